//! HTTP surface: routes, handlers and middleware.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::{AppError, Result};
use crate::module::country::{CountryQueries, CountryRecord, ListQuery, StatusSummary, Synchronizer};
use crate::module::renderer::{timestamp_label, SummaryRenderer};

/// Everything the handlers need, built once in `main`.
#[derive(Clone)]
pub struct AppState {
    pub queries: CountryQueries,
    pub synchronizer: Arc<Synchronizer>,
    pub renderer: Arc<SummaryRenderer>,
    /// Where to drop `summary.png` after a refresh; `None` disables it
    pub image_cache_dir: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct RefreshResponse {
    message: &'static str,
    inserted: usize,
    updated: usize,
    total_countries: u64,
    last_refreshed_at: DateTime<Utc>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/countries", get(list_countries))
        .route("/countries/refresh", post(refresh_countries))
        .route("/countries/image", get(summary_image))
        .route("/countries/status", get(status))
        .route("/countries/{name}", get(get_country).delete(delete_country))
        .fallback(route_not_found)
        .method_not_allowed_fallback(route_not_found)
        .with_state(state)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn list_countries(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<Vec<CountryRecord>>> {
    let query = ListQuery::from_pairs(params);
    Ok(Json(state.queries.list(&query).await?))
}

async fn get_country(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<CountryRecord>> {
    Ok(Json(state.queries.get_by_name(&name).await?))
}

async fn delete_country(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode> {
    state.queries.delete_by_name(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn status(State(state): State<AppState>) -> Result<Json<StatusSummary>> {
    Ok(Json(state.queries.status().await?))
}

async fn refresh_countries(State(state): State<AppState>) -> Result<Json<RefreshResponse>> {
    let report = state.synchronizer.refresh().await?;

    if let Some(dir) = &state.image_cache_dir {
        if let Err(e) = write_summary_image(&state, dir).await {
            tracing::warn!("Failed to update cached summary image: {:#}", e);
        }
    }

    Ok(Json(RefreshResponse {
        message: "Countries refreshed successfully",
        inserted: report.inserted,
        updated: report.updated,
        total_countries: report.total_countries,
        last_refreshed_at: report.refreshed_at,
    }))
}

async fn write_summary_image(state: &AppState, dir: &std::path::Path) -> anyhow::Result<PathBuf> {
    let records = state.queries.list(&ListQuery::default()).await?;
    let label = timestamp_label(records.iter().map(|r| r.last_refreshed_at).max());
    state.renderer.clone().render_to_dir(records, label, dir).await
}

async fn summary_image(State(state): State<AppState>) -> Result<Response> {
    let records = state.queries.list(&ListQuery::default()).await?;
    let label = timestamp_label(records.iter().map(|r| r.last_refreshed_at).max());

    let png = state
        .renderer
        .clone()
        .render_blocking(records, label)
        .await
        .map_err(AppError::Render)?;

    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}

async fn route_not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "status": "error",
            "message": "Route not found. Try visiting /countries for the country endpoints.",
        })),
    )
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!("Internal Server Error: handler panicked: {}", detail);

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "status": "error",
            "message": "Something went wrong on the server. Please try again later.",
        })),
    )
        .into_response()
}
