use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::module::country::GatewayError;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("country not found: {0}")]
    NotFound(String),

    #[error("external data source unavailable: {0}")]
    GatewayUnavailable(#[from] GatewayError),

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("failed to render summary image: {0:#}")]
    Render(anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::GatewayUnavailable(_) | AppError::Store(_) | AppError::Render(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.status_code();

        let body = match &self {
            AppError::NotFound(name) => {
                tracing::debug!("Country not found: {}", name);
                json!({ "error": "Country not found" })
            }
            AppError::GatewayUnavailable(err) => {
                tracing::error!("Refresh failed: {}", err);
                json!({
                    "error": "External data source unavailable",
                    "details": err.to_string(),
                })
            }
            AppError::Store(_) | AppError::Render(_) => {
                tracing::error!("Internal error: {}", self);
                json!({
                    "status": "error",
                    "message": "Something went wrong on the server. Please try again later.",
                })
            }
        };

        (code, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode as UpstreamStatus;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::Store(sqlx::Error::RowNotFound).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );

        let gateway = GatewayError::Status {
            url: "http://upstream".to_string(),
            status: UpstreamStatus::BAD_GATEWAY,
        };
        let err = AppError::from(gateway);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().contains("http://upstream"));
    }
}
