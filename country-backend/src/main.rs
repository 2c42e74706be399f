use country_backend::config::BackendConfig;
use country_backend::module::country::{CountryQueries, CountryStore, HttpGateway, Synchronizer};
use country_backend::module::renderer::SummaryRenderer;
use country_backend::server::{self, AppState};

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let (config, from_file) = BackendConfig::load()?;

    // Initialize logging
    let _logging_guard = country_backend::logging::init_logging(
        &config.log_dir,
        "country-backend",
        &config.log_level,
        config.log_retention_days,
    )?;

    tracing::info!("Country backend starting...");
    if !from_file {
        tracing::warn!("No config file found, running with defaults");
    }

    let store = CountryStore::connect(&config.database_url).await?;
    tracing::info!("Database ready at {}", config.database_url);

    let gateway = HttpGateway::from_config(&config)?;
    let synchronizer = Synchronizer::new(
        store.clone(),
        Arc::new(gateway),
        config.reference_currency.clone(),
    )
    .with_gdp_seed(config.gdp_seed);

    let state = AppState {
        queries: CountryQueries::new(store),
        synchronizer: Arc::new(synchronizer),
        renderer: Arc::new(SummaryRenderer::new(&config.render)),
        image_cache_dir: Some(PathBuf::from(&config.image_cache_dir)),
    };

    let addr = config.server_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("HTTP server listening on http://{}", addr);

    axum::serve(listener, server::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Country backend stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received.");
}
