mod aggregate;
mod centers;
mod config;
mod error;
mod logging;
mod provider;
mod routes;

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::logging::LoggingConfig;
use crate::provider::GoogleDistanceMatrix;
use crate::routes::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment (.env is optional)
    let dotenv = dotenvy::dotenv();
    logging::init(&LoggingConfig::from_env());
    if let Ok(path) = dotenv {
        info!(path = %path.display(), "loaded environment file");
    }

    let config = Config::from_env();
    if config.has_credential() {
        info!("Google Maps API key configured");
    } else {
        warn!("GOOGLE_MAPS_APIKEY is not set; /calculate will fail until it is");
    }

    // 2. Routing provider
    let provider = GoogleDistanceMatrix::from_config(&config)?;

    info!(
        centers = %config.centers_path.display(),
        policy = ?config.failure_policy,
        timeout_secs = config.provider_timeout.as_secs(),
        "configuration loaded"
    );

    let addr = config.bind_addr();
    let shared_state = Arc::new(AppState {
        config,
        provider: Arc::new(provider),
    });

    // 3. Router
    let app = routes::router(shared_state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "API server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
