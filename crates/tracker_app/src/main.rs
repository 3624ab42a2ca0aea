mod config;
mod logging;

use std::sync::Arc;

use anyhow::Context;
use engine_logging::{engine_error, engine_info};
use tokio_util::sync::CancellationToken;
use tracker_engine::{CatalogSettings, HttpCatalogClient, NoopSink, Tracker};

use crate::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    logging::initialize(&config.log_path());

    let client = HttpCatalogClient::new(CatalogSettings::new(config.catalog_url.clone()))
        .context("invalid catalog configuration")?;
    let tracker = Tracker::start(
        config.tracker_settings(),
        Arc::new(client),
        &config.credentials,
        Arc::new(NoopSink),
    )
    .await
    .context("startup failed")?;

    let shutdown = CancellationToken::new();
    let on_interrupt = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => on_interrupt.cancel(),
            Err(err) => engine_error!("Could not listen for the interrupt signal: {}", err),
        }
    });

    let result = tracker.run(shutdown).await.context("tracking aborted");
    engine_info!("Exiting\n\n");
    result
}
