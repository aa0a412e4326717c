//! HTTP server that prices recycling-centre visits.

mod config;
mod routes;

use anyhow::{Context, Result};
use reqwest::Client;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use recyparc_core::{rules::PricingRuleEngine, service::PriceCalculator};
use recyparc_provider_api as provider;

use crate::config::{AppConfig, CONFIG_ENV, config_path};
use crate::routes::{AppState, router};

#[tokio::main]
async fn main() -> Result<()> {
    let path = config_path();
    let (config, load_error) = match AppConfig::load(&path) {
        Ok(config) => (config, None),
        Err(err) => (AppConfig::default(), Some(err)),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    match load_error {
        None => info!(path = %path.display(), "configuration loaded"),
        Some(err) => warn!(
            path = %path.display(),
            error = %format!("{err:#}"),
            "using default configuration; set {CONFIG_ENV} to point at a config file"
        ),
    }

    // HTTP + service setup
    let client = Client::builder().user_agent("recyparc/0.1").build()?;
    let collaborators = provider::plugin(client, config.api.settings());
    info!(backend = %collaborators.name, base_url = %config.api.base_url, "collaborators ready");

    let mut calculator = PriceCalculator::new(collaborators, PricingRuleEngine::with_default_rules());
    if config.api.preload_visitors
        && let Err(err) = calculator.preload_visitors().await
    {
        error!(error = %err, "visitor preload failed, continuing with lazy lookups");
    }

    let app = router(AppState::new(calculator, config.api.preload_visitors));

    let addr = config.server.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("cannot bind {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
