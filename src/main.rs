use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use wa_dashboard_api::app::app;
use wa_dashboard_api::config;
use wa_dashboard_api::gateway::EvolutionClient;
use wa_dashboard_api::state::AppState;
use wa_dashboard_api::store::Stores;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up GATEWAY_URL, STORE_URL, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config::config().clone();
    config.validate()?;
    tracing::info!(
        "Starting WhatsApp Dashboard API in {:?} mode with {:?} store",
        config.environment,
        config.store.backend
    );
    if wa_dashboard_api::is_development!() && std::env::var("JWT_SECRET").is_err() {
        tracing::warn!("JWT_SECRET not set; tokens are signed with an ephemeral secret and die with the process");
    }

    let stores = Stores::connect(&config.store).await.context("failed to open store")?;
    let gateway = EvolutionClient::new(&config.gateway).context("failed to build gateway client")?;

    let bind_addr = format!("0.0.0.0:{}", config.api.port);
    let state = AppState::new(config, stores, Arc::new(gateway));

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    println!("🚀 WhatsApp Dashboard API listening on http://{}", bind_addr);

    axum::serve(listener, app(state)).await.context("server")?;
    Ok(())
}
