use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use gatekeeper_api::config;
use gatekeeper_api::geo::PrefixGeoResolver;
use gatekeeper_api::store::PgStore;
use gatekeeper_api::{build_router, build_state};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = config::config().clone();
    config.validate().map_err(anyhow::Error::msg)?;

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let store = PgStore::connect(&database_url, 10)
        .await
        .context("failed to connect to database")?;
    store.ensure_schema().await.context("schema setup failed")?;

    let geo = Arc::new(PrefixGeoResolver::from_entries(&config.gate.country_prefixes));

    let port = config.server.port;
    let state = build_state(config, Arc::new(store), geo);
    let router = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
