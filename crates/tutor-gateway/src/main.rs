use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

mod app;
mod auth;
mod http;
mod pipeline;
mod ws;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tutor_gateway=info,tower_http=debug".into()),
        )
        .init();

    // load config: explicit path > TUTOR_CONFIG env > ~/.tutor/tutor.toml
    let config_path = std::env::var("TUTOR_CONFIG").ok();
    let config = tutor_core::config::TutorConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("config load failed ({e}), using defaults");
        tutor_core::config::TutorConfig::default()
    });

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;

    let store = tutor_store::Store::open(&config.database.path)?;
    let llm = tutor_llm::build_provider(&config.llm)?;
    let embeddings = tutor_embeddings::build_provider(&config.embeddings);

    let state = Arc::new(app::AppState::new(config, store, llm, embeddings));
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!("tutor gateway listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
