use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use tutor_core::config::TutorConfig;
use tutor_embeddings::EmbeddingProvider;
use tutor_llm::RetryingProvider;
use tutor_store::Store;

/// Central shared state — passed as `Arc<AppState>` to every Axum handler
/// and to the per-connection turn loop.
pub struct AppState {
    pub config: TutorConfig,
    pub store: Store,
    pub llm: RetryingProvider,
    pub embeddings: Option<Box<dyn EmbeddingProvider>>,
}

impl AppState {
    pub fn new(config: TutorConfig, store: Store, llm: RetryingProvider, embeddings: Option<Box<dyn EmbeddingProvider>>) -> Self {
        Self { config, store, llm, embeddings }
    }
}

/// Assemble the full Axum router: the chat WebSocket plus the REST surface
/// for session history and usage.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors_origins: Vec<_> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    let cors = CorsLayer::new().allow_origin(AllowOrigin::list(cors_origins)).allow_methods(tower_http::cors::Any);

    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/ws/chat", get(crate::ws::connection::ws_handler))
        .route("/api/chat/sessions", get(crate::http::chat::list_sessions))
        .route("/api/chat/sessions/{id}/messages", get(crate::http::chat::get_session_messages))
        .route("/api/chat/sessions/{id}", delete(crate::http::chat::delete_session))
        .route("/api/chat/usage", get(crate::http::chat::get_usage))
        .route("/api/chat/uploads", post(crate::http::uploads::upload_files))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
