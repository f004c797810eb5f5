use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use tutor_llm::LlmProvider;

use crate::app::AppState;

/// `GET /health` — liveness probe, reporting which LLM provider is wired
/// up and whether the database is reachable.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let db_ok = state.store.list_sessions_for_user("__health_check__").is_ok();

    Json(json!({
        "status": "ok",
        "llm_provider": state.llm.name(),
        "embeddings_enabled": state.embeddings.is_some(),
        "database": if db_ok { "ok" } else { "unreachable" },
    }))
}
