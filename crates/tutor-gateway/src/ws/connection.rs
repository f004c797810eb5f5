use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::ws::{Message, WebSocket},
    extract::{Query, State, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

use tutor_pedagogy::StudentState;
use tutor_protocol::frames::{ClientFrame, ServerEvent};

use crate::app::AppState;
use crate::pipeline::{run_turn, TurnOutcome};
use crate::ws::handshake::authenticate;

/// WS close code sent when the upgrade handshake's auth check fails.
const AUTH_FAILURE_CLOSE_CODE: u16 = 4001;

/// Axum handler for `GET /ws/chat?token=<access-jwt>`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let token = params.get("token").cloned();
    ws.on_upgrade(move |socket| handle_connection(socket, state, token))
}

/// Per-connection task: authenticates once, then processes frames strictly
/// sequentially for the lifetime of the socket.
async fn handle_connection(socket: WebSocket, state: Arc<AppState>, token: Option<String>) {
    let (mut tx, mut rx) = socket.split();

    let user = match authenticate(&state, token.as_deref()).await {
        Ok(user) => user,
        Err(e) => {
            warn!(error = %e, "WS auth failed, closing connection");
            let _ = tx
                .send(Message::Close(Some(axum::extract::ws::CloseFrame {
                    code: AUTH_FAILURE_CLOSE_CODE,
                    reason: "authentication failed".into(),
                })))
                .await;
            return;
        }
    };

    info!(user_id = %user.id, "WS connection authenticated");

    let mut student_state = StudentState {
        programming_level: if user.effective_programming_level > 0.0 {
            user.effective_programming_level
        } else {
            user.programming_level as f32
        },
        maths_level: if user.effective_maths_level > 0.0 {
            user.effective_maths_level
        } else {
            user.maths_level as f32
        },
        last_embedding: user.last_embedding.clone(),
        last_updated: user.last_embedding_at,
    };

    // Events are written by a dedicated task so `run_turn` can stream
    // `token` chunks without waiting on the main loop to come back around
    // for the next inbound frame.
    let (event_tx, mut event_rx) = mpsc::channel::<ServerEvent>(64);
    let writer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if tx.send(Message::Text(event.to_json().into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        match rx.next().await {
            Some(Ok(Message::Text(text))) => {
                let frame: ClientFrame = match serde_json::from_str(&text) {
                    Ok(f) => f,
                    Err(e) => {
                        warn!(user_id = %user.id, error = %e, "malformed client frame");
                        let event = ServerEvent::Error { message: "malformed message".to_string() };
                        if event_tx.send(event).await.is_err() {
                            break;
                        }
                        continue;
                    }
                };

                let outcome = run_turn(&state, &user.id, &user.display_name, &mut student_state, frame, &event_tx).await;
                if matches!(outcome, TurnOutcome::ConnectionFatal) {
                    break;
                }
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!(user_id = %user.id, error = %e, "WS receive error");
                break;
            }
        }
    }

    drop(event_tx);
    let _ = writer.await;
    info!(user_id = %user.id, "WS connection closed");
}
