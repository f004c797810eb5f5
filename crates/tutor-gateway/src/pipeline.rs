use base64::Engine;
use chrono::Utc;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{error, instrument};

use tutor_context::{build_context_messages, build_system_prompt};
use tutor_llm::{ContentPart, LlmProvider, Message as LlmMessage, MessageContent, Role as LlmRole};
use tutor_pedagogy::{FilterResult, PedagogyEngine, StudentState};
use tutor_protocol::frames::{ClientFrame, FilterKind, ServerEvent};
use tutor_store::UploadedFileRow;

use crate::app::AppState;

/// Token weight charged per attached image toward the per-turn input
/// estimate, since image content isn't counted by `count_tokens`.
const IMAGE_TOKEN_WEIGHT: usize = 512;

/// Result of one turn. `ConnectionFatal` means a store error occurred and
/// the caller must close the WS connection; every other outcome leaves the
/// connection open for the next frame.
pub enum TurnOutcome {
    Completed,
    ConnectionFatal,
}

/// Runs one full turn of the chat pipeline: quota check, attachment
/// resolution, enrichment, pedagogy decision, context assembly, streaming
/// generation, and persistence. Turns on one connection are never run
/// concurrently with each other — the caller awaits this before reading the
/// next frame.
#[instrument(skip_all, fields(user_id = %user_id))]
pub async fn run_turn(
    state: &AppState,
    user_id: &str,
    display_name: &str,
    student_state: &mut StudentState,
    frame: ClientFrame,
    emit: &mpsc::Sender<ServerEvent>,
) -> TurnOutcome {
    let within_limits = match state.store.check_daily_limit(
        user_id,
        state.config.quotas.user_daily_input_token_limit,
        state.config.quotas.user_daily_output_token_limit,
    ) {
        Ok(ok) => ok,
        Err(e) => return fatal(emit, e).await,
    };
    if !within_limits {
        let _ = emit
            .send(ServerEvent::Error {
                message: "daily token limit reached; quota resets at midnight".to_string(),
            })
            .await;
        return TurnOutcome::Completed;
    }

    let upload_ids: Vec<String> = frame.upload_ids.iter().map(|id| id.to_string()).collect();
    let uploads = if upload_ids.is_empty() {
        Vec::new()
    } else {
        match state.store.get_user_uploads_by_ids(user_id, &upload_ids) {
            Ok(rows) => rows,
            Err(e) => return fatal(emit, e).await,
        }
    };
    if uploads.len() != upload_ids.len() {
        let _ = emit
            .send(ServerEvent::Error {
                message: "one or more attachments were not found or have expired".to_string(),
            })
            .await;
        return TurnOutcome::Completed;
    }

    let image_uploads: Vec<&UploadedFileRow> = uploads.iter().filter(|u| u.file_type == "image").collect();
    let document_uploads: Vec<&UploadedFileRow> = uploads.iter().filter(|u| u.file_type == "document").collect();
    if image_uploads.len() > state.config.uploads.max_images_per_message
        || document_uploads.len() > state.config.uploads.max_documents_per_message
    {
        let _ = emit
            .send(ServerEvent::Error {
                message: "too many attachments for one message".to_string(),
            })
            .await;
        return TurnOutcome::Completed;
    }

    let mut enriched = frame.content.clone();
    for doc in &document_uploads {
        enriched.push_str(&format!(
            "\n[Attached document: {}]\n{}",
            doc.original_filename,
            doc.extracted_text.as_deref().unwrap_or("")
        ));
    }
    if frame.content.trim().is_empty() && document_uploads.is_empty() {
        enriched = "Please analyse the attached files.".to_string();
    }

    let input_tokens_estimate = state.llm.count_tokens(&enriched) + IMAGE_TOKEN_WEIGHT * image_uploads.len();
    if input_tokens_estimate > state.config.llm.max_user_input_tokens {
        let _ = emit
            .send(ServerEvent::Error {
                message: "message is too long; please shorten it or remove attachments".to_string(),
            })
            .await;
        return TurnOutcome::Completed;
    }

    let combined_embedding = compute_combined_embedding(state, &enriched, &image_uploads).await;

    let session = match state
        .store
        .get_or_create_session(user_id, frame.session_id.map(|id| id.to_string()).as_deref())
    {
        Ok(s) => s,
        Err(e) => return fatal(emit, e).await,
    };

    let attachment_ids: Vec<String> = uploads.iter().map(|u| u.id.clone()).collect();
    if let Err(e) = state.store.save_message(
        &session.id,
        "user",
        &enriched,
        None,
        None,
        None,
        Some(input_tokens_estimate as u32),
        None,
        &attachment_ids,
    ) {
        return fatal(emit, e).await;
    }
    if let Err(e) = state.store.increment_token_usage(user_id, input_tokens_estimate as u64, 0) {
        return fatal(emit, e).await;
    }

    let session_uuid = uuid::Uuid::parse_str(&session.id).unwrap_or_else(|_| uuid::Uuid::nil());
    if emit.send(ServerEvent::Session { session_id: session_uuid }).await.is_err() {
        return TurnOutcome::Completed;
    }

    let enable_topic_filters = uploads.is_empty();
    let engine = PedagogyEngine::new(&state.llm, &state.config.pedagogy);
    let now = Utc::now();
    let decision = engine
        .process_message(&enriched, display_name, student_state, combined_embedding.as_deref(), enable_topic_filters, now)
        .await;

    if let Some(canned) = decision.canned_response.clone() {
        let filter = match decision.filter_result {
            Some(FilterResult::Greeting) => FilterKind::Greeting,
            _ => FilterKind::OffTopic,
        };
        let _ = emit.send(ServerEvent::Canned { content: canned.clone(), filter }).await;
        if let Err(e) = state
            .store
            .save_message(&session.id, "assistant", &canned, None, None, None, None, None, &[])
        {
            return fatal(emit, e).await;
        }
        return TurnOutcome::Completed;
    }

    let mut history_pairs = match state.store.get_chat_history(&session.id) {
        Ok(h) => h,
        Err(e) => return fatal(emit, e).await,
    };
    history_pairs.pop(); // drop the user message just persisted above
    let history: Vec<LlmMessage> = history_pairs
        .into_iter()
        .map(|(role, content)| match role.as_str() {
            "assistant" => LlmMessage::assistant(content),
            _ => LlmMessage::user(content),
        })
        .collect();

    let current_message = build_current_message(&enriched, &image_uploads);

    let context_messages = build_context_messages(
        &state.llm,
        &history,
        &current_message,
        state.config.llm.max_context_tokens,
        state.config.llm.context_compression_threshold,
    )
    .await;

    let system_prompt = build_system_prompt(
        decision.hint_level,
        student_state.programming_level.round() as u8,
        student_state.maths_level.round() as u8,
    );

    let mut stream = match state
        .llm
        .generate_stream(&system_prompt, &context_messages, state.config.llm.max_response_tokens)
        .await
    {
        Ok(s) => s,
        Err(e) => {
            let _ = emit.send(ServerEvent::Error { message: format!("AI service error: {e}") }).await;
            return TurnOutcome::Completed;
        }
    };

    let mut assistant_text = String::new();
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(text) => {
                assistant_text.push_str(&text);
                if emit.send(ServerEvent::Token { content: text }).await.is_err() {
                    return TurnOutcome::Completed;
                }
            }
            Err(e) => {
                let _ = emit.send(ServerEvent::Error { message: format!("AI service error: {e}") }).await;
                return TurnOutcome::Completed;
            }
        }
    }

    let output_tokens_estimate = state.llm.count_tokens(&assistant_text);
    let qa_text = format!("{enriched}\n{assistant_text}");
    let qa_embedding = compute_combined_embedding(state, &qa_text, &image_uploads).await.or(combined_embedding);
    student_state.apply_update(
        decision.programming_difficulty,
        decision.maths_difficulty,
        state.config.pedagogy.level_drift_step,
        qa_embedding,
        now,
    );

    if let Err(e) = state.store.save_message(
        &session.id,
        "assistant",
        &assistant_text,
        Some(decision.hint_level),
        Some(decision.programming_difficulty),
        Some(decision.maths_difficulty),
        None,
        Some(output_tokens_estimate as u32),
        &[],
    ) {
        return fatal(emit, e).await;
    }
    if let Err(e) = state.store.increment_token_usage(user_id, 0, output_tokens_estimate as u64) {
        return fatal(emit, e).await;
    }
    if let Err(e) = state.store.update_student_state(
        user_id,
        student_state.programming_level,
        student_state.maths_level,
        student_state.last_embedding.as_deref(),
    ) {
        return fatal(emit, e).await;
    }

    let _ = emit
        .send(ServerEvent::Done {
            hint_level: decision.hint_level,
            programming_difficulty: decision.programming_difficulty,
            maths_difficulty: decision.maths_difficulty,
        })
        .await;

    TurnOutcome::Completed
}

fn build_current_message(enriched: &str, image_uploads: &[&UploadedFileRow]) -> LlmMessage {
    if image_uploads.is_empty() {
        return LlmMessage::user(enriched);
    }

    let mut parts = vec![ContentPart::Text { text: enriched.to_string() }];
    for image in image_uploads {
        if let Ok(bytes) = std::fs::read(&image.storage_path) {
            parts.push(ContentPart::Image {
                media_type: image.content_type.clone(),
                data: base64::engine::general_purpose::STANDARD.encode(bytes),
            });
        }
    }
    LlmMessage {
        role: LlmRole::User,
        content: MessageContent::Parts(parts),
    }
}

async fn compute_combined_embedding(
    state: &AppState,
    text: &str,
    image_uploads: &[&UploadedFileRow],
) -> Option<Vec<f32>> {
    let provider = state.embeddings.as_ref()?;
    let mut vectors = Vec::new();
    if let Some(v) = provider.embed_text(text).await {
        vectors.push(v);
    }
    for image in image_uploads {
        if let Ok(bytes) = tokio::fs::read(&image.storage_path).await {
            if let Some(v) = provider.embed_image(&bytes, &image.content_type).await {
                vectors.push(v);
            }
        }
    }
    tutor_embeddings::combine(&vectors)
}

async fn fatal(emit: &mpsc::Sender<ServerEvent>, e: impl std::fmt::Display) -> TurnOutcome {
    error!(error = %e, "store error mid-turn; closing connection");
    let _ = emit
        .send(ServerEvent::Error { message: "internal storage error".to_string() })
        .await;
    TurnOutcome::ConnectionFatal
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tutor_core::config::{PedagogyConfig, QuotaConfig, TutorConfig, UploadConfig};
    use tutor_llm::{LlmError, Message, RetryingProvider, TextChunkStream};
    use tutor_store::Store;

    /// Replies to `generate_stream` in call order; the first three calls are
    /// consumed by pedagogy classification, the fourth is the turn's actual
    /// generation.
    struct ScriptedProvider {
        replies: std::sync::Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate_stream(
            &self,
            _system_prompt: &str,
            _messages: &[Message],
            _max_tokens: u32,
        ) -> Result<TextChunkStream, LlmError> {
            let mut replies = self.replies.lock().unwrap();
            let next = if replies.is_empty() { "ON_TOPIC" } else { replies.remove(0) };
            Ok(Box::pin(futures_util::stream::iter(vec![Ok(next.to_string())])))
        }
    }

    fn test_state(scripted_replies: Vec<&'static str>) -> (AppState, StudentState) {
        let mut config = TutorConfig::default();
        config.pedagogy = PedagogyConfig {
            continuation_similarity_threshold: 0.8,
            continuation_window_secs: 900,
            level_drift_step: 0.05,
        };
        config.quotas = QuotaConfig {
            user_daily_input_token_limit: 200_000,
            user_daily_output_token_limit: 50_000,
        };
        config.uploads = UploadConfig {
            storage_dir: "/tmp/tutor-gateway-test-uploads".to_string(),
            expiry_hours: 24,
            max_images_per_message: 4,
            max_documents_per_message: 4,
            max_image_mb: 10,
            max_document_mb: 20,
            max_document_tokens: 8_000,
        };

        let store = Store::open_in_memory().unwrap();
        store.get_or_create_user("u1", "Ada", "").unwrap();

        let llm = RetryingProvider::new(Box::new(ScriptedProvider {
            replies: std::sync::Mutex::new(scripted_replies),
        }));
        let state = AppState::new(config, store, llm, None);
        (state, StudentState::default())
    }

    fn frame(content: &str) -> ClientFrame {
        ClientFrame { content: content.to_string(), session_id: None, upload_ids: Vec::new() }
    }

    #[tokio::test]
    async fn happy_path_streams_tokens_and_persists_both_messages() {
        let (state, mut student_state) =
            test_state(vec!["ON_TOPIC", "2", "3,2", "Here's a hint."]);
        let (tx, mut rx) = mpsc::channel(16);

        let outcome = run_turn(&state, "u1", "Ada", &mut student_state, frame("how do loops work?"), &tx).await;
        assert!(matches!(outcome, TurnOutcome::Completed));
        drop(tx);

        let mut events = Vec::new();
        while let Some(e) = rx.recv().await {
            events.push(e);
        }
        assert!(matches!(events[0], ServerEvent::Session { .. }));
        assert!(events.iter().any(|e| matches!(e, ServerEvent::Token { content } if content == "Here's a hint.")));
        assert!(matches!(events.last().unwrap(), ServerEvent::Done { .. }));

        let usage = state.store.get_daily_usage("u1").unwrap();
        assert!(usage.input_tokens_used > 0);
        assert!(usage.output_tokens_used > 0);
    }

    #[tokio::test]
    async fn greeting_short_circuits_without_generation() {
        let (state, mut student_state) = test_state(vec!["GREETING"]);
        let (tx, mut rx) = mpsc::channel(16);

        let outcome = run_turn(&state, "u1", "Ada", &mut student_state, frame("hi!"), &tx).await;
        assert!(matches!(outcome, TurnOutcome::Completed));
        drop(tx);

        let mut events = Vec::new();
        while let Some(e) = rx.recv().await {
            events.push(e);
        }
        assert_eq!(events.len(), 2, "expect Session then Canned, no Done");
        assert!(matches!(events[0], ServerEvent::Session { .. }));
        assert!(matches!(events[1], ServerEvent::Canned { .. }));
    }

    #[tokio::test]
    async fn quota_exceeded_emits_error_without_creating_a_session() {
        let (state, mut student_state) = test_state(vec![]);
        state.store.increment_token_usage("u1", 200_000, 0).unwrap();
        let (tx, mut rx) = mpsc::channel(16);

        let outcome = run_turn(&state, "u1", "Ada", &mut student_state, frame("hello"), &tx).await;
        assert!(matches!(outcome, TurnOutcome::Completed));
        drop(tx);

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, ServerEvent::Error { .. }));
        assert!(rx.recv().await.is_none());
        assert!(state.store.list_sessions_for_user("u1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_attachment_is_rejected_before_any_persistence() {
        let (state, mut student_state) = test_state(vec![]);
        let mut bad_frame = frame("look at this");
        bad_frame.upload_ids = vec![uuid::Uuid::new_v4()];
        let (tx, mut rx) = mpsc::channel(16);

        let outcome = run_turn(&state, "u1", "Ada", &mut student_state, bad_frame, &tx).await;
        assert!(matches!(outcome, TurnOutcome::Completed));
        drop(tx);

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, ServerEvent::Error { .. }));
        assert!(state.store.list_sessions_for_user("u1").unwrap().is_empty());
    }
}
