use futures_util::StreamExt;
use tracing::warn;
use tutor_llm::{LlmProvider, Message};

const SUMMARY_SYSTEM_PROMPT: &str = "Summarise the following conversation history into a short paragraph \
capturing what the student and tutor discussed, for use as background context in a continuing \
conversation. Keep it under 300 tokens.";
const SUMMARY_MAX_TOKENS: u32 = 300;

/// Reserved budget for the system prompt plus the current user message,
/// before any conversation history is considered.
const RESERVED_TOKENS: usize = 512;

/// Builds the bounded message sequence sent to the LLM for one turn.
///
/// `history` is ordered oldest-first. Returns a sequence whose estimated
/// token total never exceeds `budget`, whose final element is always
/// `current_user_message`, and whose kept history preserves relative order
///.
pub async fn build_context_messages(
    provider: &dyn LlmProvider,
    history: &[Message],
    current_user_message: &Message,
    budget: usize,
    compression_ratio: f32,
) -> Vec<Message> {
    let current_text = current_user_message.content.text_for_counting();
    let reserved = RESERVED_TOKENS + provider.count_tokens(&current_text);
    let remaining = budget.saturating_sub(reserved);

    let mut kept: Vec<Message> = Vec::new();
    let mut used = 0usize;
    let mut first_dropped_index = history.len();

    for (idx, message) in history.iter().enumerate().rev() {
        let tokens = provider.count_tokens(&message.content.text_for_counting());
        if used + tokens > remaining {
            first_dropped_index = idx + 1;
            break;
        }
        used += tokens;
        kept.push(message.clone());
        first_dropped_index = idx;
    }
    kept.reverse();

    let dropped = &history[..first_dropped_index];
    let dropped_tokens: usize = dropped
        .iter()
        .map(|m| provider.count_tokens(&m.content.text_for_counting()))
        .sum();

    let mut result = Vec::new();
    if !dropped.is_empty() && dropped_tokens as f32 > (1.0 - compression_ratio) * budget as f32 {
        if let Some(summary) = summarise(provider, dropped).await {
            result.push(Message::user(format!("[Earlier context summary: {summary}]")));
        }
    }
    result.extend(kept);
    result.push(current_user_message.clone());
    result
}

async fn summarise(provider: &dyn LlmProvider, dropped: &[Message]) -> Option<String> {
    let transcript: String = dropped
        .iter()
        .map(|m| format!("{:?}: {}", m.role, m.content.text_for_counting()))
        .collect::<Vec<_>>()
        .join("\n");

    let request = [Message::user(transcript)];
    let stream = provider
        .generate_stream(SUMMARY_SYSTEM_PROMPT, &request, SUMMARY_MAX_TOKENS)
        .await
        .map_err(|e| warn!(error = %e, "context summarisation failed to start"))
        .ok()?;

    let mut stream = stream;
    let mut out = String::new();
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(text) => out.push_str(&text),
            Err(e) => {
                warn!(error = %e, "context summarisation stream ended early");
                break;
            }
        }
    }
    if out.trim().is_empty() {
        None
    } else {
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tutor_llm::{LlmError, TextChunkStream};

    struct CountingProvider;

    #[async_trait]
    impl LlmProvider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        async fn generate_stream(
            &self,
            _system_prompt: &str,
            _messages: &[Message],
            _max_tokens: u32,
        ) -> Result<TextChunkStream, LlmError> {
            Ok(Box::pin(futures_util::stream::iter(vec![Ok(
                "a prior discussion summary".to_string(),
            )])))
        }
    }

    fn long_message(label: &str, words: usize) -> Message {
        Message::user(vec![label; words].join(" "))
    }

    #[tokio::test]
    async fn final_element_is_always_current_message() {
        let provider = CountingProvider;
        let history = vec![long_message("hist", 5)];
        let current = Message::user("what now?");
        let result = build_context_messages(&provider, &history, &current, 10_000, 0.5).await;
        assert_eq!(result.last().unwrap().content.text_for_counting(), "what now?");
    }

    #[tokio::test]
    async fn result_respects_budget() {
        let provider = CountingProvider;
        let history: Vec<Message> = (0..50).map(|i| long_message(&format!("turn{i}"), 200)).collect();
        let current = Message::user("current question");
        let budget = 1_000;
        let result = build_context_messages(&provider, &history, &current, budget, 0.5).await;
        let total: usize = result
            .iter()
            .map(|m| provider.count_tokens(&m.content.text_for_counting()))
            .sum();
        assert!(total <= budget);
    }

    #[tokio::test]
    async fn empty_history_yields_only_current_message() {
        let provider = CountingProvider;
        let current = Message::user("hello");
        let result = build_context_messages(&provider, &[], &current, 10_000, 0.5).await;
        assert_eq!(result.len(), 1);
    }

    #[tokio::test]
    async fn kept_history_preserves_relative_order() {
        let provider = CountingProvider;
        let history = vec![Message::user("first"), Message::user("second"), Message::user("third")];
        let current = Message::user("current");
        let result = build_context_messages(&provider, &history, &current, 10_000, 0.5).await;
        let texts: Vec<String> = result.iter().map(|m| m.content.text_for_counting()).collect();
        assert_eq!(texts, vec!["first", "second", "third", "current"]);
    }
}
