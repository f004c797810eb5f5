use chrono::{DateTime, Utc};
use serde::Serialize;

use tutor_core::config::PedagogyConfig;
use tutor_embeddings::cosine_similarity;
use tutor_llm::LlmProvider;

use crate::canned::canned_response;
use crate::classify::{classify_difficulty, classify_hint_level, classify_topic, TopicFilter};
use crate::state::StudentState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterResult {
    Greeting,
    OffTopic,
}

/// The decision handed back to the chat pipeline for one turn.
/// When `filter_result`/`canned_response` are set, the caller emits the
/// canned response and skips LLM generation entirely.
#[derive(Debug, Clone, Serialize)]
pub struct PedagogyDecision {
    #[serde(skip)]
    pub filter_result: Option<FilterResult>,
    pub canned_response: Option<String>,
    pub hint_level: u8,
    pub programming_difficulty: u8,
    pub maths_difficulty: u8,
}

pub struct PedagogyEngine<'a> {
    provider: &'a dyn LlmProvider,
    config: &'a PedagogyConfig,
}

impl<'a> PedagogyEngine<'a> {
    pub fn new(provider: &'a dyn LlmProvider, config: &'a PedagogyConfig) -> Self {
        Self { provider, config }
    }

    /// Runs the full per-turn pedagogy pipeline: topic filter (unless
    /// attachments are present, since attachments always make the message
    /// task context) → hint level → difficulty estimation.
    pub async fn process_message(
        &self,
        user_message: &str,
        display_name: &str,
        state: &StudentState,
        combined_embedding: Option<&[f32]>,
        enable_topic_filters: bool,
        now: DateTime<Utc>,
    ) -> PedagogyDecision {
        if enable_topic_filters {
            let topic = classify_topic(self.provider, user_message).await;
            if let Some(decision) = self.filtered_decision(topic, display_name) {
                return decision;
            }
        }

        let is_continuation = state
            .last_embedding
            .as_deref()
            .zip(combined_embedding)
            .zip(state.last_updated)
            .map(|((last, current), last_updated)| {
                let within_window =
                    (now - last_updated).num_seconds() <= self.config.continuation_window_secs;
                within_window
                    && cosine_similarity(last, current) >= self.config.continuation_similarity_threshold
            })
            .unwrap_or(false);

        let mut hint_level = classify_hint_level(self.provider, user_message).await;
        if is_continuation {
            hint_level = (hint_level + 1).min(4);
        }

        let (programming_difficulty, maths_difficulty) = classify_difficulty(
            self.provider,
            user_message,
            state.programming_level.round() as u8,
            state.maths_level.round() as u8,
        )
        .await;

        PedagogyDecision {
            filter_result: None,
            canned_response: None,
            hint_level,
            programming_difficulty,
            maths_difficulty,
        }
    }

    fn filtered_decision(&self, topic: TopicFilter, display_name: &str) -> Option<PedagogyDecision> {
        let filter_result = match topic {
            TopicFilter::Greeting => FilterResult::Greeting,
            TopicFilter::OffTopic => FilterResult::OffTopic,
            TopicFilter::OnTopic => return None,
        };
        Some(PedagogyDecision {
            filter_result: Some(filter_result),
            canned_response: canned_response(topic, display_name),
            hint_level: 0,
            programming_difficulty: 0,
            maths_difficulty: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tutor_llm::{LlmError, Message, TextChunkStream};

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

    fn config() -> PedagogyConfig {
        PedagogyConfig {
            continuation_similarity_threshold: 0.8,
            continuation_window_secs: 900,
            level_drift_step: 0.05,
        }
    }

    #[tokio::test]
    async fn greeting_short_circuits_to_canned_response() {
        let provider = ScriptedProvider {
            replies: std::sync::Mutex::new(vec!["GREETING"]),
        };
        let cfg = config();
        let engine = PedagogyEngine::new(&provider, &cfg);
        let state = StudentState::default();
        let now = Utc::now();
        let decision = engine
            .process_message("hi there", "Ada", &state, None, true, now)
            .await;
        assert_eq!(decision.filter_result, Some(FilterResult::Greeting));
        assert!(decision.canned_response.unwrap().contains("Ada"));
    }

    #[tokio::test]
    async fn attachments_skip_topic_filter() {
        let provider = ScriptedProvider {
            replies: std::sync::Mutex::new(vec!["OFF_TOPIC", "2", "3,2"]),
        };
        let cfg = config();
        let engine = PedagogyEngine::new(&provider, &cfg);
        let state = StudentState::default();
        let now = Utc::now();
        let decision = engine
            .process_message("look at this file", "Ada", &state, None, false, now)
            .await;
        assert!(decision.filter_result.is_none());
    }

    #[tokio::test]
    async fn continuation_increments_hint_level() {
        let provider = ScriptedProvider {
            replies: std::sync::Mutex::new(vec!["ON_TOPIC", "2", "3,2"]),
        };
        let cfg = config();
        let engine = PedagogyEngine::new(&provider, &cfg);
        let now = Utc::now();
        let state = StudentState {
            programming_level: 2.5,
            maths_level: 2.5,
            last_embedding: Some(vec![1.0, 0.0]),
            last_updated: Some(now),
        };
        let decision = engine
            .process_message("still stuck", "Ada", &state, Some(&[1.0, 0.0]), true, now)
            .await;
        assert_eq!(decision.hint_level, 3);
    }

    #[tokio::test]
    async fn hint_level_increment_is_bounded_to_four() {
        let provider = ScriptedProvider {
            replies: std::sync::Mutex::new(vec!["ON_TOPIC", "4", "3,2"]),
        };
        let cfg = config();
        let engine = PedagogyEngine::new(&provider, &cfg);
        let now = Utc::now();
        let state = StudentState {
            programming_level: 2.5,
            maths_level: 2.5,
            last_embedding: Some(vec![1.0, 0.0]),
            last_updated: Some(now),
        };
        let decision = engine
            .process_message("still stuck", "Ada", &state, Some(&[1.0, 0.0]), true, now)
            .await;
        assert_eq!(decision.hint_level, 4);
    }
}
