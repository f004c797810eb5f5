use futures_util::StreamExt;
use tracing::warn;
use tutor_llm::{LlmProvider, Message, TextChunkStream};

/// Drains a `generate_stream` result into a single string, stopping (and
/// keeping whatever text arrived so far) on the first mid-stream error —
/// classification prompts are best-effort, so a partial answer is still
/// worth tolerantly parsing.
async fn collect_text(mut stream: TextChunkStream) -> String {
    let mut out = String::new();
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(text) => out.push_str(&text),
            Err(e) => {
                warn!(error = %e, "classification stream ended early");
                break;
            }
        }
    }
    out
}

async fn ask(
    provider: &dyn LlmProvider,
    system_prompt: &str,
    user_message: &str,
    max_tokens: u32,
) -> Option<String> {
    let messages = [Message::user(user_message)];
    match provider.generate_stream(system_prompt, &messages, max_tokens).await {
        Ok(stream) => Some(collect_text(stream).await),
        Err(e) => {
            warn!(error = %e, "classification request failed to start");
            None
        }
    }
}

const TOPIC_FILTER_SYSTEM_PROMPT: &str = "Classify this message as one of: GREETING, OFF_TOPIC, ON_TOPIC. \
Respond with exactly one of those three words and nothing else.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicFilter {
    Greeting,
    OffTopic,
    OnTopic,
}

/// Classify a message's topic. Malformed or unreachable classifier output
/// falls back to `OnTopic` so a transient LLM hiccup never blocks the turn.
pub async fn classify_topic(provider: &dyn LlmProvider, user_message: &str) -> TopicFilter {
    let Some(raw) = ask(provider, TOPIC_FILTER_SYSTEM_PROMPT, user_message, 30).await else {
        return TopicFilter::OnTopic;
    };
    let upper = raw.trim().to_uppercase();
    if upper.contains("GREETING") {
        TopicFilter::Greeting
    } else if upper.contains("OFF_TOPIC") {
        TopicFilter::OffTopic
    } else {
        TopicFilter::OnTopic
    }
}

const HINT_LEVEL_SYSTEM_PROMPT: &str = "You are selecting how much to reveal to a student asking a programming or \
maths question. Respond with a single digit 1-4: 1 = conceptual nudge, 2 = guiding question, \
3 = partial solution outline, 4 = full worked solution. Respond with only the digit.";

/// Default hint level used whenever the classifier's response can't be
/// parsed into 1..4.
pub const DEFAULT_HINT_LEVEL: u8 = 2;

pub async fn classify_hint_level(provider: &dyn LlmProvider, user_message: &str) -> u8 {
    let Some(raw) = ask(provider, HINT_LEVEL_SYSTEM_PROMPT, user_message, 10).await else {
        return DEFAULT_HINT_LEVEL;
    };
    first_digit_in_range(&raw, 1, 4).unwrap_or(DEFAULT_HINT_LEVEL)
}

const DIFFICULTY_SYSTEM_PROMPT: &str = "Rate this question's difficulty on two independent 1-5 scales: \
programming difficulty and maths difficulty. Respond with exactly two digits separated by a comma, \
for example: 3,2";

/// Estimate `(programming_difficulty, maths_difficulty)`. Falls back to the
/// student's current rounded effective levels when the classifier output is
/// malformed.
pub async fn classify_difficulty(
    provider: &dyn LlmProvider,
    user_message: &str,
    fallback_programming: u8,
    fallback_maths: u8,
) -> (u8, u8) {
    let Some(raw) = ask(provider, DIFFICULTY_SYSTEM_PROMPT, user_message, 10).await else {
        return (fallback_programming, fallback_maths);
    };
    parse_difficulty_pair(&raw).unwrap_or((fallback_programming, fallback_maths))
}

fn first_digit_in_range(text: &str, lo: u8, hi: u8) -> Option<u8> {
    text.chars()
        .filter_map(|c| c.to_digit(10).map(|d| d as u8))
        .find(|d| (lo..=hi).contains(d))
}

fn parse_difficulty_pair(text: &str) -> Option<(u8, u8)> {
    let digits: Vec<u8> = text.chars().filter_map(|c| c.to_digit(10).map(|d| d as u8)).collect();
    let programming = *digits.first()?;
    let maths = *digits.get(1)?;
    if (1..=5).contains(&programming) && (1..=5).contains(&maths) {
        Some((programming, maths))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hint_level_from_noisy_text() {
        assert_eq!(first_digit_in_range("Level: 3 out of 4", 1, 4), Some(3));
    }

    #[test]
    fn hint_level_out_of_range_is_rejected() {
        assert_eq!(first_digit_in_range("9", 1, 4), None);
    }

    #[test]
    fn parses_difficulty_pair() {
        assert_eq!(parse_difficulty_pair("3,2"), Some((3, 2)));
        assert_eq!(parse_difficulty_pair("programming=4 maths=1"), Some((4, 1)));
    }

    #[test]
    fn malformed_difficulty_pair_is_none() {
        assert_eq!(parse_difficulty_pair("not sure"), None);
        assert_eq!(parse_difficulty_pair("7,2"), None);
    }
}
