use tutor_core::config::LlmConfig;

use crate::anthropic::AnthropicProvider;
use crate::error::LlmError;
use crate::error::LlmErrorKind;
use crate::google::GoogleProvider;
use crate::openai::OpenAiProvider;
use crate::provider::LlmProvider;
use crate::retry::RetryingProvider;

const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-5-20250929";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
const DEFAULT_GOOGLE_MODEL: &str = "gemini-2.0-flash";

/// Builds the configured provider, wrapped in the connection-retry policy.
///
/// Selection: the preferred tag (`config.provider`) wins if its
/// credential is present, otherwise the fixed priority list anthropic →
/// openai → google is tried in order. No credentialed provider is a startup
/// failure, mirroring the original's `get_llm_with_fallback` chain.
pub fn build_provider(config: &LlmConfig) -> Result<RetryingProvider, LlmError> {
    let preferred = try_build(config, &config.provider);
    if let Some(provider) = preferred {
        return Ok(RetryingProvider::new(provider));
    }

    for tag in ["anthropic", "openai", "google"] {
        if tag == config.provider {
            continue;
        }
        if let Some(provider) = try_build(config, tag) {
            return Ok(RetryingProvider::new(provider));
        }
    }

    Err(LlmError::new(
        LlmErrorKind::Upstream4xx,
        "factory",
        "no LLM provider is credentialed; set one of anthropic_api_key, openai_api_key, google_api_key",
    ))
}

fn try_build(config: &LlmConfig, tag: &str) -> Option<Box<dyn LlmProvider>> {
    match tag {
        "anthropic" => config.anthropic_api_key.clone().map(|key| {
            Box::new(AnthropicProvider::new(key, DEFAULT_ANTHROPIC_MODEL.to_string(), None))
                as Box<dyn LlmProvider>
        }),
        "openai" => config.openai_api_key.clone().map(|key| {
            Box::new(OpenAiProvider::new(key, DEFAULT_OPENAI_MODEL.to_string(), None)) as Box<dyn LlmProvider>
        }),
        "google" => config.google_api_key.clone().map(|key| {
            Box::new(GoogleProvider::new(key, DEFAULT_GOOGLE_MODEL.to_string(), None)) as Box<dyn LlmProvider>
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> LlmConfig {
        LlmConfig {
            provider: "anthropic".to_string(),
            anthropic_api_key: None,
            openai_api_key: None,
            google_api_key: None,
            max_context_tokens: 10_000,
            max_user_input_tokens: 4_000,
            context_compression_threshold: 0.5,
            max_response_tokens: 8192,
        }
    }

    #[test]
    fn falls_back_to_priority_list_when_preferred_missing() {
        let mut config = base_config();
        config.provider = "anthropic".to_string();
        config.openai_api_key = Some("key".to_string());
        let provider = build_provider(&config).unwrap();
        assert_eq!(provider.name(), "openai");
    }

    #[test]
    fn uses_preferred_when_credentialed() {
        let mut config = base_config();
        config.provider = "google".to_string();
        config.google_api_key = Some("key".to_string());
        config.anthropic_api_key = Some("key".to_string());
        let provider = build_provider(&config).unwrap();
        assert_eq!(provider.name(), "google");
    }

    #[test]
    fn fails_with_no_credentials() {
        let config = base_config();
        assert!(build_provider(&config).is_err());
    }
}
