use tutor_core::config::EmbeddingsConfig;

use crate::cohere::CohereProvider;
use crate::provider::EmbeddingProvider;
use crate::voyage::VoyageProvider;

/// Builds the configured embedding provider. Unlike the LLM factory there is
/// no cross-provider fallback chain — embeddings are best-effort (spec
/// §4.2), so an uncredentialed configuration simply yields `None` rather
/// than failing startup.
pub fn build_provider(config: &EmbeddingsConfig) -> Option<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "voyage" => config
            .voyageai_api_key
            .clone()
            .map(|key| Box::new(VoyageProvider::new(key, None)) as Box<dyn EmbeddingProvider>),
        _ => config
            .cohere_api_key
            .clone()
            .map(|key| Box::new(CohereProvider::new(key, None)) as Box<dyn EmbeddingProvider>),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_credentials_yields_none() {
        let config = EmbeddingsConfig {
            provider: "cohere".to_string(),
            cohere_api_key: None,
            voyageai_api_key: None,
        };
        assert!(build_provider(&config).is_none());
    }

    #[test]
    fn voyage_selected_by_tag() {
        let config = EmbeddingsConfig {
            provider: "voyage".to_string(),
            cohere_api_key: None,
            voyageai_api_key: Some("key".to_string()),
        };
        let provider = build_provider(&config).unwrap();
        assert_eq!(provider.name(), "voyage");
    }
}
