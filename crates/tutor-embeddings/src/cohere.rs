use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use crate::provider::{Embedding, EmbeddingProvider};

const PROVIDER: &str = "cohere";
const MODEL: &str = "embed-english-v3.0";
const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Cohere's `embed` endpoint. Text-only — `embed_image` always degrades to
/// `None` grounding (Cohere has no multimodal path).
pub struct CohereProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl CohereProvider {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.cohere.com".to_string()),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for CohereProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn embed_text(&self, text: &str) -> Option<Embedding> {
        let body = serde_json::json!({
            "texts": [text],
            "model": MODEL,
            "input_type": "search_query",
            "embedding_types": ["float"],
        });

        let resp = self
            .client
            .post(format!("{}/v1/embed", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .json(&body)
            .send()
            .await
            .inspect_err(|e| warn!(error = %e, "cohere embed request failed"))
            .ok()?;

        if !resp.status().is_success() {
            warn!(status = %resp.status(), "cohere embed returned error status");
            return None;
        }

        let parsed: CohereResponse = resp.json().await.ok()?;
        parsed.embeddings.float.into_iter().next()
    }

    async fn embed_image(&self, _bytes: &[u8], _media_type: &str) -> Option<Embedding> {
        None
    }
}

#[derive(Deserialize)]
struct CohereResponse {
    embeddings: CohereEmbeddings,
}

#[derive(Deserialize)]
struct CohereEmbeddings {
    float: Vec<Vec<f32>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_embeddings_response() {
        let data = r#"{"embeddings":{"float":[[0.1,0.2,0.3]]}}"#;
        let parsed: CohereResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.embeddings.float[0], vec![0.1, 0.2, 0.3]);
    }
}
