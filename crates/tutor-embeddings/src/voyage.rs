use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use tracing::warn;

use crate::provider::{Embedding, EmbeddingProvider};

const PROVIDER: &str = "voyage";
const TEXT_MODEL: &str = "voyage-2";
const MULTIMODAL_MODEL: &str = "voyage-multimodal-3";
const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Voyage's `embeddings` (text) and `multimodalembeddings` (image) endpoints.
/// The only configured provider that supports `embed_image`.
pub struct VoyageProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl VoyageProvider {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.voyageai.com".to_string()),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for VoyageProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn embed_text(&self, text: &str) -> Option<Embedding> {
        let body = serde_json::json!({
            "input": [text],
            "model": TEXT_MODEL,
        });

        let resp = self
            .client
            .post(format!("{}/v1/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .json(&body)
            .send()
            .await
            .inspect_err(|e| warn!(error = %e, "voyage embed request failed"))
            .ok()?;

        if !resp.status().is_success() {
            warn!(status = %resp.status(), "voyage embed returned error status");
            return None;
        }

        let parsed: VoyageResponse = resp.json().await.ok()?;
        parsed.data.into_iter().next().map(|d| d.embedding)
    }

    async fn embed_image(&self, bytes: &[u8], media_type: &str) -> Option<Embedding> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        let body = serde_json::json!({
            "inputs": [{"content": [{"type": "image_base64", "image_base64": format!("data:{media_type};base64,{encoded}")}]}],
            "model": MULTIMODAL_MODEL,
        });

        let resp = self
            .client
            .post(format!("{}/v1/multimodalembeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .json(&body)
            .send()
            .await
            .inspect_err(|e| warn!(error = %e, "voyage multimodal embed request failed"))
            .ok()?;

        if !resp.status().is_success() {
            warn!(status = %resp.status(), "voyage multimodal embed returned error status");
            return None;
        }

        let parsed: VoyageResponse = resp.json().await.ok()?;
        parsed.data.into_iter().next().map(|d| d.embedding)
    }
}

#[derive(Deserialize)]
struct VoyageResponse {
    data: Vec<VoyageDatum>,
}

#[derive(Deserialize)]
struct VoyageDatum {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_embedding_response() {
        let data = r#"{"data":[{"embedding":[0.4,0.5]}]}"#;
        let parsed: VoyageResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.data[0].embedding, vec![0.4, 0.5]);
    }
}
