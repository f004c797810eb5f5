use async_trait::async_trait;

/// An embedding vector, kept as-is (not renormalised) — callers normalise
/// where it matters, e.g. `combine`.
pub type Embedding = Vec<f32>;

/// Unified interface over the two supported embedding APIs.
/// Transient failures are swallowed by callers, not by the trait: every
/// method returns `None` on any error so the pedagogy engine can proceed
/// without continuity detection for that turn.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn embed_text(&self, text: &str) -> Option<Embedding>;

    /// Image embedding is only available on multimodal-capable providers
    /// (Voyage); providers without multimodal support always return `None`.
    async fn embed_image(&self, bytes: &[u8], media_type: &str) -> Option<Embedding>;
}
