use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Approximate, provider-agnostic token estimate: `max(1, len/4)`.
pub const CHARS_PER_TOKEN: usize = 4;

/// Top-level config (tutor.toml + TUTOR_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TutorConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: JwtConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub pedagogy: PedagogyConfig,
    #[serde(default)]
    pub quotas: QuotaConfig,
    #[serde(default)]
    pub uploads: UploadConfig,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            database: DatabaseConfig::default(),
            auth: JwtConfig::default(),
            llm: LlmConfig::default(),
            embeddings: EmbeddingsConfig::default(),
            pedagogy: PedagogyConfig::default(),
            quotas: QuotaConfig::default(),
            uploads: UploadConfig::default(),
            cors_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// JWT access-token verification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// Shared HS256 secret. No default — a production deployment must set
    /// TUTOR_AUTH_JWT_SECRET or config load fails once a WS connection is attempted.
    #[serde(default)]
    pub jwt_secret: Option<String>,
    #[serde(default = "default_access_token_lifetime_secs")]
    pub access_token_lifetime_secs: u64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            access_token_lifetime_secs: default_access_token_lifetime_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Preferred provider tag; falls back through a fixed priority list
    /// (anthropic -> openai -> google) when absent or uncredentialed.
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub google_api_key: Option<String>,
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,
    #[serde(default = "default_max_user_input_tokens")]
    pub max_user_input_tokens: usize,
    #[serde(default = "default_compression_threshold")]
    pub context_compression_threshold: f32,
    #[serde(default = "default_max_tokens")]
    pub max_response_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            anthropic_api_key: None,
            openai_api_key: None,
            google_api_key: None,
            max_context_tokens: default_max_context_tokens(),
            max_user_input_tokens: default_max_user_input_tokens(),
            context_compression_threshold: default_compression_threshold(),
            max_response_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    pub cohere_api_key: Option<String>,
    pub voyageai_api_key: Option<String>,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            cohere_api_key: None,
            voyageai_api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PedagogyConfig {
    /// Cosine-similarity threshold above which a message counts as a
    /// continuation of the previous problem.
    #[serde(default = "default_continuation_threshold")]
    pub continuation_similarity_threshold: f32,
    /// Recency window for continuation detection, in seconds.
    #[serde(default = "default_continuation_window_secs")]
    pub continuation_window_secs: i64,
    /// Open Question (c): exposed as a tunable, default 0.05.
    #[serde(default = "default_level_drift_step")]
    pub level_drift_step: f32,
}

impl Default for PedagogyConfig {
    fn default() -> Self {
        Self {
            continuation_similarity_threshold: default_continuation_threshold(),
            continuation_window_secs: default_continuation_window_secs(),
            level_drift_step: default_level_drift_step(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    #[serde(default = "default_daily_input_limit")]
    pub user_daily_input_token_limit: u64,
    #[serde(default = "default_daily_output_limit")]
    pub user_daily_output_token_limit: u64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            user_daily_input_token_limit: default_daily_input_limit(),
            user_daily_output_token_limit: default_daily_output_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_storage_dir")]
    pub storage_dir: String,
    #[serde(default = "default_expiry_hours")]
    pub expiry_hours: i64,
    #[serde(default = "default_max_images")]
    pub max_images_per_message: usize,
    #[serde(default = "default_max_documents")]
    pub max_documents_per_message: usize,
    #[serde(default = "default_max_image_mb")]
    pub max_image_mb: u64,
    #[serde(default = "default_max_document_mb")]
    pub max_document_mb: u64,
    #[serde(default = "default_max_document_tokens")]
    pub max_document_tokens: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            expiry_hours: default_expiry_hours(),
            max_images_per_message: default_max_images(),
            max_documents_per_message: default_max_documents(),
            max_image_mb: default_max_image_mb(),
            max_document_mb: default_max_document_mb(),
            max_document_tokens: default_max_document_tokens(),
        }
    }
}

fn default_port() -> u16 {
    8000
}
fn default_bind() -> String {
    "127.0.0.1".to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.tutor/tutor.db", home)
}
fn default_access_token_lifetime_secs() -> u64 {
    3600
}
fn default_llm_provider() -> String {
    "anthropic".to_string()
}
fn default_max_context_tokens() -> usize {
    10_000
}
fn default_max_user_input_tokens() -> usize {
    4_000
}
fn default_compression_threshold() -> f32 {
    0.5
}
fn default_max_tokens() -> u32 {
    8192
}
fn default_embedding_provider() -> String {
    "voyage".to_string()
}
fn default_continuation_threshold() -> f32 {
    0.80
}
fn default_continuation_window_secs() -> i64 {
    15 * 60
}
fn default_level_drift_step() -> f32 {
    0.05
}
fn default_daily_input_limit() -> u64 {
    200_000
}
fn default_daily_output_limit() -> u64 {
    50_000
}
fn default_storage_dir() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.tutor/uploads", home)
}
fn default_expiry_hours() -> i64 {
    24
}
fn default_max_images() -> usize {
    4
}
fn default_max_documents() -> usize {
    4
}
fn default_max_image_mb() -> u64 {
    10
}
fn default_max_document_mb() -> u64 {
    20
}
fn default_max_document_tokens() -> usize {
    8_000
}

impl TutorConfig {
    /// Load config from a TOML file with TUTOR_* env var overrides.
    ///
    /// Checks in order: explicit path argument, then `~/.tutor/tutor.toml`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: TutorConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("TUTOR_").split("_"))
            .extract()
            .map_err(|e| crate::error::TutorError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.tutor/tutor.toml", home)
}
