pub mod cohere;
pub mod combine;
pub mod factory;
pub mod provider;
pub mod voyage;

pub use combine::{combine, cosine_similarity};
pub use factory::build_provider;
pub use provider::{Embedding, EmbeddingProvider};
