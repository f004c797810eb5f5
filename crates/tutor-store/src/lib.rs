pub mod error;
pub mod messages;
pub mod schema;
pub mod sessions;
pub mod store;
pub mod types;
pub mod uploads;
pub mod usage;
pub mod users;

pub use error::{Result, StoreError};
pub use store::Store;
pub use types::{ChatMessage, ChatSession, DailyTokenUsage, SessionSummary, UploadedFileRow, User};
