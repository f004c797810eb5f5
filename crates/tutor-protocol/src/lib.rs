pub mod frames;

pub use frames::{ClientFrame, FilterKind, ServerEvent};
