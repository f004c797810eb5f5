pub mod canned;
pub mod classify;
pub mod engine;
pub mod state;

pub use engine::{FilterResult, PedagogyDecision, PedagogyEngine};
pub use state::StudentState;
