//! Quiz session state engine.
//!
//! The in-memory model of an active quiz: feature index, match property,
//! filters, guessed and highlighted state, plus the guess-matching and
//! filter rules. State changes go out on the event bus and durable state
//! lives behind the store.

mod session;
mod types;

pub use session::QuizSession;
pub use types::{Feature, FeatureId, Filter, PropertyValues, QuizInfo};
