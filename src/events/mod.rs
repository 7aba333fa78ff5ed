//! Publish/subscribe plumbing for quiz state changes.
//!
//! The quiz session announces every state change here rather than calling
//! its observers directly, keeping state decoupled from rendering and other
//! presentation concerns.

mod bus;
mod types;

pub use bus::{EventBus, Subscription};
pub use types::{QuizEvent, QuizEventKind};
