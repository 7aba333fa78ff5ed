//! Event definitions published by the quiz session.

use crate::quiz::{Feature, FeatureId, Filter};

/// All state-change events a quiz session can publish.
///
/// Payloads are owned snapshots taken at publish time, so subscribers can
/// hold on to them without observing later session mutations.
#[derive(Debug, Clone)]
pub enum QuizEvent {
    /// A quiz was started or resumed; all session state has been replaced.
    QuizStart,
    /// The active filter list changed (set comparison, order-independent).
    FiltersUpdate(Vec<Filter>),
    /// A guess matched at least one not-yet-guessed feature.
    MatchesUpdate {
        /// The features matched by the previous successful guess.
        previous_last_guessed: Vec<Feature>,
        /// The features newly matched by this guess, in feature-id order.
        new_matches: Vec<Feature>,
    },
    /// The pointer-driven highlight moved to a different feature.
    HighlightedFeatureUpdate {
        previous_highlighted_id: Option<FeatureId>,
        current_highlighted_id: Option<FeatureId>,
    },
}

/// Discriminant for registering subscriber interest in one event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuizEventKind {
    QuizStart,
    FiltersUpdate,
    MatchesUpdate,
    HighlightedFeatureUpdate,
}

impl QuizEvent {
    /// The kind this event is delivered under.
    pub fn kind(&self) -> QuizEventKind {
        match self {
            QuizEvent::QuizStart => QuizEventKind::QuizStart,
            QuizEvent::FiltersUpdate(_) => QuizEventKind::FiltersUpdate,
            QuizEvent::MatchesUpdate { .. } => QuizEventKind::MatchesUpdate,
            QuizEvent::HighlightedFeatureUpdate { .. } => QuizEventKind::HighlightedFeatureUpdate,
        }
    }
}
