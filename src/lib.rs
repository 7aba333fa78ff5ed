//! Cartoquiz - a geography quiz over user-supplied geospatial datasets.
//!
//! The user loads a GeoJSON dataset, picks a property to be quizzed on,
//! and types guesses that are matched against that property across a
//! filterable feature set. Progress persists across restarts.
//!
//! This crate provides the quiz session state engine (`quiz`), its event
//! bus (`events`) and SQLite persistence (`store`), and the dataset
//! loading used by the binaries (`dataset`).

pub mod dataset;
pub mod error;
pub mod events;
pub mod quiz;
pub mod store;

// Re-export commonly used types for convenience
pub use dataset::{
    DATASETS_FILE, LoadedDataset, ParsedFeatureSet, PresetDataset, PresetRegistry,
    build_quiz_info, collect_key_values, load_file, load_preset, parse_geo_json,
};
pub use error::QuizError;
pub use events::{EventBus, QuizEvent, QuizEventKind, Subscription};
pub use quiz::{Feature, FeatureId, Filter, PropertyValues, QuizInfo, QuizSession};
pub use store::{QuizOverview, QuizStore, StoredData};
