//! Core data types for quiz sessions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Dense, zero-based identifier assigned to each feature when a quiz
/// starts. `id[i] = i` in input order; stable for the session's lifetime
/// and used as the storage key.
pub type FeatureId = usize;

/// Mapping from a property key to all distinct values observed for that key
/// across the loaded feature set. Keys are kept sorted so choice lists are
/// deterministic.
pub type PropertyValues = BTreeMap<String, Vec<Value>>;

/// A single quizzable map entity: opaque geometry plus a property bag.
///
/// The geometry is carried verbatim for the rendering layer and never
/// interpreted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    /// Assigned at quiz start; `None` on freshly parsed features.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<FeatureId>,
    #[serde(default)]
    pub geometry: Value,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Feature {
    /// Look up one property off the bag.
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

/// A `{key, value}` pair restricting the active feature subset to features
/// whose property at `key` loosely equals `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub key: String,
    pub value: Value,
}

impl Filter {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// The persistable definition of a quiz, created when a new quiz starts and
/// read back verbatim on resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizInfo {
    /// Label of where the data came from (file name, preset label).
    pub data_source: String,
    pub features: Vec<Feature>,
    pub attribution: Option<String>,
    /// The property key whose value the user must guess.
    pub match_property: String,
    pub collected_property_values: PropertyValues,
}
