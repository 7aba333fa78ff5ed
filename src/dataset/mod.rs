//! Dataset loading: GeoJSON text to quiz-ready feature data.
//!
//! This is the collaborator that sits in front of the session: it reads
//! dataset text from a file or a named preset, collects the features and
//! the per-key property values, and assembles the `QuizInfo` handed to
//! `QuizSession::start_new_quiz`. Input errors are rejected here; the
//! session assumes validated input.

mod presets;

use std::fs;
use std::path::Path;

use log::info;
use serde_json::Value;

use crate::error::QuizError;
use crate::quiz::{Feature, PropertyValues, QuizInfo};

pub use presets::{DATASETS_FILE, PresetDataset, PresetRegistry};

/// Raw dataset text together with where it came from.
#[derive(Debug, Clone)]
pub struct LoadedDataset {
    /// Label persisted as the quiz's data source.
    pub data_source: String,
    pub text: String,
    pub attribution: Option<String>,
}

/// Features and collected property values parsed from one dataset.
#[derive(Debug, Clone, Default)]
pub struct ParsedFeatureSet {
    pub features: Vec<Feature>,
    pub collected_property_values: PropertyValues,
}

/// Read dataset text from a file on disk.
pub fn load_file(path: &Path) -> Result<LoadedDataset, QuizError> {
    let text = fs::read_to_string(path).map_err(|source| QuizError::DatasetIo {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(LoadedDataset {
        data_source: path.to_string_lossy().into_owned(),
        text,
        attribution: None,
    })
}

/// Read dataset text for a preset by its registry label.
pub fn load_preset(registry: &PresetRegistry, name: &str) -> Result<LoadedDataset, QuizError> {
    let Some(preset) = registry.find(name) else {
        return Err(QuizError::UnknownPreset(name.to_string()));
    };
    let path = Path::new(&preset.path);
    let text = fs::read_to_string(path).map_err(|source| QuizError::DatasetIo {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(LoadedDataset {
        data_source: preset.label.clone(),
        text,
        attribution: preset.attribution.clone(),
    })
}

/// Parse GeoJSON text into features plus the property-values snapshot.
///
/// Accepts a single `Feature` or a `FeatureCollection`; any other root
/// yields an empty feature list. Geometry is carried opaquely.
pub fn parse_geo_json(text: &str) -> Result<ParsedFeatureSet, QuizError> {
    let root: Value = serde_json::from_str(text)?;
    let features = collect_features(&root);
    let collected_property_values = collect_key_values(&features);
    info!(
        "parsed {} feature(s) with {} property key(s)",
        features.len(),
        collected_property_values.len()
    );
    Ok(ParsedFeatureSet {
        features,
        collected_property_values,
    })
}

/// All features contained in a parsed GeoJSON document.
fn collect_features(root: &Value) -> Vec<Feature> {
    match root.get("type").and_then(Value::as_str) {
        Some("Feature") => vec![feature_from_value(root)],
        Some("FeatureCollection") => root
            .get("features")
            .and_then(Value::as_array)
            .map(|features| features.iter().map(feature_from_value).collect())
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn feature_from_value(value: &Value) -> Feature {
    Feature {
        id: None,
        geometry: value.get("geometry").cloned().unwrap_or(Value::Null),
        properties: value
            .get("properties")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default(),
    }
}

/// Aggregate all property key/values across the feature set: every key
/// observed on any feature, each with its distinct values in first-seen
/// order.
pub fn collect_key_values(features: &[Feature]) -> PropertyValues {
    let mut collected = PropertyValues::new();
    for feature in features {
        for (key, value) in &feature.properties {
            let values = collected.entry(key.clone()).or_default();
            if !values.contains(value) {
                values.push(value.clone());
            }
        }
    }
    collected
}

/// Assemble the quiz definition for a loaded and parsed dataset.
///
/// Rejects a match property that never occurs in the dataset; the session
/// does not re-check this.
pub fn build_quiz_info(
    dataset: &LoadedDataset,
    parsed: ParsedFeatureSet,
    match_property: &str,
) -> Result<QuizInfo, QuizError> {
    if !parsed
        .collected_property_values
        .contains_key(match_property)
    {
        return Err(QuizError::UnknownMatchProperty(match_property.to_string()));
    }
    Ok(QuizInfo {
        data_source: dataset.data_source.clone(),
        features: parsed.features,
        attribution: dataset.attribution.clone(),
        match_property: match_property.to_string(),
        collected_property_values: parsed.collected_property_values,
    })
}
