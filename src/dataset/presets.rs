//! Preset dataset registry.
//!
//! Binaries offer a list of ready-to-play datasets next to file loading.
//! The list lives in a TOML file so presets can be added without a
//! rebuild; a missing or unparsable file just means no presets.

use std::fs;

use log::warn;
use serde::Deserialize;

/// Default path of the preset registry file.
pub const DATASETS_FILE: &str = "datasets.toml";

/// One entry in the registry.
#[derive(Debug, Clone, Deserialize)]
pub struct PresetDataset {
    /// Display label, also used to select the preset and as the quiz's
    /// data source.
    pub label: String,
    /// Path of the GeoJSON file, relative to the working directory.
    pub path: String,
    #[serde(default)]
    pub attribution: Option<String>,
}

/// All presets offered by the binaries.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PresetRegistry {
    #[serde(default)]
    pub datasets: Vec<PresetDataset>,
}

impl PresetRegistry {
    /// Load the registry from a file, or return an empty registry if the
    /// file is missing or malformed.
    pub fn load_from_file(path: &str) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(error) => {
                warn!("could not read preset registry {path}: {error}");
                return Self::default();
            }
        };
        match toml::from_str(&content) {
            Ok(registry) => registry,
            Err(error) => {
                warn!("could not parse preset registry {path}: {error}");
                Self::default()
            }
        }
    }

    /// Look up a preset by its label.
    pub fn find(&self, label: &str) -> Option<&PresetDataset> {
        self.datasets.iter().find(|preset| preset.label == label)
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_registry() {
        let toml = r#"
            [[datasets]]
            label = "Sample countries"
            path = "data/sample-countries.geojson"
            attribution = "Sample data"

            [[datasets]]
            label = "Bare entry"
            path = "data/bare.geojson"
        "#;
        let registry: PresetRegistry = toml::from_str(toml).unwrap();
        assert_eq!(registry.datasets.len(), 2);
        assert_eq!(
            registry.find("Sample countries").map(|preset| preset.path.as_str()),
            Some("data/sample-countries.geojson")
        );
        assert_eq!(registry.find("Bare entry").unwrap().attribution, None);
        assert!(registry.find("missing").is_none());
    }

    #[test]
    fn test_missing_registry_file_is_empty() {
        let registry = PresetRegistry::load_from_file("no-such-registry.toml");
        assert!(registry.is_empty());
    }
}
