//! Dataset inspector - prints a dataset's property keys and value counts.
//!
//! Shows the information the quiz configuration step works from (which
//! properties exist, how many distinct values each has) without touching
//! the quiz database.

use std::path::Path;
use std::process::ExitCode;

use serde_json::Value;

use cartoquiz::{
    DATASETS_FILE, LoadedDataset, PresetRegistry, QuizError, load_file, load_preset,
    parse_geo_json,
};

/// Sample values shown per property key
const MAX_SAMPLE_VALUES: usize = 5;

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &[String]) -> Result<(), QuizError> {
    let Some(dataset) = load_dataset(args)? else {
        println!("Usage: dataset-info <geojson-file>");
        println!("       dataset-info --preset <label>");
        return Ok(());
    };

    let parsed = parse_geo_json(&dataset.text)?;
    println!("Data source: {}", dataset.data_source);
    if let Some(attribution) = &dataset.attribution {
        println!("Attribution: {attribution}");
    }
    println!("Features:    {}", parsed.features.len());
    println!();

    if parsed.collected_property_values.is_empty() {
        println!("No feature properties found.");
        return Ok(());
    }
    println!("Properties:");
    for (key, values) in &parsed.collected_property_values {
        let samples: Vec<String> = values
            .iter()
            .take(MAX_SAMPLE_VALUES)
            .map(render_value)
            .collect();
        let ellipsis = if values.len() > MAX_SAMPLE_VALUES {
            ", ..."
        } else {
            ""
        };
        println!(
            "  {key} ({} distinct): {}{ellipsis}",
            values.len(),
            samples.join(", ")
        );
    }
    Ok(())
}

fn load_dataset(args: &[String]) -> Result<Option<LoadedDataset>, QuizError> {
    if let Some(index) = args.iter().position(|arg| arg == "--preset") {
        let Some(label) = args.get(index + 1) else {
            return Ok(None);
        };
        let registry = PresetRegistry::load_from_file(DATASETS_FILE);
        return load_preset(&registry, label).map(Some);
    }
    match args.get(1) {
        Some(path) => load_file(Path::new(path)).map(Some),
        None => Ok(None),
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
