use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::util::read_json_value;

/// Canonical state reported when a raw value has no mapping or a prediction
/// cannot be extracted.
pub const UNKNOWN_STATE: &str = "unknown";

#[derive(Debug, Clone, Deserialize)]
pub struct PropertyConfigFile {
    pub properties: BTreeMap<String, PropertyEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PropertyEntry {
    pub gt_to_algo_mapping: BTreeMap<String, String>,
    pub algo_extraction_path: Vec<String>,
}

/// One segment of an algorithm-result extraction path, parsed once at config
/// load. `"[3]"` becomes `Index(3)`; anything else is a field name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => write!(f, "{name}"),
            Self::Index(idx) => write!(f, "[{idx}]"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PropertyConfig {
    pub name: String,
    value_map: BTreeMap<String, String>,
    pub extraction_path: Vec<PathSegment>,
}

impl PropertyConfig {
    /// Canonical state for a raw ground-truth value, or `None` when the value
    /// has no mapping. Integer and string spellings of the same raw value
    /// share one entry.
    pub fn map_raw_value(&self, raw: &serde_json::Value) -> Option<&str> {
        let key = raw_value_key(raw)?;
        self.value_map.get(&key).map(String::as_str)
    }
}

/// Normalized lookup key for a raw ground-truth value. JSON `1` and `"1"`
/// denote the same annotation value.
pub fn raw_value_key(raw: &serde_json::Value) -> Option<String> {
    match raw {
        serde_json::Value::String(text) => Some(text.clone()),
        serde_json::Value::Number(number) => Some(number.to_string()),
        serde_json::Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

pub fn load_config_file(path: &Path) -> Result<PropertyConfigFile> {
    let value = read_json_value(path)?;
    serde_json::from_value(value)
        .with_context(|| format!("invalid property configuration: {}", path.display()))
}

/// Resolves one property from a loaded configuration file, parsing its
/// extraction path eagerly so malformed segments fail at load time.
pub fn resolve_property(file: &PropertyConfigFile, property: &str) -> Result<PropertyConfig> {
    let Some(entry) = file.properties.get(property) else {
        let available = file
            .properties
            .keys()
            .map(String::as_str)
            .collect::<Vec<&str>>()
            .join(", ");
        bail!("property '{property}' not found in configuration (available: {available})");
    };

    let extraction_path = parse_extraction_path(&entry.algo_extraction_path)
        .with_context(|| format!("invalid extraction path for property '{property}'"))?;

    Ok(PropertyConfig {
        name: property.to_string(),
        value_map: entry.gt_to_algo_mapping.clone(),
        extraction_path,
    })
}

fn parse_extraction_path(segments: &[String]) -> Result<Vec<PathSegment>> {
    let mut parsed = Vec::with_capacity(segments.len());

    for segment in segments {
        if let Some(inner) = segment.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            let index = inner
                .parse::<usize>()
                .with_context(|| format!("invalid array-index segment: {segment}"))?;
            parsed.push(PathSegment::Index(index));
        } else {
            parsed.push(PathSegment::Field(segment.clone()));
        }
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config_file() -> PropertyConfigFile {
        let raw = json!({
            "properties": {
                "driver_seatbelt": {
                    "gt_to_algo_mapping": {"1": "fastened", "2": "unfastened"},
                    "algo_extraction_path": ["persons", "[0]", "seatbelt", "state"]
                }
            }
        });
        serde_json::from_value(raw).expect("config fixture should deserialize")
    }

    #[test]
    fn resolve_property_parses_index_segments() {
        let config = resolve_property(&config_file(), "driver_seatbelt")
            .expect("property should resolve");
        assert_eq!(
            config.extraction_path,
            vec![
                PathSegment::Field("persons".to_string()),
                PathSegment::Index(0),
                PathSegment::Field("seatbelt".to_string()),
                PathSegment::Field("state".to_string()),
            ]
        );
    }

    #[test]
    fn resolve_property_lists_available_names_when_missing() {
        let error = resolve_property(&config_file(), "gaze")
            .expect_err("unknown property should be rejected");
        let message = error.to_string();
        assert!(message.contains("'gaze'"), "unexpected error: {message}");
        assert!(
            message.contains("driver_seatbelt"),
            "available properties should be listed: {message}"
        );
    }

    #[test]
    fn malformed_index_segment_fails_at_load() {
        let raw = json!({
            "properties": {
                "gaze": {
                    "gt_to_algo_mapping": {},
                    "algo_extraction_path": ["[not-a-number]"]
                }
            }
        });
        let file: PropertyConfigFile =
            serde_json::from_value(raw).expect("fixture should deserialize");
        assert!(resolve_property(&file, "gaze").is_err());
    }

    #[test]
    fn numeric_and_string_raw_values_share_one_mapping() {
        let config = resolve_property(&config_file(), "driver_seatbelt")
            .expect("property should resolve");
        assert_eq!(config.map_raw_value(&json!(1)), Some("fastened"));
        assert_eq!(config.map_raw_value(&json!("1")), Some("fastened"));
        assert_eq!(config.map_raw_value(&json!(9)), None);
    }
}
