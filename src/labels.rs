use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;

use crate::config::{PropertyConfig, UNKNOWN_STATE, raw_value_key};
use crate::util::read_json_value;

/// Number of skip/unmap diagnostics surfaced verbatim; the rest are only
/// counted.
pub const DIAGNOSTIC_CAP: usize = 5;

/// Property name assigned to records from the legacy flat label format,
/// which predates named properties.
pub const LEGACY_PROPERTY: &str = "default";

/// Normalized label store. Accepts both on-disk shapes: the legacy flat
/// mapping (frame key to a single raw value) and the structured document
/// with `frames`, `mappings`, and `metadata` sections.
#[derive(Debug, Clone, Default)]
pub struct LabelStore {
    pub frames: BTreeMap<String, BTreeMap<String, Vec<serde_json::Value>>>,
    pub mappings: BTreeMap<String, BTreeMap<String, String>>,
    pub metadata: StoreMetadata,
}

#[derive(Debug, Clone, Default)]
pub struct StoreMetadata {
    pub version: Option<String>,
    pub created_with: Option<String>,
    pub total_frames: Option<usize>,
}

impl LabelStore {
    pub fn property_names(&self) -> Vec<String> {
        let mut names = self
            .frames
            .values()
            .flat_map(|properties| properties.keys().cloned())
            .collect::<Vec<String>>();
        names.sort();
        names.dedup();
        names
    }
}

pub fn load_label_store(path: &Path) -> Result<LabelStore> {
    let value = read_json_value(path)?;
    normalize_store(&value).with_context(|| format!("invalid label store: {}", path.display()))
}

pub fn normalize_store(value: &serde_json::Value) -> Result<LabelStore> {
    let root = value
        .as_object()
        .context("label store is not a JSON object")?;

    if let Some(frame_section) = root.get("frames") {
        let frame_map = frame_section
            .as_object()
            .context("'frames' is not a JSON object")?;

        Ok(LabelStore {
            frames: normalize_frames(frame_map),
            mappings: parse_mappings(root.get("mappings")),
            metadata: parse_metadata(root.get("metadata")),
        })
    } else {
        Ok(LabelStore {
            frames: normalize_frames(root),
            ..LabelStore::default()
        })
    }
}

fn normalize_frames(
    frame_map: &serde_json::Map<String, serde_json::Value>,
) -> BTreeMap<String, BTreeMap<String, Vec<serde_json::Value>>> {
    let mut frames = BTreeMap::new();

    for (frame_key, entry) in frame_map {
        let mut properties = BTreeMap::new();

        match entry {
            serde_json::Value::Object(property_map) => {
                for (property, values) in property_map {
                    let values = match values {
                        serde_json::Value::Array(items) => items.clone(),
                        scalar => vec![scalar.clone()],
                    };
                    properties.insert(property.clone(), values);
                }
            }
            scalar => {
                properties.insert(LEGACY_PROPERTY.to_string(), vec![scalar.clone()]);
            }
        }

        frames.insert(frame_key.clone(), properties);
    }

    frames
}

fn parse_mappings(
    value: Option<&serde_json::Value>,
) -> BTreeMap<String, BTreeMap<String, String>> {
    let mut mappings = BTreeMap::new();

    let Some(serde_json::Value::Object(per_property)) = value else {
        return mappings;
    };

    for (property, entries) in per_property {
        let Some(entries) = entries.as_object() else {
            continue;
        };
        let meanings = entries
            .iter()
            .filter_map(|(raw, meaning)| {
                meaning
                    .as_str()
                    .map(|text| (raw.clone(), text.to_string()))
            })
            .collect::<BTreeMap<String, String>>();
        mappings.insert(property.clone(), meanings);
    }

    mappings
}

fn parse_metadata(value: Option<&serde_json::Value>) -> StoreMetadata {
    let Some(serde_json::Value::Object(map)) = value else {
        return StoreMetadata::default();
    };

    StoreMetadata {
        version: map.get("version").and_then(raw_value_key),
        created_with: map
            .get("created_with")
            .and_then(|v| v.as_str())
            .map(ToOwned::to_owned),
        total_frames: map
            .get("total_frames")
            .and_then(serde_json::Value::as_u64)
            .map(|count| count as usize),
    }
}

/// Parses the frame index embedded in a frame identifier. Identifiers come
/// from image filenames, so the common spellings are tried most-specific
/// first before falling back to any digit run.
#[derive(Debug)]
pub struct FrameKeyParser {
    patterns: Vec<Regex>,
}

impl FrameKeyParser {
    pub fn new() -> Result<Self> {
        let sources = [
            r"(?i)(\d+)\.(?:jpg|jpeg|png|bmp|tiff|tif)$",
            r"(?i)frame[_-]?(\d+)",
            r"(?i)img[_-]?(\d+)",
            r"(\d+)",
        ];

        let patterns = sources
            .iter()
            .map(|source| {
                Regex::new(source)
                    .with_context(|| format!("failed to compile frame-key pattern: {source}"))
            })
            .collect::<Result<Vec<Regex>>>()?;

        Ok(Self { patterns })
    }

    pub fn parse(&self, frame_key: &str) -> Option<usize> {
        for pattern in &self.patterns {
            if let Some(captures) = pattern.captures(frame_key)
                && let Some(digits) = captures.get(1)
                && let Ok(index) = digits.as_str().parse::<usize>()
            {
                return Some(index);
            }
        }
        None
    }
}

/// A keyframe: the frame where a property transitions into a state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyframeEvent {
    pub frame: usize,
    pub state: String,
}

#[derive(Debug, Clone, Default)]
pub struct KeyframeStats {
    pub keyframe_count: usize,
    pub unresolved_key_count: usize,
    pub unmapped_value_count: usize,
    pub duplicate_frame_count: usize,
    pub warnings: Vec<String>,
}

impl KeyframeStats {
    fn record_warning(&mut self, suppressed: &mut usize, message: String) {
        if self.warnings.len() < DIAGNOSTIC_CAP {
            self.warnings.push(message);
        } else {
            *suppressed += 1;
        }
    }
}

/// Extracts the sorted keyframe sequence for one property.
///
/// Records whose identifier carries no frame number are skipped with a
/// warning; records that do not annotate the property are skipped silently;
/// raw values outside the configured mapping degrade to the `"unknown"`
/// state. The output is stably sorted ascending by frame index, so
/// same-frame duplicates keep store order and the later one wins during
/// reconstruction.
pub fn extract_keyframes(
    store: &LabelStore,
    config: &PropertyConfig,
    parser: &FrameKeyParser,
) -> (Vec<KeyframeEvent>, KeyframeStats) {
    let mut events = Vec::new();
    let mut stats = KeyframeStats::default();
    let mut suppressed = 0_usize;

    for (frame_key, properties) in &store.frames {
        let Some(values) = properties.get(&config.name) else {
            continue;
        };
        // The store wraps single annotations in a one-element list; an empty
        // list means the annotation was cleared.
        let Some(raw) = values.first() else {
            continue;
        };

        let Some(frame) = parser.parse(frame_key) else {
            stats.unresolved_key_count += 1;
            stats.record_warning(
                &mut suppressed,
                format!("could not extract frame number from '{frame_key}'"),
            );
            continue;
        };

        let state = match config.map_raw_value(raw) {
            Some(state) => state.to_string(),
            None => {
                stats.unmapped_value_count += 1;
                stats.record_warning(
                    &mut suppressed,
                    format!("unmapped ground-truth value {raw} at '{frame_key}'"),
                );
                UNKNOWN_STATE.to_string()
            }
        };

        events.push(KeyframeEvent { frame, state });
    }

    events.sort_by_key(|event| event.frame);

    stats.keyframe_count = events.len();
    stats.duplicate_frame_count = events
        .windows(2)
        .filter(|pair| pair[0].frame == pair[1].frame)
        .count();
    if suppressed > 0 {
        stats
            .warnings
            .push(format!("... and {suppressed} more warnings"));
    }

    (events, stats)
}

/// A keyframe carrying the raw value set, used by the completeness analysis
/// where states are reported as annotated values rather than canonical
/// names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueEvent {
    pub frame: usize,
    pub values: Vec<String>,
}

/// Extracts raw-value transition events for one property, sorted by frame
/// index. Returns the events and the count of identifiers that carried no
/// frame number.
pub fn extract_value_events(
    store: &LabelStore,
    property: &str,
    parser: &FrameKeyParser,
) -> (Vec<ValueEvent>, usize) {
    let mut events = Vec::new();
    let mut unresolved = 0_usize;

    for (frame_key, properties) in &store.frames {
        let Some(raw_values) = properties.get(property) else {
            continue;
        };
        if raw_values.is_empty() {
            continue;
        }

        let Some(frame) = parser.parse(frame_key) else {
            unresolved += 1;
            continue;
        };

        let mut values = raw_values
            .iter()
            .filter_map(raw_value_key)
            .collect::<Vec<String>>();
        values.sort();

        events.push(ValueEvent { frame, values });
    }

    events.sort_by_key(|event| event.frame);

    (events, unresolved)
}
