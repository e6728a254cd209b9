use anyhow::{Result, bail};

use crate::config::{PathSegment, UNKNOWN_STATE};
use crate::labels::DIAGNOSTIC_CAP;

#[derive(Debug, Clone, Default)]
pub struct ExtractionStats {
    pub record_count: usize,
    pub failure_count: usize,
    pub failures: Vec<String>,
}

/// Extracts predicted states from an ordered sequence of per-frame result
/// records. The output has one state per record, in input order; records
/// whose extraction path fails degrade to `"unknown"` and are counted, with
/// the first few failures surfaced verbatim.
pub fn load_predictions<'a, I>(records: I, path: &[PathSegment]) -> (Vec<String>, ExtractionStats)
where
    I: IntoIterator<Item = (&'a str, &'a serde_json::Value)>,
{
    let mut states = Vec::new();
    let mut stats = ExtractionStats::default();
    let mut suppressed = 0_usize;

    for (label, record) in records {
        stats.record_count += 1;

        match extract_prediction(record, path) {
            Ok(state) => states.push(state),
            Err(err) => {
                stats.failure_count += 1;
                if stats.failures.len() < DIAGNOSTIC_CAP {
                    stats.failures.push(format!("{label}: {err}"));
                } else {
                    suppressed += 1;
                }
                states.push(UNKNOWN_STATE.to_string());
            }
        }
    }

    if suppressed > 0 {
        stats
            .failures
            .push(format!("... and {suppressed} more extraction failures"));
    }

    (states, stats)
}

/// Walks the extraction path through one result record and renders the
/// terminal scalar as a state name.
pub fn extract_prediction(record: &serde_json::Value, path: &[PathSegment]) -> Result<String> {
    let mut cursor = record;

    for segment in path {
        cursor = match segment {
            PathSegment::Field(name) => {
                let Some(object) = cursor.as_object() else {
                    bail!("expected an object at segment '{segment}'");
                };
                let Some(next) = object.get(name) else {
                    bail!("missing field '{name}'");
                };
                next
            }
            PathSegment::Index(index) => {
                let Some(array) = cursor.as_array() else {
                    bail!("expected an array at segment '{segment}'");
                };
                let Some(next) = array.get(*index) else {
                    bail!("index {index} out of range (length {})", array.len());
                };
                next
            }
        };
    }

    match cursor {
        serde_json::Value::String(text) => Ok(text.clone()),
        serde_json::Value::Number(number) => Ok(number.to_string()),
        serde_json::Value::Bool(flag) => Ok(flag.to_string()),
        other => bail!("extracted value is not a scalar: {other}"),
    }
}
