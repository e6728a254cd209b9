use std::collections::BTreeMap;
use std::io::{self, Write};

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::cli::AnalyzeArgs;
use crate::labels::{FrameKeyParser, LabelStore, extract_value_events, load_label_store};
use crate::model::{AnalyzeReport, GapEntry, PropertyReport, SpanEntry};
use crate::timeline::{state_spans, undefined_gap};
use crate::util::{now_utc_string, sha256_file, write_json_pretty};

const SPAN_PRINT_LIMIT: usize = 10;

pub fn run(args: AnalyzeArgs) -> Result<()> {
    let store = load_label_store(&args.labels)?;
    let parser = FrameKeyParser::new()?;

    let properties = select_properties(&store, args.property.as_deref())?;
    info!(
        path = %args.labels.display(),
        frame_count = store.frames.len(),
        property_count = properties.len(),
        "analyzing label store"
    );

    let mut reports = Vec::with_capacity(properties.len());
    for property in &properties {
        let (events, unresolved) = extract_value_events(&store, property, &parser);
        if unresolved > 0 {
            warn!(
                property = %property,
                unresolved,
                "frame identifiers without a frame number were skipped"
            );
        }

        let total_frames = args
            .total_frames
            .or(store.metadata.total_frames)
            .unwrap_or_else(|| events.last().map(|event| event.frame + 1).unwrap_or(0));

        let spans = state_spans(&events, total_frames);
        let gap = undefined_gap(&events, total_frames);
        let covered_frames = spans
            .iter()
            .map(|span| span.end_frame - span.start_frame)
            .sum::<usize>();
        let coverage_percent = if total_frames > 0 {
            covered_frames as f64 / total_frames as f64 * 100.0
        } else {
            0.0
        };

        reports.push(PropertyReport {
            property: property.clone(),
            transition_count: spans.len(),
            covered_frames,
            total_frames,
            coverage_percent,
            unresolved_frame_key_count: unresolved,
            spans: spans
                .iter()
                .map(|span| SpanEntry {
                    start_frame: span.start_frame,
                    end_frame: span.end_frame,
                    frame_count: span.end_frame - span.start_frame,
                    values: span.values.clone(),
                })
                .collect(),
            undefined_gap: gap.map(|(start_frame, end_frame)| GapEntry {
                start_frame,
                end_frame,
                frame_count: end_frame - start_frame,
            }),
            value_meanings: store
                .mappings
                .get(property)
                .cloned()
                .unwrap_or_default(),
        });
    }

    let report = AnalyzeReport {
        manifest_version: 1,
        generated_at: now_utc_string(),
        labels_path: args.labels.display().to_string(),
        labels_sha256: sha256_file(&args.labels)?,
        store_version: store.metadata.version.clone(),
        created_with: store.metadata.created_with.clone(),
        total_frames: reports
            .iter()
            .map(|property| property.total_frames)
            .max()
            .unwrap_or(0),
        properties: reports,
    };

    if args.json {
        write_json_response(&report)?;
    } else {
        write_text_report(&report)?;
    }

    if let Some(report_path) = &args.report_path {
        write_json_pretty(report_path, &report)?;
        info!(path = %report_path.display(), "wrote analysis report");
    }

    Ok(())
}

fn select_properties(store: &LabelStore, requested: Option<&str>) -> Result<Vec<String>> {
    let available = store.property_names();
    if available.is_empty() {
        bail!("label store contains no annotated properties");
    }

    match requested {
        Some(name) => {
            if !available.iter().any(|candidate| candidate.as_str() == name) {
                bail!(
                    "property '{name}' not found in label store (available: {})",
                    available.join(", ")
                );
            }
            Ok(vec![name.to_string()])
        }
        None => Ok(available),
    }
}

fn write_json_response(report: &AnalyzeReport) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, report)
        .context("failed to serialize analysis json output")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

fn write_text_report(report: &AnalyzeReport) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());

    writeln!(output, "Labels: {}", report.labels_path)?;
    if report.created_with.is_some() || report.store_version.is_some() {
        writeln!(
            output,
            "Store: {} v{}",
            report.created_with.as_deref().unwrap_or("unknown"),
            report.store_version.as_deref().unwrap_or("unknown"),
        )?;
    }

    for property in &report.properties {
        writeln!(output)?;
        writeln!(output, "Property: {}", property.property)?;
        writeln!(output, "  Transitions: {}", property.transition_count)?;
        writeln!(
            output,
            "  Coverage: {}/{} frames ({:.1}%)",
            property.covered_frames, property.total_frames, property.coverage_percent
        )?;
        if property.unresolved_frame_key_count > 0 {
            writeln!(
                output,
                "  Unresolved frame keys: {}",
                property.unresolved_frame_key_count
            )?;
        }

        if !property.spans.is_empty() {
            writeln!(output, "  Spans:")?;
            for span in property.spans.iter().take(SPAN_PRINT_LIMIT) {
                writeln!(
                    output,
                    "    frames {}-{} ({} frames): {}",
                    span.start_frame,
                    span.end_frame.saturating_sub(1),
                    span.frame_count,
                    format_values(&span.values, &property.value_meanings),
                )?;
            }
            if property.spans.len() > SPAN_PRINT_LIMIT {
                writeln!(
                    output,
                    "    ... and {} more spans",
                    property.spans.len() - SPAN_PRINT_LIMIT
                )?;
            }
        }

        if let Some(gap) = &property.undefined_gap {
            writeln!(
                output,
                "  Undefined before first transition: frames {}-{} ({} frames)",
                gap.start_frame,
                gap.end_frame.saturating_sub(1),
                gap.frame_count
            )?;
        }
    }

    output.flush()?;
    Ok(())
}

fn format_values(values: &[String], meanings: &BTreeMap<String, String>) -> String {
    values
        .iter()
        .map(|value| match meanings.get(value) {
            Some(meaning) => format!("{value}:{meaning}"),
            None => value.clone(),
        })
        .collect::<Vec<String>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::normalize_store;
    use serde_json::json;

    fn store() -> LabelStore {
        normalize_store(&json!({
            "frames": {
                "img_0005.jpg": {"driver_seatbelt": [1]},
                "img_0012.jpg": {"driver_seatbelt": [2], "gaze": [3]}
            },
            "mappings": {"driver_seatbelt": {"1": "fastened", "2": "unfastened"}},
            "metadata": {"version": "2.0", "created_with": "frame_property_labeler", "total_frames": 20}
        }))
        .expect("store fixture should normalize")
    }

    #[test]
    fn select_properties_defaults_to_all_sorted() {
        let properties =
            select_properties(&store(), None).expect("selection should succeed");
        assert_eq!(
            properties,
            vec!["driver_seatbelt".to_string(), "gaze".to_string()]
        );
    }

    #[test]
    fn select_properties_rejects_unknown_names() {
        let error = select_properties(&store(), Some("speed"))
            .expect_err("unknown property should be rejected");
        let message = error.to_string();
        assert!(message.contains("'speed'"), "got: {message}");
        assert!(message.contains("driver_seatbelt"), "got: {message}");
    }

    #[test]
    fn format_values_appends_known_meanings() {
        let mut meanings = BTreeMap::new();
        meanings.insert("1".to_string(), "fastened".to_string());

        let rendered = format_values(&["1".to_string(), "2".to_string()], &meanings);
        assert_eq!(rendered, "1:fastened, 2");
    }
}
