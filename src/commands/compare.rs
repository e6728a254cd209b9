use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use regex::Regex;
use tracing::{info, warn};

use crate::align::align_lengths;
use crate::cli::CompareArgs;
use crate::config::{PropertyConfig, load_config_file, resolve_property};
use crate::labels::{FrameKeyParser, KeyframeStats, extract_keyframes, load_label_store};
use crate::metrics::{self, ComparisonMetrics};
use crate::model::{CompareCounts, ComparePaths, CompareRunManifest, SourceHash};
use crate::results::{ExtractionStats, load_predictions};
use crate::timeline::{reconstruct, state_distribution};
use crate::util::{now_utc_string, read_json_value, sha256_file, write_json_pretty};

const ERROR_PRINT_LIMIT: usize = 5;

pub fn run(args: CompareArgs) -> Result<()> {
    let config_file = load_config_file(&args.config)?;
    let property = resolve_property(&config_file, &args.property)?;

    info!(property = %property.name, path = %args.gt.display(), "loading ground truth");
    let store = load_label_store(&args.gt)?;
    let parser = FrameKeyParser::new()?;
    let (events, keyframe_stats) = extract_keyframes(&store, &property, &parser);

    for warning in &keyframe_stats.warnings {
        warn!(%warning, "ground-truth warning");
    }
    info!(
        keyframe_count = keyframe_stats.keyframe_count,
        duplicates = keyframe_stats.duplicate_frame_count,
        "extracted keyframes"
    );

    let total_frames = resolve_total_frames(&args, store.metadata.total_frames)?;

    let truth = reconstruct(&events, total_frames);
    for (state, count) in state_distribution(&truth) {
        info!(
            state = %state,
            count,
            percent = count as f64 * 100.0 / truth.len() as f64,
            "ground-truth distribution"
        );
    }

    let result_files = discover_result_files(&args.results)?;
    if result_files.is_empty() {
        bail!(
            "no algorithm result files found in {}",
            args.results.display()
        );
    }
    info!(file_count = result_files.len(), path = %args.results.display(), "loading algorithm results");

    let mut records = Vec::with_capacity(result_files.len());
    for path in &result_files {
        let value = read_json_value(path)?;
        let label = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(ToOwned::to_owned)
            .with_context(|| format!("invalid UTF-8 filename: {}", path.display()))?;
        records.push((label, value));
    }

    let (predictions, extraction_stats) = load_predictions(
        records.iter().map(|(label, value)| (label.as_str(), value)),
        &property.extraction_path,
    );
    for failure in &extraction_stats.failures {
        warn!(%failure, "extraction failure");
    }

    let ground_truth_length = truth.len();
    let prediction_length = predictions.len();
    if ground_truth_length != prediction_length {
        warn!(
            ground_truth = ground_truth_length,
            predictions = prediction_length,
            "sequence length mismatch, stretching the shorter sequence"
        );
    }
    let (predicted, actual, resampled) = align_lengths(predictions, truth);

    let comparison = metrics::compare(&predicted, &actual)?;

    let manifest = build_manifest(
        &args,
        &property,
        &keyframe_stats,
        &extraction_stats,
        &comparison,
        total_frames,
        result_files.len(),
        ground_truth_length,
        prediction_length,
        resampled,
    )?;

    if args.json {
        write_json_response(&manifest)?;
    } else {
        write_text_report(&manifest, &comparison)?;
    }

    if let Some(report_path) = &args.report_path {
        write_json_pretty(report_path, &manifest)?;
        info!(path = %report_path.display(), "wrote comparison manifest");
    }

    Ok(())
}

/// The dense timeline length is an explicit input: either `--total-frames`
/// or the ground-truth file's own `metadata.total_frames`. There is no
/// built-in fallback count.
fn resolve_total_frames(args: &CompareArgs, from_metadata: Option<usize>) -> Result<usize> {
    match args.total_frames.or(from_metadata) {
        Some(count) if count > 0 => Ok(count),
        Some(_) => bail!("total frame count must be greater than zero"),
        None => bail!(
            "total frame count unavailable: pass --total-frames or add metadata.total_frames to {}",
            args.gt.display()
        ),
    }
}

/// Per-frame result files, `img_<number>.json`, in lexicographic filename
/// order so repeated runs see an identical record sequence.
fn discover_result_files(results_dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern =
        Regex::new(r"^img_\d+\.json$").context("failed to compile result filename regex")?;

    let entries = fs::read_dir(results_dir)
        .with_context(|| format!("failed to read {}", results_dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry
            .with_context(|| format!("failed to read entry in {}", results_dir.display()))?;
        let path = entry.path();

        if !entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?
            .is_file()
        {
            continue;
        }

        let matches = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| pattern.is_match(name))
            .unwrap_or(false);
        if matches {
            files.push(path);
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    Ok(files)
}

#[allow(clippy::too_many_arguments)]
fn build_manifest(
    args: &CompareArgs,
    property: &PropertyConfig,
    keyframe_stats: &KeyframeStats,
    extraction_stats: &ExtractionStats,
    comparison: &ComparisonMetrics,
    total_frames: usize,
    result_file_count: usize,
    ground_truth_length: usize,
    prediction_length: usize,
    resampled: bool,
) -> Result<CompareRunManifest> {
    let mut warnings = keyframe_stats.warnings.clone();
    warnings.extend(extraction_stats.failures.iter().cloned());
    if keyframe_stats.duplicate_frame_count > 0 {
        warnings.push(format!(
            "{} keyframes share a frame index with another keyframe (last one wins)",
            keyframe_stats.duplicate_frame_count
        ));
    }

    let mut notes = Vec::new();
    if resampled {
        notes.push(format!(
            "sequence lengths differed (ground truth {ground_truth_length}, predictions {prediction_length}); \
             the shorter sequence was stretched by nearest-index resampling, so the alignment is approximate"
        ));
    }

    Ok(CompareRunManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        property: property.name.clone(),
        paths: ComparePaths {
            ground_truth_path: args.gt.display().to_string(),
            results_dir: args.results.display().to_string(),
            config_path: args.config.display().to_string(),
        },
        source_hashes: vec![
            SourceHash {
                path: args.gt.display().to_string(),
                sha256: sha256_file(&args.gt)?,
            },
            SourceHash {
                path: args.config.display().to_string(),
                sha256: sha256_file(&args.config)?,
            },
        ],
        counts: CompareCounts {
            keyframe_count: keyframe_stats.keyframe_count,
            duplicate_keyframe_count: keyframe_stats.duplicate_frame_count,
            unresolved_frame_key_count: keyframe_stats.unresolved_key_count,
            unmapped_value_count: keyframe_stats.unmapped_value_count,
            total_frames,
            result_file_count,
            extraction_failure_count: extraction_stats.failure_count,
            ground_truth_length,
            prediction_length,
            compared_length: comparison.total,
            resampled,
        },
        agreement_rate: comparison.agreement_rate,
        matches: comparison.matches,
        total: comparison.total,
        state_metrics: comparison.state_metrics.clone(),
        confusion_matrix: comparison.confusion.to_nested_map(),
        common_errors: comparison.common_errors.clone(),
        warnings,
        notes,
    })
}

fn write_json_response(manifest: &CompareRunManifest) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, manifest)
        .context("failed to serialize comparison json output")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

fn write_text_report(manifest: &CompareRunManifest, comparison: &ComparisonMetrics) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());

    writeln!(output, "Property: {}", manifest.property)?;
    writeln!(
        output,
        "Overall agreement: {:.2}% ({}/{})",
        manifest.agreement_rate, manifest.matches, manifest.total
    )?;
    for note in &manifest.notes {
        writeln!(output, "Note: {note}")?;
    }

    writeln!(output)?;
    writeln!(
        output,
        "{:<15} {:>10} {:>10} {:>10} {:>10}",
        "State", "Precision", "Recall", "F1", "Support"
    )?;
    for (state, state_metrics) in &manifest.state_metrics {
        writeln!(
            output,
            "{:<15} {:>9.2}% {:>9.2}% {:>9.2}% {:>10}",
            state,
            state_metrics.precision,
            state_metrics.recall,
            state_metrics.f1,
            state_metrics.support
        )?;
    }

    writeln!(output)?;
    writeln!(
        output,
        "Confusion matrix (rows = algorithm, columns = ground truth):"
    )?;
    write!(output, "{:<15}", "")?;
    for state in comparison.confusion.states() {
        write!(output, " {state:>12}")?;
    }
    writeln!(output)?;
    for (row, predicted) in comparison.confusion.states().iter().enumerate() {
        write!(output, "{predicted:<15}")?;
        for column in 0..comparison.confusion.states().len() {
            write!(output, " {:>12}", comparison.confusion.count(row, column))?;
        }
        writeln!(output)?;
    }

    if !manifest.common_errors.is_empty() {
        writeln!(output)?;
        writeln!(output, "Most common errors:")?;
        for error in manifest.common_errors.iter().take(ERROR_PRINT_LIMIT) {
            writeln!(
                output,
                "  {} -> {}: {} times",
                error.predicted, error.actual, error.count
            )?;
        }
    }

    writeln!(output)?;
    writeln!(
        output,
        "Data quality: keyframes={} duplicates={} unresolved_keys={} unmapped_values={} extraction_failures={}",
        manifest.counts.keyframe_count,
        manifest.counts.duplicate_keyframe_count,
        manifest.counts.unresolved_frame_key_count,
        manifest.counts.unmapped_value_count,
        manifest.counts.extraction_failure_count,
    )?;
    if !manifest.warnings.is_empty() {
        writeln!(output, "Warnings:")?;
        for warning in &manifest.warnings {
            writeln!(output, "  {warning}")?;
        }
    }

    output.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::align::align_lengths;
    use crate::labels::KeyframeEvent;
    use crate::metrics;
    use crate::timeline::reconstruct;

    fn event(frame: usize, state: &str) -> KeyframeEvent {
        KeyframeEvent {
            frame,
            state: state.to_string(),
        }
    }

    #[test]
    fn end_to_end_scenario_scores_ninety_five_percent() {
        // Ground truth holds closed for frames 0..=49 and open from frame 50.
        // The algorithm flips to open five frames early, at frame 45, so
        // frames 45..=49 read open against a closed truth.
        let truth = reconstruct(&[event(0, "closed"), event(50, "open")], 100);
        let predictions = (0..100)
            .map(|frame| {
                if frame < 45 {
                    "closed".to_string()
                } else {
                    "open".to_string()
                }
            })
            .collect::<Vec<String>>();

        let (predicted, actual, resampled) = align_lengths(predictions, truth);
        assert!(!resampled);

        let comparison =
            metrics::compare(&predicted, &actual).expect("comparison should succeed");

        assert_eq!(comparison.agreement_rate, 95.0);
        assert_eq!(comparison.matches, 95);
        assert_eq!(comparison.total, 100);

        let open_for_closed = comparison
            .common_errors
            .iter()
            .find(|error| error.predicted == "open" && error.actual == "closed")
            .expect("open-for-closed confusion should exist");
        assert_eq!(open_for_closed.count, 5);
        assert_eq!(comparison.common_errors.len(), 1);
    }

    #[test]
    fn resampled_comparison_still_conserves_mass() {
        let truth = reconstruct(&[event(0, "closed"), event(25, "open")], 50);
        let predictions = (0..100)
            .map(|frame| {
                if frame < 50 {
                    "closed".to_string()
                } else {
                    "open".to_string()
                }
            })
            .collect::<Vec<String>>();

        let (predicted, actual, resampled) = align_lengths(predictions, truth);
        assert!(resampled);
        assert_eq!(predicted.len(), 100);
        assert_eq!(actual.len(), 100);

        let comparison =
            metrics::compare(&predicted, &actual).expect("comparison should succeed");
        assert_eq!(comparison.confusion.total(), 100);
    }
}
