use std::collections::BTreeMap;

use serde::Serialize;

use crate::metrics::{ConfusionPair, StateMetrics};

#[derive(Debug, Clone, Serialize)]
pub struct SourceHash {
    pub path: String,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparePaths {
    pub ground_truth_path: String,
    pub results_dir: String,
    pub config_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompareCounts {
    pub keyframe_count: usize,
    pub duplicate_keyframe_count: usize,
    pub unresolved_frame_key_count: usize,
    pub unmapped_value_count: usize,
    pub total_frames: usize,
    pub result_file_count: usize,
    pub extraction_failure_count: usize,
    pub ground_truth_length: usize,
    pub prediction_length: usize,
    pub compared_length: usize,
    pub resampled: bool,
}

/// Full record of one comparison run: inputs, data-quality counters, and the
/// computed metrics. Written with `write_json_pretty` when a report path is
/// given, or to stdout in `--json` mode.
#[derive(Debug, Clone, Serialize)]
pub struct CompareRunManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub property: String,
    pub paths: ComparePaths,
    pub source_hashes: Vec<SourceHash>,
    pub counts: CompareCounts,
    pub agreement_rate: f64,
    pub matches: usize,
    pub total: usize,
    pub state_metrics: BTreeMap<String, StateMetrics>,
    pub confusion_matrix: BTreeMap<String, BTreeMap<String, usize>>,
    pub common_errors: Vec<ConfusionPair>,
    pub warnings: Vec<String>,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpanEntry {
    pub start_frame: usize,
    pub end_frame: usize,
    pub frame_count: usize,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GapEntry {
    pub start_frame: usize,
    pub end_frame: usize,
    pub frame_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PropertyReport {
    pub property: String,
    pub transition_count: usize,
    pub covered_frames: usize,
    pub total_frames: usize,
    pub coverage_percent: f64,
    pub unresolved_frame_key_count: usize,
    pub spans: Vec<SpanEntry>,
    pub undefined_gap: Option<GapEntry>,
    pub value_meanings: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeReport {
    pub manifest_version: u32,
    pub generated_at: String,
    pub labels_path: String,
    pub labels_sha256: String,
    pub store_version: Option<String>,
    pub created_with: Option<String>,
    pub total_frames: usize,
    pub properties: Vec<PropertyReport>,
}
