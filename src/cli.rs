use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "frameval",
    version,
    about = "Frame-classification agreement evaluation against sparse ground-truth annotations"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compare per-frame algorithm output against keyframe ground truth
    Compare(CompareArgs),
    /// Report label completeness for a label-store file
    Analyze(AnalyzeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CompareArgs {
    /// Ground-truth annotation file
    #[arg(long)]
    pub gt: PathBuf,

    /// Directory containing per-frame algorithm result files
    #[arg(long)]
    pub results: PathBuf,

    /// Property configuration file
    #[arg(long)]
    pub config: PathBuf,

    /// Property name to compare
    #[arg(long)]
    pub property: String,

    /// Dense timeline length; overrides metadata.total_frames
    #[arg(long)]
    pub total_frames: Option<usize>,

    /// Write the comparison run manifest to this path
    #[arg(long)]
    pub report_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    /// Label-store file (legacy flat or structured format)
    #[arg(long)]
    pub labels: PathBuf,

    /// Restrict the analysis to one property
    #[arg(long)]
    pub property: Option<String>,

    /// End frame of the final span; overrides metadata.total_frames
    #[arg(long)]
    pub total_frames: Option<usize>,

    /// Write the analysis report to this path
    #[arg(long)]
    pub report_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}
