use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::DEFAULT_DATA_ROOT;
use crate::model::Split;

#[derive(Parser, Debug)]
#[command(
    name = "bibscore",
    version,
    about = "Bib and face detection benchmark with baseline regression checks"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Score the detectors against labeled ground truth.
    Run(RunArgs),
    /// Show recent runs from the history store.
    List(ListArgs),
    /// Show one stored run record.
    Inspect(InspectArgs),
    /// Promote a stored full-split run to baseline.
    SetBaseline(SetBaselineArgs),
    /// Delete old run records.
    Clean(CleanArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[arg(long, default_value = DEFAULT_DATA_ROOT)]
    pub data_root: PathBuf,

    #[arg(long, value_enum, default_value_t = Split::Iteration)]
    pub split: Split,

    #[arg(long)]
    pub note: Option<String>,

    #[arg(long)]
    pub tolerance: Option<f64>,

    #[arg(long)]
    pub bib_iou_threshold: Option<f64>,

    #[arg(long)]
    pub face_iou_threshold: Option<f64>,

    /// Skip face detection (and therefore link scoring) for this run.
    #[arg(long, default_value_t = false)]
    pub no_faces: bool,

    /// Score only the first N photos; limited runs never touch the baseline.
    #[arg(long)]
    pub limit: Option<usize>,

    #[arg(long, default_value_t = false)]
    pub json: bool,

    #[arg(long)]
    pub config_path: Option<PathBuf>,

    #[arg(long)]
    pub ground_truth_path: Option<PathBuf>,

    #[arg(long)]
    pub photo_index_path: Option<PathBuf>,

    #[arg(long)]
    pub photos_root: Option<PathBuf>,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    #[arg(long, default_value = DEFAULT_DATA_ROOT)]
    pub data_root: PathBuf,

    #[arg(long, value_enum)]
    pub split: Option<Split>,

    #[arg(long, default_value_t = 20)]
    pub limit: usize,

    #[arg(long, default_value_t = false)]
    pub json: bool,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct InspectArgs {
    #[arg(long, default_value = DEFAULT_DATA_ROOT)]
    pub data_root: PathBuf,

    /// Run id or a unique prefix of one.
    #[arg(long)]
    pub run_id: String,

    #[arg(long, default_value_t = false)]
    pub failures_only: bool,

    #[arg(long, default_value_t = false)]
    pub json: bool,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct SetBaselineArgs {
    #[arg(long, default_value = DEFAULT_DATA_ROOT)]
    pub data_root: PathBuf,

    #[arg(long)]
    pub run_id: String,

    /// Required when replacing an existing baseline.
    #[arg(long)]
    pub reason: Option<String>,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct CleanArgs {
    #[arg(long, default_value = DEFAULT_DATA_ROOT)]
    pub data_root: PathBuf,

    #[arg(long, default_value_t = 10)]
    pub keep: usize,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}
