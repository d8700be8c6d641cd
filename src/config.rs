use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::detect::DetectorConfig;
use crate::scoring::AutolinkConfig;

pub const DEFAULT_DATA_ROOT: &str = ".cache/bibscore";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    pub bib_iou_threshold: f64,
    pub face_iou_threshold: f64,
    pub tolerance: f64,
    pub autolink: AutolinkConfig,
    pub bib_detector: DetectorConfig,
    pub face_detector: DetectorConfig,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            bib_iou_threshold: 0.5,
            face_iou_threshold: 0.5,
            tolerance: 0.005,
            autolink: AutolinkConfig::default(),
            bib_detector: DetectorConfig::Precomputed {
                path: PathBuf::from("predictions").join("bib_predictions.json"),
            },
            face_detector: DetectorConfig::Disabled,
        }
    }
}

impl BenchmarkConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "benchmark config missing; using defaults");
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config = parse_config_json(&raw)
            .with_context(|| format!("failed to load {}", path.display()))?;
        info!(path = %path.display(), "loaded benchmark config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("bib_iou_threshold", self.bib_iou_threshold),
            ("face_iou_threshold", self.face_iou_threshold),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                bail!("{name} must be in (0, 1], got {value}");
            }
        }
        if !(self.tolerance >= 0.0 && self.tolerance.is_finite()) {
            bail!("tolerance must be a non-negative number, got {}", self.tolerance);
        }

        let autolink = &self.autolink;
        if !(autolink.torso_top >= 0.0 && autolink.torso_bottom > autolink.torso_top) {
            bail!(
                "torso bounds must satisfy 0 <= torso_top < torso_bottom, got {}..{}",
                autolink.torso_top,
                autolink.torso_bottom
            );
        }
        if !(autolink.torso_half_width > 0.0) {
            bail!(
                "torso_half_width must be positive, got {}",
                autolink.torso_half_width
            );
        }
        if !autolink.torso_horizontal_offset.is_finite() {
            bail!("torso_horizontal_offset must be finite");
        }
        if !(0.0..=1.0).contains(&autolink.bib_confidence_threshold) {
            bail!(
                "bib_confidence_threshold must be in [0, 1], got {}",
                autolink.bib_confidence_threshold
            );
        }

        Ok(())
    }
}

/// File layout under the data root. Each path can be overridden from the CLI.
#[derive(Debug, Clone)]
pub struct DataLayout {
    pub root: PathBuf,
}

impl DataLayout {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("benchmark_config.json")
    }

    pub fn ground_truth_path(&self) -> PathBuf {
        self.root.join("ground_truth.json")
    }

    pub fn photo_index_path(&self) -> PathBuf {
        self.root.join("photo_index.json")
    }

    pub fn photos_root(&self) -> PathBuf {
        self.root.join("photos")
    }

    pub fn db_path(&self) -> PathBuf {
        self.root.join("bibscore_runs.sqlite")
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.root.join("runs")
    }

    pub fn run_record_path(&self, run_id: &str) -> PathBuf {
        self.runs_dir().join(format!("{run_id}.json"))
    }

    pub fn baseline_path(&self) -> PathBuf {
        self.root.join("baseline.lock.json")
    }

    /// Inverse of `resolve` for paths under the root; stored paths stay valid from any directory.
    pub fn relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }

    /// Resolves config-relative paths (detector files) against the data root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

pub fn resolve_override(value: Option<&PathBuf>, fallback: PathBuf) -> PathBuf {
    value.cloned().unwrap_or(fallback)
}

pub fn parse_config_json(raw: &str) -> Result<BenchmarkConfig> {
    serde_json::from_str(raw).context("failed to parse benchmark config")
}
