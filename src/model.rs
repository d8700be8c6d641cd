use std::collections::BTreeMap;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::geometry::NormalizedBox;
use crate::scoring::{
    AutolinkConfig, BibScorecard, DetectionCounts, FaceScorecard, LinkRule, LinkScorecard,
};

pub const RUN_MANIFEST_VERSION: u32 = 1;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Split {
    Iteration,
    Full,
}

impl Split {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Iteration => "iteration",
            Self::Full => "full",
        }
    }

    /// `full` covers the whole labeled corpus; `iteration` only its own subset.
    pub fn includes(self, assigned: Split) -> bool {
        match self {
            Self::Full => true,
            Self::Iteration => assigned == Split::Iteration,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BibScope {
    #[default]
    Bib,
    BibClipped,
    NotBib,
    BibObscured,
}

impl BibScope {
    pub fn is_scored(self) -> bool {
        matches!(self, Self::Bib | Self::BibClipped)
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaceScope {
    #[default]
    Keep,
    Exclude,
    Uncertain,
}

impl FaceScope {
    pub fn is_scored(self) -> bool {
        self == Self::Keep
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BibLabel {
    #[serde(flatten)]
    pub bbox: NormalizedBox,
    #[serde(default)]
    pub scope: BibScope,
    pub number: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceLabel {
    #[serde(flatten)]
    pub bbox: NormalizedBox,
    #[serde(default)]
    pub scope: FaceScope,
    #[serde(default)]
    pub identity: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkLabel {
    pub bib_index: usize,
    pub face_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoLabels {
    pub content_hash: String,
    pub split: Split,
    #[serde(default)]
    pub bibs: Vec<BibLabel>,
    #[serde(default)]
    pub faces: Vec<FaceLabel>,
    #[serde(default)]
    pub links: Vec<LinkLabel>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundTruthManifest {
    pub manifest_version: u32,
    pub photos: Vec<PhotoLabels>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoIndexManifest {
    pub manifest_version: u32,
    /// content hash -> candidate paths, relative to the photos root.
    pub photos: BTreeMap<String, Vec<String>>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhotoStatus {
    Pass,
    Partial,
    Miss,
}

impl PhotoStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Partial => "PARTIAL",
            Self::Miss => "MISS",
        }
    }

    pub fn classify(scorecard: &BibScorecard) -> Self {
        let expected = scorecard.true_positives + scorecard.false_negatives;
        if expected > 0 && scorecard.true_positives == 0 {
            Self::Miss
        } else if scorecard.false_negatives == 0 && scorecard.false_positives == 0 {
            Self::Pass
        } else {
            Self::Partial
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Judgement {
    Improved,
    Regressed,
    NoChange,
}

impl Judgement {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Improved => "IMPROVED",
            Self::Regressed => "REGRESSED",
            Self::NoChange => "NO_CHANGE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrMismatch {
    pub expected: String,
    pub detected: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkDetail {
    pub bib_index: usize,
    pub face_index: usize,
    pub bib_number: String,
    pub rule: LinkRule,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoResult {
    pub content_hash: String,
    pub split: Split,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub status: Option<PhotoStatus>,
    #[serde(default)]
    pub bib: Option<BibScorecard>,
    #[serde(default)]
    pub face: Option<FaceScorecard>,
    #[serde(default)]
    pub link: Option<LinkScorecard>,
    #[serde(default)]
    pub expected_numbers: Vec<String>,
    #[serde(default)]
    pub detected_numbers: Vec<String>,
    #[serde(default)]
    pub missed_numbers: Vec<String>,
    #[serde(default)]
    pub ocr_mismatches: Vec<OcrMismatch>,
    #[serde(default)]
    pub links: Vec<LinkDetail>,
    #[serde(default)]
    pub dropped_predictions: usize,
    #[serde(default)]
    pub errors: Vec<String>,
    pub elapsed_ms: u128,
}

impl PhotoResult {
    pub fn new(content_hash: &str, split: Split) -> Self {
        Self {
            content_hash: content_hash.to_string(),
            split,
            path: None,
            status: None,
            bib: None,
            face: None,
            link: None,
            expected_numbers: Vec::new(),
            detected_numbers: Vec::new(),
            missed_numbers: Vec::new(),
            ocr_mismatches: Vec::new(),
            links: Vec::new(),
            dropped_predictions: 0,
            errors: Vec::new(),
            elapsed_ms: 0,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn is_failure(&self) -> bool {
        self.has_errors() || !matches!(self.status, Some(PhotoStatus::Pass) | None)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionState {
    pub enabled: bool,
    #[serde(default)]
    pub detector: Option<String>,
    #[serde(default)]
    pub disabled_reason: Option<String>,
}

impl DimensionState {
    pub fn enabled(detector: String) -> Self {
        Self {
            enabled: true,
            detector: Some(detector),
            disabled_reason: None,
        }
    }

    pub fn disabled(reason: impl Into<String>) -> Self {
        Self {
            enabled: false,
            detector: None,
            disabled_reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    pub tool_version: String,
    #[serde(default)]
    pub git_commit: Option<String>,
    #[serde(default)]
    pub git_dirty: Option<bool>,
    pub command: String,
    pub ground_truth_sha256: String,
    #[serde(default)]
    pub photo_index_sha256: Option<String>,
    pub bib_iou_threshold: f64,
    pub face_iou_threshold: f64,
    pub tolerance: f64,
    pub autolink: AutolinkConfig,
    pub bib: DimensionState,
    pub face: DimensionState,
    pub link: DimensionState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: String,
    pub created_at: String,
    pub split: Split,
    #[serde(default)]
    pub note: Option<String>,
    pub photo_count: usize,
    pub scored_photo_count: usize,
    pub error_count: usize,
    #[serde(default)]
    pub limited: bool,
    pub duration_ms: u128,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunScorecards {
    pub bib: Option<BibScorecard>,
    pub face: Option<FaceScorecard>,
    pub link: Option<LinkScorecard>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub bib_precision: Option<f64>,
    pub bib_recall: Option<f64>,
    pub bib_f1: Option<f64>,
    pub ocr_accuracy: Option<f64>,
    pub face_precision: Option<f64>,
    pub face_recall: Option<f64>,
    pub face_f1: Option<f64>,
    pub link_precision: Option<f64>,
    pub link_recall: Option<f64>,
    pub link_f1: Option<f64>,
}

impl RunMetrics {
    /// Ratios are derived once from the summed counts, never averaged per photo.
    pub fn from_scorecards(scorecards: &RunScorecards) -> Self {
        let bib = scorecards.bib.as_ref();
        let face = scorecards.face.as_ref();
        let link = scorecards.link.as_ref();
        Self {
            bib_precision: bib.map(DetectionCounts::precision),
            bib_recall: bib.map(DetectionCounts::recall),
            bib_f1: bib.map(DetectionCounts::f1),
            ocr_accuracy: bib.map(BibScorecard::ocr_accuracy),
            face_precision: face.map(DetectionCounts::precision),
            face_recall: face.map(DetectionCounts::recall),
            face_f1: face.map(DetectionCounts::f1),
            link_precision: link.map(DetectionCounts::precision),
            link_recall: link.map(DetectionCounts::recall),
            link_f1: link.map(DetectionCounts::f1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineComparison {
    pub baseline_run_id: String,
    pub baseline_promoted_at: String,
    pub tolerance: f64,
    pub precision_delta: f64,
    pub recall_delta: f64,
    pub f1_delta: f64,
    pub ocr_accuracy_delta: f64,
    pub judgement: Judgement,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkRun {
    pub manifest_version: u32,
    pub metadata: RunMetadata,
    pub environment: EnvironmentSnapshot,
    pub scorecards: RunScorecards,
    pub metrics: RunMetrics,
    #[serde(default)]
    pub comparison: Option<BaselineComparison>,
    pub photo_results: Vec<PhotoResult>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl BenchmarkRun {
    pub fn judgement(&self) -> Option<Judgement> {
        self.comparison.as_ref().map(|comparison| comparison.judgement)
    }

    /// Only complete, unlimited `full` runs with bib scoring may act as a baseline.
    pub fn baseline_eligible(&self) -> bool {
        self.metadata.split == Split::Full
            && !self.metadata.limited
            && self.scorecards.bib.is_some()
    }
}
