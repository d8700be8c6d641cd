use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::{BaselineComparison, BenchmarkRun, Judgement, Split};
use crate::scoring::{BibScorecard, DetectionCounts, FaceScorecard, LinkScorecard};
use crate::util::{now_utc_string, sha256_bytes, write_json_pretty};

pub const BIBSCORE_BASELINE_MODE_ENV: &str = "BIBSCORE_BASELINE_MODE";
pub const BIBSCORE_BASELINE_REASON_ENV: &str = "BIBSCORE_BASELINE_REASON";
pub const BASELINE_LOCK_VERSION: u32 = 1;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BaselineMode {
    Verify,
    Bootstrap,
}

impl BaselineMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Verify => "verify",
            Self::Bootstrap => "bootstrap",
        }
    }
}

pub fn resolve_baseline_mode() -> BaselineMode {
    parse_baseline_mode(std::env::var(BIBSCORE_BASELINE_MODE_ENV).ok().as_deref())
}

pub fn parse_baseline_mode(value: Option<&str>) -> BaselineMode {
    match value {
        Some(value)
            if value.trim().eq_ignore_ascii_case("bootstrap")
                || value.trim().eq_ignore_ascii_case("rotate") =>
        {
            BaselineMode::Bootstrap
        }
        _ => BaselineMode::Verify,
    }
}

pub fn resolve_baseline_reason() -> Option<String> {
    parse_baseline_reason(std::env::var(BIBSCORE_BASELINE_REASON_ENV).ok().as_deref())
}

pub fn parse_baseline_reason(value: Option<&str>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Promoted baseline scorecards. Only bib metrics drive the judgement; face and
/// link scorecards are kept for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineLock {
    pub manifest_version: u32,
    pub run_id: String,
    pub split: Split,
    pub promoted_at: String,
    #[serde(default)]
    pub change_reason: Option<String>,
    pub ground_truth_sha256: String,
    pub bib: BibScorecard,
    #[serde(default)]
    pub face: Option<FaceScorecard>,
    #[serde(default)]
    pub link: Option<LinkScorecard>,
    pub checksum: String,
}

pub fn lock_from_run(run: &BenchmarkRun, change_reason: Option<String>) -> Result<BaselineLock> {
    if !run.baseline_eligible() {
        bail!(
            "run {} cannot be a baseline: only unlimited full-split runs with bib scoring qualify",
            run.metadata.run_id
        );
    }
    let Some(bib) = run.scorecards.bib else {
        bail!("run {} has no bib scorecard", run.metadata.run_id);
    };

    let checksum = checksum_baseline_payload(
        &run.metadata.run_id,
        &run.environment.ground_truth_sha256,
        &bib,
        run.scorecards.face.as_ref(),
        run.scorecards.link.as_ref(),
    )?;

    Ok(BaselineLock {
        manifest_version: BASELINE_LOCK_VERSION,
        run_id: run.metadata.run_id.clone(),
        split: run.metadata.split,
        promoted_at: now_utc_string(),
        change_reason,
        ground_truth_sha256: run.environment.ground_truth_sha256.clone(),
        bib,
        face: run.scorecards.face,
        link: run.scorecards.link,
        checksum,
    })
}

/// Writes `run` as the new baseline. Replacing an existing lockfile requires a reason.
pub fn promote_run(path: &Path, run: &BenchmarkRun, change_reason: Option<String>) -> Result<BaselineLock> {
    if path.exists() && change_reason.is_none() {
        bail!(
            "promoting {} would rotate existing baseline at {}; set {} or pass --reason",
            run.metadata.run_id,
            path.display(),
            BIBSCORE_BASELINE_REASON_ENV
        );
    }

    let lock = lock_from_run(run, change_reason)?;
    write_baseline_lock(path, &lock)?;
    info!(
        run_id = %lock.run_id,
        path = %path.display(),
        "promoted run to baseline"
    );
    Ok(lock)
}

pub fn write_baseline_lock(path: &Path, lock: &BaselineLock) -> Result<()> {
    write_json_pretty(path, lock)
}

pub fn read_baseline_lock(path: &Path) -> Result<BaselineLock> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let lock = serde_json::from_slice::<BaselineLock>(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    let expected = checksum_baseline_payload(
        &lock.run_id,
        &lock.ground_truth_sha256,
        &lock.bib,
        lock.face.as_ref(),
        lock.link.as_ref(),
    )?;
    if expected != lock.checksum {
        bail!(
            "baseline checksum mismatch in {}: recorded {}, computed {}",
            path.display(),
            lock.checksum,
            expected
        );
    }
    Ok(lock)
}

/// `Ok(None)` when no baseline has been promoted yet.
pub fn load_baseline(path: &Path) -> Result<Option<BaselineLock>> {
    if !path.exists() {
        return Ok(None);
    }
    read_baseline_lock(path).map(Some)
}

pub fn checksum_baseline_payload(
    run_id: &str,
    ground_truth_sha256: &str,
    bib: &BibScorecard,
    face: Option<&FaceScorecard>,
    link: Option<&LinkScorecard>,
) -> Result<String> {
    let payload = serde_json::json!({
        "run_id": run_id,
        "ground_truth_sha256": ground_truth_sha256,
        "bib": bib,
        "face": face,
        "link": link,
    });
    let bytes = serde_json::to_vec(&payload).context("failed to serialize baseline payload")?;
    Ok(sha256_bytes(&bytes))
}

/// Slack for rounding in ratio differences; far below any meaningful tolerance.
const DELTA_EPSILON: f64 = 1e-9;

/// A delta exactly at `tolerance` is within the band: regression needs
/// `delta < -tolerance`, improvement needs `delta > tolerance`.
pub fn judge(precision_delta: f64, recall_delta: f64, tolerance: f64) -> Judgement {
    let band = tolerance + DELTA_EPSILON;
    let regressed = precision_delta < -band || recall_delta < -band;
    let improved = precision_delta > band || recall_delta > band;
    if regressed {
        Judgement::Regressed
    } else if improved {
        Judgement::Improved
    } else {
        Judgement::NoChange
    }
}

/// Compares bib metrics of an eligible run against the promoted baseline.
pub fn compare(
    current: &BenchmarkRun,
    baseline: &BaselineLock,
    tolerance: f64,
) -> Option<BaselineComparison> {
    if !current.baseline_eligible() {
        return None;
    }
    let bib = current.scorecards.bib?;

    let precision_delta = bib.precision() - baseline.bib.precision();
    let recall_delta = bib.recall() - baseline.bib.recall();
    let mut warnings = Vec::new();
    if baseline.ground_truth_sha256 != current.environment.ground_truth_sha256 {
        warnings.push(format!(
            "baseline {} was scored against different ground truth; deltas include label drift",
            baseline.run_id
        ));
    }

    Some(BaselineComparison {
        baseline_run_id: baseline.run_id.clone(),
        baseline_promoted_at: baseline.promoted_at.clone(),
        tolerance,
        precision_delta,
        recall_delta,
        f1_delta: bib.f1() - baseline.bib.f1(),
        ocr_accuracy_delta: bib.ocr_accuracy() - baseline.bib.ocr_accuracy(),
        judgement: judge(precision_delta, recall_delta, tolerance),
        warnings,
    })
}
