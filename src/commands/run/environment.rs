use std::process::Command;

use crate::config::BenchmarkConfig;
use crate::model::{DimensionState, EnvironmentSnapshot};

pub struct DimensionStates {
    pub bib: DimensionState,
    pub face: DimensionState,
    pub link: DimensionState,
}

pub fn capture_environment(
    config: &BenchmarkConfig,
    ground_truth_sha256: &str,
    photo_index_sha256: Option<&str>,
    dimensions: DimensionStates,
) -> EnvironmentSnapshot {
    EnvironmentSnapshot {
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        git_commit: git_output(&["rev-parse", "HEAD"]),
        git_dirty: git_output(&["status", "--porcelain"]).map(|status| !status.is_empty()),
        command: command_line(),
        ground_truth_sha256: ground_truth_sha256.to_string(),
        photo_index_sha256: photo_index_sha256.map(str::to_string),
        bib_iou_threshold: config.bib_iou_threshold,
        face_iou_threshold: config.face_iou_threshold,
        tolerance: config.tolerance,
        autolink: config.autolink,
        bib: dimensions.bib,
        face: dimensions.face,
        link: dimensions.link,
    }
}

fn command_line() -> String {
    std::env::args().collect::<Vec<_>>().join(" ")
}

/// Trimmed stdout of a git command, or `None` outside a work tree or without git.
fn git_output(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
