use std::time::Instant;

use anyhow::{Result, bail};
use chrono::Utc;
use tracing::{info, warn};

use crate::baseline::{
    BIBSCORE_BASELINE_MODE_ENV, BIBSCORE_BASELINE_REASON_ENV, BaselineMode, compare,
    load_baseline, promote_run, resolve_baseline_mode, resolve_baseline_reason,
};
use crate::cli::RunArgs;
use crate::config::{BenchmarkConfig, DataLayout, resolve_override};
use crate::detect::{Detector, DetectorConfig, build_detector};
use crate::ground_truth::{GroundTruthStore, JsonGroundTruth, JsonPhotoIndex, PhotoIndex};
use crate::model::{
    BenchmarkRun, DimensionState, Judgement, RUN_MANIFEST_VERSION, RunMetadata, RunMetrics, Split,
};
use crate::store::{insert_run, open_run_store};
use crate::util::{run_id_for, write_json_pretty};

use super::environment::{DimensionStates, capture_environment};
use super::output::write_run_summary;
use super::runner::{BenchmarkRunner, RunnerSettings};

pub fn run(args: RunArgs) -> Result<Option<Judgement>> {
    let mode = resolve_baseline_mode();
    let reason = resolve_baseline_reason();
    let layout = DataLayout::new(&args.data_root);
    let run = execute(&args, &layout, mode, reason)?;

    let record_path = layout.run_record_path(&run.metadata.run_id);
    write_run_summary(&run, &record_path, args.json)?;

    let judgement = run.judgement();
    match judgement {
        Some(Judgement::Regressed) => warn!(
            run_id = %run.metadata.run_id,
            judgement = Judgement::Regressed.as_str(),
            "bib accuracy regressed against baseline"
        ),
        Some(judgement) => info!(
            run_id = %run.metadata.run_id,
            judgement = judgement.as_str(),
            "baseline comparison complete"
        ),
        None => info!(run_id = %run.metadata.run_id, "run complete without baseline judgement"),
    }
    Ok(judgement)
}

/// Evaluates, persists and (in bootstrap mode) promotes one run.
pub(super) fn execute(
    args: &RunArgs,
    layout: &DataLayout,
    mode: BaselineMode,
    baseline_reason: Option<String>,
) -> Result<BenchmarkRun> {
    let started = Instant::now();
    let created = Utc::now();
    let run_id = run_id_for(created);

    let config_path = resolve_override(args.config_path.as_ref(), layout.config_path());
    let mut config = BenchmarkConfig::load(&config_path)?;
    apply_overrides(&mut config, args);
    config.validate()?;

    let ground_truth_path =
        resolve_override(args.ground_truth_path.as_ref(), layout.ground_truth_path());
    let photo_index_path =
        resolve_override(args.photo_index_path.as_ref(), layout.photo_index_path());
    let photos_root = resolve_override(args.photos_root.as_ref(), layout.photos_root());
    let db_path = resolve_override(args.db_path.as_ref(), layout.db_path());

    let ground_truth = JsonGroundTruth::load(&ground_truth_path)?;
    let photo_index = JsonPhotoIndex::load(&photo_index_path, &photos_root)?;

    let mut photos = ground_truth.labeled_photos(args.split);
    let limited = args.limit.is_some();
    if let Some(limit) = args.limit {
        photos.truncate(limit);
    }

    let mut warnings = Vec::new();
    let (bib_detector, bib_state) = build_dimension("bib", &config.bib_detector, layout);
    let (face_detector, face_state) = if args.no_faces {
        (None, DimensionState::disabled("disabled by --no-faces"))
    } else {
        build_dimension("face", &config.face_detector, layout)
    };
    if bib_detector.is_none() && face_detector.is_none() {
        bail!(
            "no detector available (bib: {}; face: {})",
            bib_state.disabled_reason.as_deref().unwrap_or("unknown"),
            face_state.disabled_reason.as_deref().unwrap_or("unknown")
        );
    }

    // Rotation without a reason fails before any photo is scored or persisted.
    let baseline_path = layout.baseline_path();
    let would_promote = mode == BaselineMode::Bootstrap
        && args.split == Split::Full
        && !limited
        && bib_detector.is_some();
    if would_promote && baseline_reason.is_none() && baseline_path.exists() {
        bail!(
            "{}={} would rotate the existing baseline at {}; set {} to record why",
            BIBSCORE_BASELINE_MODE_ENV,
            mode.as_str(),
            baseline_path.display(),
            BIBSCORE_BASELINE_REASON_ENV
        );
    }

    for (name, state) in [("bib", &bib_state), ("face", &face_state)] {
        if let Some(reason) = state.disabled_reason.as_deref() {
            warnings.push(format!("{name} scoring disabled: {reason}"));
        }
    }
    let link_state = if bib_detector.is_some() && face_detector.is_some() {
        DimensionState::enabled("autolink".to_string())
    } else {
        DimensionState::disabled("link scoring needs both bib and face detection")
    };

    info!(
        run_id = %run_id,
        split = args.split.as_str(),
        photos = photos.len(),
        limited,
        bib = bib_state.enabled,
        face = face_state.enabled,
        "benchmark run started"
    );

    let runner = BenchmarkRunner::new(
        RunnerSettings {
            bib_iou_threshold: config.bib_iou_threshold,
            face_iou_threshold: config.face_iou_threshold,
            autolink: config.autolink,
        },
        bib_detector.as_deref(),
        face_detector.as_deref(),
        &photo_index,
    )?;
    let output = runner.evaluate(&photos);

    let environment = capture_environment(
        &config,
        ground_truth.fingerprint(),
        photo_index.fingerprint(),
        DimensionStates {
            bib: bib_state,
            face: face_state,
            link: link_state,
        },
    );

    let metrics = RunMetrics::from_scorecards(&output.scorecards);
    let mut run = BenchmarkRun {
        manifest_version: RUN_MANIFEST_VERSION,
        metadata: RunMetadata {
            run_id: run_id.clone(),
            created_at: created.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            split: args.split,
            note: args.note.clone(),
            photo_count: output.photo_results.len(),
            scored_photo_count: output.scored_photo_count,
            error_count: output.error_count,
            limited,
            duration_ms: 0,
        },
        environment,
        scorecards: output.scorecards,
        metrics,
        comparison: None,
        photo_results: output.photo_results,
        warnings,
    };

    if args.split == Split::Full {
        if run.baseline_eligible() {
            match load_baseline(&baseline_path)? {
                Some(lock) => run.comparison = compare(&run, &lock, config.tolerance),
                None => run.warnings.push(format!(
                    "no baseline at {}; set {}=bootstrap to promote a full run",
                    baseline_path.display(),
                    BIBSCORE_BASELINE_MODE_ENV
                )),
            }
        } else if limited {
            run.warnings
                .push("limited run; baseline comparison skipped".to_string());
        } else {
            run.warnings
                .push("bib scoring disabled; baseline comparison skipped".to_string());
        }
    }
    run.metadata.duration_ms = started.elapsed().as_millis();

    let record_path = layout.run_record_path(&run_id);
    write_json_pretty(&record_path, &run)?;
    let connection = open_run_store(&db_path)?;
    insert_run(&connection, &run, &layout.relative(&record_path))?;
    info!(
        run_id = %run_id,
        path = %record_path.display(),
        scored = run.metadata.scored_photo_count,
        errors = run.metadata.error_count,
        duration_ms = run.metadata.duration_ms as u64,
        "run record written"
    );

    if mode == BaselineMode::Bootstrap {
        if run.baseline_eligible() {
            promote_run(&baseline_path, &run, baseline_reason)?;
        } else {
            warn!(
                run_id = %run_id,
                mode = mode.as_str(),
                "baseline bootstrap requested but only unlimited full runs with bib scoring qualify"
            );
        }
    }

    Ok(run)
}

fn apply_overrides(config: &mut BenchmarkConfig, args: &RunArgs) {
    if let Some(tolerance) = args.tolerance {
        config.tolerance = tolerance;
    }
    if let Some(threshold) = args.bib_iou_threshold {
        config.bib_iou_threshold = threshold;
    }
    if let Some(threshold) = args.face_iou_threshold {
        config.face_iou_threshold = threshold;
    }
}

/// A detector that cannot be built disables its dimension for the whole run.
fn build_dimension(
    name: &str,
    config: &DetectorConfig,
    layout: &DataLayout,
) -> (Option<Box<dyn Detector>>, DimensionState) {
    match build_detector(config, layout) {
        Ok(Some(detector)) => {
            let state = DimensionState::enabled(detector.describe());
            (Some(detector), state)
        }
        Ok(None) => (None, DimensionState::disabled("disabled in config")),
        Err(error) => {
            warn!(
                dimension = name,
                error = %format!("{error:#}"),
                "detector unavailable; dimension disabled for this run"
            );
            (None, DimensionState::disabled(format!("{error:#}")))
        }
    }
}
