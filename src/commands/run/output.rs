use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::model::{
    BaselineComparison, BenchmarkRun, DimensionState, PhotoResult, RunMetrics, RunScorecards,
};
use crate::scoring::DetectionCounts;

#[derive(Debug, Serialize)]
struct RunSummary<'a> {
    run_id: &'a str,
    split: &'a str,
    note: Option<&'a str>,
    record_path: String,
    photo_count: usize,
    scored_photo_count: usize,
    error_count: usize,
    limited: bool,
    duration_ms: u128,
    scorecards: &'a RunScorecards,
    metrics: &'a RunMetrics,
    comparison: Option<&'a BaselineComparison>,
    warnings: &'a [String],
}

pub fn write_run_summary(run: &BenchmarkRun, record_path: &Path, json: bool) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    if json {
        let summary = RunSummary {
            run_id: &run.metadata.run_id,
            split: run.metadata.split.as_str(),
            note: run.metadata.note.as_deref(),
            record_path: record_path.display().to_string(),
            photo_count: run.metadata.photo_count,
            scored_photo_count: run.metadata.scored_photo_count,
            error_count: run.metadata.error_count,
            limited: run.metadata.limited,
            duration_ms: run.metadata.duration_ms,
            scorecards: &run.scorecards,
            metrics: &run.metrics,
            comparison: run.comparison.as_ref(),
            warnings: &run.warnings,
        };
        serde_json::to_writer_pretty(&mut output, &summary)
            .context("failed to serialize run summary")?;
        writeln!(output)?;
    } else {
        write_run_text(&mut output, run)?;
        writeln!(output, "Record: {}", record_path.display())?;
    }
    output.flush()?;
    Ok(())
}

pub(crate) fn write_run_text(output: &mut impl Write, run: &BenchmarkRun) -> Result<()> {
    let metadata = &run.metadata;
    writeln!(
        output,
        "Run: {} split={} photos={} scored={} errors={}{}",
        metadata.run_id,
        metadata.split.as_str(),
        metadata.photo_count,
        metadata.scored_photo_count,
        metadata.error_count,
        if metadata.limited { " (limited)" } else { "" }
    )?;
    if let Some(note) = metadata.note.as_deref() {
        writeln!(output, "Note: {note}")?;
    }

    match run.scorecards.bib.as_ref() {
        Some(bib) => writeln!(
            output,
            "Bibs:  tp={} fp={} fn={} precision={:.4} recall={:.4} f1={:.4} ocr_accuracy={:.4} ({}/{})",
            bib.true_positives,
            bib.false_positives,
            bib.false_negatives,
            bib.precision(),
            bib.recall(),
            bib.f1(),
            bib.ocr_accuracy(),
            bib.ocr_correct,
            bib.ocr_total
        )?,
        None => write_disabled(output, "Bibs: ", &run.environment.bib)?,
    }
    match run.scorecards.face.as_ref() {
        Some(face) => writeln!(
            output,
            "Faces: tp={} fp={} fn={} ignored={} precision={:.4} recall={:.4} f1={:.4}",
            face.true_positives,
            face.false_positives,
            face.false_negatives,
            face.ignored_predictions,
            face.precision(),
            face.recall(),
            face.f1()
        )?,
        None => write_disabled(output, "Faces:", &run.environment.face)?,
    }
    match run.scorecards.link.as_ref() {
        Some(link) => writeln!(
            output,
            "Links: tp={} fp={} fn={} gt_links={} precision={:.4} recall={:.4} f1={:.4}",
            link.true_positives,
            link.false_positives,
            link.false_negatives,
            link.gt_link_count,
            link.precision(),
            link.recall(),
            link.f1()
        )?,
        None => write_disabled(output, "Links:", &run.environment.link)?,
    }

    match run.comparison.as_ref() {
        Some(comparison) => {
            writeln!(
                output,
                "Baseline: {} precision_delta={:+.4} recall_delta={:+.4} f1_delta={:+.4} ocr_delta={:+.4} tolerance={} => {}",
                comparison.baseline_run_id,
                comparison.precision_delta,
                comparison.recall_delta,
                comparison.f1_delta,
                comparison.ocr_accuracy_delta,
                comparison.tolerance,
                comparison.judgement.as_str()
            )?;
            for warning in &comparison.warnings {
                writeln!(output, "  warning: {warning}")?;
            }
        }
        None => writeln!(output, "Baseline: not compared")?,
    }

    for warning in &run.warnings {
        writeln!(output, "Warning: {warning}")?;
    }
    Ok(())
}

fn write_disabled(output: &mut impl Write, label: &str, state: &DimensionState) -> Result<()> {
    writeln!(
        output,
        "{label} disabled ({})",
        state.disabled_reason.as_deref().unwrap_or("no detector")
    )?;
    Ok(())
}

pub(crate) fn write_photo_line(output: &mut impl Write, photo: &PhotoResult) -> Result<()> {
    let status = photo
        .status
        .map(|status| status.as_str())
        .unwrap_or("ERROR");
    write!(output, "{status:<7} {}", photo.content_hash)?;
    if let Some(bib) = photo.bib.as_ref() {
        write!(
            output,
            " bibs tp={} fp={} fn={}",
            bib.true_positives, bib.false_positives, bib.false_negatives
        )?;
    }
    if let Some(face) = photo.face.as_ref() {
        write!(
            output,
            " faces tp={} fp={} fn={}",
            face.true_positives, face.false_positives, face.false_negatives
        )?;
    }
    if let Some(link) = photo.link.as_ref() {
        write!(output, " links tp={} fp={} fn={}", link.true_positives, link.false_positives, link.false_negatives)?;
    }
    writeln!(output, " {}ms", photo.elapsed_ms)?;

    if !photo.missed_numbers.is_empty() {
        writeln!(output, "        missed: {}", photo.missed_numbers.join(", "))?;
    }
    for mismatch in &photo.ocr_mismatches {
        writeln!(
            output,
            "        ocr: expected {} got {}",
            mismatch.expected, mismatch.detected
        )?;
    }
    for error in &photo.errors {
        writeln!(output, "        error: {error}")?;
    }
    Ok(())
}
