use std::io::{self, Write};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::ListArgs;
use crate::config::{DataLayout, resolve_override};
use crate::store::{RunSummaryRow, list_runs, open_run_store, schema_version};

pub fn run(args: ListArgs) -> Result<()> {
    let layout = DataLayout::new(&args.data_root);
    let db_path = resolve_override(args.db_path.as_ref(), layout.db_path());
    if !db_path.exists() {
        warn!(path = %db_path.display(), "run store missing; no runs recorded yet");
        return Ok(());
    }

    let connection = open_run_store(&db_path)?;
    let rows = list_runs(&connection, args.split, Some(args.limit))?;
    info!(
        path = %db_path.display(),
        schema_version = %schema_version(&connection)?.unwrap_or_default(),
        runs = rows.len(),
        "listed runs"
    );

    let mut output = io::BufWriter::new(io::stdout().lock());
    if args.json {
        serde_json::to_writer_pretty(&mut output, &rows).context("failed to serialize run list")?;
        writeln!(output)?;
    } else {
        for row in &rows {
            writeln!(output, "{}", format_row(row))?;
        }
    }
    output.flush()?;
    Ok(())
}

fn format_metric(value: Option<f64>) -> String {
    value
        .map(|value| format!("{value:.4}"))
        .unwrap_or_else(|| "-".to_string())
}

fn format_row(row: &RunSummaryRow) -> String {
    let mut line = format!(
        "{}  {:<9} photos={} errors={} bib_p={} bib_r={} ocr={} face_f1={} link_f1={}",
        row.run_id,
        row.split,
        row.photo_count,
        row.error_count,
        format_metric(row.bib_precision),
        format_metric(row.bib_recall),
        format_metric(row.ocr_accuracy),
        format_metric(row.face_f1),
        format_metric(row.link_f1),
    );
    if let Some(judgement) = row.judgement.as_deref() {
        line.push_str(&format!(" [{judgement}]"));
    }
    if row.limited {
        line.push_str(" (limited)");
    }
    if let Some(note) = row.note.as_deref() {
        line.push_str(&format!(" {note}"));
    }
    line
}
