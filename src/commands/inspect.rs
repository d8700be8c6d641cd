use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::InspectArgs;
use crate::commands::run::output::{write_photo_line, write_run_text};
use crate::config::{DataLayout, resolve_override};
use crate::model::BenchmarkRun;
use crate::store::{RunSummaryRow, find_run, open_run_store};
use crate::util::read_json;

pub fn run(args: InspectArgs) -> Result<()> {
    let layout = DataLayout::new(&args.data_root);
    let db_path = resolve_override(args.db_path.as_ref(), layout.db_path());
    let connection = open_run_store(&db_path)?;
    let row = find_run(&connection, &args.run_id)?;

    let mut record = load_stored_record(&layout, &row)?;
    if args.failures_only {
        retain_failures(&mut record);
    }
    info!(
        run_id = %record.metadata.run_id,
        photos = record.photo_results.len(),
        failures_only = args.failures_only,
        "inspecting run"
    );

    let mut output = io::BufWriter::new(io::stdout().lock());
    if args.json {
        serde_json::to_writer_pretty(&mut output, &record)
            .context("failed to serialize run record")?;
        writeln!(output)?;
    } else {
        write_run_text(&mut output, &record)?;
        writeln!(output)?;
        for photo in &record.photo_results {
            write_photo_line(&mut output, photo)?;
        }
    }
    output.flush()?;
    Ok(())
}

pub fn load_run_record(path: &Path) -> Result<BenchmarkRun> {
    read_json(path).with_context(|| format!("failed to load run record {}", path.display()))
}

/// Stored record paths are relative to the data root.
pub fn load_stored_record(layout: &DataLayout, row: &RunSummaryRow) -> Result<BenchmarkRun> {
    load_run_record(&layout.resolve(Path::new(&row.record_path)))
}

fn retain_failures(record: &mut BenchmarkRun) {
    record.photo_results.retain(|photo| photo.is_failure());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PhotoResult, PhotoStatus, Split};

    #[test]
    fn failures_are_errors_or_non_pass_statuses() {
        let mut pass = PhotoResult::new("aaaaaaaa", Split::Full);
        pass.status = Some(PhotoStatus::Pass);
        let mut partial = PhotoResult::new("bbbbbbbb", Split::Full);
        partial.status = Some(PhotoStatus::Partial);
        let mut errored = PhotoResult::new("cccccccc", Split::Full);
        errored.errors.push("photo file not found".to_string());
        let face_only = PhotoResult::new("dddddddd", Split::Full);

        let kept = [pass, partial, errored, face_only]
            .into_iter()
            .filter(PhotoResult::is_failure)
            .map(|photo| photo.content_hash)
            .collect::<Vec<_>>();
        assert_eq!(kept, vec!["bbbbbbbb".to_string(), "cccccccc".to_string()]);
    }
}
