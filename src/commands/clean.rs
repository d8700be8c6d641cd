use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::baseline::load_baseline;
use crate::cli::CleanArgs;
use crate::config::{DataLayout, resolve_override};
use crate::store::{RunSummaryRow, delete_run, list_runs, open_run_store};

pub fn run(args: CleanArgs) -> Result<()> {
    let layout = DataLayout::new(&args.data_root);
    let db_path = resolve_override(args.db_path.as_ref(), layout.db_path());
    let connection = open_run_store(&db_path)?;

    let baseline_run_id = load_baseline(&layout.baseline_path())?.map(|lock| lock.run_id);
    let rows = list_runs(&connection, None, None)?;
    let doomed = runs_to_delete(&rows, args.keep, baseline_run_id.as_deref());

    for row in &doomed {
        if args.dry_run {
            info!(run_id = %row.run_id, "would delete run");
            continue;
        }

        let record_path = layout.resolve(Path::new(&row.record_path));
        if record_path.exists() {
            fs::remove_file(&record_path)
                .with_context(|| format!("failed to remove {}", record_path.display()))?;
        }
        delete_run(&connection, &row.run_id)?;
        info!(run_id = %row.run_id, "deleted run");
    }

    let verb = if args.dry_run { "Would delete" } else { "Deleted" };
    println!("{verb} {} of {} runs (keep={})", doomed.len(), rows.len(), args.keep);
    Ok(())
}

/// `rows` are newest first. The baseline run is never deleted.
fn runs_to_delete<'a>(
    rows: &'a [RunSummaryRow],
    keep: usize,
    baseline_run_id: Option<&str>,
) -> Vec<&'a RunSummaryRow> {
    rows.iter()
        .skip(keep)
        .filter(|row| Some(row.run_id.as_str()) != baseline_run_id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(run_id: &str) -> RunSummaryRow {
        RunSummaryRow {
            run_id: run_id.to_string(),
            created_at: String::new(),
            split: "full".to_string(),
            note: None,
            photo_count: 0,
            scored_photo_count: 0,
            error_count: 0,
            limited: false,
            bib_precision: None,
            bib_recall: None,
            bib_f1: None,
            ocr_accuracy: None,
            face_f1: None,
            link_f1: None,
            judgement: None,
            git_commit: None,
            record_path: String::new(),
        }
    }

    #[test]
    fn keeps_newest_runs_and_the_baseline() {
        let rows = vec![row("run-4"), row("run-3"), row("run-2"), row("run-1")];

        let doomed = runs_to_delete(&rows, 1, Some("run-2"))
            .into_iter()
            .map(|row| row.run_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(doomed, vec!["run-3", "run-1"]);

        assert!(runs_to_delete(&rows, 10, None).is_empty());
        assert_eq!(runs_to_delete(&rows, 0, None).len(), 4);
    }
}
