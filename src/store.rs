use std::path::Path;

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;

use crate::model::{BenchmarkRun, Split};
use crate::util::{ensure_directory, now_utc_string};

pub const STORE_SCHEMA_VERSION: &str = "1";

/// One row of run history. The full record lives in the JSON file at `record_path`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummaryRow {
    pub run_id: String,
    pub created_at: String,
    pub split: String,
    pub note: Option<String>,
    pub photo_count: i64,
    pub scored_photo_count: i64,
    pub error_count: i64,
    pub limited: bool,
    pub bib_precision: Option<f64>,
    pub bib_recall: Option<f64>,
    pub bib_f1: Option<f64>,
    pub ocr_accuracy: Option<f64>,
    pub face_f1: Option<f64>,
    pub link_f1: Option<f64>,
    pub judgement: Option<String>,
    pub git_commit: Option<String>,
    pub record_path: String,
}

const SUMMARY_COLUMNS: &str = "run_id, created_at, split, note, photo_count, scored_photo_count, \
     error_count, limited, bib_precision, bib_recall, bib_f1, ocr_accuracy, face_f1, link_f1, \
     judgement, git_commit, record_path";

pub fn open_run_store(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        ensure_directory(parent)?;
    }

    let connection = Connection::open(path)
        .with_context(|| format!("failed to open run store: {}", path.display()))?;
    configure_connection(&connection)?;
    ensure_schema(&connection)?;
    Ok(connection)
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    Ok(())
}

pub(crate) fn ensure_schema(connection: &Connection) -> Result<()> {
    connection.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS benchmark_runs (
          run_id TEXT PRIMARY KEY,
          created_at TEXT NOT NULL,
          split TEXT NOT NULL,
          note TEXT,
          photo_count INTEGER NOT NULL,
          scored_photo_count INTEGER NOT NULL,
          error_count INTEGER NOT NULL,
          limited INTEGER NOT NULL DEFAULT 0,
          bib_precision REAL,
          bib_recall REAL,
          bib_f1 REAL,
          ocr_accuracy REAL,
          face_f1 REAL,
          link_f1 REAL,
          judgement TEXT,
          git_commit TEXT,
          record_path TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_benchmark_runs_split_created
          ON benchmark_runs(split, created_at);
        ",
    )?;

    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('store_schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [STORE_SCHEMA_VERSION],
    )?;
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('store_updated_at', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [now_utc_string()],
    )?;

    Ok(())
}

pub fn insert_run(connection: &Connection, run: &BenchmarkRun, record_path: &Path) -> Result<()> {
    let metadata = &run.metadata;
    let metrics = &run.metrics;
    connection
        .execute(
            "INSERT INTO benchmark_runs(
               run_id, created_at, split, note, photo_count, scored_photo_count, error_count,
               limited, bib_precision, bib_recall, bib_f1, ocr_accuracy, face_f1, link_f1,
               judgement, git_commit, record_path
             ) VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
             ON CONFLICT(run_id) DO UPDATE SET
               note=excluded.note,
               judgement=excluded.judgement,
               record_path=excluded.record_path",
            params![
                metadata.run_id,
                metadata.created_at,
                metadata.split.as_str(),
                metadata.note,
                metadata.photo_count as i64,
                metadata.scored_photo_count as i64,
                metadata.error_count as i64,
                metadata.limited,
                metrics.bib_precision,
                metrics.bib_recall,
                metrics.bib_f1,
                metrics.ocr_accuracy,
                metrics.face_f1,
                metrics.link_f1,
                run.judgement().map(|judgement| judgement.as_str()),
                run.environment.git_commit,
                record_path.display().to_string(),
            ],
        )
        .with_context(|| format!("failed to record run {}", metadata.run_id))?;
    Ok(())
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<RunSummaryRow> {
    Ok(RunSummaryRow {
        run_id: row.get(0)?,
        created_at: row.get(1)?,
        split: row.get(2)?,
        note: row.get(3)?,
        photo_count: row.get(4)?,
        scored_photo_count: row.get(5)?,
        error_count: row.get(6)?,
        limited: row.get(7)?,
        bib_precision: row.get(8)?,
        bib_recall: row.get(9)?,
        bib_f1: row.get(10)?,
        ocr_accuracy: row.get(11)?,
        face_f1: row.get(12)?,
        link_f1: row.get(13)?,
        judgement: row.get(14)?,
        git_commit: row.get(15)?,
        record_path: row.get(16)?,
    })
}

/// Newest first. `limit = None` returns every run.
pub fn list_runs(
    connection: &Connection,
    split: Option<Split>,
    limit: Option<usize>,
) -> Result<Vec<RunSummaryRow>> {
    let sql = format!(
        "SELECT {SUMMARY_COLUMNS} FROM benchmark_runs
         WHERE (?1 IS NULL OR split = ?1)
         ORDER BY created_at DESC, run_id DESC
         LIMIT ?2"
    );
    let limit = limit.map(|value| value as i64).unwrap_or(-1);
    let mut statement = connection.prepare(&sql)?;
    let rows = statement
        .query_map(params![split.map(Split::as_str), limit], summary_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("failed to list runs")?;
    Ok(rows)
}

/// Looks a run up by exact id or by a unique id prefix.
pub fn find_run(connection: &Connection, id_or_prefix: &str) -> Result<RunSummaryRow> {
    let needle = id_or_prefix.trim();
    if needle.is_empty() {
        bail!("run id must not be empty");
    }

    let exact_sql = format!("SELECT {SUMMARY_COLUMNS} FROM benchmark_runs WHERE run_id = ?1");
    if let Some(row) = connection
        .query_row(&exact_sql, [needle], summary_from_row)
        .optional()?
    {
        return Ok(row);
    }

    let prefix_sql = format!(
        "SELECT {SUMMARY_COLUMNS} FROM benchmark_runs
         WHERE substr(run_id, 1, length(?1)) = ?1
         ORDER BY run_id"
    );
    let mut statement = connection.prepare(&prefix_sql)?;
    let mut matches = statement
        .query_map([needle], summary_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    match matches.len() {
        0 => bail!("no run matches '{needle}'"),
        1 => Ok(matches.remove(0)),
        count => bail!("run id prefix '{needle}' is ambiguous ({count} runs match)"),
    }
}

pub fn delete_run(connection: &Connection, run_id: &str) -> Result<bool> {
    let deleted = connection
        .execute("DELETE FROM benchmark_runs WHERE run_id = ?1", [run_id])
        .with_context(|| format!("failed to delete run {run_id}"))?;
    Ok(deleted > 0)
}

pub fn schema_version(connection: &Connection) -> Result<Option<String>> {
    connection
        .query_row(
            "SELECT value FROM metadata WHERE key = 'store_schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()
        .context("failed to read store schema version")
}
