use anyhow::Result;
use tracing::info;

use crate::baseline::{promote_run, resolve_baseline_reason};
use crate::cli::SetBaselineArgs;
use crate::commands::inspect::load_stored_record;
use crate::config::{DataLayout, resolve_override};
use crate::store::{find_run, open_run_store};

pub fn run(args: SetBaselineArgs) -> Result<()> {
    let layout = DataLayout::new(&args.data_root);
    let db_path = resolve_override(args.db_path.as_ref(), layout.db_path());
    let connection = open_run_store(&db_path)?;
    let row = find_run(&connection, &args.run_id)?;
    let record = load_stored_record(&layout, &row)?;

    let reason = args
        .reason
        .map(|reason| reason.trim().to_string())
        .filter(|reason| !reason.is_empty())
        .or_else(resolve_baseline_reason);
    let lock = promote_run(&layout.baseline_path(), &record, reason)?;

    info!(
        run_id = %lock.run_id,
        checksum = %lock.checksum,
        reason = lock.change_reason.as_deref().unwrap_or("-"),
        "baseline updated"
    );
    println!("Baseline: {}", lock.run_id);
    Ok(())
}
