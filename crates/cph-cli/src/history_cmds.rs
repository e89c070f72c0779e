//! `cph history list|gc`, driving the State Store's operation log directly
//! via `query_operations`/`gc_operations`.

use cph_core::{CphError, OutputFormat};
use cph_state::OperationRecord;

use crate::context::Session;

fn print_text(records: &[OperationRecord]) {
    if records.is_empty() {
        println!("(no recorded operations)");
        return;
    }
    for r in records {
        println!(
            "{:<20} {:<8} {}/{}/{:<10} {:<4} {:>5}ms rc={}",
            r.timestamp, r.command, r.language, r.contest_name, r.problem_name, r.env_type, r.duration_ms, r.return_code
        );
    }
}

fn print_json(records: &[OperationRecord]) {
    let items: Vec<serde_json::Value> = records
        .iter()
        .map(|r| {
            serde_json::json!({
                "id": r.id,
                "timestamp": r.timestamp,
                "command": r.command,
                "language": r.language,
                "contest_name": r.contest_name,
                "problem_name": r.problem_name,
                "env_type": r.env_type,
                "result": r.result,
                "return_code": r.return_code,
                "duration_ms": r.duration_ms,
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&items).unwrap_or_default());
}

pub fn list(session: &Session, limit: usize, format: OutputFormat) -> Result<(), CphError> {
    let records = session.store.query_operations(limit)?;
    match format {
        OutputFormat::Text => print_text(&records),
        OutputFormat::Json => print_json(&records),
    }
    Ok(())
}

pub fn gc(session: &Session, max_age_days: u64, dry_run: bool) -> Result<(), CphError> {
    let deleted = session.store.gc_operations(max_age_days, dry_run)?;
    if dry_run {
        println!("would delete {deleted} operation(s) older than {max_age_days} day(s)");
    } else {
        println!("deleted {deleted} operation(s) older than {max_age_days} day(s)");
    }
    Ok(())
}
