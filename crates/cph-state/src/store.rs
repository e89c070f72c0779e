//! State Store (C4): opens the history database, runs migrations, and
//! exposes the core context/history operations.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use cph_core::{ContextField, ContextSnapshot, CphError, EnvType, SessionRecord};

use crate::lock::{self, DatabaseLock};
use crate::migrate;

/// Default poll window before a contending invocation gives up and reports
/// `STATE_DATABASE_BUSY`.
pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_millis(500);

/// One process's handle on the history database: a single connection held
/// for the run's duration, plus the advisory
/// file lock that excludes other concurrent invocations.
pub struct StateStore {
    conn: Connection,
    _lock: DatabaseLock,
}

impl StateStore {
    /// Open (creating if absent) the database at `db_path`, acquire the
    /// exclusive advisory lock, and bring the schema up to date.
    pub fn open(db_path: &Path) -> Result<Self, CphError> {
        Self::open_with_wait(db_path, DEFAULT_LOCK_WAIT)
    }

    pub fn open_with_wait(db_path: &Path, lock_wait: Duration) -> Result<Self, CphError> {
        let reason = format!("cph run (pid {})", std::process::id());
        let guard = lock::acquire(db_path, &reason, lock_wait)?;

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CphError::DriverFilesystem {
                path: parent.to_path_buf(),
                reason: e.to_string(),
            })?;
        }
        let mut conn = Connection::open(db_path).map_err(|e| CphError::StateIntegrity(format!(
            "failed to open database {}: {e}",
            db_path.display()
        )))?;
        migrate::run(&mut conn)?;

        Ok(Self { conn, _lock: guard })
    }

    /// Open an in-memory store for tests; skips the file lock entirely.
    #[cfg(test)]
    fn open_in_memory_for_tests() -> Self {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate::run(&mut conn).unwrap();
        // Tests never exercise the lock guard; acquire one against a throwaway path.
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let guard = lock::acquire(tmp.path(), "test", Duration::from_millis(100)).unwrap();
        Self { conn, _lock: guard }
    }

    /// Read every `context` row into a [`ContextSnapshot`].
    pub fn load_context(&self) -> Result<ContextSnapshot, CphError> {
        let mut stmt = self
            .conn
            .prepare("SELECT field, value, user_specified FROM context")
            .map_err(sqlite_err)?;
        let rows = stmt
            .query_map([], |row| {
                let field: String = row.get(0)?;
                let value: Option<String> = row.get(1)?;
                let user_specified: i64 = row.get(2)?;
                Ok((field, value, user_specified != 0))
            })
            .map_err(sqlite_err)?;

        let mut snapshot = ContextSnapshot::default();
        for row in rows {
            let (field, value, user_specified) = row.map_err(sqlite_err)?;
            if user_specified {
                if let Some(tagged) = field_from_str(&field) {
                    snapshot.user_specified.insert(tagged);
                }
            }
            snapshot.values.insert(field, value);
        }
        Ok(snapshot)
    }

    /// Idempotent upsert of one `context` field. `value = None` is a valid,
    /// distinct state ("explicitly cleared").
    pub fn update_context(
        &self,
        field: ContextField,
        value: Option<&str>,
        user_specified: bool,
    ) -> Result<(), CphError> {
        self.conn
            .execute(
                "INSERT INTO context (field, value, user_specified, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(field) DO UPDATE SET
                     value = excluded.value,
                     user_specified = excluded.user_specified,
                     updated_at = excluded.updated_at",
                params![field.as_str(), value, user_specified as i64, Utc::now().to_rfc3339()],
            )
            .map_err(sqlite_err)?;
        Ok(())
    }

    /// Insert one `operations` row and increment the matching
    /// `contest_progress` counters in the same transaction.
    pub fn append_operation(&mut self, record: &SessionRecord) -> Result<(), CphError> {
        let tx = self.conn.transaction().map_err(sqlite_err)?;

        tx.execute(
            "INSERT INTO operations
                (timestamp, command, language, contest_name, problem_name, env_type,
                 result, duration_ms, stdout, stderr, return_code, details_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                record.timestamp.to_rfc3339(),
                record.command,
                record.language,
                record.contest_name,
                record.problem_name,
                record.env_type.as_str(),
                record.result,
                record.duration_ms as i64,
                record.stdout_digest,
                record.stderr_digest,
                record.return_code,
                record.details_json,
            ],
        )
        .map_err(sqlite_err)?;

        let succeeded = record.return_code == 0;
        let now = record.timestamp.to_rfc3339();
        let existing_status: Option<String> = tx
            .query_row(
                "SELECT status FROM contest_progress
                 WHERE contest_name = ?1 AND problem_name = ?2 AND language = ?3",
                params![record.contest_name, record.problem_name, record.language],
                |row| row.get(0),
            )
            .optional()
            .map_err(sqlite_err)?;

        let new_status = if succeeded {
            "solved".to_string()
        } else {
            existing_status.clone().unwrap_or_else(|| "attempted".to_string())
        };

        if existing_status.is_some() {
            tx.execute(
                "UPDATE contest_progress SET
                     status = ?4,
                     last_attempt = ?5,
                     total_attempts = total_attempts + 1,
                     successful_submissions = successful_submissions + ?6
                 WHERE contest_name = ?1 AND problem_name = ?2 AND language = ?3",
                params![
                    record.contest_name,
                    record.problem_name,
                    record.language,
                    new_status,
                    now,
                    succeeded as i64,
                ],
            )
            .map_err(sqlite_err)?;
        } else {
            tx.execute(
                "INSERT INTO contest_progress
                    (contest_name, problem_name, language, status, first_attempt,
                     last_attempt, total_attempts, successful_submissions)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5, 1, ?6)",
                params![
                    record.contest_name,
                    record.problem_name,
                    record.language,
                    new_status,
                    now,
                    succeeded as i64,
                ],
            )
            .map_err(sqlite_err)?;
        }

        tx.commit().map_err(sqlite_err)?;
        Ok(())
    }
}

impl StateStore {
    /// Most recent `operations` rows, newest first (SPEC_FULL supplement:
    /// `cph history`).
    pub fn query_operations(&self, limit: usize) -> Result<Vec<OperationRecord>, CphError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, timestamp, command, language, contest_name, problem_name,
                        env_type, result, return_code, duration_ms
                 FROM operations
                 ORDER BY timestamp DESC
                 LIMIT ?1",
            )
            .map_err(sqlite_err)?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(OperationRecord {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    command: row.get(2)?,
                    language: row.get(3)?,
                    contest_name: row.get(4)?,
                    problem_name: row.get(5)?,
                    env_type: row.get(6)?,
                    result: row.get(7)?,
                    return_code: row.get(8)?,
                    duration_ms: row.get::<_, i64>(9)? as u64,
                })
            })
            .map_err(sqlite_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(sqlite_err)
    }

    /// Delete `operations` rows older than `max_age_days`; returns the
    /// number of rows removed (or that would be removed, under
    /// `dry_run`). SPEC_FULL supplement: `cph history gc`.
    pub fn gc_operations(&self, max_age_days: u64, dry_run: bool) -> Result<usize, CphError> {
        let cutoff = Utc::now() - chrono::Duration::days(max_age_days as i64);
        let cutoff = cutoff.to_rfc3339();

        if dry_run {
            let count: i64 = self
                .conn
                .query_row(
                    "SELECT count(*) FROM operations WHERE timestamp < ?1",
                    params![cutoff],
                    |r| r.get(0),
                )
                .map_err(sqlite_err)?;
            return Ok(count as usize);
        }

        let removed = self
            .conn
            .execute("DELETE FROM operations WHERE timestamp < ?1", params![cutoff])
            .map_err(sqlite_err)?;
        Ok(removed)
    }
}

/// One `operations` row as read back for display (SPEC_FULL supplement:
/// `cph history`).
#[derive(Clone, Debug)]
pub struct OperationRecord {
    pub id: i64,
    pub timestamp: String,
    pub command: String,
    pub language: String,
    pub contest_name: String,
    pub problem_name: String,
    pub env_type: String,
    pub result: String,
    pub return_code: i32,
    pub duration_ms: u64,
}

fn field_from_str(s: &str) -> Option<ContextField> {
    match s {
        "language" => Some(ContextField::Language),
        "contest_name" => Some(ContextField::ContestName),
        "problem_name" => Some(ContextField::ProblemName),
        "command_type" => Some(ContextField::CommandType),
        "env_type" => Some(ContextField::EnvType),
        _ => None,
    }
}

fn sqlite_err(e: rusqlite::Error) -> CphError {
    CphError::StateIntegrity(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(contest: &str, problem: &str, return_code: i32) -> SessionRecord {
        SessionRecord {
            timestamp: Utc::now(),
            language: "python".into(),
            contest_name: contest.into(),
            problem_name: problem.into(),
            command: "test".into(),
            env_type: EnvType::Local,
            result: if return_code == 0 { "ok" } else { "fail" }.into(),
            stdout_digest: "deadbeef".into(),
            stderr_digest: "".into(),
            return_code,
            duration_ms: 120,
            details_json: None,
        }
    }

    #[test]
    fn load_context_on_fresh_store_is_empty() {
        let store = StateStore::open_in_memory_for_tests();
        let snapshot = store.load_context().unwrap();
        assert!(snapshot.values.is_empty());
    }

    #[test]
    fn update_then_load_context_round_trips() {
        let store = StateStore::open_in_memory_for_tests();
        store
            .update_context(ContextField::Language, Some("rust"), true)
            .unwrap();
        let snapshot = store.load_context().unwrap();
        assert_eq!(snapshot.get(ContextField::Language), Some("rust"));
        assert!(snapshot.user_specified.contains(&ContextField::Language));
    }

    #[test]
    fn update_context_null_is_distinct_from_absent() {
        let store = StateStore::open_in_memory_for_tests();
        store
            .update_context(ContextField::ContestName, None, true)
            .unwrap();
        let snapshot = store.load_context().unwrap();
        // Present as an explicit key mapping to None, not simply missing.
        assert!(snapshot.values.contains_key("contest_name"));
        assert_eq!(snapshot.get(ContextField::ContestName), None);
    }

    #[test]
    fn update_context_is_idempotent_upsert() {
        let store = StateStore::open_in_memory_for_tests();
        store
            .update_context(ContextField::Language, Some("python"), true)
            .unwrap();
        store
            .update_context(ContextField::Language, Some("rust"), false)
            .unwrap();
        let snapshot = store.load_context().unwrap();
        assert_eq!(snapshot.get(ContextField::Language), Some("rust"));
        assert!(!snapshot.user_specified.contains(&ContextField::Language));
    }

    #[test]
    fn append_operation_inserts_row_and_creates_progress() {
        let mut store = StateStore::open_in_memory_for_tests();
        store.append_operation(&sample_record("abc300", "a", 0)).unwrap();

        let count: i64 = store
            .conn
            .query_row("SELECT count(*) FROM operations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);

        let (status, total, success): (String, i64, i64) = store
            .conn
            .query_row(
                "SELECT status, total_attempts, successful_submissions FROM contest_progress
                 WHERE contest_name = 'abc300' AND problem_name = 'a' AND language = 'python'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(status, "solved");
        assert_eq!(total, 1);
        assert_eq!(success, 1);
    }

    #[test]
    fn append_operation_increments_counters_on_repeat_attempts() {
        let mut store = StateStore::open_in_memory_for_tests();
        store.append_operation(&sample_record("abc300", "a", 1)).unwrap();
        store.append_operation(&sample_record("abc300", "a", 0)).unwrap();

        let (status, total, success): (String, i64, i64) = store
            .conn
            .query_row(
                "SELECT status, total_attempts, successful_submissions FROM contest_progress
                 WHERE contest_name = 'abc300' AND problem_name = 'a' AND language = 'python'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(status, "solved");
        assert_eq!(total, 2);
        assert_eq!(success, 1);
    }

    #[test]
    fn append_operation_test_command_writes_through_to_history_and_progress() {
        let mut store = StateStore::open_in_memory_for_tests();
        store.append_operation(&sample_record("abc300", "a", 0)).unwrap();

        let (command, return_code): (String, i32) = store
            .conn
            .query_row(
                "SELECT command, return_code FROM operations
                 WHERE language = 'python' AND contest_name = 'abc300' AND problem_name = 'a'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(command, "test");
        assert_eq!(return_code, 0);
    }

    #[test]
    fn query_operations_returns_newest_first() {
        let mut store = StateStore::open_in_memory_for_tests();
        store.append_operation(&sample_record("abc300", "a", 0)).unwrap();
        store.append_operation(&sample_record("abc300", "b", 1)).unwrap();
        let rows = store.query_operations(10).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].problem_name, "b");
        assert_eq!(rows[1].problem_name, "a");
    }

    #[test]
    fn query_operations_respects_limit() {
        let mut store = StateStore::open_in_memory_for_tests();
        for p in ["a", "b", "c"] {
            store.append_operation(&sample_record("abc300", p, 0)).unwrap();
        }
        let rows = store.query_operations(2).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn gc_operations_dry_run_does_not_delete() {
        let mut store = StateStore::open_in_memory_for_tests();
        store.append_operation(&sample_record("abc300", "a", 0)).unwrap();
        let would_remove = store.gc_operations(0, true).unwrap();
        assert_eq!(would_remove, 1);
        assert_eq!(store.query_operations(10).unwrap().len(), 1);
    }

    #[test]
    fn gc_operations_removes_rows_older_than_cutoff() {
        let mut store = StateStore::open_in_memory_for_tests();
        store.append_operation(&sample_record("abc300", "a", 0)).unwrap();
        let removed = store.gc_operations(0, false).unwrap();
        assert_eq!(removed, 1);
        assert!(store.query_operations(10).unwrap().is_empty());
    }
}
