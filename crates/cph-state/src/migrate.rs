//! Schema migrations for the history database.
//!
//! Ordered, versioned, each run in its own transaction — the same shape as
//! the config layer's migration registry, but keyed on the literal
//! `schema_version(id=1, version INTEGER)` row, rather than
//! the semver triple the config layer uses for project-state migrations.

use rusqlite::Connection;

use cph_core::CphError;

/// One schema revision: raw DDL executed as a single transaction to bring
/// the database from `version - 1` to `version`.
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
}

/// All migrations in ascending `version` order. The binary's compiled-in
/// latest version is `MIGRATIONS.last().version`.
pub fn migrations() -> &'static [Migration] {
    &[Migration {
        version: 1,
        description: "initial schema: context, operations, sessions, contest_progress",
        up: r#"
            CREATE TABLE schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );
            INSERT INTO schema_version (id, version) VALUES (1, 0);

            CREATE TABLE context (
                field TEXT PRIMARY KEY,
                value TEXT NULL,
                user_specified INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE operations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                command TEXT NOT NULL,
                language TEXT NOT NULL,
                contest_name TEXT NOT NULL,
                problem_name TEXT NOT NULL,
                env_type TEXT NOT NULL,
                result TEXT NOT NULL,
                duration_ms INTEGER NOT NULL,
                stdout TEXT NOT NULL,
                stderr TEXT NOT NULL,
                return_code INTEGER NOT NULL,
                details_json TEXT NULL
            );

            CREATE TABLE sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_start TEXT NOT NULL,
                session_end TEXT NULL,
                language TEXT NOT NULL,
                contest_name TEXT NOT NULL,
                problem_name TEXT NOT NULL,
                total_ops INTEGER NOT NULL DEFAULT 0,
                successful_ops INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE contest_progress (
                contest_name TEXT NOT NULL,
                problem_name TEXT NOT NULL,
                language TEXT NOT NULL,
                status TEXT NOT NULL,
                first_attempt TEXT NOT NULL,
                last_attempt TEXT NOT NULL,
                total_attempts INTEGER NOT NULL DEFAULT 0,
                successful_submissions INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (contest_name, problem_name, language)
            );
        "#,
    }]
}

/// Current schema version, or 0 if `schema_version` does not exist yet
/// (a brand-new database file).
fn current_version(conn: &Connection) -> rusqlite::Result<u32> {
    let exists: bool = conn.query_row(
        "SELECT count(*) FROM sqlite_master WHERE type='table' AND name='schema_version'",
        [],
        |row| row.get::<_, i64>(0),
    )? > 0;
    if !exists {
        return Ok(0);
    }
    conn.query_row("SELECT version FROM schema_version WHERE id = 1", [], |row| row.get(0))
}

/// Bring `conn`'s schema up to the latest compiled-in version, running each
/// pending migration in its own transaction: "failure aborts the
/// open with MigrationFailed."
pub fn run(conn: &mut Connection) -> Result<(), CphError> {
    let mut version = current_version(conn).map_err(|e| CphError::StateMigrationFailed {
        version: 0,
        reason: format!("failed to read schema version: {e}"),
    })?;

    for migration in migrations().iter().filter(|m| m.version > version) {
        let tx = conn.transaction().map_err(|e| CphError::StateMigrationFailed {
            version: migration.version,
            reason: format!("failed to begin transaction: {e}"),
        })?;
        tx.execute_batch(migration.up)
            .map_err(|e| CphError::StateMigrationFailed {
                version: migration.version,
                reason: e.to_string(),
            })?;
        tx.execute(
            "UPDATE schema_version SET version = ?1 WHERE id = 1",
            rusqlite::params![migration.version],
        )
        .map_err(|e| CphError::StateMigrationFailed {
            version: migration.version,
            reason: format!("failed to record schema version: {e}"),
        })?;
        tx.commit().map_err(|e| CphError::StateMigrationFailed {
            version: migration.version,
            reason: format!("failed to commit migration: {e}"),
        })?;
        version = migration.version;
        tracing::debug!(version, description = migration.description, "applied migration");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_database_reaches_latest_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        run(&mut conn).unwrap();
        let version = current_version(&conn).unwrap();
        assert_eq!(version, migrations().last().unwrap().version);
    }

    #[test]
    fn running_twice_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        run(&mut conn).unwrap();
        run(&mut conn).unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name='operations'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn expected_tables_exist_after_migration() {
        let mut conn = Connection::open_in_memory().unwrap();
        run(&mut conn).unwrap();
        for table in ["context", "operations", "sessions", "contest_progress"] {
            let count: i64 = conn
                .query_row(
                    "SELECT count(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |r| r.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {table}");
        }
    }
}
