//! Advisory file lock guarding the history database
//! "Concurrency"). Ported from the session-lock crate's direct-`flock(2)`
//! approach: owning only the `File` (which owns the fd) avoids the
//! self-referential-struct problem an RAII lock-over-owner guard would have.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cph_core::CphError;

#[derive(Debug, Serialize, Deserialize)]
struct LockDiagnostic {
    pid: u32,
    acquired_at: DateTime<Utc>,
    reason: String,
}

/// Guard holding the advisory `flock(2)` lock on a database's sidecar
/// `.lock` file. Releases via `LOCK_UN` on `Drop`.
pub struct DatabaseLock {
    file: File,
    lock_path: PathBuf,
}

impl std::fmt::Debug for DatabaseLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseLock")
            .field("lock_path", &self.lock_path)
            .finish()
    }
}

impl Drop for DatabaseLock {
    fn drop(&mut self) {
        let fd = self.file.as_raw_fd();
        // SAFETY: `fd` is owned by `self.file` for the lifetime of this guard.
        unsafe {
            libc::flock(fd, libc::LOCK_UN);
        }
    }
}

impl DatabaseLock {
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }
}

fn lock_path_for(db_path: &Path) -> PathBuf {
    let mut os = db_path.as_os_str().to_owned();
    os.push(".lock");
    PathBuf::from(os)
}

fn try_once(lock_path: &Path, reason: &str) -> std::io::Result<Result<DatabaseLock, LockDiagnostic>> {
    if let Some(parent) = lock_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)?;
    let fd = file.as_raw_fd();

    // SAFETY: `fd` is a valid descriptor from the `File` opened above.
    let ret = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
    if ret == 0 {
        let mut lock = DatabaseLock {
            file,
            lock_path: lock_path.to_path_buf(),
        };
        let diagnostic = LockDiagnostic {
            pid: std::process::id(),
            acquired_at: Utc::now(),
            reason: reason.to_string(),
        };
        let json = serde_json::to_string(&diagnostic).unwrap_or_default();
        lock.file.set_len(0)?;
        lock.file.write_all(json.as_bytes())?;
        lock.file.flush()?;
        Ok(Ok(lock))
    } else {
        let mut contents = String::new();
        let _ = File::open(lock_path).and_then(|mut f| f.read_to_string(&mut contents));
        let diagnostic = serde_json::from_str::<LockDiagnostic>(&contents).unwrap_or(LockDiagnostic {
            pid: 0,
            acquired_at: Utc::now(),
            reason: "unknown (diagnostic unreadable)".to_string(),
        });
        Ok(Err(diagnostic))
    }
}

/// Acquire an exclusive non-blocking lock on `db_path`'s sidecar lock file,
/// polling for up to `max_wait` before failing with `STATE_DATABASE_BUSY`
/// (a second invocation fails ... after a configurable short
/// wait").
pub fn acquire(db_path: &Path, reason: &str, max_wait: Duration) -> Result<DatabaseLock, CphError> {
    let lock_path = lock_path_for(db_path);
    let deadline = Instant::now() + max_wait;
    let poll_interval = Duration::from_millis(20);

    loop {
        let attempt = try_once(&lock_path, reason).map_err(|e| CphError::StateIntegrity(format!(
            "failed to open lock file {}: {e}",
            lock_path.display()
        )))?;
        match attempt {
            Ok(lock) => return Ok(lock),
            Err(diagnostic) => {
                if Instant::now() >= deadline {
                    return Err(CphError::StateDatabaseBusy {
                        locked_by_pid: diagnostic.pid,
                        reason: diagnostic.reason,
                    });
                }
                thread::sleep(poll_interval);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn acquire_succeeds_and_writes_diagnostic() {
        let tmp = tempdir().unwrap();
        let db_path = tmp.path().join("cph_history.db");
        let lock = acquire(&db_path, "test run", Duration::from_millis(50)).unwrap();
        assert!(lock.lock_path().exists());
    }

    #[test]
    fn second_acquire_times_out_busy() {
        let tmp = tempdir().unwrap();
        let db_path = tmp.path().join("cph_history.db");
        let _first = acquire(&db_path, "first run", Duration::from_millis(50)).unwrap();

        let err = acquire(&db_path, "second run", Duration::from_millis(60)).unwrap_err();
        assert_eq!(err.code(), "STATE_DATABASE_BUSY");
    }

    #[test]
    fn second_acquire_reports_first_pid_and_reason() {
        let tmp = tempdir().unwrap();
        let db_path = tmp.path().join("cph_history.db");
        let _first = acquire(&db_path, "indexing run", Duration::from_millis(50)).unwrap();

        let err = acquire(&db_path, "second run", Duration::from_millis(60)).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains(&std::process::id().to_string()));
        assert!(msg.contains("indexing run"));
    }

    #[test]
    fn lock_path_is_sidecar_of_db_path() {
        let tmp = tempdir().unwrap();
        let db_path = tmp.path().join("cph_history.db");
        let lock = acquire(&db_path, "test", Duration::from_millis(50)).unwrap();
        assert_eq!(lock.lock_path(), tmp.path().join("cph_history.db.lock"));
    }
}
