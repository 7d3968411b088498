//! Exclusive merge lock.
//!
//! At most one merge commit may run at a time for a given spec name. The
//! lock is a file created exclusively under `.reweave/.locks/`, holding the
//! owner's PID. Acquisition polls with a bounded wait; a lock whose
//! recorded PID is no longer alive (or unparseable) is reclaimed as stale.
//! The lock is released on drop, including error paths.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("could not acquire merge lock for {spec} after {waited_secs}s")]
    Timeout { spec: String, waited_secs: u64 },
    #[error("lock io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Exclusive, PID-validated lock serializing merge commits per spec name.
pub struct MergeLock {
    lock_file: PathBuf,
    acquired: bool,
}

impl MergeLock {
    /// Acquire the lock for `spec_name`, waiting up to `max_wait`.
    pub fn acquire(
        project_dir: &Path,
        spec_name: &str,
        max_wait: Duration,
        poll: Duration,
    ) -> Result<Self, LockError> {
        let lock_dir = project_dir.join(".reweave").join(".locks");
        fs::create_dir_all(&lock_dir)?;
        let lock_file = lock_dir.join(format!("merge-{spec_name}.lock"));

        let start = Instant::now();
        loop {
            match fs::File::create_new(&lock_file) {
                Ok(mut file) => {
                    write!(file, "{}", std::process::id())?;
                    tracing::debug!(lock = %lock_file.display(), "merge lock acquired");
                    return Ok(Self {
                        lock_file,
                        acquired: true,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if Self::reclaim_if_stale(&lock_file)? {
                        continue;
                    }
                    if start.elapsed() >= max_wait {
                        return Err(LockError::Timeout {
                            spec: spec_name.to_string(),
                            waited_secs: max_wait.as_secs(),
                        });
                    }
                    std::thread::sleep(poll);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Remove the lock file when its recorded PID is dead or unparseable.
    /// Returns true when the caller should retry immediately.
    fn reclaim_if_stale(lock_file: &Path) -> Result<bool, LockError> {
        let contents = match fs::read_to_string(lock_file) {
            Ok(contents) => contents,
            // Lost a race with the releasing owner; retry.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(e.into()),
        };

        let stale = match contents.trim().parse::<u32>() {
            Ok(pid) => !process_alive(pid),
            Err(_) => true,
        };
        if stale {
            tracing::warn!(lock = %lock_file.display(), "reclaiming stale merge lock");
            match fs::remove_file(lock_file) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            return Ok(true);
        }
        Ok(false)
    }
}

impl Drop for MergeLock {
    fn drop(&mut self) {
        if self.acquired {
            if let Err(e) = fs::remove_file(&self.lock_file) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(
                        lock = %self.lock_file.display(),
                        error = %e,
                        "failed to release merge lock"
                    );
                }
            }
        }
    }
}

/// Best-effort liveness probe for a PID.
#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(true)
}

/// On non-unix platforms a held lock is trusted until the wait expires.
#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_millis(200);
    const POLL: Duration = Duration::from_millis(20);

    #[test]
    fn test_acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir
            .path()
            .join(".reweave")
            .join(".locks")
            .join("merge-spec.lock");
        {
            let _lock = MergeLock::acquire(dir.path(), "spec", WAIT, POLL).unwrap();
            assert!(lock_path.exists());
        }
        assert!(!lock_path.exists());
    }

    #[test]
    fn test_second_acquire_times_out_while_held() {
        let dir = tempfile::tempdir().unwrap();
        let _held = MergeLock::acquire(dir.path(), "spec", WAIT, POLL).unwrap();
        let second = MergeLock::acquire(dir.path(), "spec", WAIT, POLL);
        assert!(matches!(second, Err(LockError::Timeout { .. })));
    }

    #[test]
    fn test_stale_lock_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let lock_dir = dir.path().join(".reweave").join(".locks");
        fs::create_dir_all(&lock_dir).unwrap();
        // A PID that cannot exist, so the lock reads as stale.
        fs::write(lock_dir.join("merge-spec.lock"), "999999999").unwrap();

        let lock = MergeLock::acquire(dir.path(), "spec", WAIT, POLL);
        assert!(lock.is_ok());
    }

    #[test]
    fn test_garbage_pid_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let lock_dir = dir.path().join(".reweave").join(".locks");
        fs::create_dir_all(&lock_dir).unwrap();
        fs::write(lock_dir.join("merge-spec.lock"), "not-a-pid").unwrap();

        let lock = MergeLock::acquire(dir.path(), "spec", WAIT, POLL);
        assert!(lock.is_ok());
    }

    #[test]
    fn test_distinct_specs_do_not_contend() {
        let dir = tempfile::tempdir().unwrap();
        let _a = MergeLock::acquire(dir.path(), "spec-a", WAIT, POLL).unwrap();
        let b = MergeLock::acquire(dir.path(), "spec-b", WAIT, POLL);
        assert!(b.is_ok());
    }
}
