//! Single-instance guard using `flock(2)` directly.
//!
//! The guard owns the open `File` carrying the lock. `Drop` calls
//! `flock(fd, LOCK_UN)`; if the supervisor crashes instead, the kernel
//! releases the lock when the fd is closed.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rotor_core::RotorError;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

/// Diagnostic information written to the lock file by the holder.
#[derive(Debug, Serialize, Deserialize)]
struct LockDiagnostic {
    pid: u32,
    acquired_at: DateTime<Utc>,
    reason: String,
}

/// Exclusive supervisor lock backed by `flock(2)`.
pub struct SingletonGuard {
    file: File,
    lock_path: PathBuf,
}

impl std::fmt::Debug for SingletonGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingletonGuard")
            .field("lock_path", &self.lock_path)
            .finish()
    }
}

impl Drop for SingletonGuard {
    fn drop(&mut self) {
        let fd = self.file.as_raw_fd();
        // SAFETY: `fd` is a valid file descriptor owned by `self.file`.
        // If `LOCK_UN` fails the lock is still released when the fd closes.
        unsafe {
            libc::flock(fd, libc::LOCK_UN);
        }
    }
}

impl SingletonGuard {
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Release the lock now instead of at scope end.
    pub fn release(self) {
        drop(self);
    }
}

/// Acquire the supervisor lock without waiting.
///
/// On success the lock file holds a JSON diagnostic (pid, acquired_at,
/// reason). When another process holds the lock this returns
/// [`RotorError::AlreadyRunning`] carrying whatever diagnostic the holder
/// left behind.
pub fn acquire_singleton(lock_path: &Path, reason: &str) -> Result<SingletonGuard> {
    if let Some(parent) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create lock directory: {}", parent.display()))?;
    }

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)
        .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;

    let fd = file.as_raw_fd();

    // SAFETY: `fd` is a valid file descriptor from the `File` we just opened.
    // `LOCK_EX | LOCK_NB` requests an exclusive non-blocking lock.
    let ret = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };

    if ret != 0 {
        let holder = read_holder(lock_path);
        return Err(RotorError::AlreadyRunning { holder }.into());
    }

    let mut guard = SingletonGuard {
        file,
        lock_path: lock_path.to_path_buf(),
    };

    let diagnostic = LockDiagnostic {
        pid: std::process::id(),
        acquired_at: Utc::now(),
        reason: reason.to_string(),
    };
    let json = serde_json::to_string(&diagnostic).context("Failed to serialize lock diagnostic")?;

    guard
        .file
        .set_len(0)
        .context("Failed to truncate lock file")?;
    guard.file.seek(SeekFrom::Start(0))?;
    guard
        .file
        .write_all(json.as_bytes())
        .context("Failed to write lock diagnostic")?;
    guard.file.flush().context("Failed to flush lock file")?;

    Ok(guard)
}

fn read_holder(lock_path: &Path) -> String {
    let mut contents = String::new();
    let read = File::open(lock_path).and_then(|mut f| f.read_to_string(&mut contents));
    match read
        .ok()
        .and_then(|_| serde_json::from_str::<LockDiagnostic>(&contents).ok())
    {
        Some(diag) => format!(
            "PID {}, reason: {}, acquired: {}",
            diag.pid, diag.reason, diag.acquired_at
        ),
        None => "holder unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_acquire_singleton_succeeds() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let lock_path = temp_dir.path().join("rotor.lock");

        let guard = acquire_singleton(&lock_path, "test").expect("Lock should succeed");
        assert_eq!(guard.lock_path(), lock_path);
        assert!(lock_path.exists());
    }

    #[test]
    fn test_lock_diagnostic_written() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let lock_path = temp_dir.path().join("rotor.lock");

        let _guard = acquire_singleton(&lock_path, "supervise transfer").unwrap();

        let contents = fs::read_to_string(&lock_path).unwrap();
        let diagnostic: LockDiagnostic = serde_json::from_str(&contents).unwrap();
        assert_eq!(diagnostic.pid, std::process::id());
        assert_eq!(diagnostic.reason, "supervise transfer");
    }

    #[test]
    fn test_second_acquire_fails_immediately() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let lock_path = temp_dir.path().join("rotor.lock");

        let _first = acquire_singleton(&lock_path, "first instance").unwrap();

        // flock locks belong to the open file description, so a second
        // open() in the same process still conflicts.
        let err = acquire_singleton(&lock_path, "second instance").unwrap_err();
        match err.downcast_ref::<RotorError>() {
            Some(RotorError::AlreadyRunning { holder }) => {
                assert!(holder.contains(&std::process::id().to_string()));
                assert!(holder.contains("first instance"));
            }
            other => panic!("expected AlreadyRunning, got {other:?}"),
        }
    }

    #[test]
    fn test_lock_released_on_drop() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let lock_path = temp_dir.path().join("rotor.lock");

        {
            let _guard = acquire_singleton(&lock_path, "scoped").unwrap();
        }

        let again = acquire_singleton(&lock_path, "after drop");
        assert!(again.is_ok(), "lock should be free once the guard is gone");
    }

    #[test]
    fn test_explicit_release() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let lock_path = temp_dir.path().join("rotor.lock");

        let guard = acquire_singleton(&lock_path, "explicit").unwrap();
        guard.release();
        assert!(acquire_singleton(&lock_path, "next").is_ok());
    }

    #[test]
    fn test_parent_directories_created() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let lock_path = temp_dir.path().join("deep").join("nested").join("rotor.lock");

        assert!(acquire_singleton(&lock_path, "nested").is_ok());
    }

    #[test]
    fn test_unreadable_holder_diagnostic() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let lock_path = temp_dir.path().join("rotor.lock");

        let _first = acquire_singleton(&lock_path, "first").unwrap();
        fs::write(&lock_path, "garbage").unwrap();

        let err = acquire_singleton(&lock_path, "second").unwrap_err();
        assert!(err.to_string().contains("holder unknown"));
    }

    #[test]
    fn test_invalid_lock_location() {
        // /dev/null is a file, so nothing can be created beneath it.
        let result = acquire_singleton(Path::new("/dev/null/rotor.lock"), "reason");
        assert!(result.is_err());
    }

    #[test]
    fn test_guard_debug_format() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let guard = acquire_singleton(&temp_dir.path().join("rotor.lock"), "debug").unwrap();

        let debug = format!("{:?}", guard);
        assert!(debug.contains("SingletonGuard"));
        assert!(debug.contains("lock_path"));
    }
}
