//! Per-directory lock registry (spec.md §4.6), modeled on the teacher's
//! `WorkspaceRegistry` JSON atomic-write pattern (`workspace/registry.rs`)
//! plus the liveness-check idiom common across the pack.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

const LOCK_FILE: &str = ".file_watcher.lock";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LockRecord {
    pub pid: u32,
    pub timestamp: f64,
    pub worker_name: String,
    pub hostname: String,
}

/// A held lock; releases on drop unless [`Lock::forget`] is called, mirroring
/// the teacher's RAII cleanup style for `EditingTransaction`.
pub struct Lock {
    path: PathBuf,
    released: bool,
}

impl Lock {
    pub fn release(mut self) -> Result<()> {
        self.release_inner()?;
        self.released = true;
        Ok(())
    }

    fn release_inner(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.release_inner() {
                warn!("failed to release lock {}: {e}", self.path.display());
            }
        }
    }
}

fn current_hostname() -> String {
    hostname_from_env().unwrap_or_else(|| "unknown-host".to_string())
}

fn hostname_from_env() -> Option<String> {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::env::var("COMPUTERNAME").ok())
}

/// `true` if `pid` identifies a running process on this host. Uses
/// `/proc/<pid>` on Linux, which is sufficient for the watcher's own host —
/// spec.md explicitly forbids liveness checks on remote hosts.
#[cfg(target_os = "linux")]
fn is_process_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

#[cfg(not(target_os = "linux"))]
fn is_process_alive(pid: u32) -> bool {
    // Best effort on non-Linux: signal 0 probes existence without side effects.
    unsafe { libc_kill0(pid) }
}

#[cfg(not(target_os = "linux"))]
fn libc_kill0(_pid: u32) -> bool {
    // No libc dependency carried by this crate; treat as alive so a
    // non-Linux host never wrongly steals another process's lock.
    true
}

/// Try to acquire the lock for `dir`. Returns `Ok(None)` if a live owner
/// already holds it (caller should skip this cycle, not error).
pub fn acquire(dir: &Path, worker_name: &str) -> Result<Option<Lock>> {
    let lock_path = dir.join(LOCK_FILE);

    if let Some(existing) = read_lock(&lock_path)? {
        if existing.hostname != current_hostname() {
            debug!(
                "lock at {} held by foreign host {}, treating as held",
                lock_path.display(),
                existing.hostname
            );
            return Ok(None);
        }
        if is_process_alive(existing.pid) {
            return Ok(None);
        }
        warn!(
            "removing stale lock at {} (owner pid {} is dead)",
            lock_path.display(),
            existing.pid
        );
        let _ = std::fs::remove_file(&lock_path);
    }

    let record = LockRecord {
        pid: std::process::id(),
        timestamp: crate::util::unix_time(),
        worker_name: worker_name.to_string(),
        hostname: current_hostname(),
    };

    match write_lock_atomically(&lock_path, &record) {
        Ok(()) => Ok(Some(Lock {
            path: lock_path,
            released: false,
        })),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn read_lock(path: &Path) -> Result<Option<LockRecord>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(path)?;
    match serde_json::from_str(&text) {
        Ok(record) => Ok(Some(record)),
        Err(e) => {
            bail!("malformed lock file at {}: {e}", path.display())
        }
    }
}

fn write_lock_atomically(path: &Path, record: &LockRecord) -> std::io::Result<()> {
    let tmp = path.with_extension(format!("tmp.{}", Uuid::new_v4()));
    std::fs::write(&tmp, serde_json::to_string(record)?)?;
    // Fail instead of silently overwriting if another acquirer won the race
    // between our existence check and this write.
    if path.exists() {
        let _ = std::fs::remove_file(&tmp);
        return Err(std::io::Error::new(std::io::ErrorKind::AlreadyExists, "lock exists"));
    }
    std::fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_then_release_allows_reacquire() {
        let dir = tempfile::tempdir().unwrap();
        let lock = acquire(dir.path(), "watcher").unwrap().unwrap();
        lock.release().unwrap();
        assert!(acquire(dir.path(), "watcher").unwrap().is_some());
    }

    #[test]
    fn second_acquire_while_held_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let _lock = acquire(dir.path(), "watcher").unwrap().unwrap();
        assert!(acquire(dir.path(), "watcher").unwrap().is_none());
    }

    #[test]
    fn stale_pid_on_same_host_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let stale = LockRecord {
            pid: 1,
            timestamp: 0.0,
            worker_name: "watcher".into(),
            hostname: current_hostname(),
        };
        std::fs::write(
            dir.path().join(LOCK_FILE),
            serde_json::to_string(&stale).unwrap(),
        )
        .unwrap();

        assert!(acquire(dir.path(), "watcher").unwrap().is_some());
    }

    #[test]
    fn foreign_hostname_is_held_even_with_reused_pid() {
        let dir = tempfile::tempdir().unwrap();
        let foreign = LockRecord {
            pid: std::process::id(),
            timestamp: 0.0,
            worker_name: "watcher".into(),
            hostname: "some-other-host".into(),
        };
        std::fs::write(
            dir.path().join(LOCK_FILE),
            serde_json::to_string(&foreign).unwrap(),
        )
        .unwrap();

        assert!(acquire(dir.path(), "watcher").unwrap().is_none());
    }

    #[test]
    fn missing_file_on_release_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let lock = acquire(dir.path(), "watcher").unwrap().unwrap();
        std::fs::remove_file(dir.path().join(LOCK_FILE)).unwrap();
        lock.release().unwrap();
    }
}
