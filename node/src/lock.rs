// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Cross-process write lock.
//!
//! The lock is a file created with create-exclusive semantics. Its presence is
//! the mutual-exclusion signal; its YAML body names the owner so waiters can
//! report who holds it and reclaim it once the owner is provably gone.
//!
//! # Staleness
//! A lock file is abandoned when either
//! - its owner ran on this host and its pid is gone from the process table,
//! - its owner ran on another host and the file is older than `stale_after`, or
//! - its metadata is unreadable and the file is older than `stale_after`.
//!
//! A pid that exists but belongs to another user still counts as alive.
//! Waiters reclaim one at a time under a `<lock>.reclaim` guard file.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::LockOptions;

#[derive(Error, Debug)]
pub enum LockError {
    #[error("timed out after {waited:?} waiting for write lock {} (held by {})", .path.display(), describe(.owner))]
    Timeout {
        path: PathBuf,
        owner: Option<LockOwner>,
        waited: Duration,
    },

    #[error("refusing to release lock {}: held by {}", .path.display(), describe(.owner))]
    NotOwner {
        path: PathBuf,
        owner: Option<LockOwner>,
    },

    #[error("lock IO error: {0}")]
    Io(#[from] io::Error),
}

fn describe(owner: &Option<LockOwner>) -> String {
    match owner {
        Some(o) => o.to_string(),
        None => "unknown owner".to_string(),
    }
}

/// Metadata written into the lock file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockOwner {
    pub pid: u32,
    #[serde(default)]
    pub host: String,
    pub token: String,
    pub acquired: DateTime<Utc>,
}

impl LockOwner {
    fn current() -> Self {
        Self {
            pid: std::process::id(),
            host: current_host(),
            token: hex::encode(rand::random::<[u8; 16]>()),
            acquired: Utc::now(),
        }
    }
}

impl fmt::Display for LockOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid={} host={} acquired={}", self.pid, self.host, self.acquired.to_rfc3339())
    }
}

/// A held write lock. Dropping it releases the lock.
#[derive(Debug)]
pub struct ProcessLock {
    path: PathBuf,
    owner: LockOwner,
    released: bool,
}

impl ProcessLock {
    /// Blocks until the lock is held or `opts.timeout` elapses.
    pub fn acquire(path: impl AsRef<Path>, opts: &LockOptions) -> Result<Self, LockError> {
        let path = path.as_ref().to_path_buf();
        let owner = LockOwner::current();
        let start = Instant::now();

        loop {
            match try_create(&path, &owner) {
                Ok(()) => {
                    let waited = start.elapsed();
                    metrics::histogram!("lore_lock_wait_seconds", waited.as_secs_f64());
                    tracing::debug!(path = %path.display(), waited_ms = waited.as_millis() as u64, "write lock acquired");
                    return Ok(Self {
                        path,
                        owner,
                        released: false,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(LockError::Io(e)),
            }

            if reclaim_if_stale(&path, opts.stale_after)? {
                continue;
            }

            let waited = start.elapsed();
            if waited >= opts.timeout {
                return Err(LockError::Timeout {
                    owner: read_owner(&path).ok().flatten(),
                    path,
                    waited,
                });
            }
            thread::sleep(opts.retry_interval.min(opts.timeout.saturating_sub(waited)));
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn owner(&self) -> &LockOwner {
        &self.owner
    }

    /// Removes the lock file if it still carries this handle's token.
    ///
    /// A missing file counts as released. A file with another token was
    /// reclaimed by someone else and is left alone.
    pub fn release(mut self) -> Result<(), LockError> {
        self.released = true;
        release_path(&self.path, &self.owner.token)
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = release_path(&self.path, &self.owner.token) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release write lock");
        }
    }
}

fn release_path(path: &Path, token: &str) -> Result<(), LockError> {
    match read_owner(path) {
        Ok(None) => return Ok(()),
        Ok(Some(owner)) if owner.token == token => {}
        Ok(Some(owner)) => {
            return Err(LockError::NotOwner {
                path: path.to_path_buf(),
                owner: Some(owner),
            })
        }
        Err(_) => {
            return Err(LockError::NotOwner {
                path: path.to_path_buf(),
                owner: None,
            })
        }
    }

    match fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "write lock released");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(LockError::Io(e)),
    }
}

fn try_create(path: &Path, owner: &LockOwner) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;

    let body = serde_yaml::to_string(owner).map_err(|e| io::Error::new(io::ErrorKind::Other, e));
    let written = body.and_then(|b| {
        file.write_all(b.as_bytes())?;
        file.sync_all()
    });
    if let Err(e) = written {
        drop(file);
        let _ = fs::remove_file(path);
        return Err(e);
    }
    Ok(())
}

/// Reads the current owner.
///
/// `Ok(None)` when no lock file exists; `Err` when it exists but its
/// metadata cannot be parsed.
pub fn read_owner(path: &Path) -> io::Result<Option<LockOwner>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    serde_yaml::from_str(&raw)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// What a waiter found at the lock path.
enum Holder {
    Gone,
    Live,
    /// Abandoned; the owner is `None` when the metadata was unreadable.
    Stale(Option<LockOwner>),
}

fn inspect(path: &Path, stale_after: Duration) -> Result<Holder, LockError> {
    let meta = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Holder::Gone),
        Err(e) => return Err(LockError::Io(e)),
    };
    let old = || {
        meta.modified()
            .ok()
            .and_then(|m| SystemTime::now().duration_since(m).ok())
            .map_or(false, |age| age > stale_after)
    };

    match read_owner(path) {
        Ok(None) => Ok(Holder::Gone),
        Ok(Some(owner)) => {
            let stale = if owner.host.is_empty() || owner.host == current_host() {
                !process_alive(owner.pid)
            } else {
                // Another host's process table cannot be probed from here.
                old()
            };
            Ok(if stale { Holder::Stale(Some(owner)) } else { Holder::Live })
        }
        Err(_) if old() => Ok(Holder::Stale(None)),
        Err(_) => Ok(Holder::Live),
    }
}

// Returns true when the lock path is free and acquisition should retry.
//
// Removal happens under the reclaim guard and only after the holder is
// re-inspected there, so a lock another waiter just took is never removed.
fn reclaim_if_stale(path: &Path, stale_after: Duration) -> Result<bool, LockError> {
    match inspect(path, stale_after)? {
        Holder::Gone => return Ok(true),
        Holder::Live => return Ok(false),
        Holder::Stale(_) => {}
    }

    let Some(guard) = ReclaimGuard::take(path)? else {
        return Ok(false);
    };
    let previous = match inspect(path, stale_after)? {
        Holder::Gone => return Ok(true),
        Holder::Live => return Ok(false),
        Holder::Stale(owner) => owner,
    };

    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(LockError::Io(e)),
    }
    drop(guard);

    metrics::counter!("lore_stale_locks_reclaimed_total", 1);
    match previous {
        Some(owner) => tracing::warn!(
            path = %path.display(),
            pid = owner.pid,
            host = %owner.host,
            "reclaimed abandoned write lock"
        ),
        None => tracing::warn!(path = %path.display(), "reclaimed write lock with unreadable metadata"),
    }
    Ok(true)
}

/// Serializes reclamation of one lock path: `write.lock` -> `write.lock.reclaim`.
struct ReclaimGuard {
    path: PathBuf,
}

impl ReclaimGuard {
    // A reclaimer that died mid-reclaim leaves its guard behind.
    const ABANDONED_AFTER: Duration = Duration::from_secs(10);

    /// `None` while another waiter is reclaiming.
    fn take(lock_path: &Path) -> Result<Option<Self>, LockError> {
        let mut name = lock_path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".reclaim");
        let path = lock_path.with_file_name(name);

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Some(Self { path })),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let abandoned = fs::metadata(&path)
                    .and_then(|m| m.modified())
                    .ok()
                    .and_then(|m| SystemTime::now().duration_since(m).ok())
                    .map_or(false, |age| age > Self::ABANDONED_AFTER);
                if abandoned {
                    let _ = fs::remove_file(&path);
                }
                Ok(None)
            }
            Err(e) => Err(LockError::Io(e)),
        }
    }
}

impl Drop for ReclaimGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn current_host() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Whether `pid` names a live process on this host.
#[cfg(unix)]
pub fn process_alive(pid: u32) -> bool {
    if pid == 0 || pid > i32::MAX as u32 {
        return false;
    }
    // SAFETY: signal 0 performs permission and existence checks only.
    let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
    if rc == 0 {
        return true;
    }
    io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
pub fn process_alive(pid: u32) -> bool {
    pid != 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn quick() -> LockOptions {
        LockOptions {
            timeout: Duration::from_millis(150),
            retry_interval: Duration::from_millis(10),
            stale_after: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_acquire_writes_owner_metadata() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("write.lock");

        let lock = ProcessLock::acquire(&path, &quick()).unwrap();
        let owner = read_owner(&path).unwrap().unwrap();
        assert_eq!(owner.pid, std::process::id());
        assert_eq!(owner.token.len(), 32);
        assert_eq!(&owner, lock.owner());

        lock.release().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_second_acquire_times_out_with_owner() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("write.lock");
        let held = ProcessLock::acquire(&path, &quick()).unwrap();

        let err = ProcessLock::acquire(&path, &quick()).unwrap_err();
        match err {
            LockError::Timeout { owner, waited, .. } => {
                assert_eq!(owner.unwrap().token, held.owner().token);
                assert!(waited >= Duration::from_millis(150));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        drop(held);
        assert!(!path.exists());
    }

    #[test]
    fn test_release_refuses_foreign_token() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("write.lock");
        let lock = ProcessLock::acquire(&path, &quick()).unwrap();

        let mut foreign = lock.owner().clone();
        foreign.token = "ffff".to_string();
        fs::write(&path, serde_yaml::to_string(&foreign).unwrap()).unwrap();

        assert!(matches!(lock.release(), Err(LockError::NotOwner { .. })));
        assert!(path.exists());
    }

    #[test]
    fn test_release_of_missing_file_is_ok() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("write.lock");
        let lock = ProcessLock::acquire(&path, &quick()).unwrap();
        fs::remove_file(&path).unwrap();
        lock.release().unwrap();
    }

    #[test]
    fn test_unreadable_fresh_lock_is_respected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("write.lock");
        fs::write(&path, "{{{ not yaml").unwrap();

        let err = ProcessLock::acquire(&path, &quick()).unwrap_err();
        assert!(matches!(err, LockError::Timeout { owner: None, .. }));
    }

    #[test]
    fn test_unreadable_old_lock_is_reclaimed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("write.lock");
        fs::write(&path, "").unwrap();

        let opts = LockOptions {
            stale_after: Duration::ZERO,
            ..quick()
        };
        thread::sleep(Duration::from_millis(5));
        let lock = ProcessLock::acquire(&path, &opts).unwrap();
        assert_eq!(read_owner(&path).unwrap().unwrap().token, lock.owner().token);
    }

    #[cfg(unix)]
    #[test]
    fn test_reclaim_waits_for_busy_guard() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("write.lock");
        let dead = LockOwner {
            pid: u32::MAX,
            host: current_host(),
            token: "dead".to_string(),
            acquired: Utc::now(),
        };
        fs::write(&path, serde_yaml::to_string(&dead).unwrap()).unwrap();
        let guard = dir.path().join("write.lock.reclaim");
        fs::write(&guard, "").unwrap();

        let err = ProcessLock::acquire(&path, &quick()).unwrap_err();
        assert!(matches!(err, LockError::Timeout { .. }));
        assert_eq!(read_owner(&path).unwrap().unwrap().token, "dead");

        fs::remove_file(&guard).unwrap();
        let lock = ProcessLock::acquire(&path, &quick()).unwrap();
        assert_eq!(read_owner(&path).unwrap().unwrap().token, lock.owner().token);
        assert!(!guard.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_own_pid_is_alive() {
        assert!(process_alive(std::process::id()));
        assert!(!process_alive(0));
    }
}
