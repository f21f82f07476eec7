// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::path::PathBuf;
use std::time::Duration;

/// Default store directory, relative to the working directory.
pub const DEFAULT_ROOT: &str = ".lore";

/// Write-lock acquisition policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockOptions {
    pub timeout: Duration,
    pub retry_interval: Duration,
    /// Age after which a lock file with unreadable metadata is abandoned.
    pub stale_after: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retry_interval: Duration::from_millis(25),
            stale_after: Duration::from_secs(30 * 60),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    pub root: PathBuf,
    pub lock: LockOptions,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
            lock: LockOptions::default(),
        }
    }
}

impl StoreConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Defaults overridden by `LORE_DIR`, `LORE_LOCK_TIMEOUT_MS`,
    /// `LORE_LOCK_RETRY_MS` and `LORE_LOCK_STALE_SECS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        if let Some(dir) = lookup("LORE_DIR").filter(|d| !d.is_empty()) {
            cfg.root = PathBuf::from(dir);
        }
        if let Some(ms) = parse_u64(&lookup, "LORE_LOCK_TIMEOUT_MS") {
            cfg.lock.timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_u64(&lookup, "LORE_LOCK_RETRY_MS") {
            cfg.lock.retry_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_u64(&lookup, "LORE_LOCK_STALE_SECS") {
            cfg.lock.stale_after = Duration::from_secs(secs);
        }
        cfg
    }

    pub fn with_lock(mut self, lock: LockOptions) -> Self {
        self.lock = lock;
        self
    }
}

fn parse_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u64> {
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable setting");
            None
        }
    }
}
