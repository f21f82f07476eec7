// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Snapshot / index file.
//!
//! The snapshot caches what replay produced: project identity, session state,
//! the head cache and the cursor (`applied_seq`, `log_offset`) of the last
//! event folded in. It is only ever replaced atomically.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use lore_kernel::{HeadEntry, KnowledgeState, SessionState};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, StoreError};
use crate::fileio::write_atomic;

pub const INDEX_FILE: &str = "index.yaml";
pub const SNAPSHOT_VERSION: u32 = 2;
pub const SNAPSHOT_FORMAT: &str = "lorefile-v1";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub project: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub state: SessionState,
    /// Legacy flat tombstone list; absence from `heads` is authoritative.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deleted: Vec<String>,
    #[serde(default)]
    pub applied_seq: u64,
    #[serde(default)]
    pub log_offset: u64,
    #[serde(default)]
    pub heads: BTreeMap<String, HeadEntry>,
}

impl Snapshot {
    /// Captures `state` with the cursor set to `log_offset`.
    pub fn capture(project: &str, description: &str, state: &KnowledgeState, log_offset: u64) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            format: SNAPSHOT_FORMAT.to_string(),
            project: project.to_string(),
            description: description.to_string(),
            state: state.session().clone(),
            deleted: state.tombstones().to_vec(),
            applied_seq: state.applied_seq(),
            log_offset,
            heads: state.heads().clone(),
        }
    }

    /// Whether the cursor can seed tail replay for a log of `log_len` bytes
    /// whose first record starts at `header_len`.
    pub fn cursor_usable(&self, header_len: u64, log_len: u64) -> bool {
        self.version == SNAPSHOT_VERSION
            && self.format == SNAPSHOT_FORMAT
            && self.log_offset >= header_len
            && self.log_offset <= log_len
    }

    pub fn to_state(&self) -> KnowledgeState {
        KnowledgeState::from_parts(
            self.heads.clone(),
            self.state.clone(),
            self.deleted.clone(),
            self.applied_seq,
        )
    }

    /// Forget the replay cursor so the next open replays from the start.
    pub fn reset_cursor(&mut self) {
        self.applied_seq = 0;
        self.log_offset = 0;
    }
}

/// Reads and atomically writes the snapshot file.
#[derive(Clone, Debug)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(INDEX_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` if no snapshot exists.
    ///
    /// A missing `format` is read as the current format (files written
    /// before the field existed). Any other format is rejected.
    pub fn load(&self) -> Result<Option<Snapshot>> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        // Bad encoding is a parse failure like any other damage.
        let mut snapshot: Snapshot = serde_yaml::from_slice(&raw)?;
        if snapshot.format.is_empty() {
            snapshot.format = SNAPSHOT_FORMAT.to_string();
        }
        if snapshot.format != SNAPSHOT_FORMAT {
            return Err(StoreError::UnsupportedSnapshotFormat {
                found: snapshot.format,
                expected: SNAPSHOT_FORMAT,
            });
        }
        Ok(Some(snapshot))
    }

    /// Stamps version and format, then replaces the file atomically.
    pub fn save(&self, snapshot: &mut Snapshot) -> Result<()> {
        snapshot.version = SNAPSHOT_VERSION;
        snapshot.format = SNAPSHOT_FORMAT.to_string();
        let yaml = serde_yaml::to_string(snapshot)?;
        write_atomic(&self.path, yaml.as_bytes())?;

        metrics::counter!("lore_snapshot_saves_total", 1);
        tracing::debug!(
            applied_seq = snapshot.applied_seq,
            log_offset = snapshot.log_offset,
            heads = snapshot.heads.len(),
            "snapshot saved"
        );
        Ok(())
    }

    pub fn read_raw(&self) -> Result<String> {
        Ok(fs::read_to_string(&self.path)?)
    }
}
