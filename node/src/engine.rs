// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Single-process handle over one store directory.
//!
//! `KnowledgeFile` ties the knowledge log, the snapshot file and the in-memory
//! `KnowledgeState` together. It takes no lock: cross-process callers go
//! through [`crate::store::Store`], which reopens a fresh handle under the
//! write lock for every mutation.

use std::collections::btree_map;
use std::io;
use std::path::{Path, PathBuf};

use lore_kernel::{state_digest, Entry, Event, HeadEntry, KnowledgeState, SessionState};

use crate::errors::{Result, StoreError};
use crate::events::event_compact::{compaction_path, swap_in, write_compacted, CompactionReport};
use crate::events::event_log::{Appended, EventLog, LOG_FILE};
use crate::events::event_replay::{full_replay, recover, ReplayMode};
use crate::persistence::{Snapshot, SnapshotStore};

/// How [`KnowledgeFile::open_with`] rebuilds state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OpenMode {
    /// Hydrate from the snapshot when its cursor fits, else full replay.
    #[default]
    Auto,
    /// Ignore the snapshot entirely.
    FullReplay,
}

#[derive(Debug)]
pub struct KnowledgeFile {
    dir: PathBuf,
    log: EventLog,
    snapshots: SnapshotStore,
    project: String,
    description: String,
    state: KnowledgeState,
    log_offset: u64,
    replay_mode: ReplayMode,
}

impl KnowledgeFile {
    /// Creates the log and initial snapshot in an existing directory.
    pub fn create(dir: impl AsRef<Path>, project: &str, description: &str) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let log = EventLog::create(dir.join(LOG_FILE)).map_err(|e| match e {
            StoreError::Io(io) if io.kind() == io::ErrorKind::AlreadyExists => {
                StoreError::AlreadyInitialized(dir.clone())
            }
            other => other,
        })?;

        let mut kf = Self {
            snapshots: SnapshotStore::in_dir(&dir),
            log_offset: log.header_len(),
            log,
            project: project.to_string(),
            description: description.to_string(),
            state: KnowledgeState::new(),
            replay_mode: ReplayMode::Full,
            dir,
        };
        kf.save_snapshot()?;

        tracing::info!(dir = %kf.dir.display(), project, "knowledge store created");
        Ok(kf)
    }

    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(dir, OpenMode::Auto)
    }

    pub fn open_with(dir: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let mut log = EventLog::open(dir.join(LOG_FILE)).map_err(|e| match e {
            StoreError::Io(io) if io.kind() == io::ErrorKind::NotFound => StoreError::NotInitialized(dir.clone()),
            other => other,
        })?;

        let snapshots = SnapshotStore::in_dir(&dir);
        let snapshot = match snapshots.load() {
            Ok(snapshot) => snapshot,
            Err(StoreError::Serialization(reason)) => {
                tracing::warn!(
                    path = %snapshots.path().display(),
                    %reason,
                    "unreadable snapshot ignored; project name and description are lost and the next write saves them empty"
                );
                None
            }
            Err(e) => return Err(e),
        };

        let replayed = match mode {
            OpenMode::Auto => recover(&log, snapshot.as_ref())?,
            OpenMode::FullReplay => full_replay(&log)?,
        };
        log.set_last_seq(replayed.state.applied_seq());

        let (project, description) = snapshot
            .map(|s| (s.project, s.description))
            .unwrap_or_default();

        tracing::debug!(
            dir = %dir.display(),
            mode = replayed.mode.as_str(),
            live = replayed.state.live_count(),
            applied_seq = replayed.state.applied_seq(),
            "knowledge store opened"
        );
        Ok(Self {
            dir,
            log,
            snapshots,
            project,
            description,
            state: replayed.state,
            log_offset: replayed.log_offset,
            replay_mode: replayed.mode,
        })
    }

    // --- Read APIs ---

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn log_path(&self) -> &Path {
        self.log.path()
    }

    pub fn snapshot_path(&self) -> &Path {
        self.snapshots.path()
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn knowledge_state(&self) -> &KnowledgeState {
        &self.state
    }

    pub fn session(&self) -> &SessionState {
        self.state.session()
    }

    pub fn applied_seq(&self) -> u64 {
        self.state.applied_seq()
    }

    pub fn log_offset(&self) -> u64 {
        self.log_offset
    }

    pub fn log_len(&self) -> Result<u64> {
        self.log.len()
    }

    pub fn replay_mode(&self) -> ReplayMode {
        self.replay_mode
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.is_live(id)
    }

    pub fn head(&self, id: &str) -> Option<&HeadEntry> {
        self.state.head(id)
    }

    /// Live heads in ID order.
    pub fn entries(&self) -> btree_map::Iter<'_, String, HeadEntry> {
        self.state.heads().iter()
    }

    /// BLAKE3 digest of the in-memory state.
    pub fn digest(&self) -> [u8; 32] {
        state_digest(&self.state)
    }

    /// Full latest version of a live item, read back from the log.
    pub fn get(&self, id: &str) -> Result<Entry> {
        let head = self
            .state
            .head(id)
            .ok_or_else(|| StoreError::ItemNotFound(id.to_string()))?;
        let entry = self.log.read_entry(head.pointer())?;
        if entry.id != id {
            return Err(StoreError::corrupt(
                head.body_offset,
                format!("head for {id} points at item {}", entry.id),
            ));
        }
        Ok(entry)
    }

    // --- Write Logic ---

    /// Appends a new version of `entry`: `item.update` if the ID is live,
    /// `item.create` otherwise.
    pub fn append(&mut self, entry: Entry) -> Result<Appended> {
        if entry.item_type.trim().is_empty() {
            return Err(StoreError::InvalidItem(format!("item {} has no type", entry.id)));
        }
        let event = if self.state.is_live(&entry.id) {
            Event::update(entry)
        } else {
            Event::create(entry)
        };
        self.commit(event)
    }

    pub fn delete(&mut self, id: &str) -> Result<Appended> {
        if !self.state.is_live(id) {
            return Err(StoreError::ItemNotFound(id.to_string()));
        }
        self.commit(Event::delete(id))
    }

    /// Replaces the session state wholesale.
    pub fn update_state(&mut self, session: SessionState) -> Result<Appended> {
        self.commit(Event::state(session))
    }

    // Append, fold in, persist the snapshot.
    fn commit(&mut self, event: Event) -> Result<Appended> {
        event.validate()?;
        let appended = self.log.append(&event)?;
        self.state.apply(appended.seq, &event, appended.pointer)?;
        self.log_offset = appended.end;
        self.save_snapshot()?;
        Ok(appended)
    }

    /// Rewrites the log down to the live set.
    pub fn compact(&mut self) -> Result<CompactionReport> {
        let bytes_before = self.log.len()?;
        let entries = self
            .state
            .live_ids()
            .iter()
            .map(|id| self.get(id))
            .collect::<Result<Vec<_>>>()?;
        let session = self.state.session().clone();

        let log_path = self.log.path().to_path_buf();
        let tmp_path = compaction_path(&log_path);
        let compacted = write_compacted(&tmp_path, &session, &entries)?;

        // A crash from here on must not hydrate old offsets against the new file.
        let mut pending = self.capture();
        pending.reset_cursor();
        if let Err(e) = self.snapshots.save(&mut pending).and_then(|()| swap_in(&tmp_path, &log_path)) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e);
        }

        let mut log = EventLog::open(&log_path)?;
        log.set_last_seq(compacted.applied_seq());
        self.log_offset = log.len()?;
        self.log = log;
        self.state = compacted;
        self.state.clear_tombstones();
        self.save_snapshot()?;

        let report = CompactionReport {
            live_items: entries.len(),
            bytes_before,
            bytes_after: self.log_offset,
        };
        metrics::counter!("lore_compactions_total", 1);
        tracing::info!(
            live = report.live_items,
            bytes_before = report.bytes_before,
            bytes_after = report.bytes_after,
            "knowledge log compacted"
        );
        Ok(report)
    }

    fn capture(&self) -> Snapshot {
        Snapshot::capture(&self.project, &self.description, &self.state, self.log_offset)
    }

    /// Persists the current state and cursor.
    pub fn save_snapshot(&mut self) -> Result<()> {
        if self.log_offset == 0 {
            self.log_offset = self.log.len()?;
        }
        let mut snapshot = self.capture();
        self.snapshots.save(&mut snapshot)
    }

    /// Raw log contents.
    pub fn dump_log(&self) -> Result<String> {
        Ok(String::from_utf8_lossy(&std::fs::read(self.log.path())?).into_owned())
    }

    /// Raw snapshot contents.
    pub fn dump_index(&self) -> Result<String> {
        self.snapshots.read_raw()
    }

    pub fn close(self) -> Result<()> {
        self.log.sync()
    }
}
