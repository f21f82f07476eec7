// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Log compaction.
//!
//! A compacted log holds, after the header, one `state.update` (only when the
//! session state is non-empty) and one `item.create` per live item in ID
//! order. Superseded versions and deletions disappear; current semantics do
//! not change.
//!
//! The new log is written beside the old one and fsynced before it is renamed
//! over it. Any failure before the rename leaves the old log untouched.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use lore_kernel::{Entry, Event, KnowledgeState, SessionState};
use serde::Serialize;

use crate::errors::Result;
use crate::events::event_log::EventLog;
use crate::fileio::{parent_dir, sync_dir};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CompactionReport {
    pub live_items: usize,
    pub bytes_before: u64,
    pub bytes_after: u64,
}

/// Scratch path the compacted log is built at.
pub fn compaction_path(log_path: &Path) -> PathBuf {
    let mut name = log_path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".compact");
    log_path.with_file_name(name)
}

/// Writes and fsyncs a compacted log at `tmp_path`.
///
/// Returns the state a full replay of that file produces. On error the
/// scratch file is removed.
pub fn write_compacted(tmp_path: &Path, session: &SessionState, entries: &[Entry]) -> Result<KnowledgeState> {
    // Left behind by a compaction that crashed before its rename.
    match fs::remove_file(tmp_path) {
        Ok(()) => tracing::warn!(path = %tmp_path.display(), "removed stale compaction file"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let mut log = EventLog::create(tmp_path)?;
    let written = fill(&mut log, session, entries);
    if written.is_err() {
        drop(log);
        let _ = fs::remove_file(tmp_path);
    }
    written
}

fn fill(log: &mut EventLog, session: &SessionState, entries: &[Entry]) -> Result<KnowledgeState> {
    let mut state = KnowledgeState::new();

    let mut events = Vec::with_capacity(entries.len() + 1);
    if !session.is_empty() {
        events.push(Event::state(session.clone()));
    }
    events.extend(entries.iter().cloned().map(Event::create));

    for event in &events {
        let at = log.append_unsynced(event)?;
        state.apply(at.seq, event, at.pointer)?;
    }
    log.sync()?;
    Ok(state)
}

/// Renames the compacted log over `log_path` and makes the rename durable.
pub fn swap_in(tmp_path: &Path, log_path: &Path) -> Result<()> {
    fs::rename(tmp_path, log_path)?;
    sync_dir(&parent_dir(log_path))?;
    Ok(())
}
