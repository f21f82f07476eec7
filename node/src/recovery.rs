// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Crash Recovery Checks
//!
//! Recovery itself happens on every open (see `events::event_replay`). This
//! module answers the operator's questions about a store on disk: is there
//! one, and does the snapshot still agree with the log?

use std::path::Path;
use std::time::Instant;

use serde::Serialize;

use crate::engine::{KnowledgeFile, OpenMode};
use crate::errors::Result;
use crate::events::event_log::{EventLog, LOG_FILE};
use crate::events::event_replay::ReplayMode;

/// Check if a knowledge log exists and has a valid header.
pub fn has_event_log(dir: &Path) -> bool {
    EventLog::open(dir.join(LOG_FILE)).is_ok()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    /// How the normal open path rebuilt state.
    pub mode: ReplayMode,
    pub hydrated_digest: String,
    pub replay_digest: String,
    pub consistent: bool,
    pub applied_seq: u64,
    pub live_items: usize,
    pub log_bytes: u64,
}

/// Opens the store twice, once normally and once by forced full replay, and
/// compares the BLAKE3 digests of the two states.
pub fn verify_store(dir: &Path) -> Result<VerifyReport> {
    let start = Instant::now();
    let hydrated = KnowledgeFile::open_with(dir, OpenMode::Auto)?;
    let replayed = KnowledgeFile::open_with(dir, OpenMode::FullReplay)?;

    let hydrated_digest = hex::encode(hydrated.digest());
    let replay_digest = hex::encode(replayed.digest());
    let consistent = hydrated_digest == replay_digest && hydrated.log_offset() == replayed.log_offset();

    let report = VerifyReport {
        mode: hydrated.replay_mode(),
        consistent,
        applied_seq: replayed.applied_seq(),
        live_items: replayed.knowledge_state().live_count(),
        log_bytes: replayed.log_len()?,
        hydrated_digest,
        replay_digest,
    };

    if report.consistent {
        tracing::info!(
            digest = %report.replay_digest,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "snapshot verified against full replay"
        );
    } else {
        tracing::warn!(
            hydrated = %report.hydrated_digest,
            replayed = %report.replay_digest,
            "snapshot disagrees with full replay"
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::SnapshotStore;
    use chrono::Utc;
    use lore_kernel::Entry;
    use tempfile::tempdir;

    fn entry(id: &str) -> Entry {
        Entry {
            id: id.to_string(),
            item_type: "lesson".to_string(),
            topic: None,
            domain: None,
            severity: None,
            oneliner: "verify me".to_string(),
            created: Utc::now(),
            refs: Vec::new(),
            body: String::new(),
        }
    }

    #[test]
    fn test_has_event_log() {
        let dir = tempdir().unwrap();
        assert!(!has_event_log(dir.path()));
        KnowledgeFile::create(dir.path(), "p", "").unwrap();
        assert!(has_event_log(dir.path()));
    }

    #[test]
    fn test_verify_consistent_store() {
        let dir = tempdir().unwrap();
        let mut kf = KnowledgeFile::create(dir.path(), "p", "").unwrap();
        kf.append(entry("L-1")).unwrap();
        kf.append(entry("L-2")).unwrap();
        kf.delete("L-1").unwrap();

        let report = verify_store(dir.path()).unwrap();
        assert!(report.consistent, "{report:?}");
        assert_eq!(report.mode, ReplayMode::Hydrated);
        assert_eq!(report.applied_seq, 3);
        assert_eq!(report.live_items, 1);
    }

    #[test]
    fn test_verify_detects_lying_snapshot() {
        let dir = tempdir().unwrap();
        let mut kf = KnowledgeFile::create(dir.path(), "p", "").unwrap();
        kf.append(entry("L-1")).unwrap();

        let snapshots = SnapshotStore::in_dir(dir.path());
        let mut snap = snapshots.load().unwrap().unwrap();
        snap.heads.get_mut("L-1").unwrap().oneliner = "rewritten".to_string();
        snapshots.save(&mut snap).unwrap();

        let report = verify_store(dir.path()).unwrap();
        assert!(!report.consistent);
        assert_ne!(report.hydrated_digest, report.replay_digest);
    }
}
