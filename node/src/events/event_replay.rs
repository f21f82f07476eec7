// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Event Replay - Authoritative Recovery
//!
//! **The log always wins. The snapshot is just a cache.**
//!
//! # Recovery Protocol
//! 1. If the snapshot cursor is usable, hydrate heads and session from it and
//!    replay only the records after `log_offset`
//! 2. Otherwise, or if tail replay fails, discard everything and replay the
//!    whole log from just after the header
//! 3. A record that cannot be framed, checksummed, decoded or applied stops
//!    replay with `CorruptLog`; it is never skipped
//!
//! # Guarantees
//! - Snapshot deleted or stale => full replay still recovers
//! - Truncated tail => recovery refuses
//! - Hydrated state == fully replayed state (see `recovery::verify_store`)

use std::time::Instant;

use lore_kernel::KnowledgeState;
use serde::Serialize;

use crate::errors::{Result, StoreError};
use crate::events::event_log::{decode_payload, EventLog, RecordScanner};
use crate::persistence::Snapshot;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayMode {
    /// Snapshot heads plus tail replay.
    Hydrated,
    /// Every record from the start of the log.
    Full,
}

impl ReplayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplayMode::Hydrated => "hydrated",
            ReplayMode::Full => "full",
        }
    }
}

/// Outcome of recovery.
#[derive(Debug)]
pub struct Replayed {
    pub state: KnowledgeState,
    /// Byte offset just past the last record consumed.
    pub log_offset: u64,
    pub mode: ReplayMode,
    /// Records applied by this replay (tail only when hydrated).
    pub events_applied: u64,
}

/// Applies every record from `from` to the end of the log onto `state`.
///
/// Records are numbered from `state.applied_seq() + 1`. Returns the offset
/// reached and the number of records applied.
pub fn replay_from(log: &EventLog, state: &mut KnowledgeState, from: u64) -> Result<(u64, u64)> {
    let buf = log.read_from(from)?;
    let mut seq = state.applied_seq();
    let mut applied = 0u64;

    for record in RecordScanner::new(&buf, from) {
        let record = record?;
        let at = record.pointer;
        let event = decode_payload(record.payload).map_err(|reason| StoreError::corrupt(at.offset, reason))?;

        seq += 1;
        state
            .apply(seq, &event, at)
            .map_err(|e| StoreError::corrupt(at.offset, e.to_string()))?;
        applied += 1;
    }

    Ok((from + buf.len() as u64, applied))
}

/// Rebuilds state from the first record, ignoring any snapshot.
pub fn full_replay(log: &EventLog) -> Result<Replayed> {
    let start = Instant::now();
    let mut state = KnowledgeState::new();

    let (log_offset, events_applied) = replay_from(log, &mut state, log.header_len()).map_err(|e| {
        tracing::error!(path = %log.path().display(), error = %e, "full replay failed");
        e
    })?;

    metrics::histogram!("lore_replay_duration_seconds", start.elapsed().as_secs_f64(), "mode" => "full");
    tracing::info!(
        events = events_applied,
        live = state.live_count(),
        applied_seq = state.applied_seq(),
        "knowledge log replayed"
    );
    Ok(Replayed {
        state,
        log_offset,
        mode: ReplayMode::Full,
        events_applied,
    })
}

/// Hydrates from `snapshot` when its cursor fits this log, else full replay.
pub fn recover(log: &EventLog, snapshot: Option<&Snapshot>) -> Result<Replayed> {
    let log_len = log.len()?;

    match snapshot {
        Some(snap) if snap.cursor_usable(log.header_len(), log_len) => {
            let start = Instant::now();
            let mut state = snap.to_state();
            match replay_from(log, &mut state, snap.log_offset) {
                Ok((log_offset, events_applied)) => {
                    metrics::histogram!(
                        "lore_replay_duration_seconds",
                        start.elapsed().as_secs_f64(),
                        "mode" => "hydrated"
                    );
                    tracing::debug!(
                        snapshot_seq = snap.applied_seq,
                        tail_events = events_applied,
                        "hydrated from snapshot"
                    );
                    return Ok(Replayed {
                        state,
                        log_offset,
                        mode: ReplayMode::Hydrated,
                        events_applied,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        offset = snap.log_offset,
                        error = %e,
                        "tail replay after snapshot failed; falling back to full replay"
                    );
                }
            }
        }
        Some(snap) if snap.log_offset != 0 => {
            tracing::warn!(
                log_offset = snap.log_offset,
                log_len,
                version = snap.version,
                "snapshot cursor does not fit the log; falling back to full replay"
            );
        }
        _ => {}
    }

    full_replay(log)
}
