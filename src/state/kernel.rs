// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Knowledge state and the event application state machine.

use std::collections::BTreeMap;

use crate::error::{KernelError, Result};
use crate::event::Event;
use crate::state::head::{HeadEntry, LogPointer};
use crate::types::SessionState;

/// Everything replay produces: live heads, session state, the legacy
/// tombstone list and the highest sequence folded in so far.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KnowledgeState {
    pub(crate) heads: BTreeMap<String, HeadEntry>,
    pub(crate) session: SessionState,
    pub(crate) tombstones: Vec<String>,
    pub(crate) applied_seq: u64,
}

impl KnowledgeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a state from persisted snapshot parts.
    pub fn from_parts(
        heads: BTreeMap<String, HeadEntry>,
        session: SessionState,
        tombstones: Vec<String>,
        applied_seq: u64,
    ) -> Self {
        Self {
            heads,
            session,
            tombstones,
            applied_seq,
        }
    }

    // --- Read APIs ---

    pub fn applied_seq(&self) -> u64 {
        self.applied_seq
    }

    pub fn head(&self, id: &str) -> Option<&HeadEntry> {
        self.heads.get(id)
    }

    pub fn heads(&self) -> &BTreeMap<String, HeadEntry> {
        &self.heads
    }

    pub fn is_live(&self, id: &str) -> bool {
        self.heads.contains_key(id)
    }

    pub fn live_count(&self) -> usize {
        self.heads.len()
    }

    /// Live IDs in lexicographic order.
    pub fn live_ids(&self) -> Vec<String> {
        self.heads.keys().cloned().collect()
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn tombstones(&self) -> &[String] {
        &self.tombstones
    }

    // --- Write Logic ---

    /// Folds one event into the state.
    ///
    /// `at` locates the event payload in the log and is recorded for item
    /// upserts. A rejected event leaves the state untouched.
    pub fn apply(&mut self, seq: u64, event: &Event, at: LogPointer) -> Result<()> {
        event.validate()?;

        match event {
            Event::ItemCreate { item } | Event::ItemUpdate { item } => {
                if at.len == 0 {
                    return Err(KernelError::EmptyPointer { id: item.id.clone(), len: at.len });
                }
                self.heads.insert(item.id.clone(), HeadEntry::from_entry(item, at, seq));
                self.tombstones.retain(|t| t != &item.id);
            }
            Event::ItemDelete { id } => {
                self.heads.remove(id);
                if !self.tombstones.iter().any(|t| t == id) {
                    self.tombstones.push(id.clone());
                }
            }
            Event::StateUpdate { state } => {
                self.session = state.clone();
            }
            Event::Compact => {}
        }

        self.applied_seq = self.applied_seq.max(seq);
        Ok(())
    }

    /// Drops the legacy tombstone list. Only compaction does this.
    pub fn clear_tombstones(&mut self) {
        self.tombstones.clear();
    }

    pub fn into_parts(self) -> (BTreeMap<String, HeadEntry>, SessionState, Vec<String>, u64) {
        (self.heads, self.session, self.tombstones, self.applied_seq)
    }
}
