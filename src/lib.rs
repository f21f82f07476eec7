// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.

//! lore-kernel: the deterministic, I/O-free core of the lore knowledge store.
//!
//! Holds the record types, the closed event language and the state machine
//! that folds events into a head cache. Files, locks and processes live in
//! `lore-node`.

pub mod error;
pub mod event;
pub mod state;
pub mod types;
pub mod verify;

pub use error::{KernelError, KernelResult};
pub use event::Event;
pub use state::{HeadEntry, KnowledgeState, LogPointer};
pub use types::{Entry, IdError, IdIssuer, ItemDraft, SessionState, StatePatch};
pub use verify::state_digest;

#[cfg(test)]
pub mod tests;
