// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Domain records: knowledge items, session state, and the ID seam.

pub mod entry;
pub mod id;
pub mod session;

pub use entry::{Entry, ItemDraft};
pub use id::{IdError, IdIssuer};
pub use session::{SessionState, StatePatch};
