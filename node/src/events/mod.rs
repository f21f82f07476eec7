// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Event-Sourced Persistence Layer
//!
//! # Architecture
//! - Knowledge log = primary truth (append-only, durable)
//! - Snapshot = replay cache (disposable)
//! - Compaction = whole-file replacement, never in-place edits
//!
//! # Guarantees
//! - Events are fsync'd before application
//! - Torn or malformed records fail recovery loudly
//! - Hydrated and fully replayed state agree

pub mod event_compact;
pub mod event_log;
pub mod event_replay;

pub use event_compact::CompactionReport;
pub use event_log::{Appended, EventLog};
pub use event_replay::{recover, ReplayMode, Replayed};
