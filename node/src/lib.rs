// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! lore-node: crash-safe on-disk storage for the lore knowledge store.

pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod fileio;
pub mod idgen;
pub mod lock;
pub mod persistence;
pub mod recovery;
pub mod store;
pub mod telemetry;

pub use config::{LockOptions, StoreConfig};
pub use engine::{KnowledgeFile, OpenMode};
pub use errors::{Result, StoreError};
pub use events::{CompactionReport, ReplayMode};
pub use store::{ListFilter, ListItem, ProjectInfo, Store, StoreStats, TopicInfo};
