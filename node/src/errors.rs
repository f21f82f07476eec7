// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::path::PathBuf;

use lore_kernel::{IdError, KernelError};
use thiserror::Error;

use crate::lock::LockError;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid knowledge log header in {}: found {found:?}", .path.display())]
    HeaderInvalid { path: PathBuf, found: String },

    #[error("corrupt knowledge log at offset {offset}: {reason}")]
    CorruptLog { offset: u64, reason: String },

    #[error("unsupported snapshot format {found:?} (expected {expected:?})")]
    UnsupportedSnapshotFormat { found: String, expected: &'static str },

    #[error("item {0} not found")]
    ItemNotFound(String),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("lore already initialized in {}", .0.display())]
    AlreadyInitialized(PathBuf),

    #[error("no lore store in {}", .0.display())]
    NotInitialized(PathBuf),

    #[error("invalid item: {0}")]
    InvalidItem(String),

    #[error("could not issue id: {0}")]
    IdIssue(#[from] IdError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub(crate) fn corrupt(offset: u64, reason: impl Into<String>) -> Self {
        StoreError::CorruptLog {
            offset,
            reason: reason.into(),
        }
    }

    /// The write lock could not be taken in time; retrying may succeed.
    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, StoreError::Lock(LockError::Timeout { .. }))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::ItemNotFound(_))
    }

    /// Corruption, header and format errors: reopening will not help.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StoreError::HeaderInvalid { .. }
                | StoreError::CorruptLog { .. }
                | StoreError::UnsupportedSnapshotFormat { .. }
        )
    }
}

impl From<KernelError> for StoreError {
    fn from(e: KernelError) -> Self {
        StoreError::InvalidItem(e.to_string())
    }
}

impl From<serde_yaml::Error> for StoreError {
    fn from(e: serde_yaml::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
