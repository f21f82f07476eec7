// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Error types.

use thiserror::Error;

/// Reasons the kernel refuses to fold an event into the state.
///
/// These only surface while replaying or appending; a refused event in the
/// log is corruption, never something to skip.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    /// `item.create` / `item.update` without an item, or with an empty ID.
    #[error("invalid {op} event: missing item id")]
    MissingItemId { op: &'static str },
    /// `item.delete` with an empty ID.
    #[error("invalid {op} event: missing id")]
    MissingId { op: &'static str },
    /// A record pointer that cannot address a payload.
    #[error("invalid log pointer for {id}: length {len}")]
    EmptyPointer { id: String, len: u64 },
}

pub type KernelResult<T> = core::result::Result<T, KernelError>;
pub type Result<T> = KernelResult<T>;
