// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Identity seam.
//!
//! Item IDs are issued outside the kernel. The engine only relies on them
//! being unique, sorting in creation order, and starting with a type prefix.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("item type is required")]
    EmptyType,
    #[error("id source failed: {0}")]
    Source(String),
}

/// Issues opaque item IDs for a given item type.
pub trait IdIssuer: Send + Sync {
    fn issue(&self, item_type: &str) -> Result<String, IdError>;
}

