// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Event language of the knowledge log.
//!
//! Every durable change is exactly one `Event`. The set is closed: a payload
//! with any other `op` tag fails to decode, and the log layer reports that as
//! corruption.
//!
//! # Invariants
//! - Same event sequence => same final state
//! - Events are immutable once committed
//! - `item.create` and `item.update` are both latest-wins upserts keyed by ID

use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};
use crate::types::{Entry, SessionState};

pub const OP_ITEM_CREATE: &str = "item.create";
pub const OP_ITEM_UPDATE: &str = "item.update";
pub const OP_ITEM_DELETE: &str = "item.delete";
pub const OP_STATE_UPDATE: &str = "state.update";
pub const OP_COMPACT: &str = "compact";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum Event {
    #[serde(rename = "item.create")]
    ItemCreate { item: Entry },
    #[serde(rename = "item.update")]
    ItemUpdate { item: Entry },
    #[serde(rename = "item.delete")]
    ItemDelete { id: String },
    #[serde(rename = "state.update")]
    StateUpdate { state: SessionState },
    /// Marks the start of a rewritten log. Carries no state.
    #[serde(rename = "compact")]
    Compact,
}

impl Event {
    pub fn create(item: Entry) -> Self {
        Event::ItemCreate { item }
    }

    pub fn update(item: Entry) -> Self {
        Event::ItemUpdate { item }
    }

    pub fn delete(id: impl Into<String>) -> Self {
        Event::ItemDelete { id: id.into() }
    }

    pub fn state(state: SessionState) -> Self {
        Event::StateUpdate { state }
    }

    /// The on-disk `op` tag.
    pub fn op(&self) -> &'static str {
        match self {
            Event::ItemCreate { .. } => OP_ITEM_CREATE,
            Event::ItemUpdate { .. } => OP_ITEM_UPDATE,
            Event::ItemDelete { .. } => OP_ITEM_DELETE,
            Event::StateUpdate { .. } => OP_STATE_UPDATE,
            Event::Compact => OP_COMPACT,
        }
    }

    /// The item ID this event touches, if any.
    pub fn item_id(&self) -> Option<&str> {
        match self {
            Event::ItemCreate { item } | Event::ItemUpdate { item } => Some(&item.id),
            Event::ItemDelete { id } => Some(id),
            Event::StateUpdate { .. } | Event::Compact => None,
        }
    }

    /// Structural checks the type system cannot express.
    pub fn validate(&self) -> Result<()> {
        match self {
            Event::ItemCreate { item } | Event::ItemUpdate { item } if item.id.is_empty() => {
                Err(KernelError::MissingItemId { op: self.op() })
            }
            Event::ItemDelete { id } if id.is_empty() => Err(KernelError::MissingId { op: self.op() }),
            _ => Ok(()),
        }
    }
}
