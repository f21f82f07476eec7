// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Head cache entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Entry;

/// Byte range of one event payload inside the log, excluding its delimiter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogPointer {
    pub offset: u64,
    pub len: u64,
}

impl LogPointer {
    pub fn new(offset: u64, len: u64) -> Self {
        Self { offset, len }
    }

    pub fn end(&self) -> u64 {
        self.offset + self.len
    }
}

/// Latest metadata of one live item plus where its full payload lives.
///
/// Bodies are never cached here; `get` reads them back through `body_offset`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadEntry {
    #[serde(rename = "type")]
    pub item_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default)]
    pub oneliner: String,
    pub created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub refs: Vec<String>,
    pub body_offset: u64,
    pub body_len: u64,
    #[serde(default)]
    pub last_event_seq: u64,
}

impl HeadEntry {
    pub fn from_entry(entry: &Entry, at: LogPointer, seq: u64) -> Self {
        Self {
            item_type: entry.item_type.clone(),
            topic: entry.topic.clone(),
            domain: entry.domain.clone(),
            severity: entry.severity.clone(),
            oneliner: entry.oneliner.clone(),
            created: entry.created,
            refs: entry.refs.clone(),
            body_offset: at.offset,
            body_len: at.len,
            last_event_seq: seq,
        }
    }

    pub fn pointer(&self) -> LogPointer {
        LogPointer::new(self.body_offset, self.body_len)
    }

    /// Topic if set, otherwise domain.
    pub fn classification(&self) -> Option<&str> {
        self.topic.as_deref().or(self.domain.as_deref())
    }
}
