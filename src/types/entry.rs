// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Knowledge item records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One immutable version of a knowledge item.
///
/// An update never edits an `Entry` in place: a new `Entry` with the same
/// `id` is appended and becomes the head. `created` is caller-supplied and is
/// carried over unchanged by the usual update paths.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    #[serde(rename = "type")]
    pub item_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Only meaningful for lessons; validated by higher layers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default)]
    pub oneliner: String,
    pub created: DateTime<Utc>,
    /// Ordered references to other items. Duplicates and dangling IDs are kept.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub refs: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,
}

impl Entry {
    /// Topic if set, otherwise domain.
    pub fn classification(&self) -> Option<&str> {
        self.topic.as_deref().or(self.domain.as_deref())
    }
}

/// Everything needed to create an item except its identity and timestamp.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ItemDraft {
    pub item_type: String,
    pub oneliner: String,
    pub topic: Option<String>,
    pub domain: Option<String>,
    pub severity: Option<String>,
    pub refs: Vec<String>,
    pub body: String,
}

impl ItemDraft {
    pub fn new(item_type: impl Into<String>, oneliner: impl Into<String>) -> Self {
        Self {
            item_type: item_type.into(),
            oneliner: oneliner.into(),
            ..Self::default()
        }
    }

    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn severity(mut self, severity: impl Into<String>) -> Self {
        self.severity = Some(severity.into());
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn refs<I, S>(mut self, refs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.refs = refs.into_iter().map(Into::into).collect();
        self
    }

    /// Binds the draft to an issued ID and creation time.
    pub fn into_entry(self, id: String, created: DateTime<Utc>) -> Entry {
        Entry {
            id,
            item_type: self.item_type,
            topic: self.topic,
            domain: self.domain,
            severity: self.severity,
            oneliner: self.oneliner,
            created,
            refs: self.refs,
            body: self.body,
        }
    }
}
