// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Multi-process store handle.
//!
//! Every write runs under the directory's write lock and against a freshly
//! reopened [`KnowledgeFile`], so it always builds on the latest bytes any
//! other process committed. Reads take no lock; each one reopens so it sees
//! every write committed before it started.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use lore_kernel::{Entry, HeadEntry, IdIssuer, ItemDraft, SessionState, StatePatch};
use serde::Serialize;

use crate::config::StoreConfig;
use crate::engine::KnowledgeFile;
use crate::errors::{Result, StoreError};
use crate::events::event_compact::CompactionReport;
use crate::events::event_log::LOG_FILE;
use crate::idgen::TimeOrderedIds;
use crate::lock::ProcessLock;
use crate::recovery::{verify_store, VerifyReport};

pub const LOCK_FILE: &str = "write.lock";

/// Filters for [`Store::list`]. Empty fields match everything.
#[derive(Clone, Debug, Default)]
pub struct ListFilter {
    pub item_type: Option<String>,
    /// Matches either topic or domain.
    pub topic: Option<String>,
    pub severity: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl ListFilter {
    pub fn matches(&self, head: &HeadEntry) -> bool {
        if let Some(t) = &self.item_type {
            if &head.item_type != t {
                return false;
            }
        }
        if let Some(topic) = &self.topic {
            if head.topic.as_ref() != Some(topic) && head.domain.as_ref() != Some(topic) {
                return false;
            }
        }
        if let Some(sev) = &self.severity {
            if head.severity.as_ref() != Some(sev) {
                return false;
            }
        }
        if self.since.map_or(false, |since| head.created < since) {
            return false;
        }
        if self.until.map_or(false, |until| head.created > until) {
            return false;
        }
        true
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ListItem {
    pub id: String,
    #[serde(rename = "type")]
    pub item_type: String,
    pub oneliner: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    pub created: DateTime<Utc>,
}

impl ListItem {
    fn from_head(id: &str, head: &HeadEntry) -> Self {
        Self {
            id: id.to_string(),
            item_type: head.item_type.clone(),
            oneliner: head.oneliner.clone(),
            topic: head.topic.clone(),
            domain: head.domain.clone(),
            severity: head.severity.clone(),
            created: head.created,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TopicInfo {
    pub name: String,
    pub count: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProjectInfo {
    pub name: String,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub live_items: usize,
    pub by_type: BTreeMap<String, usize>,
    pub applied_seq: u64,
    pub log_bytes: u64,
    pub tombstones: usize,
}

pub struct Store {
    config: StoreConfig,
    ids: Box<dyn IdIssuer>,
    kf: Option<KnowledgeFile>,
}

impl Store {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            ids: Box::new(TimeOrderedIds),
            kf: None,
        }
    }

    /// Store at `root` with default lock policy.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self::new(StoreConfig::new(root))
    }

    pub fn with_id_issuer(mut self, ids: impl IdIssuer + 'static) -> Self {
        self.ids = Box::new(ids);
        self
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn lock_path(&self) -> PathBuf {
        self.config.root.join(LOCK_FILE)
    }

    /// True when a readable store lives at the root.
    pub fn exists(&self) -> bool {
        KnowledgeFile::open(&self.config.root).is_ok()
    }

    /// Creates the root directory, the log and the first snapshot.
    pub fn init(&mut self, project: &str, description: &str) -> Result<()> {
        let root = self.config.root.clone();
        fs::create_dir_all(&root)?;

        let lock = ProcessLock::acquire(self.lock_path(), &self.config.lock)?;
        self.kf = None;
        if root.join(LOG_FILE).exists() {
            return Err(StoreError::AlreadyInitialized(root));
        }
        let kf = KnowledgeFile::create(&root, project, description)?;
        self.kf = Some(kf);
        release(lock);
        Ok(())
    }

    /// Drops the held handle, if any.
    pub fn close(&mut self) -> Result<()> {
        match self.kf.take() {
            Some(kf) => kf.close(),
            None => Ok(()),
        }
    }

    // Lock, reopen fresh, mutate, release. Each mutation saves the snapshot.
    fn with_write_lock<T>(&mut self, f: impl FnOnce(&mut KnowledgeFile) -> Result<T>) -> Result<T> {
        if !self.config.root.join(LOG_FILE).is_file() {
            return Err(StoreError::NotInitialized(self.config.root.clone()));
        }

        let lock = ProcessLock::acquire(self.lock_path(), &self.config.lock)?;
        self.kf = None;

        let result = KnowledgeFile::open(&self.config.root).and_then(|mut kf| {
            let out = f(&mut kf)?;
            self.kf = Some(kf);
            Ok(out)
        });
        release(lock);
        result
    }

    // Reads always reopen to see other processes' writes.
    fn open_latest(&mut self) -> Result<&KnowledgeFile> {
        self.kf = None;
        let kf = KnowledgeFile::open(&self.config.root)?;
        Ok(self.kf.insert(kf))
    }

    // --- Writes ---

    /// Issues an ID for the draft's type, stamps `created`, and appends it.
    pub fn create_item(&mut self, draft: ItemDraft) -> Result<String> {
        if draft.oneliner.trim().is_empty() {
            return Err(StoreError::InvalidItem("oneliner is required".to_string()));
        }
        let id = self.ids.issue(&draft.item_type)?;
        let entry = draft.into_entry(id.clone(), Utc::now());
        self.with_write_lock(|kf| kf.append(entry).map(|_| ()))?;
        tracing::info!(%id, "item created");
        Ok(id)
    }

    /// Raw upsert under the caller's ID, live or not.
    pub fn put_entry(&mut self, entry: Entry) -> Result<()> {
        self.with_write_lock(|kf| kf.append(entry).map(|_| ()))
    }

    /// Appends a new version of a live item.
    pub fn update_item(&mut self, entry: Entry) -> Result<()> {
        self.with_write_lock(|kf| {
            if !kf.contains(&entry.id) {
                return Err(StoreError::ItemNotFound(entry.id));
            }
            kf.append(entry).map(|_| ())
        })
    }

    /// Read-modify-append of a live item under one lock hold.
    ///
    /// The closure cannot change the ID.
    pub fn modify_item(&mut self, id: &str, f: impl FnOnce(&mut Entry)) -> Result<Entry> {
        self.with_write_lock(|kf| {
            let mut entry = kf.get(id)?;
            f(&mut entry);
            entry.id = id.to_string();
            kf.append(entry.clone())?;
            Ok(entry)
        })
    }

    pub fn remove(&mut self, id: &str) -> Result<()> {
        self.with_write_lock(|kf| kf.delete(id).map(|_| ()))?;
        tracing::info!(%id, "item removed");
        Ok(())
    }

    /// Merges the non-empty fields of `patch` into the session state.
    pub fn update_state(&mut self, patch: StatePatch) -> Result<SessionState> {
        self.with_write_lock(|kf| {
            let merged = kf.session().merged(&patch, Utc::now());
            kf.update_state(merged.clone())?;
            Ok(merged)
        })
    }

    pub fn replace_state(&mut self, state: SessionState) -> Result<()> {
        self.with_write_lock(|kf| kf.update_state(state).map(|_| ()))
    }

    pub fn compact(&mut self) -> Result<CompactionReport> {
        self.with_write_lock(|kf| kf.compact())
    }

    // --- Reads ---

    pub fn get(&mut self, id: &str) -> Result<Entry> {
        self.open_latest()?.get(id)
    }

    /// Live items matching `filter`, sorted by ID.
    pub fn list(&mut self, filter: &ListFilter) -> Result<Vec<ListItem>> {
        let kf = self.open_latest()?;
        Ok(kf
            .entries()
            .filter(|(_, head)| filter.matches(head))
            .map(|(id, head)| ListItem::from_head(id, head))
            .collect())
    }

    /// Item counts per topic (or domain when no topic is set), by name.
    pub fn topics(&mut self) -> Result<Vec<TopicInfo>> {
        let kf = self.open_latest()?;
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for (_, head) in kf.entries() {
            if let Some(name) = head.classification().filter(|n| !n.is_empty()) {
                *counts.entry(name.to_string()).or_default() += 1;
            }
        }
        Ok(counts.into_iter().map(|(name, count)| TopicInfo { name, count }).collect())
    }

    pub fn state(&mut self) -> Result<SessionState> {
        Ok(self.open_latest()?.session().clone())
    }

    pub fn project(&mut self) -> Result<ProjectInfo> {
        let kf = self.open_latest()?;
        Ok(ProjectInfo {
            name: kf.project().to_string(),
            description: kf.description().to_string(),
        })
    }

    pub fn stats(&mut self) -> Result<StoreStats> {
        let kf = self.open_latest()?;
        let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
        for (_, head) in kf.entries() {
            *by_type.entry(head.item_type.clone()).or_default() += 1;
        }
        Ok(StoreStats {
            live_items: kf.knowledge_state().live_count(),
            by_type,
            applied_seq: kf.applied_seq(),
            log_bytes: kf.log_len()?,
            tombstones: kf.knowledge_state().tombstones().len(),
        })
    }

    pub fn dump_log(&mut self) -> Result<String> {
        self.open_latest()?.dump_log()
    }

    pub fn dump_index(&mut self) -> Result<String> {
        self.open_latest()?.dump_index()
    }

    /// Compares snapshot hydration against a full replay.
    pub fn verify(&mut self) -> Result<VerifyReport> {
        self.kf = None;
        verify_store(&self.config.root)
    }
}

fn release(lock: ProcessLock) {
    if let Err(e) = lock.release() {
        tracing::warn!(error = %e, "write lock release failed");
    }
}
