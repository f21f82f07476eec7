// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Session state: the one mutable, history-free record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocker: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub working_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub open_questions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl SessionState {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Merges every non-empty field of `patch` over `self` and stamps `at`.
    ///
    /// Empty strings and empty lists in the patch leave the current value alone,
    /// so a patch can only set fields, never clear them.
    pub fn merged(&self, patch: &StatePatch, at: DateTime<Utc>) -> SessionState {
        fn pick(current: &Option<String>, incoming: &Option<String>) -> Option<String> {
            match incoming {
                Some(v) if !v.is_empty() => Some(v.clone()),
                _ => current.clone(),
            }
        }
        fn pick_list(current: &[String], incoming: &[String]) -> Vec<String> {
            if incoming.is_empty() {
                current.to_vec()
            } else {
                incoming.to_vec()
            }
        }

        SessionState {
            goal: pick(&self.goal, &patch.goal),
            progress: pick(&self.progress, &patch.progress),
            blocker: pick(&self.blocker, &patch.blocker),
            next: pick_list(&self.next, &patch.next),
            working_files: pick_list(&self.working_files, &patch.working_files),
            open_questions: pick_list(&self.open_questions, &patch.open_questions),
            last_updated: Some(at),
        }
    }
}

/// Partial update for [`SessionState`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatePatch {
    pub goal: Option<String>,
    pub progress: Option<String>,
    pub blocker: Option<String>,
    pub next: Vec<String>,
    pub working_files: Vec<String>,
    pub open_questions: Vec<String>,
}
