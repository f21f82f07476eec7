// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod state_tests;
pub mod session_tests;
pub mod determinism_tests;

use chrono::{TimeZone, Utc};

use crate::types::Entry;

pub(crate) fn sample_entry(id: &str, oneliner: &str) -> Entry {
    Entry {
        id: id.to_string(),
        item_type: "lesson".to_string(),
        topic: Some("storage".to_string()),
        domain: None,
        severity: Some("medium".to_string()),
        oneliner: oneliner.to_string(),
        created: Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
        refs: Vec::new(),
        body: format!("body of {id}"),
    }
}
