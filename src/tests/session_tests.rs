// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use chrono::{TimeZone, Utc};

use crate::types::{ItemDraft, SessionState, StatePatch};

#[test]
fn test_patch_merges_only_non_empty_fields() {
    let current = SessionState {
        goal: Some("ship v1".to_string()),
        blocker: Some("flaky disk".to_string()),
        next: vec!["write tests".to_string()],
        ..SessionState::default()
    };
    let patch = StatePatch {
        goal: Some(String::new()),
        progress: Some("tests written".to_string()),
        open_questions: vec!["retry policy?".to_string()],
        ..StatePatch::default()
    };
    let at = Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 0).unwrap();

    let merged = current.merged(&patch, at);

    assert_eq!(merged.goal.as_deref(), Some("ship v1"));
    assert_eq!(merged.progress.as_deref(), Some("tests written"));
    assert_eq!(merged.blocker.as_deref(), Some("flaky disk"));
    assert_eq!(merged.next, vec!["write tests".to_string()]);
    assert_eq!(merged.open_questions, vec!["retry policy?".to_string()]);
    assert_eq!(merged.last_updated, Some(at));
}

#[test]
fn test_empty_state_detection() {
    assert!(SessionState::default().is_empty());
    let state = SessionState {
        working_files: vec!["src/lib.rs".to_string()],
        ..SessionState::default()
    };
    assert!(!state.is_empty());
}

#[test]
fn test_session_yaml_omits_empty_fields() {
    let state = SessionState {
        goal: Some("g".to_string()),
        ..SessionState::default()
    };
    let yaml = serde_yaml::to_string(&state).unwrap();
    assert_eq!(yaml.trim(), "goal: g");
}

#[test]
fn test_draft_into_entry() {
    let created = Utc.with_ymd_and_hms(2025, 2, 2, 0, 0, 0).unwrap();
    let entry = ItemDraft::new("decision", "use yaml payloads")
        .domain("storage")
        .refs(["L-1", "L-1"])
        .body("human diffable")
        .into_entry("D-1".to_string(), created);

    assert_eq!(entry.id, "D-1");
    assert_eq!(entry.item_type, "decision");
    assert_eq!(entry.classification(), Some("storage"));
    assert_eq!(entry.refs, vec!["L-1".to_string(), "L-1".to_string()]);
    assert_eq!(entry.created, created);
}
