// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use super::sample_entry;
use crate::error::KernelError;
use crate::event::Event;
use crate::state::head::LogPointer;
use crate::state::kernel::KnowledgeState;
use crate::types::SessionState;

#[test]
fn test_upsert_then_update_keeps_latest() {
    let mut state = KnowledgeState::new();

    state.apply(1, &Event::create(sample_entry("L-1", "first")), LogPointer::new(10, 40)).unwrap();
    let mut newer = sample_entry("L-1", "second");
    newer.severity = Some("high".to_string());
    state.apply(2, &Event::update(newer), LogPointer::new(54, 41)).unwrap();

    let head = state.head("L-1").unwrap();
    assert_eq!(head.oneliner, "second");
    assert_eq!(head.severity.as_deref(), Some("high"));
    assert_eq!(head.pointer(), LogPointer::new(54, 41));
    assert_eq!(head.last_event_seq, 2);
    assert_eq!(state.live_count(), 1);
    assert_eq!(state.applied_seq(), 2);
}

#[test]
fn test_delete_tombstones_once() {
    let mut state = KnowledgeState::new();
    state.apply(1, &Event::create(sample_entry("L-1", "x")), LogPointer::new(10, 30)).unwrap();

    state.apply(2, &Event::delete("L-1"), LogPointer::new(44, 20)).unwrap();
    state.apply(3, &Event::delete("L-1"), LogPointer::new(68, 20)).unwrap();

    assert!(!state.is_live("L-1"));
    assert_eq!(state.tombstones(), ["L-1".to_string()]);
    assert_eq!(state.applied_seq(), 3);
}

#[test]
fn test_delete_unknown_id_is_recorded() {
    let mut state = KnowledgeState::new();
    state.apply(1, &Event::delete("P-404"), LogPointer::new(10, 20)).unwrap();
    assert_eq!(state.tombstones(), ["P-404".to_string()]);
    assert_eq!(state.live_count(), 0);
}

#[test]
fn test_recreate_after_delete_clears_tombstone() {
    let mut state = KnowledgeState::new();
    state.apply(1, &Event::create(sample_entry("D-7", "old")), LogPointer::new(10, 30)).unwrap();
    state.apply(2, &Event::delete("D-7"), LogPointer::new(44, 20)).unwrap();
    state.apply(3, &Event::create(sample_entry("D-7", "new")), LogPointer::new(68, 30)).unwrap();

    assert_eq!(state.head("D-7").unwrap().oneliner, "new");
    assert!(state.tombstones().is_empty());
}

#[test]
fn test_state_update_replaces_wholesale() {
    let mut state = KnowledgeState::new();
    let first = SessionState {
        goal: Some("ship".to_string()),
        next: vec!["a".to_string(), "b".to_string()],
        ..SessionState::default()
    };
    state.apply(1, &Event::state(first), LogPointer::new(10, 30)).unwrap();

    let second = SessionState {
        progress: Some("half".to_string()),
        ..SessionState::default()
    };
    state.apply(2, &Event::state(second.clone()), LogPointer::new(44, 30)).unwrap();

    assert_eq!(state.session(), &second);
    assert!(state.session().goal.is_none());
}

#[test]
fn test_compact_marker_only_advances_seq() {
    let mut state = KnowledgeState::new();
    state.apply(1, &Event::create(sample_entry("L-1", "x")), LogPointer::new(10, 30)).unwrap();
    let before = state.clone();

    state.apply(2, &Event::Compact, LogPointer::new(44, 12)).unwrap();

    assert_eq!(state.heads(), before.heads());
    assert_eq!(state.applied_seq(), 2);
}

#[test]
fn test_rejected_event_leaves_state_untouched() {
    let mut state = KnowledgeState::new();
    state.apply(1, &Event::create(sample_entry("L-1", "x")), LogPointer::new(10, 30)).unwrap();
    let before = state.clone();

    let err = state.apply(2, &Event::create(sample_entry("", "no id")), LogPointer::new(44, 30));
    assert!(matches!(err, Err(KernelError::MissingItemId { .. })));

    let err = state.apply(2, &Event::create(sample_entry("L-2", "no bytes")), LogPointer::new(44, 0));
    assert!(matches!(err, Err(KernelError::EmptyPointer { .. })));

    assert_eq!(state, before);
}

#[test]
fn test_applied_seq_is_max_seen() {
    let mut state = KnowledgeState::new();
    state.apply(5, &Event::Compact, LogPointer::new(10, 12)).unwrap();
    state.apply(3, &Event::Compact, LogPointer::new(26, 12)).unwrap();
    assert_eq!(state.applied_seq(), 5);
}

#[test]
fn test_live_ids_sorted() {
    let mut state = KnowledgeState::new();
    for (seq, id) in ["P-3", "D-2", "L-1"].iter().enumerate() {
        let seq = seq as u64 + 1;
        state
            .apply(seq, &Event::create(sample_entry(id, "x")), LogPointer::new(seq * 100, 50))
            .unwrap();
    }
    assert_eq!(state.live_ids(), vec!["D-2", "L-1", "P-3"]);
}
