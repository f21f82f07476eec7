// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use super::sample_entry;
use crate::event::Event;
use crate::state::head::LogPointer;
use crate::state::kernel::KnowledgeState;
use crate::types::SessionState;
use crate::verify::state_digest;

fn script() -> Vec<Event> {
    vec![
        Event::create(sample_entry("L-1", "one")),
        Event::create(sample_entry("L-2", "two")),
        Event::state(SessionState {
            goal: Some("g".to_string()),
            ..SessionState::default()
        }),
        Event::update(sample_entry("L-1", "one again")),
        Event::delete("L-2"),
        Event::Compact,
    ]
}

fn run(events: &[Event]) -> KnowledgeState {
    let mut state = KnowledgeState::new();
    for (i, ev) in events.iter().enumerate() {
        let seq = i as u64 + 1;
        state.apply(seq, ev, LogPointer::new(seq * 64, 48)).unwrap();
    }
    state
}

#[test]
fn test_same_events_same_digest() {
    let a = run(&script());
    let b = run(&script());
    assert_eq!(state_digest(&a), state_digest(&b));
}

#[test]
fn test_digest_sees_every_part() {
    let base = run(&script());
    let digest = state_digest(&base);

    let mut events = script();
    events.pop();
    assert_ne!(state_digest(&run(&events)), digest, "applied seq");

    let (heads, session, _, seq) = base.clone().into_parts();
    let no_tombstones = KnowledgeState::from_parts(heads.clone(), session, Vec::new(), seq);
    assert_ne!(state_digest(&no_tombstones), digest, "tombstones");

    let moved = KnowledgeState::from_parts(heads, SessionState::default(), base.tombstones().to_vec(), seq);
    assert_ne!(state_digest(&moved), digest, "session");
}

#[test]
fn test_from_parts_round_trips() {
    let base = run(&script());
    let (heads, session, tombstones, seq) = base.clone().into_parts();
    let rebuilt = KnowledgeState::from_parts(heads, session, tombstones, seq);
    assert_eq!(state_digest(&rebuilt), state_digest(&base));
}

#[test]
fn test_string_boundaries_are_hashed() {
    let mut a = KnowledgeState::new();
    let mut b = KnowledgeState::new();
    let mut ea = sample_entry("L-1", "x");
    ea.refs = vec!["ab".to_string(), "c".to_string()];
    let mut eb = sample_entry("L-1", "x");
    eb.refs = vec!["a".to_string(), "bc".to_string()];
    a.apply(1, &Event::create(ea), LogPointer::new(10, 10)).unwrap();
    b.apply(1, &Event::create(eb), LogPointer::new(10, 10)).unwrap();
    assert_ne!(state_digest(&a), state_digest(&b));
}
