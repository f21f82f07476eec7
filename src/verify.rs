// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Deterministic state hashing.

use crate::state::head::HeadEntry;
use crate::state::kernel::KnowledgeState;
use crate::types::SessionState;

/// Computes the BLAKE3 digest of a knowledge state.
///
/// **Scope**: covers everything replay reconstructs:
/// - Applied sequence
/// - Heads (in ID order, including log pointers)
/// - Session state
/// - Legacy tombstones (in list order)
///
/// Two states with equal digests answer every read identically.
pub fn state_digest(state: &KnowledgeState) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();

    hasher.update(&state.applied_seq.to_le_bytes());

    hasher.update(&(state.heads.len() as u64).to_le_bytes());
    for (id, head) in &state.heads {
        put_str(&mut hasher, id);
        put_head(&mut hasher, head);
    }

    put_session(&mut hasher, &state.session);

    hasher.update(&(state.tombstones.len() as u64).to_le_bytes());
    for id in &state.tombstones {
        put_str(&mut hasher, id);
    }

    *hasher.finalize().as_bytes()
}

// Length prefixes keep ["ab", "c"] distinct from ["a", "bc"].
fn put_str(hasher: &mut blake3::Hasher, s: &str) {
    hasher.update(&(s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}

fn put_opt(hasher: &mut blake3::Hasher, s: Option<&str>) {
    match s {
        Some(v) => {
            hasher.update(&[1]);
            put_str(hasher, v);
        }
        None => {
            hasher.update(&[0]);
        }
    }
}

fn put_list(hasher: &mut blake3::Hasher, items: &[String]) {
    hasher.update(&(items.len() as u64).to_le_bytes());
    for item in items {
        put_str(hasher, item);
    }
}

fn put_head(hasher: &mut blake3::Hasher, head: &HeadEntry) {
    put_str(hasher, &head.item_type);
    put_opt(hasher, head.topic.as_deref());
    put_opt(hasher, head.domain.as_deref());
    put_opt(hasher, head.severity.as_deref());
    put_str(hasher, &head.oneliner);
    put_str(hasher, &head.created.to_rfc3339());
    put_list(hasher, &head.refs);
    hasher.update(&head.body_offset.to_le_bytes());
    hasher.update(&head.body_len.to_le_bytes());
    hasher.update(&head.last_event_seq.to_le_bytes());
}

fn put_session(hasher: &mut blake3::Hasher, s: &SessionState) {
    put_opt(hasher, s.goal.as_deref());
    put_opt(hasher, s.progress.as_deref());
    put_opt(hasher, s.blocker.as_deref());
    put_list(hasher, &s.next);
    put_list(hasher, &s.working_files);
    put_list(hasher, &s.open_questions);
    match s.last_updated {
        Some(at) => {
            hasher.update(&[1]);
            put_str(hasher, &at.to_rfc3339());
        }
        None => {
            hasher.update(&[0]);
        }
    }
}
