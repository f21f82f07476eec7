// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Default item ID issuer.
//!
//! IDs look like `L-01JQ4W8X2M6N3P5R7T9V0YZABC`: a one-letter type prefix,
//! a dash, then 26 Crockford base-32 characters encoding 48 bits of Unix
//! milliseconds followed by 80 random bits. Lexical order follows creation
//! time at millisecond granularity.

use chrono::{DateTime, Utc};
use lore_kernel::{IdError, IdIssuer};
use rand::RngCore;

const CROCKFORD: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";
const ENCODED_LEN: usize = 26;

/// Prefix letter for an item type: `L`, `D`, `P`, or `K` for anything else.
pub fn prefix_for_type(item_type: &str) -> Result<char, IdError> {
    let normalized = item_type.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "" => Err(IdError::EmptyType),
        "lesson" => Ok('L'),
        "decision" => Ok('D'),
        "pattern" => Ok('P'),
        _ => Ok('K'),
    }
}

/// Whether `id` has the shape this issuer produces.
pub fn is_item_id(id: &str) -> bool {
    let bytes = id.as_bytes();
    bytes.len() == ENCODED_LEN + 2
        && matches!(bytes[0], b'L' | b'D' | b'P' | b'K')
        && bytes[1] == b'-'
        && bytes[2..].iter().all(|b| CROCKFORD.contains(b))
}

/// Time-ordered random IDs.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimeOrderedIds;

impl TimeOrderedIds {
    pub fn issue_at(&self, item_type: &str, at: DateTime<Utc>) -> Result<String, IdError> {
        let prefix = prefix_for_type(item_type)?;

        let mut random = [0u8; 10];
        rand::thread_rng()
            .try_fill_bytes(&mut random)
            .map_err(|e| IdError::Source(e.to_string()))?;

        let ms = at.timestamp_millis().max(0) as u128 & ((1u128 << 48) - 1);
        let mut value = ms << 80;
        for (i, b) in random.iter().enumerate() {
            value |= (*b as u128) << (72 - 8 * i);
        }

        let mut id = String::with_capacity(ENCODED_LEN + 2);
        id.push(prefix);
        id.push('-');
        for i in 0..ENCODED_LEN {
            let shift = 5 * (ENCODED_LEN - 1 - i);
            id.push(CROCKFORD[((value >> shift) & 0x1f) as usize] as char);
        }
        Ok(id)
    }
}

impl IdIssuer for TimeOrderedIds {
    fn issue(&self, item_type: &str) -> Result<String, IdError> {
        self.issue_at(item_type, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashSet;

    #[test]
    fn test_prefixes() {
        assert_eq!(prefix_for_type("lesson").unwrap(), 'L');
        assert_eq!(prefix_for_type(" Decision ").unwrap(), 'D');
        assert_eq!(prefix_for_type("pattern").unwrap(), 'P');
        assert_eq!(prefix_for_type("runbook").unwrap(), 'K');
        assert_eq!(prefix_for_type("  "), Err(IdError::EmptyType));
    }

    #[test]
    fn test_shape_and_uniqueness() {
        let ids = TimeOrderedIds;
        let mut seen = HashSet::new();
        for _ in 0..500 {
            let id = ids.issue("lesson").unwrap();
            assert!(is_item_id(&id), "{id}");
            assert!(seen.insert(id));
        }
    }

    #[test]
    fn test_later_time_sorts_later() {
        let ids = TimeOrderedIds;
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let t1 = t0 + chrono::Duration::milliseconds(1);
        for _ in 0..50 {
            let a = ids.issue_at("decision", t0).unwrap();
            let b = ids.issue_at("decision", t1).unwrap();
            assert!(a < b, "{a} !< {b}");
        }
    }

    #[test]
    fn test_epoch_encodes_leading_zeros() {
        let id = TimeOrderedIds.issue_at("pattern", Utc.timestamp_millis_opt(0).unwrap()).unwrap();
        assert!(id.starts_with("P-0000000000"), "{id}");
    }
}
