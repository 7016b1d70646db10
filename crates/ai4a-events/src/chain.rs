//! Chain construction and verification.

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use ai4a_types::{AccountId, DayId};

use crate::event::{DomainEvent, EventError, EventKind};

/// The zeroed digest the very first event in the system chains to.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Chain-integrity violations found by [`verify_chain`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChainError {
    /// An event's stored hash does not match its contents.
    #[error("event {sequence} hash mismatch")]
    HashMismatch {
        /// Sequence number of the offending event.
        sequence: u64,
    },
    /// An event does not link to its predecessor's hash.
    #[error("event {sequence} broken prev-hash link")]
    BrokenLink {
        /// Sequence number of the offending event.
        sequence: u64,
    },
    /// Sequence numbers are not contiguous from 0.
    #[error("sequence gap: expected {expected}, found {found}")]
    SequenceGap {
        /// Sequence number the chain position requires.
        expected: u64,
        /// Sequence number actually recorded.
        found: u64,
    },
}

/// Single-writer cursor that mints chained events.
///
/// The coordinator owns exactly one of these; its mutex makes the chain
/// single-writer. Restart reconstruction seeds the cursor from the last
/// persisted event's hash.
#[derive(Debug, Clone)]
pub struct EventChain {
    last_hash: String,
}

impl EventChain {
    /// Resume from a persisted tail hash, or start at genesis.
    pub fn new(last_hash: Option<String>) -> Self {
        Self {
            last_hash: last_hash.unwrap_or_else(|| GENESIS_HASH.to_string()),
        }
    }

    /// Hash the next event will chain to.
    pub fn last_hash(&self) -> &str {
        &self.last_hash
    }

    /// Mint the next event in the chain and advance the cursor.
    #[allow(clippy::too_many_arguments)]
    pub fn next(
        &mut self,
        day_id: DayId,
        sequence_number: u64,
        event_type: EventKind,
        actor_id: Option<AccountId>,
        payload: Value,
        timestamp: DateTime<Utc>,
    ) -> Result<DomainEvent, EventError> {
        let mut event = DomainEvent {
            event_id: Uuid::new_v4(),
            day_id,
            sequence_number,
            timestamp,
            event_type,
            actor_id,
            payload,
            prev_event_hash: self.last_hash.clone(),
            event_hash: String::new(),
        };
        event.event_hash = event.compute_event_hash()?;
        self.last_hash = event.event_hash.clone();
        Ok(event)
    }
}

/// Verify one day's events: hashes match contents, links are unbroken, and
/// sequence numbers run contiguously from 0. `expected_prev` is the hash
/// the first event must chain to — the prior day's tail, or
/// [`GENESIS_HASH`] for the first day ever.
pub fn verify_chain(events: &[DomainEvent], expected_prev: &str) -> Result<(), ChainError> {
    let mut prev = expected_prev.to_string();
    for (position, event) in events.iter().enumerate() {
        let expected_seq = position as u64;
        if event.sequence_number != expected_seq {
            return Err(ChainError::SequenceGap {
                expected: expected_seq,
                found: event.sequence_number,
            });
        }
        if event.prev_event_hash != prev {
            return Err(ChainError::BrokenLink {
                sequence: event.sequence_number,
            });
        }
        if !event.hash_is_valid() {
            return Err(ChainError::HashMismatch {
                sequence: event.sequence_number,
            });
        }
        prev = event.event_hash.clone();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn day() -> DayId {
        DayId::parse("2026-01-28").unwrap()
    }

    fn sample_chain(len: u64) -> Vec<DomainEvent> {
        let mut chain = EventChain::new(None);
        (0..len)
            .map(|seq| {
                chain
                    .next(
                        day(),
                        seq,
                        EventKind::SubmissionReceived,
                        None,
                        json!({ "seq": seq }),
                        day().pinned_noon(),
                    )
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn first_event_chains_to_genesis() {
        let events = sample_chain(1);
        assert_eq!(events[0].prev_event_hash, GENESIS_HASH);
        assert!(events[0].hash_is_valid());
    }

    #[test]
    fn links_are_contiguous() {
        let events = sample_chain(5);
        for pair in events.windows(2) {
            assert_eq!(pair[1].prev_event_hash, pair[0].event_hash);
        }
        assert!(verify_chain(&events, GENESIS_HASH).is_ok());
    }

    #[test]
    fn tampered_payload_is_detected() {
        let mut events = sample_chain(3);
        events[1].payload = json!({ "seq": 999 });
        assert_eq!(
            verify_chain(&events, GENESIS_HASH),
            Err(ChainError::HashMismatch { sequence: 1 })
        );
    }

    #[test]
    fn broken_link_is_detected() {
        let mut events = sample_chain(3);
        events[2].prev_event_hash = GENESIS_HASH.to_string();
        assert_eq!(
            verify_chain(&events, GENESIS_HASH),
            Err(ChainError::BrokenLink { sequence: 2 })
        );
    }

    #[test]
    fn sequence_gap_is_detected() {
        let mut events = sample_chain(3);
        events.remove(1);
        assert_eq!(
            verify_chain(&events, GENESIS_HASH),
            Err(ChainError::SequenceGap {
                expected: 1,
                found: 2
            })
        );
    }

    #[test]
    fn wrong_expected_prev_is_detected() {
        let events = sample_chain(2);
        let bogus = "1".repeat(64);
        assert_eq!(
            verify_chain(&events, &bogus),
            Err(ChainError::BrokenLink { sequence: 0 })
        );
    }

    #[test]
    fn chain_continues_across_days() {
        let mut chain = EventChain::new(None);
        let first = chain
            .next(day(), 0, EventKind::RosterLocked, None, json!({}), day().pinned_noon())
            .unwrap();
        let next_day = day().next();
        let second = chain
            .next(
                next_day.clone(),
                0,
                EventKind::RosterLocked,
                None,
                json!({}),
                next_day.pinned_noon(),
            )
            .unwrap();
        assert_eq!(second.prev_event_hash, first.event_hash);
        assert!(verify_chain(&[second], &first.event_hash).is_ok());
    }
}
