//! The domain event envelope.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use ai4a_hash::compute_hash;
use ai4a_types::{AccountId, DayId};

/// Failures while building or hashing an event.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// The event could not be rendered as a JSON tree for hashing.
    #[error("event not serializable: {0}")]
    NotSerializable(#[from] serde_json::Error),
    /// A payload did not match the shape its event kind requires.
    #[error("malformed {kind} payload: {detail}")]
    MalformedPayload {
        /// Event kind whose payload failed to decode.
        kind: EventKind,
        /// Decoder diagnostics.
        detail: String,
    },
}

/// Every kind of event the coordinator emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// A new account joined the network.
    NodeRegistered,
    /// The day started and its roster snapshot was frozen.
    RosterLocked,
    /// The assignment lottery ran.
    WorkAssigned,
    /// Canary blocks were chosen from the assigned pool.
    CanariesSelected,
    /// A submission arrived (informational; carries no decision).
    SubmissionReceived,
    /// A submission was decided; carries the full accepted block.
    SubmissionProcessed,
    /// A canary was answered correctly.
    CanaryPassed,
    /// A canary was answered incorrectly.
    CanaryFailed,
    /// The day's rewards were computed and committed to a Merkle root.
    DayFinalized,
    /// The day counter advanced; terminal event of every day.
    RewardsCommitted,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::NodeRegistered => "NODE_REGISTERED",
            EventKind::RosterLocked => "ROSTER_LOCKED",
            EventKind::WorkAssigned => "WORK_ASSIGNED",
            EventKind::CanariesSelected => "CANARIES_SELECTED",
            EventKind::SubmissionReceived => "SUBMISSION_RECEIVED",
            EventKind::SubmissionProcessed => "SUBMISSION_PROCESSED",
            EventKind::CanaryPassed => "CANARY_PASSED",
            EventKind::CanaryFailed => "CANARY_FAILED",
            EventKind::DayFinalized => "DAY_FINALIZED",
            EventKind::RewardsCommitted => "REWARDS_COMMITTED",
        };
        f.write_str(name)
    }
}

/// One link in the coordinator's integrity record.
///
/// `event_hash` is the canonical hash of the event with the `eventHash`
/// field removed; `prev_event_hash` is the previous event's hash, whether
/// same-day or cross-day. Sequence numbers restart at 0 within each day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    /// Unique event id (UUID v4).
    pub event_id: Uuid,
    /// Day the event belongs to.
    pub day_id: DayId,
    /// Position within the day, starting at 0.
    pub sequence_number: u64,
    /// When the event was emitted.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub event_type: EventKind,
    /// Acting account, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<AccountId>,
    /// Kind-specific payload; see [`crate::payload`].
    pub payload: Value,
    /// Hash of the predecessor event, or the genesis digest.
    pub prev_event_hash: String,
    /// Canonical hash of this event minus this field.
    pub event_hash: String,
}

impl DomainEvent {
    /// Recompute the canonical hash of this event (excluding `eventHash`).
    pub fn compute_event_hash(&self) -> Result<String, EventError> {
        let mut tree = serde_json::to_value(self)?;
        if let Some(obj) = tree.as_object_mut() {
            obj.remove("eventHash");
        }
        Ok(compute_hash(&tree))
    }

    /// Whether the stored hash matches the event's contents.
    pub fn hash_is_valid(&self) -> bool {
        self.compute_event_hash()
            .map(|h| h == self.event_hash)
            .unwrap_or(false)
    }

    /// Decode the payload as the typed struct for this event's kind.
    pub fn decode_payload<P: for<'de> Deserialize<'de>>(&self) -> Result<P, EventError> {
        serde_json::from_value(self.payload.clone()).map_err(|e| EventError::MalformedPayload {
            kind: self.event_type,
            detail: e.to_string(),
        })
    }
}
