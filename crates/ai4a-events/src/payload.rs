//! Typed payloads carried inside [`crate::DomainEvent`]s.
//!
//! Each struct serializes into the event's `payload` value. Payloads record
//! the coordinator's decisions in full so the projector never has to
//! re-derive them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ai4a_types::{
    AccountId, BlockAssignment, BlockSubmission, CompletedBlock, DayId, RewardEntry,
    SubmissionResult,
};

/// `NODE_REGISTERED`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRegistered {
    /// The new account.
    pub account_id: AccountId,
}

/// `ROSTER_LOCKED`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterLocked {
    /// Sorted snapshot of every registered account at day start.
    pub roster: Vec<AccountId>,
    /// Commitment to the roster.
    pub roster_hash: String,
    /// Day seed derived from the day id and roster hash.
    pub seed: u32,
}

/// `WORK_ASSIGNED`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkAssigned {
    /// Aggregated per-contributor assignments, in account order.
    pub assignments: Vec<BlockAssignment>,
    /// Total blocks distributed this day.
    pub total_blocks: u32,
}

/// `CANARIES_SELECTED`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanariesSelected {
    /// Sorted canary block ids.
    pub canary_block_ids: Vec<String>,
}

/// `SUBMISSION_RECEIVED` — informational only; the decision follows in
/// `SUBMISSION_PROCESSED`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceived {
    /// The raw submission as received.
    pub submission: BlockSubmission,
}

/// `SUBMISSION_PROCESSED` — the authoritative decision record. When the
/// submission was accepted, `block` holds the full attributes that entered
/// the contributor's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionProcessed {
    /// Submitting account.
    pub contributor_id: AccountId,
    /// Block the decision covers.
    pub block_id: String,
    /// Outcome returned to the worker.
    pub result: SubmissionResult,
    /// The block appended to the contributor's history, when accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<CompletedBlock>,
}

/// `CANARY_PASSED`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanaryPassed {
    /// Account that answered the canary.
    pub contributor_id: AccountId,
    /// The canary block.
    pub block_id: String,
    /// Lifetime pass counter after this event.
    pub canary_passes: u32,
}

/// `CANARY_FAILED` — carries the new reputation so replay applies exactly
/// the penalty the live coordinator applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanaryFailed {
    /// Account that failed the canary.
    pub contributor_id: AccountId,
    /// The canary block.
    pub block_id: String,
    /// Lifetime failure counter after this event.
    pub canary_failures: u32,
    /// Reputation multiplier after the penalty.
    pub reputation_multiplier: f64,
    /// Whether reputation actually decayed (false inside the cooldown).
    pub penalty_applied: bool,
    /// Failure timestamp stamped on the contributor.
    pub failure_time: DateTime<Utc>,
}

/// `DAY_FINALIZED`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayFinalized {
    /// Tokens emitted for the day.
    pub total_emissions: f64,
    /// Base-pool share of the emission.
    pub base_pool_total: f64,
    /// Performance-pool share of the emission.
    pub performance_pool_total: f64,
    /// Contributors that met the eligibility bar.
    pub active_count: usize,
    /// Per-account reward entries, sorted by account id.
    pub rewards: Vec<RewardEntry>,
    /// Merkle root over the reward entries.
    pub reward_root: String,
    /// Canonical hash of the network state at finalize time.
    pub state_hash: String,
}

/// `REWARDS_COMMITTED` — terminal event of a finalized day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardsCommitted {
    /// Day being committed.
    pub day_id: DayId,
    /// Merkle root over the day's reward entries.
    pub reward_root: String,
    /// Day counter after the commit.
    pub day_number: u64,
}
