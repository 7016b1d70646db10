#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **ai4a-types** – Shared primitive data structures for the AI4All coordinator.
//!
//! The crate is dependency-light and sits at the very bottom of the crate
//! graph so that *every* other crate can depend on it without causing cycles.
//! It intentionally makes no assumptions about I/O, cryptography, or storage;
//! hashing and persistence live in `ai4a-hash` and `ai4a-store-core`.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

//─────────────────────────────
//  Validation constants
//─────────────────────────────

/// Length of a well-formed account id: `"ai4a"` + 40 hex characters.
pub const ACCOUNT_ID_LEN: usize = 44;

/// Address prefix shared by every account id.
pub const ACCOUNT_ID_PREFIX: &str = "ai4a";

/// Maximum number of submissions accepted in a single `work/submit` batch.
pub const MAX_SUBMISSION_BATCH: usize = 1_000;

/// Inclusive bounds for a block's resource usage factor.
pub const RESOURCE_USAGE_RANGE: (f64, f64) = (0.0, 1.0);

/// Inclusive bounds for a block's difficulty multiplier.
pub const DIFFICULTY_RANGE: (f64, f64) = (0.5, 3.0);

//─────────────────────────────
//  Error type
//─────────────────────────────

/// Validation failures raised while constructing core types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TypeError {
    /// Account id is not `ai4a` + 40 lowercase hex characters.
    #[error("malformed account id: {0}")]
    BadAccountId(String),
    /// Day id is not a `YYYY-MM-DD` UTC calendar day.
    #[error("malformed day id: {0}")]
    BadDayId(String),
    /// A numeric field fell outside its documented range.
    #[error("{field} out of range: {value}")]
    OutOfRange {
        /// Name of the offending field.
        field: &'static str,
        /// The rejected value, rendered for diagnostics.
        value: String,
    },
}

//─────────────────────────────
//  Core identifiers
//─────────────────────────────

/// Network-wide account identifier: `"ai4a"` followed by 40 hex characters
/// derived from the account's public key.
///
/// The coordinator treats accounts uniformly which keeps roster snapshots,
/// idempotency keys, and ledger rows simple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Parse and validate an account id.
    pub fn parse(raw: &str) -> Result<Self, TypeError> {
        if raw.len() != ACCOUNT_ID_LEN
            || !raw.starts_with(ACCOUNT_ID_PREFIX)
            || !raw[ACCOUNT_ID_PREFIX.len()..]
                .chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        {
            return Err(TypeError::BadAccountId(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    /// Construct without validation. Intended for trusted inputs such as
    /// replayed events and test fixtures.
    pub fn unchecked(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrow the underlying string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for AccountId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A UTC calendar day in `YYYY-MM-DD` form; the unit of epoch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DayId(String);

impl DayId {
    /// Parse and validate a day id.
    pub fn parse(raw: &str) -> Result<Self, TypeError> {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|_| TypeError::BadDayId(raw.to_string()))?;
        Ok(Self(raw.to_string()))
    }

    /// The day containing `at`, in UTC.
    pub fn containing(at: DateTime<Utc>) -> Self {
        Self(at.date_naive().format("%Y-%m-%d").to_string())
    }

    /// Borrow the underlying string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Stable mid-day instant (`T12:00:00Z`) used to pin reward-calculation
    /// clocks so that replays reproduce the live run bit-for-bit.
    pub fn pinned_noon(&self) -> DateTime<Utc> {
        let date = NaiveDate::parse_from_str(&self.0, "%Y-%m-%d")
            .unwrap_or_else(|_| NaiveDate::from_ymd_opt(1970, 1, 1).unwrap());
        Utc.from_utc_datetime(&date.and_hms_opt(12, 0, 0).unwrap())
    }

    /// Start of the day (`T00:00:00Z`).
    pub fn start(&self) -> DateTime<Utc> {
        let date = NaiveDate::parse_from_str(&self.0, "%Y-%m-%d")
            .unwrap_or_else(|_| NaiveDate::from_ymd_opt(1970, 1, 1).unwrap());
        Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap())
    }

    /// The following calendar day.
    pub fn next(&self) -> Self {
        Self::containing(self.start() + Duration::days(1))
    }

    /// The preceding calendar day.
    pub fn prev(&self) -> Self {
        Self::containing(self.start() - Duration::days(1))
    }

    /// All days from `self` through `to`, inclusive. Empty when `to < self`.
    pub fn through(&self, to: &DayId) -> Vec<DayId> {
        let mut days = Vec::new();
        let mut cursor = self.clone();
        while cursor <= *to {
            days.push(cursor.clone());
            cursor = cursor.next();
        }
        days
    }
}

impl fmt::Display for DayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for DayId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

//─────────────────────────────
//  Work blocks
//─────────────────────────────

/// Category of compute a block represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockType {
    /// Model inference workload.
    Inference,
    /// Embedding computation workload.
    Embeddings,
    /// Result validation workload.
    Validation,
    /// Training contribution workload.
    Training,
}

/// A finished unit of work appended to a contributor's history.
///
/// Immutable once appended; the projector is the only writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedBlock {
    /// Identifier the block was assigned under (`{day}-b{batch}-{index}`).
    pub block_id: String,
    /// Workload category.
    pub block_type: BlockType,
    /// Fraction of the block's resource budget consumed, in `[0, 1]`.
    pub resource_usage: f64,
    /// Difficulty scaling factor, in `[0.5, 3.0]`.
    pub difficulty_multiplier: f64,
    /// Whether downstream validation accepted the result.
    pub validation_passed: bool,
    /// When the submission was processed.
    pub timestamp: DateTime<Utc>,
    /// Whether the block was a planted canary.
    pub is_canary: bool,
    /// For canaries, whether the known answer was reproduced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canary_answer_correct: Option<bool>,
}

/// One result in a `work/submit` batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSubmission {
    /// Submitting account.
    pub contributor_id: AccountId,
    /// Block being reported.
    pub block_id: String,
    /// Workload category.
    pub block_type: BlockType,
    /// Fraction of the block's resource budget consumed, in `[0, 1]`.
    pub resource_usage: f64,
    /// Difficulty scaling factor, in `[0.5, 3.0]`.
    pub difficulty_multiplier: f64,
    /// Whether the worker's own validation passed.
    pub validation_passed: bool,
    /// Canary answer, when the worker believes the block had a known answer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canary_answer_correct: Option<bool>,
    /// Worker-reported completion time.
    pub timestamp: DateTime<Utc>,
}

impl BlockSubmission {
    /// Validate numeric ranges before the submission enters the pipeline.
    pub fn validate(&self) -> Result<(), TypeError> {
        if !(RESOURCE_USAGE_RANGE.0..=RESOURCE_USAGE_RANGE.1).contains(&self.resource_usage) {
            return Err(TypeError::OutOfRange {
                field: "resource_usage",
                value: self.resource_usage.to_string(),
            });
        }
        if !(DIFFICULTY_RANGE.0..=DIFFICULTY_RANGE.1).contains(&self.difficulty_multiplier) {
            return Err(TypeError::OutOfRange {
                field: "difficulty_multiplier",
                value: self.difficulty_multiplier.to_string(),
            });
        }
        Ok(())
    }
}

/// Result of pushing one submission through the pipeline. Cached in the
/// idempotency index so replays of the same `(account, block, day)` return
/// the original decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResult {
    /// Whether the block was accepted into the contributor's history.
    pub accepted: bool,
    /// Whether the block was a planted canary.
    pub canary_detected: bool,
    /// For canaries, whether the answer matched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canary_passed: Option<bool>,
    /// Whether a reputation penalty was applied by this submission.
    pub penalty_applied: bool,
    /// Rejection reason, when `accepted` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SubmissionResult {
    /// An accepted normal block.
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            canary_detected: false,
            canary_passed: None,
            penalty_applied: false,
            reason: None,
        }
    }

    /// A rejection with the given reason; carries no state mutation.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            canary_detected: false,
            canary_passed: None,
            penalty_applied: false,
            reason: Some(reason.into()),
        }
    }
}

//─────────────────────────────
//  Assignments
//─────────────────────────────

/// The blocks one contributor is responsible for on one day.
///
/// Block ids are unique within the day and disjoint across contributors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockAssignment {
    /// Assigned account.
    pub contributor_id: AccountId,
    /// Assigned block ids, in draw order.
    pub block_ids: Vec<String>,
    /// When the lottery ran.
    pub assigned_at: DateTime<Utc>,
    /// Number of lottery batches this contributor won.
    pub batch_number: u32,
}

//─────────────────────────────
//  Contributors and network state
//─────────────────────────────

/// Per-account state accumulated across days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contributor {
    /// Account identifier.
    pub account_id: AccountId,
    /// Full completed-block history. Lookback filtering happens at read
    /// time; nothing is pruned.
    pub completed_blocks: Vec<CompletedBlock>,
    /// Scalar in `[0, 1]` reducing contribution weight after canary failures.
    pub reputation_multiplier: f64,
    /// Lifetime canary failures. Monotonic.
    pub canary_failures: u32,
    /// Lifetime canary passes. Monotonic.
    pub canary_passes: u32,
    /// Most recent canary failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_canary_failure_time: Option<DateTime<Utc>>,
    /// When the account registered.
    pub registered_at: DateTime<Utc>,
}

impl Contributor {
    /// A freshly registered contributor with full reputation.
    pub fn new(account_id: AccountId, registered_at: DateTime<Utc>) -> Self {
        Self {
            account_id,
            completed_blocks: Vec::new(),
            reputation_multiplier: 1.0,
            canary_failures: 0,
            canary_passes: 0,
            last_canary_failure_time: None,
            registered_at,
        }
    }

    /// Reward points over the trailing `lookback_days` window:
    /// `Σ resource_usage × difficulty × reputation` over non-canary blocks.
    /// Canary blocks never earn points. Only the lower cutoff is enforced;
    /// the reference clock is pinned to mid-day, so same-day blocks stamped
    /// after it still count.
    pub fn reward_points(&self, lookback_days: u32, now: DateTime<Utc>) -> f64 {
        let cutoff = now - Duration::days(i64::from(lookback_days));
        self.completed_blocks
            .iter()
            .filter(|b| !b.is_canary && b.timestamp >= cutoff)
            .map(|b| b.resource_usage * b.difficulty_multiplier * self.reputation_multiplier)
            .sum()
    }

    /// Count of non-canary blocks completed on the given day.
    pub fn blocks_on_day(&self, day: &DayId) -> usize {
        self.completed_blocks
            .iter()
            .filter(|b| !b.is_canary && DayId::containing(b.timestamp) == *day)
            .count()
    }
}

/// The authoritative projected state of the network: every contributor plus
/// the finalized-day counter. Sorted map so canonical serialization is
/// stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkState {
    /// All registered contributors, keyed by account.
    pub contributors: BTreeMap<AccountId, Contributor>,
    /// Number of finalized days since genesis.
    pub day_number: u64,
}

impl NetworkState {
    /// Sorted account ids of every registered contributor.
    pub fn roster(&self) -> Vec<AccountId> {
        self.contributors.keys().cloned().collect()
    }
}

//─────────────────────────────
//  Day lifecycle
//─────────────────────────────

/// Phase of the daily epoch state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DayPhase {
    /// No day in progress; `day/start` is the only lifecycle transition.
    Idle,
    /// Roster locked, submissions accepted.
    Active,
    /// Finalize in progress; submissions rejected.
    Finalizing,
}

impl fmt::Display for DayPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DayPhase::Idle => f.write_str("IDLE"),
            DayPhase::Active => f.write_str("ACTIVE"),
            DayPhase::Finalizing => f.write_str("FINALIZING"),
        }
    }
}

//─────────────────────────────
//  Rewards
//─────────────────────────────

/// One account's share of a finalized day's emission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardEntry {
    /// Rewarded account.
    pub account_id: AccountId,
    /// Equal-share portion from the base pool.
    pub base_pool_reward: f64,
    /// Sqrt-weighted portion from the performance pool.
    pub performance_pool_reward: f64,
    /// Sum of both portions.
    pub total_reward: f64,
}

/// The full outcome of a day's reward calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardDistribution {
    /// Day the distribution covers.
    pub date: DayId,
    /// Configuration in force when the calculation ran.
    pub config: RewardConfig,
    /// Total tokens emitted for the day.
    pub total_emissions: f64,
    /// Base-pool share of the emission.
    pub base_pool_total: f64,
    /// Performance-pool share of the emission.
    pub performance_pool_total: f64,
    /// Number of contributors that met the eligibility bar.
    pub active_contributor_count: usize,
    /// Per-account entries, sorted by account id.
    pub rewards: Vec<RewardEntry>,
}

//─────────────────────────────
//  Snapshots
//─────────────────────────────

/// Commitment metadata written once per finalized day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    /// Finalized day.
    pub day_id: DayId,
    /// Day counter after the finalize (monotonic).
    pub day_number: u64,
    /// Canonical hash of the projected `NetworkState`.
    pub state_hash: String,
    /// Hash of the last event of the day (`REWARDS_COMMITTED`).
    pub last_event_hash: String,
    /// Canonical hash of the day's reward entries.
    pub reward_hash: String,
    /// Contributor count at finalize time.
    pub contributor_count: usize,
    /// Wall-clock write time.
    pub created_at: DateTime<Utc>,
}

//─────────────────────────────
//  Balance ledger rows
//─────────────────────────────

/// Source of a balance credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryType {
    /// Daily reward distribution.
    Reward,
    /// Crawled-data contribution credit.
    Crawl,
    /// On-demand task credit.
    Task,
}

/// Current balance of one account, in integer micro-units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceRow {
    /// Account the balance belongs to.
    pub account_id: AccountId,
    /// Spendable balance. Never exceeds `total_earned_micro`.
    pub balance_micro: u64,
    /// Lifetime earnings. Monotonic.
    pub total_earned_micro: u64,
    /// Most recent day a reward credit landed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reward_day: Option<DayId>,
}

/// Append-only record of one credit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceHistoryRow {
    /// Credited account.
    pub account_id: AccountId,
    /// Day (for rewards) or external batch key the credit belongs to.
    pub day_id: DayId,
    /// Credited amount in micro-units.
    pub amount_micro: u64,
    /// Balance after the credit was applied.
    pub balance_after_micro: u64,
    /// Credit source.
    pub entry_type: EntryType,
    /// When the credit was written.
    pub timestamp: DateTime<Utc>,
}

//─────────────────────────────
//  Configuration
//─────────────────────────────

/// Assignment-engine knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentConfig {
    /// Blocks handed out per lottery batch.
    pub blocks_per_batch: u32,
    /// Number of lottery batches per day. Total daily throughput is
    /// `blocks_per_batch × max_batches`.
    pub max_batches: u32,
    /// Days of history feeding the lottery weights.
    pub lookback_days: u32,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            blocks_per_batch: 10,
            max_batches: 100,
            lookback_days: 7,
        }
    }
}

impl AssignmentConfig {
    /// Fixed per-day throughput budget.
    pub fn total_blocks(&self) -> u32 {
        self.blocks_per_batch * self.max_batches
    }
}

/// Canary-injection knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanaryConfig {
    /// Fraction of the day's blocks replaced by canaries, in `[0, 1]`.
    pub canary_percentage: f64,
}

impl Default for CanaryConfig {
    fn default() -> Self {
        Self {
            canary_percentage: 0.05,
        }
    }
}

/// Reward-calculation knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardConfig {
    /// Tokens emitted per day.
    pub daily_emissions: f64,
    /// Fraction of the emission split equally among active contributors.
    pub base_pool_percentage: f64,
    /// Fraction of the emission distributed by sqrt-weighted points.
    pub performance_pool_percentage: f64,
    /// Days of history feeding performance points.
    pub performance_lookback_days: u32,
    /// Minimum completed blocks within the day to count as active.
    pub min_blocks_for_active: usize,
    /// Minimum reputation to count as active.
    pub reputation_floor: f64,
    /// Hours an account stays ineligible after a canary failure.
    pub canary_failure_cooldown_hours: u32,
    /// Multiplicative reputation factor applied on a canary failure,
    /// clamped so reputation stays in `[0, 1]`.
    pub canary_penalty: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            daily_emissions: 1_000.0,
            base_pool_percentage: 0.3,
            performance_pool_percentage: 0.7,
            performance_lookback_days: 7,
            min_blocks_for_active: 1,
            reputation_floor: 0.2,
            canary_failure_cooldown_hours: 24,
            canary_penalty: 0.5,
        }
    }
}

/// Everything the day lifecycle needs, bundled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpochConfig {
    /// Assignment lottery knobs.
    pub assignment: AssignmentConfig,
    /// Canary injection knobs.
    pub canary: CanaryConfig,
    /// Reward calculation knobs.
    pub rewards: RewardConfig,
}
