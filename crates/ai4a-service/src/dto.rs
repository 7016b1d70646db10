//! Wire types for the HTTP boundary. All fields are camelCase on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ai4a_hash::MerkleProof;
use ai4a_types::{
    BalanceHistoryRow, BlockAssignment, BlockType, DayPhase, RewardEntry, SubmissionResult,
};

/// Error envelope returned for every non-2xx response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// The error payload.
    pub error: ErrorDetail,
}

/// Machine-readable error code plus a human-readable message.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Stable code (`DAY_NOT_STARTED`, `VALIDATION`, ...).
    pub code: String,
    /// Diagnostic text.
    pub message: String,
}

/// Signature material common to every worker-originated request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthFields {
    /// Claimed account.
    pub account_id: String,
    /// ISO-8601 request timestamp, accepted within ±30 s.
    pub timestamp: String,
    /// Hex signature over `AI4ALL:v1:{accountId}:{timestamp}`.
    pub signature: String,
}

/// `POST /nodes/register`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    /// Claimed account; must equal the address derived from the key.
    pub account_id: String,
    /// Public key, lowercase hex.
    pub public_key: String,
}

/// Response for `POST /nodes/register`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    /// The registered account.
    pub account_id: String,
    /// False when the account already existed.
    pub created: bool,
}

/// `POST /nodes/heartbeat`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    /// Signature material.
    #[serde(flatten)]
    pub auth: AuthFields,
}

/// `POST /admin/day/start`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayStartRequest {
    /// Day to start; defaults to the current UTC day.
    pub day_id: Option<String>,
}

/// Response for `POST /admin/day/start`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayStartResponse {
    /// The started day.
    pub day_id: String,
    /// Derived day seed.
    pub seed: u32,
    /// Roster commitment.
    pub roster_hash: String,
    /// Locked roster size.
    pub roster_size: usize,
    /// Throughput budget.
    pub total_blocks: u32,
    /// Contributors that won at least one batch.
    pub assignment_count: usize,
    /// Canaries planted.
    pub canary_count: usize,
}

/// Response for `GET /admin/day/status` and the core of `/health`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayStatusResponse {
    /// Current phase.
    pub phase: DayPhase,
    /// Day in progress, when not IDLE.
    pub day_id: Option<String>,
    /// Finalized-day counter.
    pub day_number: u64,
    /// Registered contributors.
    pub contributor_count: usize,
    /// Locked roster size.
    pub roster_size: usize,
    /// Pending submissions.
    pub pending_submissions: usize,
}

/// Response for `POST /admin/day/finalize`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeResponse {
    /// The finalized day.
    pub day_id: String,
    /// Day counter after the commit.
    pub day_number: u64,
    /// Merkle root over the reward entries.
    pub reward_root: String,
    /// Canonical hash of the post-finalize state.
    pub state_hash: String,
    /// Contributors that met the eligibility bar.
    pub active_contributor_count: usize,
    /// Per-account entries.
    pub rewards: Vec<RewardEntry>,
}

/// `POST /work/request`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkRequest {
    /// Signature material.
    #[serde(flatten)]
    pub auth: AuthFields,
}

/// Response for `POST /work/request`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkRequestResponse {
    /// The caller's assignments; empty when locked out.
    pub assignments: Vec<BlockAssignment>,
    /// `ROSTER_LOCKED` when the account missed the roster snapshot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// One block result inside `POST /work/submit`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionDto {
    /// Block being reported.
    pub block_id: String,
    /// Workload category.
    pub block_type: BlockType,
    /// Resource usage in `[0, 1]`.
    pub resource_usage: f64,
    /// Difficulty in `[0.5, 3.0]`.
    pub difficulty_multiplier: f64,
    /// Whether the worker's validation passed.
    pub validation_passed: bool,
    /// Canary answer, when the worker believes one applies.
    pub canary_answer_correct: Option<bool>,
}

/// `POST /work/submit`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkSubmitRequest {
    /// Signature material.
    #[serde(flatten)]
    pub auth: AuthFields,
    /// Client's view of the current day; rejected on mismatch.
    pub day_id: Option<String>,
    /// The block results.
    pub submissions: Vec<SubmissionDto>,
}

/// Response for `POST /work/submit`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkSubmitResponse {
    /// Day the batch was processed under.
    pub day_id: String,
    /// One result per submission, in input order.
    pub results: Vec<SubmissionResult>,
    /// Pending submissions after the batch.
    pub pending_count: usize,
}

/// Query string for `GET /rewards/day` and `GET /rewards/root`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardsDayQuery {
    /// The finalized day.
    pub day_id: String,
}

/// Response for `GET /rewards/day`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardsDayResponse {
    /// The finalized day.
    pub day_id: String,
    /// Tokens emitted.
    pub total_emissions: f64,
    /// Base-pool share.
    pub base_pool_total: f64,
    /// Performance-pool share.
    pub performance_pool_total: f64,
    /// Contributors that met the eligibility bar.
    pub active_contributor_count: usize,
    /// Per-account entries.
    pub rewards: Vec<RewardEntry>,
    /// Merkle root over the entries.
    pub reward_root: String,
}

/// Response for `GET /rewards/root`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardsRootResponse {
    /// The finalized day.
    pub day_id: String,
    /// Merkle root over the entries.
    pub reward_root: String,
    /// Number of reward leaves.
    pub leaf_count: usize,
}

/// Query string for `GET /rewards/proof`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardsProofQuery {
    /// The finalized day.
    pub day_id: String,
    /// Account to prove.
    pub account_id: String,
}

/// Response for `GET /rewards/proof`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardsProofResponse {
    /// The finalized day.
    pub day_id: String,
    /// Proven account.
    pub account_id: String,
    /// Leaf hash for the account's entry.
    pub leaf: String,
    /// Sibling path to the root.
    pub proof: MerkleProof,
    /// Merkle root the proof verifies against.
    pub root: String,
}

/// Response for `GET /accounts/:id/balance`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    /// The account.
    pub account_id: String,
    /// Spendable balance in micro-units.
    pub balance_micro: u64,
    /// Lifetime earnings in micro-units.
    pub total_earned_micro: u64,
    /// Most recent reward day.
    pub last_reward_day: Option<String>,
}

/// Pagination for history and leaderboard reads.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitQuery {
    /// Maximum rows to return.
    pub limit: Option<usize>,
}

/// Response for `GET /accounts/:id/history`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    /// The account.
    pub account_id: String,
    /// Credit rows, most recent first.
    pub entries: Vec<BalanceHistoryRow>,
}

/// One leaderboard row.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    /// Rank, starting at 1.
    pub rank: usize,
    /// The account.
    pub account_id: String,
    /// Lifetime earnings in micro-units.
    pub total_earned_micro: u64,
}

/// Response for `GET /accounts/supply`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplyResponse {
    /// Sum of every balance, in micro-units.
    pub total_supply_micro: u64,
}

/// One linked device row.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDto {
    /// Device identifier.
    pub device_id: String,
    /// Human-readable label.
    pub label: String,
    /// When the link was created.
    pub added_at: DateTime<Utc>,
}

/// Response for `GET /health`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Fixed `"ok"` while the process serves traffic.
    pub status: String,
    /// Current lifecycle view.
    #[serde(flatten)]
    pub day: DayStatusResponse,
}
