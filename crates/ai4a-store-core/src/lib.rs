#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **ai4a-store-core** – Core persistence abstractions for the AI4All
//! coordinator.
//!
//! This crate defines the six storage contracts the coordinator depends on —
//! events, state, assignments, submissions, operational kv, and balances —
//! without providing concrete implementations. Storage drivers (in-memory,
//! sled) implement these traits in separate crates that depend on this core
//! abstraction.
//!
//! Durable back-ends must make each `append`/`put` atomic (all-or-nothing)
//! and visible to readers after a successful write; the event log is the
//! coordinator's single commit boundary and uses WAL-grade ordering.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ai4a_events::{DomainEvent, EventKind};
use ai4a_types::{
    AccountId, BalanceHistoryRow, BalanceRow, BlockAssignment, BlockSubmission, DayId, DayPhase,
    EntryType, NetworkState, StateSnapshot,
};

//─────────────────────────────
//  Stored record types
//─────────────────────────────

/// Registered authentication material for one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeKeyRecord {
    /// Account the key belongs to.
    pub account_id: AccountId,
    /// Public key bytes, lowercase hex.
    pub public_key_hex: String,
    /// When the binding was first persisted.
    pub registered_at: DateTime<Utc>,
}

/// One linked device. Flat table keyed by device id; the account reference
/// is a plain foreign key, never a pointer graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    /// Device identifier.
    pub device_id: String,
    /// Owning account.
    pub account_id: AccountId,
    /// Human-readable label.
    pub label: String,
    /// When the link was created.
    pub added_at: DateTime<Utc>,
}

/// Current day-lifecycle snapshot, persisted so a restart mid-day restores
/// ACTIVE cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayLifecycle {
    /// Phase at the time of the write.
    pub phase: DayPhase,
    /// Day in progress, when phase is not IDLE.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day_id: Option<DayId>,
    /// Day seed, when a day is in progress.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u32>,
    /// Locked roster, sorted.
    pub roster: Vec<AccountId>,
    /// Roster commitment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roster_hash: Option<String>,
    /// Canary block ids, sorted.
    pub canary_block_ids: Vec<String>,
}

impl DayLifecycle {
    /// The idle lifecycle written after a finalize or on first boot.
    pub fn idle() -> Self {
        Self {
            phase: DayPhase::Idle,
            day_id: None,
            seed: None,
            roster: Vec::new(),
            roster_hash: None,
            canary_block_ids: Vec::new(),
        }
    }
}

/// Outcome of a ledger credit batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreditOutcome {
    /// The batch landed; `entries` rows were written.
    Credited {
        /// Number of history rows written.
        entries: usize,
    },
    /// The `(day, entry type)` pair was already credited; nothing changed.
    AlreadyCredited,
}

//─────────────────────────────
//  Error types
//─────────────────────────────

/// Errors produced by storage drivers.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A record failed to serialize for storage.
    #[error("failed to serialize record: {0}")]
    SerializationFailed(String),
    /// Stored bytes failed to decode.
    #[error("failed to deserialize record: {0}")]
    DeserializationFailed(String),
    /// The underlying engine reported a failure.
    #[error("storage operation failed: {0}")]
    BackendError(String),
}

//─────────────────────────────
//  Storage contracts
//─────────────────────────────

/// Append-only event log, keyed by `(day_id, sequence_number)`.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist a batch of events. Atomic: either all land or none. This is
    /// the coordinator's commit boundary.
    async fn append(&self, events: &[DomainEvent]) -> anyhow::Result<()>;

    /// All events for a day, in sequence order.
    async fn query_by_day(&self, day: &DayId) -> anyhow::Result<Vec<DomainEvent>>;

    /// All events of one kind, optionally restricted to an inclusive day
    /// range, in chain order.
    async fn query_by_type(
        &self,
        kind: EventKind,
        range: Option<(DayId, DayId)>,
    ) -> anyhow::Result<Vec<DomainEvent>>;

    /// All events attributed to one actor, optionally range-restricted, in
    /// chain order.
    async fn query_by_actor(
        &self,
        actor: &AccountId,
        range: Option<(DayId, DayId)>,
    ) -> anyhow::Result<Vec<DomainEvent>>;

    /// The most recently appended event, if any.
    async fn last_event(&self) -> anyhow::Result<Option<DomainEvent>>;

    /// The last event of one day, if the day has any.
    async fn last_event_for_day(&self, day: &DayId) -> anyhow::Result<Option<DomainEvent>>;
}

/// Snapshots and state blobs, one of each per finalized day.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Persist a day's snapshot.
    async fn save_snapshot(&self, snapshot: &StateSnapshot) -> anyhow::Result<()>;

    /// Snapshot for one day.
    async fn load_snapshot(&self, day: &DayId) -> anyhow::Result<Option<StateSnapshot>>;

    /// The most recent snapshot by day id.
    async fn load_latest_snapshot(&self) -> anyhow::Result<Option<StateSnapshot>>;

    /// Persist the full network state for a day.
    async fn save_state(&self, day: &DayId, state: &NetworkState) -> anyhow::Result<()>;

    /// State blob for one day.
    async fn load_state(&self, day: &DayId) -> anyhow::Result<Option<NetworkState>>;
}

/// Per-day work assignments.
#[async_trait]
pub trait AssignmentStore: Send + Sync {
    /// Persist a day's assignments. Atomic per call.
    async fn put_assignments(
        &self,
        day: &DayId,
        assignments: &[BlockAssignment],
    ) -> anyhow::Result<()>;

    /// All assignments for a day, in account order.
    async fn get_by_day(&self, day: &DayId) -> anyhow::Result<Vec<BlockAssignment>>;

    /// One contributor's assignment for a day.
    async fn get_by_node(
        &self,
        day: &DayId,
        account: &AccountId,
    ) -> anyhow::Result<Option<BlockAssignment>>;
}

/// Per-day submissions.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Replace a day's submissions wholesale. Atomic per call.
    async fn put_submissions(
        &self,
        day: &DayId,
        submissions: &[BlockSubmission],
    ) -> anyhow::Result<()>;

    /// Append one processed submission.
    async fn append_submission(
        &self,
        day: &DayId,
        submission: &BlockSubmission,
    ) -> anyhow::Result<()>;

    /// All submissions for a day, in arrival order.
    async fn list_by_day(&self, day: &DayId) -> anyhow::Result<Vec<BlockSubmission>>;

    /// One contributor's submissions for a day, in arrival order.
    async fn list_by_node(
        &self,
        day: &DayId,
        account: &AccountId,
    ) -> anyhow::Result<Vec<BlockSubmission>>;
}

/// Operational kv: authentication material, linked devices, heartbeats, and
/// the day-lifecycle snapshot.
#[async_trait]
pub trait OperationalStore: Send + Sync {
    /// Persist an account's key binding.
    async fn put_node_key(&self, record: &NodeKeyRecord) -> anyhow::Result<()>;

    /// Key binding for one account.
    async fn get_node_key(&self, account: &AccountId) -> anyhow::Result<Option<NodeKeyRecord>>;

    /// Every key binding, in account order.
    async fn list_node_keys(&self) -> anyhow::Result<Vec<NodeKeyRecord>>;

    /// Link a device to an account. Idempotent on device id.
    async fn link_device(&self, record: &DeviceRecord) -> anyhow::Result<()>;

    /// Devices linked to one account.
    async fn devices_for_account(&self, account: &AccountId) -> anyhow::Result<Vec<DeviceRecord>>;

    /// Persist the current day lifecycle.
    async fn save_day_lifecycle(&self, lifecycle: &DayLifecycle) -> anyhow::Result<()>;

    /// The persisted day lifecycle, if one was ever written.
    async fn load_day_lifecycle(&self) -> anyhow::Result<Option<DayLifecycle>>;

    /// Record a liveness ping.
    async fn record_heartbeat(&self, account: &AccountId, at: DateTime<Utc>) -> anyhow::Result<()>;

    /// Most recent liveness ping for one account.
    async fn last_heartbeat(&self, account: &AccountId)
        -> anyhow::Result<Option<DateTime<Utc>>>;
}

/// Accumulating balance ledger in integer micro-units.
#[async_trait]
pub trait BalanceStore: Send + Sync {
    /// Apply a credit batch atomically. Idempotent by `(day, entry_type)`:
    /// when any history row for the pair exists the call is a no-op
    /// returning [`CreditOutcome::AlreadyCredited`].
    async fn credit_batch(
        &self,
        day: &DayId,
        entry_type: EntryType,
        credits: &[(AccountId, u64)],
    ) -> anyhow::Result<CreditOutcome>;

    /// Current balance row for one account.
    async fn balance(&self, account: &AccountId) -> anyhow::Result<Option<BalanceRow>>;

    /// Credit history for one account, most recent first.
    async fn history(
        &self,
        account: &AccountId,
        limit: usize,
    ) -> anyhow::Result<Vec<BalanceHistoryRow>>;

    /// Accounts ordered by lifetime earnings, descending.
    async fn leaderboard(&self, limit: usize) -> anyhow::Result<Vec<BalanceRow>>;

    /// Sum of every account's balance.
    async fn total_supply(&self) -> anyhow::Result<u64>;
}

//─────────────────────────────
//  Store bundle
//─────────────────────────────

/// The six stores the coordinator is constructed over. Back-ends are chosen
/// once at startup; the core only ever sees these interfaces.
#[derive(Clone)]
pub struct Stores {
    /// Append-only event log.
    pub events: std::sync::Arc<dyn EventStore>,
    /// Snapshots and state blobs.
    pub state: std::sync::Arc<dyn StateStore>,
    /// Per-day assignments.
    pub assignments: std::sync::Arc<dyn AssignmentStore>,
    /// Per-day submissions.
    pub submissions: std::sync::Arc<dyn SubmissionStore>,
    /// Keys, devices, lifecycle, heartbeats.
    pub operational: std::sync::Arc<dyn OperationalStore>,
    /// Balance ledger.
    pub balances: std::sync::Arc<dyn BalanceStore>,
}

/// Convenient prelude for importing the most common types.
pub mod prelude {
    pub use super::{
        AssignmentStore, BalanceStore, CreditOutcome, DayLifecycle, DeviceRecord, EventStore,
        NodeKeyRecord, OperationalStore, StateStore, StorageError, Stores, SubmissionStore,
    };
}
