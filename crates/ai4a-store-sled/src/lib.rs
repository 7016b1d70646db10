#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **ai4a-store-sled** – Sled-based persistent storage driver for the AI4All
//! coordinator.
//!
//! This crate provides a durable, embedded back-end implementing all six
//! store contracts on top of the sled database engine. Each logical table is
//! a dedicated tree; event keys are `(day_id, zero-padded sequence)` so
//! range scans return chain order. Event-batch appends use `sled::Batch`
//! and ledger credits use a multi-tree transaction, which keeps the
//! coordinator's commit boundaries all-or-nothing across a crash.

use std::path::Path;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use sled::{Batch, Db, Tree};

use ai4a_events::{DomainEvent, EventKind};
use ai4a_store_core::{
    AssignmentStore, BalanceStore, CreditOutcome, DayLifecycle, DeviceRecord, EventStore,
    NodeKeyRecord, OperationalStore, StateStore, StorageError, SubmissionStore,
};
use ai4a_types::{
    AccountId, BalanceHistoryRow, BalanceRow, BlockAssignment, BlockSubmission, DayId, EntryType,
    NetworkState, StateSnapshot,
};

const LIFECYCLE_KEY: &str = "dayLifecycle";
const HEARTBEAT_PREFIX: &str = "hb:";

fn entry_type_tag(entry_type: EntryType) -> &'static str {
    match entry_type {
        EntryType::Reward => "REWARD",
        EntryType::Crawl => "CRAWL",
        EntryType::Task => "TASK",
    }
}

fn event_key(day: &DayId, sequence: u64) -> Vec<u8> {
    format!("{day}:{sequence:010}").into_bytes()
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    rmp_serde::to_vec_named(value)
        .map_err(|e| StorageError::SerializationFailed(e.to_string()).into())
}

fn decode<T: for<'de> serde::Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    rmp_serde::from_slice(bytes)
        .map_err(|e| StorageError::DeserializationFailed(e.to_string()).into())
}

fn in_range(day: &DayId, range: &Option<(DayId, DayId)>) -> bool {
    match range {
        Some((from, to)) => day >= from && day <= to,
        None => true,
    }
}

/// A persistent back-end for all six store contracts using the sled
/// embedded database.
#[derive(Debug, Clone)]
pub struct SledBackend {
    db: Db,
    events: Tree,
    snapshots: Tree,
    states: Tree,
    assignments: Tree,
    submissions: Tree,
    node_keys: Tree,
    devices: Tree,
    operational: Tree,
    balances: Tree,
    balance_history: Tree,
    credited: Tree,
}

impl SledBackend {
    /// Opens or creates a database at the given path, recovering from an
    /// unclean shutdown if necessary.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, sled::Config::default())
    }

    /// Opens with a custom sled configuration (cache size, compression, ...).
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: sled::Config) -> Result<Self> {
        let db = config.path(path).open()?;
        Self::from_db(db)
    }

    /// Builds a backend over an existing database handle.
    pub fn from_db(db: Db) -> Result<Self> {
        Ok(Self {
            events: db.open_tree("events")?,
            snapshots: db.open_tree("snapshots")?,
            states: db.open_tree("states")?,
            assignments: db.open_tree("assignments")?,
            submissions: db.open_tree("submissions")?,
            node_keys: db.open_tree("node_keys")?,
            devices: db.open_tree("devices")?,
            operational: db.open_tree("operational")?,
            balances: db.open_tree("balances")?,
            balance_history: db.open_tree("balance_history")?,
            credited: db.open_tree("credited")?,
            db,
        })
    }

    /// Creates a temporary backend whose files are removed on drop.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    /// Flush all pending writes to disk.
    pub async fn flush(&self) -> Result<()> {
        self.db.flush_async().await?;
        Ok(())
    }

    /// Total number of stored events.
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    fn scan_events<F>(&self, mut keep: F) -> Result<Vec<DomainEvent>>
    where
        F: FnMut(&DomainEvent) -> bool,
    {
        let mut out = Vec::new();
        for item in self.events.iter() {
            let (_, value) = item?;
            let event: DomainEvent = decode(&value)?;
            if keep(&event) {
                out.push(event);
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl EventStore for SledBackend {
    async fn append(&self, events: &[DomainEvent]) -> Result<()> {
        let mut batch = Batch::default();
        for event in events {
            batch.insert(event_key(&event.day_id, event.sequence_number), encode(event)?);
        }
        // The batch applies atomically; this is the commit boundary, so
        // force it to disk before reporting success.
        self.events.apply_batch(batch)?;
        self.events.flush_async().await?;
        Ok(())
    }

    async fn query_by_day(&self, day: &DayId) -> Result<Vec<DomainEvent>> {
        let mut out = Vec::new();
        for item in self.events.scan_prefix(format!("{day}:").as_bytes()) {
            let (_, value) = item?;
            out.push(decode(&value)?);
        }
        Ok(out)
    }

    async fn query_by_type(
        &self,
        kind: EventKind,
        range: Option<(DayId, DayId)>,
    ) -> Result<Vec<DomainEvent>> {
        self.scan_events(|e| e.event_type == kind && in_range(&e.day_id, &range))
    }

    async fn query_by_actor(
        &self,
        actor: &AccountId,
        range: Option<(DayId, DayId)>,
    ) -> Result<Vec<DomainEvent>> {
        self.scan_events(|e| e.actor_id.as_ref() == Some(actor) && in_range(&e.day_id, &range))
    }

    async fn last_event(&self) -> Result<Option<DomainEvent>> {
        match self.events.last()? {
            Some((_, value)) => Ok(Some(decode(&value)?)),
            None => Ok(None),
        }
    }

    async fn last_event_for_day(&self, day: &DayId) -> Result<Option<DomainEvent>> {
        match self
            .events
            .scan_prefix(format!("{day}:").as_bytes())
            .last()
            .transpose()?
        {
            Some((_, value)) => Ok(Some(decode(&value)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl StateStore for SledBackend {
    async fn save_snapshot(&self, snapshot: &StateSnapshot) -> Result<()> {
        self.snapshots
            .insert(snapshot.day_id.as_str(), encode(snapshot)?)?;
        Ok(())
    }

    async fn load_snapshot(&self, day: &DayId) -> Result<Option<StateSnapshot>> {
        match self.snapshots.get(day.as_str())? {
            Some(value) => Ok(Some(decode(&value)?)),
            None => Ok(None),
        }
    }

    async fn load_latest_snapshot(&self) -> Result<Option<StateSnapshot>> {
        // Day-id keys sort lexicographically in calendar order.
        match self.snapshots.last()? {
            Some((_, value)) => Ok(Some(decode(&value)?)),
            None => Ok(None),
        }
    }

    async fn save_state(&self, day: &DayId, state: &NetworkState) -> Result<()> {
        self.states.insert(day.as_str(), encode(state)?)?;
        Ok(())
    }

    async fn load_state(&self, day: &DayId) -> Result<Option<NetworkState>> {
        match self.states.get(day.as_str())? {
            Some(value) => Ok(Some(decode(&value)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl AssignmentStore for SledBackend {
    async fn put_assignments(
        &self,
        day: &DayId,
        assignments: &[BlockAssignment],
    ) -> Result<()> {
        self.assignments
            .insert(day.as_str(), encode(&assignments.to_vec())?)?;
        Ok(())
    }

    async fn get_by_day(&self, day: &DayId) -> Result<Vec<BlockAssignment>> {
        match self.assignments.get(day.as_str())? {
            Some(value) => decode(&value),
            None => Ok(Vec::new()),
        }
    }

    async fn get_by_node(
        &self,
        day: &DayId,
        account: &AccountId,
    ) -> Result<Option<BlockAssignment>> {
        let all = self.get_by_day(day).await?;
        Ok(all.into_iter().find(|a| a.contributor_id == *account))
    }
}

#[async_trait]
impl SubmissionStore for SledBackend {
    async fn put_submissions(
        &self,
        day: &DayId,
        submissions: &[BlockSubmission],
    ) -> Result<()> {
        self.submissions
            .insert(day.as_str(), encode(&submissions.to_vec())?)?;
        Ok(())
    }

    async fn append_submission(
        &self,
        day: &DayId,
        submission: &BlockSubmission,
    ) -> Result<()> {
        let mut all = self.list_by_day(day).await?;
        all.push(submission.clone());
        self.put_submissions(day, &all).await
    }

    async fn list_by_day(&self, day: &DayId) -> Result<Vec<BlockSubmission>> {
        match self.submissions.get(day.as_str())? {
            Some(value) => decode(&value),
            None => Ok(Vec::new()),
        }
    }

    async fn list_by_node(
        &self,
        day: &DayId,
        account: &AccountId,
    ) -> Result<Vec<BlockSubmission>> {
        let all = self.list_by_day(day).await?;
        Ok(all
            .into_iter()
            .filter(|s| s.contributor_id == *account)
            .collect())
    }
}

#[async_trait]
impl OperationalStore for SledBackend {
    async fn put_node_key(&self, record: &NodeKeyRecord) -> Result<()> {
        self.node_keys
            .insert(record.account_id.as_str(), encode(record)?)?;
        Ok(())
    }

    async fn get_node_key(&self, account: &AccountId) -> Result<Option<NodeKeyRecord>> {
        match self.node_keys.get(account.as_str())? {
            Some(value) => Ok(Some(decode(&value)?)),
            None => Ok(None),
        }
    }

    async fn list_node_keys(&self) -> Result<Vec<NodeKeyRecord>> {
        let mut out = Vec::new();
        for item in self.node_keys.iter() {
            let (_, value) = item?;
            out.push(decode(&value)?);
        }
        Ok(out)
    }

    async fn link_device(&self, record: &DeviceRecord) -> Result<()> {
        self.devices
            .insert(record.device_id.as_bytes(), encode(record)?)?;
        Ok(())
    }

    async fn devices_for_account(&self, account: &AccountId) -> Result<Vec<DeviceRecord>> {
        let mut out = Vec::new();
        for item in self.devices.iter() {
            let (_, value) = item?;
            let record: DeviceRecord = decode(&value)?;
            if record.account_id == *account {
                out.push(record);
            }
        }
        Ok(out)
    }

    async fn save_day_lifecycle(&self, lifecycle: &DayLifecycle) -> Result<()> {
        self.operational.insert(LIFECYCLE_KEY, encode(lifecycle)?)?;
        self.operational.flush_async().await?;
        Ok(())
    }

    async fn load_day_lifecycle(&self) -> Result<Option<DayLifecycle>> {
        match self.operational.get(LIFECYCLE_KEY)? {
            Some(value) => Ok(Some(decode(&value)?)),
            None => Ok(None),
        }
    }

    async fn record_heartbeat(&self, account: &AccountId, at: DateTime<Utc>) -> Result<()> {
        self.operational
            .insert(format!("{HEARTBEAT_PREFIX}{account}").as_bytes(), encode(&at)?)?;
        Ok(())
    }

    async fn last_heartbeat(&self, account: &AccountId) -> Result<Option<DateTime<Utc>>> {
        match self
            .operational
            .get(format!("{HEARTBEAT_PREFIX}{account}").as_bytes())?
        {
            Some(value) => Ok(Some(decode(&value)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl BalanceStore for SledBackend {
    async fn credit_batch(
        &self,
        day: &DayId,
        entry_type: EntryType,
        credits: &[(AccountId, u64)],
    ) -> Result<CreditOutcome> {
        let tag = entry_type_tag(entry_type);
        let credited_key = format!("{day}:{tag}");
        let now = Utc::now();

        // Pre-assign history ids outside the transaction; gaps on retry are
        // harmless, ordering per account is what matters.
        let mut history_ids = Vec::with_capacity(credits.len());
        for _ in credits {
            history_ids.push(self.db.generate_id()?);
        }

        let result = (&self.balances, &self.balance_history, &self.credited).transaction(
            |(balances, history, credited)| {
                if credited.get(credited_key.as_bytes())?.is_some() {
                    return Ok(CreditOutcome::AlreadyCredited);
                }

                for ((account, amount), history_id) in credits.iter().zip(&history_ids) {
                    let mut row = match balances.get(account.as_str().as_bytes())? {
                        Some(value) => rmp_serde::from_slice::<BalanceRow>(&value)
                            .map_err(|e| abort(e.to_string()))?,
                        None => BalanceRow {
                            account_id: account.clone(),
                            balance_micro: 0,
                            total_earned_micro: 0,
                            last_reward_day: None,
                        },
                    };
                    row.balance_micro += amount;
                    row.total_earned_micro += amount;
                    if entry_type == EntryType::Reward {
                        row.last_reward_day = Some(day.clone());
                    }

                    let history_row = BalanceHistoryRow {
                        account_id: account.clone(),
                        day_id: day.clone(),
                        amount_micro: *amount,
                        balance_after_micro: row.balance_micro,
                        entry_type,
                        timestamp: now,
                    };

                    balances.insert(
                        account.as_str().as_bytes(),
                        rmp_serde::to_vec_named(&row).map_err(|e| abort(e.to_string()))?,
                    )?;
                    history.insert(
                        format!("{account}:{history_id:020}").as_bytes(),
                        rmp_serde::to_vec_named(&history_row).map_err(|e| abort(e.to_string()))?,
                    )?;
                }

                credited.insert(credited_key.as_bytes(), vec![1u8])?;
                Ok(CreditOutcome::Credited {
                    entries: credits.len(),
                })
            },
        );

        match result {
            Ok(outcome) => Ok(outcome),
            Err(TransactionError::Abort(msg)) => {
                Err(StorageError::SerializationFailed(msg).into())
            }
            Err(TransactionError::Storage(e)) => Err(anyhow!(e)),
        }
    }

    async fn balance(&self, account: &AccountId) -> Result<Option<BalanceRow>> {
        match self.balances.get(account.as_str())? {
            Some(value) => Ok(Some(decode(&value)?)),
            None => Ok(None),
        }
    }

    async fn history(
        &self,
        account: &AccountId,
        limit: usize,
    ) -> Result<Vec<BalanceHistoryRow>> {
        let mut out = Vec::new();
        for item in self
            .balance_history
            .scan_prefix(format!("{account}:").as_bytes())
            .rev()
            .take(limit)
        {
            let (_, value) = item?;
            out.push(decode(&value)?);
        }
        Ok(out)
    }

    async fn leaderboard(&self, limit: usize) -> Result<Vec<BalanceRow>> {
        let mut rows = Vec::new();
        for item in self.balances.iter() {
            let (_, value) = item?;
            rows.push(decode::<BalanceRow>(&value)?);
        }
        rows.sort_by(|a: &BalanceRow, b: &BalanceRow| {
            b.total_earned_micro.cmp(&a.total_earned_micro)
        });
        rows.truncate(limit);
        Ok(rows)
    }

    async fn total_supply(&self) -> Result<u64> {
        let mut total = 0u64;
        for item in self.balances.iter() {
            let (_, value) = item?;
            total += decode::<BalanceRow>(&value)?.balance_micro;
        }
        Ok(total)
    }
}

fn abort(msg: String) -> ConflictableTransactionError<String> {
    ConflictableTransactionError::Abort(msg)
}
