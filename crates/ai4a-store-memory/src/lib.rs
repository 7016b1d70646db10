#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **ai4a-store-memory** – In-memory storage driver for the AI4All
//! coordinator.
//!
//! This crate provides a fast, non-persistent back-end implementing all six
//! store contracts. All data is lost when the process terminates, which
//! makes it suitable for tests, development, and `STORE_BACKEND=memory`
//! deployments where durability is not required.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use ai4a_events::{DomainEvent, EventKind};
use ai4a_store_core::{
    AssignmentStore, BalanceStore, CreditOutcome, DayLifecycle, DeviceRecord, EventStore,
    NodeKeyRecord, OperationalStore, StateStore, SubmissionStore,
};
use ai4a_types::{
    AccountId, BalanceHistoryRow, BalanceRow, BlockAssignment, BlockSubmission, DayId, EntryType,
    NetworkState, StateSnapshot,
};

fn entry_type_tag(entry_type: EntryType) -> &'static str {
    match entry_type {
        EntryType::Reward => "REWARD",
        EntryType::Crawl => "CRAWL",
        EntryType::Task => "TASK",
    }
}

fn in_range(day: &DayId, range: &Option<(DayId, DayId)>) -> bool {
    match range {
        Some((from, to)) => day >= from && day <= to,
        None => true,
    }
}

#[derive(Debug, Default)]
struct Tables {
    // Chain order; per-day sequence order falls out of it.
    events: Vec<DomainEvent>,
    snapshots: BTreeMap<DayId, StateSnapshot>,
    states: BTreeMap<DayId, NetworkState>,
    assignments: BTreeMap<DayId, Vec<BlockAssignment>>,
    submissions: BTreeMap<DayId, Vec<BlockSubmission>>,
    node_keys: BTreeMap<AccountId, NodeKeyRecord>,
    devices: BTreeMap<String, DeviceRecord>,
    lifecycle: Option<DayLifecycle>,
    heartbeats: BTreeMap<AccountId, DateTime<Utc>>,
    balances: BTreeMap<AccountId, BalanceRow>,
    balance_history: Vec<BalanceHistoryRow>,
    credited: BTreeSet<(DayId, &'static str)>,
}

/// An in-memory, non-persistent back-end for all six store contracts.
///
/// Every table lives behind one `RwLock`, so each trait call is atomic and
/// readers observe completed writes, matching the durable back-end's
/// guarantees without the durability.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryBackend {
    /// Creates a new, empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored events.
    pub async fn event_count(&self) -> usize {
        self.tables.read().await.events.len()
    }

    /// Clear every table. Useful between test scenarios.
    pub async fn clear(&self) {
        let mut t = self.tables.write().await;
        *t = Tables::default();
    }
}

#[async_trait]
impl EventStore for MemoryBackend {
    async fn append(&self, events: &[DomainEvent]) -> Result<()> {
        // Single write-lock section makes the batch all-or-nothing.
        let mut t = self.tables.write().await;
        t.events.extend_from_slice(events);
        Ok(())
    }

    async fn query_by_day(&self, day: &DayId) -> Result<Vec<DomainEvent>> {
        let t = self.tables.read().await;
        Ok(t.events.iter().filter(|e| e.day_id == *day).cloned().collect())
    }

    async fn query_by_type(
        &self,
        kind: EventKind,
        range: Option<(DayId, DayId)>,
    ) -> Result<Vec<DomainEvent>> {
        let t = self.tables.read().await;
        Ok(t.events
            .iter()
            .filter(|e| e.event_type == kind && in_range(&e.day_id, &range))
            .cloned()
            .collect())
    }

    async fn query_by_actor(
        &self,
        actor: &AccountId,
        range: Option<(DayId, DayId)>,
    ) -> Result<Vec<DomainEvent>> {
        let t = self.tables.read().await;
        Ok(t.events
            .iter()
            .filter(|e| e.actor_id.as_ref() == Some(actor) && in_range(&e.day_id, &range))
            .cloned()
            .collect())
    }

    async fn last_event(&self) -> Result<Option<DomainEvent>> {
        Ok(self.tables.read().await.events.last().cloned())
    }

    async fn last_event_for_day(&self, day: &DayId) -> Result<Option<DomainEvent>> {
        let t = self.tables.read().await;
        Ok(t.events.iter().rev().find(|e| e.day_id == *day).cloned())
    }
}

#[async_trait]
impl StateStore for MemoryBackend {
    async fn save_snapshot(&self, snapshot: &StateSnapshot) -> Result<()> {
        let mut t = self.tables.write().await;
        t.snapshots.insert(snapshot.day_id.clone(), snapshot.clone());
        Ok(())
    }

    async fn load_snapshot(&self, day: &DayId) -> Result<Option<StateSnapshot>> {
        Ok(self.tables.read().await.snapshots.get(day).cloned())
    }

    async fn load_latest_snapshot(&self) -> Result<Option<StateSnapshot>> {
        let t = self.tables.read().await;
        Ok(t.snapshots.values().next_back().cloned())
    }

    async fn save_state(&self, day: &DayId, state: &NetworkState) -> Result<()> {
        let mut t = self.tables.write().await;
        t.states.insert(day.clone(), state.clone());
        Ok(())
    }

    async fn load_state(&self, day: &DayId) -> Result<Option<NetworkState>> {
        Ok(self.tables.read().await.states.get(day).cloned())
    }
}

#[async_trait]
impl AssignmentStore for MemoryBackend {
    async fn put_assignments(
        &self,
        day: &DayId,
        assignments: &[BlockAssignment],
    ) -> Result<()> {
        let mut t = self.tables.write().await;
        t.assignments.insert(day.clone(), assignments.to_vec());
        Ok(())
    }

    async fn get_by_day(&self, day: &DayId) -> Result<Vec<BlockAssignment>> {
        Ok(self
            .tables
            .read()
            .await
            .assignments
            .get(day)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_by_node(
        &self,
        day: &DayId,
        account: &AccountId,
    ) -> Result<Option<BlockAssignment>> {
        let t = self.tables.read().await;
        Ok(t.assignments
            .get(day)
            .and_then(|list| list.iter().find(|a| a.contributor_id == *account).cloned()))
    }
}

#[async_trait]
impl SubmissionStore for MemoryBackend {
    async fn put_submissions(
        &self,
        day: &DayId,
        submissions: &[BlockSubmission],
    ) -> Result<()> {
        let mut t = self.tables.write().await;
        t.submissions.insert(day.clone(), submissions.to_vec());
        Ok(())
    }

    async fn append_submission(
        &self,
        day: &DayId,
        submission: &BlockSubmission,
    ) -> Result<()> {
        let mut t = self.tables.write().await;
        t.submissions
            .entry(day.clone())
            .or_default()
            .push(submission.clone());
        Ok(())
    }

    async fn list_by_day(&self, day: &DayId) -> Result<Vec<BlockSubmission>> {
        Ok(self
            .tables
            .read()
            .await
            .submissions
            .get(day)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_by_node(
        &self,
        day: &DayId,
        account: &AccountId,
    ) -> Result<Vec<BlockSubmission>> {
        let t = self.tables.read().await;
        Ok(t.submissions
            .get(day)
            .map(|list| {
                list.iter()
                    .filter(|s| s.contributor_id == *account)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl OperationalStore for MemoryBackend {
    async fn put_node_key(&self, record: &NodeKeyRecord) -> Result<()> {
        let mut t = self.tables.write().await;
        t.node_keys.insert(record.account_id.clone(), record.clone());
        Ok(())
    }

    async fn get_node_key(&self, account: &AccountId) -> Result<Option<NodeKeyRecord>> {
        Ok(self.tables.read().await.node_keys.get(account).cloned())
    }

    async fn list_node_keys(&self) -> Result<Vec<NodeKeyRecord>> {
        Ok(self.tables.read().await.node_keys.values().cloned().collect())
    }

    async fn link_device(&self, record: &DeviceRecord) -> Result<()> {
        let mut t = self.tables.write().await;
        t.devices.insert(record.device_id.clone(), record.clone());
        Ok(())
    }

    async fn devices_for_account(&self, account: &AccountId) -> Result<Vec<DeviceRecord>> {
        let t = self.tables.read().await;
        Ok(t.devices
            .values()
            .filter(|d| d.account_id == *account)
            .cloned()
            .collect())
    }

    async fn save_day_lifecycle(&self, lifecycle: &DayLifecycle) -> Result<()> {
        self.tables.write().await.lifecycle = Some(lifecycle.clone());
        Ok(())
    }

    async fn load_day_lifecycle(&self) -> Result<Option<DayLifecycle>> {
        Ok(self.tables.read().await.lifecycle.clone())
    }

    async fn record_heartbeat(&self, account: &AccountId, at: DateTime<Utc>) -> Result<()> {
        self.tables.write().await.heartbeats.insert(account.clone(), at);
        Ok(())
    }

    async fn last_heartbeat(&self, account: &AccountId) -> Result<Option<DateTime<Utc>>> {
        Ok(self.tables.read().await.heartbeats.get(account).copied())
    }
}

#[async_trait]
impl BalanceStore for MemoryBackend {
    async fn credit_batch(
        &self,
        day: &DayId,
        entry_type: EntryType,
        credits: &[(AccountId, u64)],
    ) -> Result<CreditOutcome> {
        let mut t = self.tables.write().await;
        let key = (day.clone(), entry_type_tag(entry_type));
        if t.credited.contains(&key) {
            return Ok(CreditOutcome::AlreadyCredited);
        }

        let now = Utc::now();
        for (account, amount) in credits {
            let row = t
                .balances
                .entry(account.clone())
                .or_insert_with(|| BalanceRow {
                    account_id: account.clone(),
                    balance_micro: 0,
                    total_earned_micro: 0,
                    last_reward_day: None,
                });
            row.balance_micro += amount;
            row.total_earned_micro += amount;
            if entry_type == EntryType::Reward {
                row.last_reward_day = Some(day.clone());
            }
            let balance_after = row.balance_micro;
            t.balance_history.push(BalanceHistoryRow {
                account_id: account.clone(),
                day_id: day.clone(),
                amount_micro: *amount,
                balance_after_micro: balance_after,
                entry_type,
                timestamp: now,
            });
        }
        t.credited.insert(key);
        Ok(CreditOutcome::Credited {
            entries: credits.len(),
        })
    }

    async fn balance(&self, account: &AccountId) -> Result<Option<BalanceRow>> {
        Ok(self.tables.read().await.balances.get(account).cloned())
    }

    async fn history(
        &self,
        account: &AccountId,
        limit: usize,
    ) -> Result<Vec<BalanceHistoryRow>> {
        let t = self.tables.read().await;
        Ok(t.balance_history
            .iter()
            .rev()
            .filter(|h| h.account_id == *account)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn leaderboard(&self, limit: usize) -> Result<Vec<BalanceRow>> {
        let t = self.tables.read().await;
        let mut rows: Vec<BalanceRow> = t.balances.values().cloned().collect();
        rows.sort_by(|a, b| b.total_earned_micro.cmp(&a.total_earned_micro));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn total_supply(&self) -> Result<u64> {
        let t = self.tables.read().await;
        Ok(t.balances.values().map(|r| r.balance_micro).sum())
    }
}
