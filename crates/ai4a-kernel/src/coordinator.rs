//! The day lifecycle state machine.
//!
//! One [`DayCoordinator`] instance owns the live day context and network
//! state behind a single mutex; every operation locks, validates phase,
//! builds its event batch, persists, and only then mutates memory. The
//! event-batch append is the commit boundary: if it fails, nothing moved.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde_json::to_value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use ai4a_events::{payload, projector, DomainEvent, EventChain, EventKind};
use ai4a_hash::{derive_day_seed, hash_of, merkle, roster_hash, DeterministicRng};
use ai4a_ledger::BalanceLedger;
use ai4a_store_core::{
    AssignmentStore, DayLifecycle, EventStore, NodeKeyRecord, OperationalStore, StateStore,
    Stores, SubmissionStore,
};
use ai4a_types::{
    AccountId, BlockAssignment, BlockSubmission, DayId, DayPhase, EpochConfig, NetworkState,
    RewardDistribution, StateSnapshot, SubmissionResult, MAX_SUBMISSION_BATCH,
};

use crate::assignment::assign_work;
use crate::submission::{process_submission, CanaryOutcome};
use crate::{ConflictKind, CoordinatorError, Result};

//─────────────────────────────
//  Live day context
//─────────────────────────────

/// Mutable context of the day in progress. Dropped wholesale on finalize,
/// which also clears the idempotency cache.
#[derive(Debug, Clone)]
struct ActiveDay {
    day_id: DayId,
    seed: u32,
    roster_hash: String,
    roster: Vec<AccountId>,
    canary_block_ids: BTreeSet<String>,
    assignments: BTreeMap<AccountId, BlockAssignment>,
    pending_submissions: Vec<BlockSubmission>,
    // (account, block, day) -> cached decision
    processed: HashMap<String, SubmissionResult>,
}

impl ActiveDay {
    fn cache_key(&self, account: &AccountId, block_id: &str) -> String {
        format!("{account}:{block_id}:{}", self.day_id)
    }
}

struct Inner {
    phase: DayPhase,
    day: Option<ActiveDay>,
    network: NetworkState,
    chain: EventChain,
    // Sequence cursor for the day events are currently being minted under.
    seq_cursor: Option<(DayId, u64)>,
}

//─────────────────────────────
//  Operation outcomes
//─────────────────────────────

/// Outcome of `register`.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterOutcome {
    /// The registered account.
    pub account_id: AccountId,
    /// False when the account already existed (idempotent replay).
    pub created: bool,
}

/// Outcome of `day/start`.
#[derive(Debug, Clone, PartialEq)]
pub struct DayStartOutcome {
    /// The started day.
    pub day_id: DayId,
    /// Seed derived from the day and roster.
    pub seed: u32,
    /// Roster commitment.
    pub roster_hash: String,
    /// Locked roster size.
    pub roster_size: usize,
    /// The day's throughput budget.
    pub total_blocks: u32,
    /// Number of contributors that won at least one batch.
    pub assignment_count: usize,
    /// Number of canaries planted.
    pub canary_count: usize,
}

/// Outcome of `work/request`.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkResponse {
    /// The caller's assignments. Empty when locked out or unlucky.
    pub assignments: Vec<BlockAssignment>,
    /// Set to `ROSTER_LOCKED` when the account registered after day start.
    pub reason: Option<String>,
}

/// Outcome of `work/submit`.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    /// Day the submissions were processed under.
    pub day_id: DayId,
    /// One result per submission, in input order.
    pub results: Vec<SubmissionResult>,
    /// Pending-submission count after the batch.
    pub pending_count: usize,
}

/// Outcome of `day/finalize`.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizeOutcome {
    /// The finalized day.
    pub day_id: DayId,
    /// Day counter after the commit.
    pub day_number: u64,
    /// The full reward distribution.
    pub distribution: RewardDistribution,
    /// Merkle root over the reward entries.
    pub reward_root: String,
    /// Canonical hash of the post-finalize network state.
    pub state_hash: String,
    /// The snapshot written for the day.
    pub snapshot: StateSnapshot,
}

/// Read-only lifecycle report for `/admin/day/status` and `/health`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    /// Current phase.
    pub phase: DayPhase,
    /// Day in progress, when not IDLE.
    pub day_id: Option<DayId>,
    /// Finalized-day counter.
    pub day_number: u64,
    /// Registered contributors.
    pub contributor_count: usize,
    /// Locked roster size (0 when IDLE).
    pub roster_size: usize,
    /// Pending submissions this day.
    pub pending_submissions: usize,
}

//─────────────────────────────
//  Coordinator
//─────────────────────────────

/// The lifecycle state machine. See the crate docs for the concurrency
/// model; all public operations serialize on the internal mutex.
pub struct DayCoordinator {
    inner: Mutex<Inner>,
    stores: Stores,
    ledger: BalanceLedger,
    config: EpochConfig,
}

impl DayCoordinator {
    /// Construct a coordinator, restoring lifecycle, network state, and the
    /// chain cursor from the stores. On a fresh deployment this yields an
    /// empty IDLE coordinator; after a mid-day crash it restores ACTIVE
    /// with the locked roster, assignments, canaries, and idempotency cache
    /// rebuilt from persisted records.
    pub async fn new(stores: Stores, config: EpochConfig) -> anyhow::Result<Self> {
        let last_event = stores.events.last_event().await?;
        let chain = EventChain::new(last_event.as_ref().map(|e| e.event_hash.clone()));
        let seq_cursor = last_event
            .as_ref()
            .map(|e| (e.day_id.clone(), e.sequence_number + 1));

        // Network state: last finalized blob, with registrations replayed on
        // top (projector inserts are idempotent, so over-application is
        // harmless).
        let snapshot = stores.state.load_latest_snapshot().await?;
        let mut network = match &snapshot {
            Some(s) => stores
                .state
                .load_state(&s.day_id)
                .await?
                .context("snapshot present but state blob missing")?,
            None => NetworkState::default(),
        };
        let registrations = stores
            .events
            .query_by_type(EventKind::NodeRegistered, None)
            .await?;
        for event in &registrations {
            projector::apply(&mut network, event)?;
        }

        let mut inner = Inner {
            phase: DayPhase::Idle,
            day: None,
            network,
            chain,
            seq_cursor,
        };

        // Mid-day restart: rehydrate the ACTIVE context.
        if let Some(lifecycle) = stores.operational.load_day_lifecycle().await? {
            if lifecycle.phase == DayPhase::Active {
                if let (Some(day_id), Some(seed), Some(rh)) =
                    (lifecycle.day_id, lifecycle.seed, lifecycle.roster_hash)
                {
                    let day_events = stores.events.query_by_day(&day_id).await?;
                    for event in &day_events {
                        if event.event_type != EventKind::NodeRegistered {
                            projector::apply(&mut inner.network, event)?;
                        }
                    }

                    let mut processed = HashMap::new();
                    for event in &day_events {
                        if event.event_type == EventKind::SubmissionProcessed {
                            let p: payload::SubmissionProcessed = event.decode_payload()?;
                            processed.insert(
                                format!("{}:{}:{day_id}", p.contributor_id, p.block_id),
                                p.result,
                            );
                        }
                    }

                    let assignments = stores
                        .assignments
                        .get_by_day(&day_id)
                        .await?
                        .into_iter()
                        .map(|a| (a.contributor_id.clone(), a))
                        .collect();
                    let pending = stores.submissions.list_by_day(&day_id).await?;

                    info!(day = %day_id, pending = pending.len(), "restored ACTIVE day after restart");
                    inner.day = Some(ActiveDay {
                        day_id,
                        seed,
                        roster_hash: rh,
                        roster: lifecycle.roster,
                        canary_block_ids: lifecycle.canary_block_ids.into_iter().collect(),
                        assignments,
                        pending_submissions: pending,
                        processed,
                    });
                    inner.phase = DayPhase::Active;
                }
            }
        }

        let ledger = BalanceLedger::new(stores.balances.clone());
        Ok(Self {
            inner: Mutex::new(inner),
            stores,
            ledger,
            config,
        })
    }

    /// The stores this coordinator persists through.
    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// The balance ledger view over the same stores.
    pub fn ledger(&self) -> &BalanceLedger {
        &self.ledger
    }

    /// The epoch configuration in force.
    pub fn config(&self) -> &EpochConfig {
        &self.config
    }

    async fn next_sequence(&self, inner: &Inner, day: &DayId) -> anyhow::Result<u64> {
        match &inner.seq_cursor {
            Some((cursor_day, next)) if cursor_day == day => Ok(*next),
            _ => Ok(self
                .stores
                .events
                .last_event_for_day(day)
                .await?
                .map(|e| e.sequence_number + 1)
                .unwrap_or(0)),
        }
    }

    //───────────────────── operations ─────────────────────

    /// Register an account. Allowed in any phase; idempotent on duplicates.
    pub async fn register(
        &self,
        account_id: AccountId,
        public_key_hex: String,
        now: DateTime<Utc>,
    ) -> Result<RegisterOutcome> {
        let mut inner = self.inner.lock().await;
        if inner.network.contributors.contains_key(&account_id) {
            debug!(account = %account_id, "duplicate registration");
            return Ok(RegisterOutcome {
                account_id,
                created: false,
            });
        }

        // The key binding lands before the event; an orphan binding is
        // harmless if the append fails.
        self.stores
            .operational
            .put_node_key(&NodeKeyRecord {
                account_id: account_id.clone(),
                public_key_hex,
                registered_at: now,
            })
            .await?;

        let day = DayId::containing(now);
        let seq = self.next_sequence(&inner, &day).await?;
        let mut chain = inner.chain.clone();
        let event = chain
            .next(
                day.clone(),
                seq,
                EventKind::NodeRegistered,
                Some(account_id.clone()),
                to_value(payload::NodeRegistered {
                    account_id: account_id.clone(),
                })
                .map_err(anyhow::Error::from)?,
                now,
            )
            .map_err(anyhow::Error::from)?;
        self.stores
            .events
            .append(std::slice::from_ref(&event))
            .await?;

        inner.chain = chain;
        inner.seq_cursor = Some((day, seq + 1));
        projector::apply(&mut inner.network, &event).map_err(anyhow::Error::from)?;
        info!(account = %account_id, "registered contributor");
        Ok(RegisterOutcome {
            account_id,
            created: true,
        })
    }

    /// Record an authenticated liveness ping.
    pub async fn heartbeat(&self, account_id: &AccountId, now: DateTime<Utc>) -> Result<()> {
        let inner = self.inner.lock().await;
        if !inner.network.contributors.contains_key(account_id) {
            return Err(CoordinatorError::NotFound(account_id.to_string()));
        }
        drop(inner);
        self.stores
            .operational
            .record_heartbeat(account_id, now)
            .await?;
        Ok(())
    }

    /// Start the day: lock the roster, derive the seed, run the lottery,
    /// persist, and go ACTIVE. Allowed only in IDLE.
    pub async fn start_day(
        &self,
        day_id: Option<DayId>,
        now: DateTime<Utc>,
    ) -> Result<DayStartOutcome> {
        let mut inner = self.inner.lock().await;
        match inner.phase {
            DayPhase::Idle => {}
            DayPhase::Active => {
                return Err(CoordinatorError::StateConflict(ConflictKind::DayAlreadyActive))
            }
            DayPhase::Finalizing => {
                return Err(CoordinatorError::StateConflict(ConflictKind::DayFinalizing))
            }
        }

        let day = day_id.unwrap_or_else(|| DayId::containing(now));
        let roster = inner.network.roster();
        let rh = roster_hash(&roster);
        let seed = derive_day_seed(&day, &rh);
        let mut rng = DeterministicRng::from_seed(seed);
        let outcome = assign_work(
            &inner.network.contributors,
            &roster,
            &day,
            &self.config.assignment,
            &self.config.canary,
            &mut rng,
            now,
        );

        self.stores
            .assignments
            .put_assignments(&day, &outcome.assignments)
            .await?;

        let seq = self.next_sequence(&inner, &day).await?;
        let mut chain = inner.chain.clone();
        let mut events = Vec::with_capacity(3);
        events.push(
            chain
                .next(
                    day.clone(),
                    seq,
                    EventKind::RosterLocked,
                    None,
                    to_value(payload::RosterLocked {
                        roster: roster.clone(),
                        roster_hash: rh.clone(),
                        seed,
                    })
                    .map_err(anyhow::Error::from)?,
                    now,
                )
                .map_err(anyhow::Error::from)?,
        );
        events.push(
            chain
                .next(
                    day.clone(),
                    seq + 1,
                    EventKind::WorkAssigned,
                    None,
                    to_value(payload::WorkAssigned {
                        assignments: outcome.assignments.clone(),
                        total_blocks: outcome.total_blocks,
                    })
                    .map_err(anyhow::Error::from)?,
                    now,
                )
                .map_err(anyhow::Error::from)?,
        );
        events.push(
            chain
                .next(
                    day.clone(),
                    seq + 2,
                    EventKind::CanariesSelected,
                    None,
                    to_value(payload::CanariesSelected {
                        canary_block_ids: outcome.canary_block_ids.clone(),
                    })
                    .map_err(anyhow::Error::from)?,
                    now,
                )
                .map_err(anyhow::Error::from)?,
        );
        self.stores.events.append(&events).await?;
        // The append is the commit point; keep the chain cursor in sync
        // with what is now on disk even if a later write fails.
        inner.chain = chain;
        inner.seq_cursor = Some((day.clone(), seq + 3));

        self.stores
            .operational
            .save_day_lifecycle(&DayLifecycle {
                phase: DayPhase::Active,
                day_id: Some(day.clone()),
                seed: Some(seed),
                roster: roster.clone(),
                roster_hash: Some(rh.clone()),
                canary_block_ids: outcome.canary_block_ids.clone(),
            })
            .await?;

        let report = DayStartOutcome {
            day_id: day.clone(),
            seed,
            roster_hash: rh.clone(),
            roster_size: roster.len(),
            total_blocks: outcome.total_blocks,
            assignment_count: outcome.assignments.len(),
            canary_count: outcome.canary_block_ids.len(),
        };

        inner.day = Some(ActiveDay {
            day_id: day.clone(),
            seed,
            roster_hash: rh,
            roster,
            canary_block_ids: outcome.canary_block_ids.into_iter().collect(),
            assignments: outcome
                .assignments
                .into_iter()
                .map(|a| (a.contributor_id.clone(), a))
                .collect(),
            pending_submissions: Vec::new(),
            processed: HashMap::new(),
        });
        inner.phase = DayPhase::Active;

        info!(day = %day, roster = report.roster_size, blocks = report.total_blocks,
              canaries = report.canary_count, "day started");
        Ok(report)
    }

    /// Return the caller's assignment. Allowed only in ACTIVE.
    pub async fn request_work(&self, account_id: &AccountId) -> Result<WorkResponse> {
        let inner = self.inner.lock().await;
        let day = self.require_active(&inner)?;

        if !day.roster.contains(account_id) {
            return Ok(WorkResponse {
                assignments: Vec::new(),
                reason: Some("ROSTER_LOCKED".to_string()),
            });
        }
        Ok(WorkResponse {
            assignments: day.assignments.get(account_id).cloned().into_iter().collect(),
            reason: None,
        })
    }

    /// Process a batch of submissions. Allowed only in ACTIVE.
    pub async fn submit_work(
        &self,
        account_id: &AccountId,
        client_day_id: Option<DayId>,
        submissions: Vec<BlockSubmission>,
        now: DateTime<Utc>,
    ) -> Result<SubmitOutcome> {
        if submissions.len() > MAX_SUBMISSION_BATCH {
            return Err(CoordinatorError::Validation(format!(
                "batch of {} exceeds limit {MAX_SUBMISSION_BATCH}",
                submissions.len()
            )));
        }

        let mut inner = self.inner.lock().await;
        let day_id = {
            let day = self.require_active(&inner)?;
            if let Some(client_day) = &client_day_id {
                if *client_day != day.day_id {
                    return Err(CoordinatorError::StateConflict(ConflictKind::DayMismatch));
                }
            }
            day.day_id.clone()
        };
        if !inner.network.contributors.contains_key(account_id) {
            return Err(CoordinatorError::NotFound(account_id.to_string()));
        }

        let seq = self.next_sequence(&inner, &day_id).await?;
        let mut chain = inner.chain.clone();
        let mut next_seq = seq;
        let mut events: Vec<DomainEvent> = Vec::new();
        let mut results = Vec::with_capacity(submissions.len());

        // Staged mutations, applied only after the batch append succeeds.
        let mut accepted: Vec<BlockSubmission> = Vec::new();
        let mut cache_inserts: Vec<(String, SubmissionResult)> = Vec::new();
        let mut contributor_updates: BTreeMap<AccountId, ai4a_types::Contributor> =
            BTreeMap::new();

        {
            let day = inner.day.as_ref().expect("phase checked above");
            for raw in &submissions {
                let mut submission = raw.clone();
                submission.contributor_id = account_id.clone();

                let key = day.cache_key(account_id, &submission.block_id);
                if let Some(cached) = day.processed.get(&key) {
                    results.push(cached.clone());
                    continue;
                }
                if let Some(pending) = cache_inserts.iter().find(|(k, _)| *k == key) {
                    // Duplicate within the same batch replays the first
                    // decision too.
                    results.push(pending.1.clone());
                    continue;
                }

                let owns_block = day
                    .assignments
                    .get(account_id)
                    .map(|a| a.block_ids.iter().any(|b| *b == submission.block_id))
                    .unwrap_or(false);

                let mut emit = |seq_slot: &mut u64,
                                kind: EventKind,
                                payload_value: serde_json::Value|
                 -> Result<()> {
                    let event = chain
                        .next(
                            day_id.clone(),
                            *seq_slot,
                            kind,
                            Some(account_id.clone()),
                            payload_value,
                            now,
                        )
                        .map_err(anyhow::Error::from)?;
                    *seq_slot += 1;
                    events.push(event);
                    Ok(())
                };

                emit(
                    &mut next_seq,
                    EventKind::SubmissionReceived,
                    to_value(payload::SubmissionReceived {
                        submission: submission.clone(),
                    })
                    .map_err(anyhow::Error::from)?,
                )?;

                if !owns_block {
                    let result = SubmissionResult::rejected("NOT_ASSIGNED");
                    emit(
                        &mut next_seq,
                        EventKind::SubmissionProcessed,
                        to_value(payload::SubmissionProcessed {
                            contributor_id: account_id.clone(),
                            block_id: submission.block_id.clone(),
                            result: result.clone(),
                            block: None,
                        })
                        .map_err(anyhow::Error::from)?,
                    )?;
                    cache_inserts.push((key, result.clone()));
                    results.push(result);
                    continue;
                }

                let is_canary = day.canary_block_ids.contains(&submission.block_id);
                let base = contributor_updates
                    .get(account_id)
                    .cloned()
                    .unwrap_or_else(|| inner.network.contributors[account_id].clone());
                let processed =
                    process_submission(&base, &submission, is_canary, &self.config.rewards, now);

                emit(
                    &mut next_seq,
                    EventKind::SubmissionProcessed,
                    to_value(payload::SubmissionProcessed {
                        contributor_id: account_id.clone(),
                        block_id: submission.block_id.clone(),
                        result: processed.result.clone(),
                        block: processed.block.clone(),
                    })
                    .map_err(anyhow::Error::from)?,
                )?;

                match &processed.canary {
                    Some(CanaryOutcome::Passed { passes }) => {
                        emit(
                            &mut next_seq,
                            EventKind::CanaryPassed,
                            to_value(payload::CanaryPassed {
                                contributor_id: account_id.clone(),
                                block_id: submission.block_id.clone(),
                                canary_passes: *passes,
                            })
                            .map_err(anyhow::Error::from)?,
                        )?;
                    }
                    Some(CanaryOutcome::Failed {
                        failures,
                        reputation_multiplier,
                        penalty_applied,
                        failure_time,
                    }) => {
                        emit(
                            &mut next_seq,
                            EventKind::CanaryFailed,
                            to_value(payload::CanaryFailed {
                                contributor_id: account_id.clone(),
                                block_id: submission.block_id.clone(),
                                canary_failures: *failures,
                                reputation_multiplier: *reputation_multiplier,
                                penalty_applied: *penalty_applied,
                                failure_time: *failure_time,
                            })
                            .map_err(anyhow::Error::from)?,
                        )?;
                        warn!(account = %account_id, block = %submission.block_id,
                              reputation = *reputation_multiplier, "canary failed");
                    }
                    None => {}
                }

                if processed.result.accepted {
                    accepted.push(submission.clone());
                }
                contributor_updates.insert(account_id.clone(), processed.contributor);
                cache_inserts.push((key, processed.result.clone()));
                results.push(processed.result);
            }
        }

        if !events.is_empty() {
            self.stores.events.append(&events).await?;
            // Decisions are committed; memory must reflect them even if the
            // incremental submission write below fails, or a retry would
            // re-process and duplicate SUBMISSION_PROCESSED.
            inner.chain = chain;
            inner.seq_cursor = Some((day_id.clone(), next_seq));
            for submission in &accepted {
                if let Err(e) = self
                    .stores
                    .submissions
                    .append_submission(&day_id, submission)
                    .await
                {
                    // Recoverable: finalize rewrites the day's submissions
                    // wholesale from the pending list.
                    warn!(error = %e, block = %submission.block_id,
                          "incremental submission write failed");
                }
            }
        }

        for (account, contributor) in contributor_updates {
            inner.network.contributors.insert(account, contributor);
        }
        let day = inner.day.as_mut().expect("phase checked above");
        for (key, result) in cache_inserts {
            day.processed.insert(key, result);
        }
        day.pending_submissions.extend(accepted);
        let pending_count = day.pending_submissions.len();

        Ok(SubmitOutcome {
            day_id,
            results,
            pending_count,
        })
    }

    /// Finalize the day: compute rewards, commit the Merkle root, write the
    /// chained events and snapshot, credit the ledger, reset to IDLE.
    /// Allowed only in ACTIVE; any failure reverts to ACTIVE.
    pub async fn finalize_day(&self, now: DateTime<Utc>) -> Result<FinalizeOutcome> {
        let mut inner = self.inner.lock().await;
        match inner.phase {
            DayPhase::Active => {}
            DayPhase::Idle => {
                return Err(CoordinatorError::StateConflict(ConflictKind::DayNotStarted))
            }
            DayPhase::Finalizing => {
                return Err(CoordinatorError::StateConflict(ConflictKind::DayFinalizing))
            }
        }
        inner.phase = DayPhase::Finalizing;

        match self.run_finalize(&mut inner, now).await {
            Ok(outcome) => {
                inner.phase = DayPhase::Idle;
                inner.day = None;
                Ok(outcome)
            }
            Err(e) => {
                // Operator retry path: the day stays ACTIVE.
                warn!(error = %e, "finalize failed, reverting to ACTIVE");
                inner.phase = DayPhase::Active;
                Err(e)
            }
        }
    }

    async fn run_finalize(
        &self,
        inner: &mut Inner,
        now: DateTime<Utc>,
    ) -> Result<FinalizeOutcome> {
        let (day_id, pending) = {
            let day = inner.day.as_ref().expect("finalize requires ACTIVE");
            (day.day_id.clone(), day.pending_submissions.clone())
        };

        // Reward math runs on a clock pinned to the day so replays
        // reproduce it exactly.
        let pinned = day_id.pinned_noon();
        let distribution = crate::rewards::calculate_rewards(
            &inner.network.contributors,
            &self.config.rewards,
            &day_id,
            pinned,
        );
        let reward_root = merkle::reward_root(&distribution.rewards);
        let reward_hash = hash_of(&distribution.rewards).map_err(anyhow::Error::from)?;
        let pre_commit_state_hash = hash_of(&inner.network).map_err(anyhow::Error::from)?;

        let day_number = inner.network.day_number + 1;
        let seq = self.next_sequence(inner, &day_id).await?;
        let mut chain = inner.chain.clone();
        let finalized = chain
            .next(
                day_id.clone(),
                seq,
                EventKind::DayFinalized,
                None,
                to_value(payload::DayFinalized {
                    total_emissions: distribution.total_emissions,
                    base_pool_total: distribution.base_pool_total,
                    performance_pool_total: distribution.performance_pool_total,
                    active_count: distribution.active_contributor_count,
                    rewards: distribution.rewards.clone(),
                    reward_root: reward_root.clone(),
                    state_hash: pre_commit_state_hash,
                })
                .map_err(anyhow::Error::from)?,
                now,
            )
            .map_err(anyhow::Error::from)?;
        let committed = chain
            .next(
                day_id.clone(),
                seq + 1,
                EventKind::RewardsCommitted,
                None,
                to_value(payload::RewardsCommitted {
                    day_id: day_id.clone(),
                    reward_root: reward_root.clone(),
                    day_number,
                })
                .map_err(anyhow::Error::from)?,
                now,
            )
            .map_err(anyhow::Error::from)?;

        let mut new_network = inner.network.clone();
        new_network.day_number = day_number;
        let state_hash = hash_of(&new_network).map_err(anyhow::Error::from)?;

        let snapshot = StateSnapshot {
            day_id: day_id.clone(),
            day_number,
            state_hash: state_hash.clone(),
            last_event_hash: committed.event_hash.clone(),
            reward_hash,
            contributor_count: new_network.contributors.len(),
            created_at: now,
        };

        // Commit boundary: once the event batch lands the day is
        // finalized; everything after is re-derivable or idempotent.
        self.stores
            .events
            .append(&[finalized, committed])
            .await?;
        inner.chain = chain;
        inner.seq_cursor = Some((day_id.clone(), seq + 2));
        self.stores.state.save_state(&day_id, &new_network).await?;
        self.stores.state.save_snapshot(&snapshot).await?;
        self.ledger
            .credit_rewards(&day_id, &distribution.rewards)
            .await?;
        self.stores
            .submissions
            .put_submissions(&day_id, &pending)
            .await?;
        self.stores
            .operational
            .save_day_lifecycle(&DayLifecycle::idle())
            .await?;

        inner.network = new_network;

        info!(day = %day_id, day_number, active = distribution.active_contributor_count,
              root = %reward_root, "day finalized");
        Ok(FinalizeOutcome {
            day_id,
            day_number,
            distribution,
            reward_root,
            state_hash,
            snapshot,
        })
    }

    /// Lifecycle report.
    pub async fn status(&self) -> StatusReport {
        let inner = self.inner.lock().await;
        StatusReport {
            phase: inner.phase,
            day_id: inner.day.as_ref().map(|d| d.day_id.clone()),
            day_number: inner.network.day_number,
            contributor_count: inner.network.contributors.len(),
            roster_size: inner.day.as_ref().map(|d| d.roster.len()).unwrap_or(0),
            pending_submissions: inner
                .day
                .as_ref()
                .map(|d| d.pending_submissions.len())
                .unwrap_or(0),
        }
    }

    /// Snapshot of the live network state.
    pub async fn network_state(&self) -> NetworkState {
        self.inner.lock().await.network.clone()
    }

    //───────────────────── read models ─────────────────────

    /// The persisted distribution record for a finalized day.
    pub async fn day_distribution(
        &self,
        day: &DayId,
    ) -> Result<Option<payload::DayFinalized>> {
        let events = self
            .stores
            .events
            .query_by_type(EventKind::DayFinalized, Some((day.clone(), day.clone())))
            .await?;
        match events.first() {
            Some(event) => Ok(Some(event.decode_payload().map_err(anyhow::Error::from)?)),
            None => Ok(None),
        }
    }

    /// Merkle root and leaf count for a finalized day.
    pub async fn reward_root(&self, day: &DayId) -> Result<Option<(String, usize)>> {
        Ok(self
            .day_distribution(day)
            .await?
            .map(|p| (p.reward_root, p.rewards.len())))
    }

    /// Merkle proof for one account's reward on a finalized day.
    pub async fn reward_proof(
        &self,
        day: &DayId,
        account: &AccountId,
    ) -> Result<Option<(String, merkle::MerkleProof, String)>> {
        let finalized = match self.day_distribution(day).await? {
            Some(p) => p,
            None => return Ok(None),
        };
        let proof = merkle::reward_proof(&finalized.rewards, account)
            .map_err(anyhow::Error::from)?;
        Ok(proof.map(|(leaf, proof)| (leaf, proof, finalized.reward_root)))
    }

    fn require_active<'a>(&self, inner: &'a Inner) -> Result<&'a ActiveDay> {
        match inner.phase {
            DayPhase::Active => Ok(inner.day.as_ref().expect("ACTIVE phase implies a day")),
            DayPhase::Idle => Err(CoordinatorError::StateConflict(ConflictKind::DayNotStarted)),
            DayPhase::Finalizing => {
                Err(CoordinatorError::StateConflict(ConflictKind::DayFinalizing))
            }
        }
    }
}
