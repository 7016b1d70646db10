#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **ai4a-ledger** – Balance-ledger semantics for the AI4All coordinator.
//!
//! Rewards are computed in floating-point tokens but stored in integer
//! micro-units, which eliminates drift once amounts enter the ledger. The
//! ledger is idempotent per `(day, entry type)`, so finalize retries and
//! crash-replays can re-credit safely. Peripheral credit sources (crawled
//! data, on-demand tasks) enter through [`BalanceLedger::credit_external`]
//! with the same invariants.

use std::sync::Arc;

use tracing::info;

use ai4a_store_core::{BalanceStore, CreditOutcome};
use ai4a_types::{AccountId, BalanceHistoryRow, BalanceRow, DayId, EntryType, RewardEntry};

/// Micro-units per whole token.
pub const MICROS_PER_TOKEN: f64 = 1_000_000.0;

/// Convert a fractional token amount to integer micro-units.
///
/// Negative and non-finite inputs clamp to zero; reward math can produce a
/// `-0.0` but never a genuinely negative entry.
pub fn to_micro(tokens: f64) -> u64 {
    if !tokens.is_finite() || tokens <= 0.0 {
        return 0;
    }
    (tokens * MICROS_PER_TOKEN).round() as u64
}

/// Ledger misuse errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LedgerError {
    /// `credit_external` was called with the reward entry type, which is
    /// reserved for the finalize path.
    #[error("REWARD credits must go through credit_rewards")]
    ReservedEntryType,
}

/// Accumulating per-account balances in integer micro-units.
pub struct BalanceLedger {
    store: Arc<dyn BalanceStore>,
}

impl BalanceLedger {
    /// Build a ledger over the given store.
    pub fn new(store: Arc<dyn BalanceStore>) -> Self {
        Self { store }
    }

    /// Credit a finalized day's reward distribution. Idempotent by day:
    /// a second call for the same day is a no-op.
    pub async fn credit_rewards(
        &self,
        day: &DayId,
        rewards: &[RewardEntry],
    ) -> anyhow::Result<CreditOutcome> {
        let credits: Vec<(AccountId, u64)> = rewards
            .iter()
            .map(|r| (r.account_id.clone(), to_micro(r.total_reward)))
            .filter(|(_, micro)| *micro > 0)
            .collect();

        let outcome = self
            .store
            .credit_batch(day, EntryType::Reward, &credits)
            .await?;
        match outcome {
            CreditOutcome::Credited { entries } => {
                info!(day = %day, entries, "credited day rewards");
            }
            CreditOutcome::AlreadyCredited => {
                info!(day = %day, "day rewards already credited");
            }
        }
        Ok(outcome)
    }

    /// Credit a peripheral source (`CRAWL` or `TASK`) for a day, with the
    /// same idempotency-by-`(day, type)` invariant as rewards.
    pub async fn credit_external(
        &self,
        day: &DayId,
        entry_type: EntryType,
        credits: &[(AccountId, f64)],
    ) -> anyhow::Result<CreditOutcome> {
        if entry_type == EntryType::Reward {
            return Err(LedgerError::ReservedEntryType.into());
        }
        let micro: Vec<(AccountId, u64)> = credits
            .iter()
            .map(|(account, tokens)| (account.clone(), to_micro(*tokens)))
            .filter(|(_, m)| *m > 0)
            .collect();
        self.store.credit_batch(day, entry_type, &micro).await
    }

    /// Current balance row for an account.
    pub async fn balance(&self, account: &AccountId) -> anyhow::Result<Option<BalanceRow>> {
        self.store.balance(account).await
    }

    /// Credit history for an account, most recent first.
    pub async fn history(
        &self,
        account: &AccountId,
        limit: usize,
    ) -> anyhow::Result<Vec<BalanceHistoryRow>> {
        self.store.history(account, limit).await
    }

    /// Accounts ordered by lifetime earnings, descending.
    pub async fn leaderboard(&self, limit: usize) -> anyhow::Result<Vec<BalanceRow>> {
        self.store.leaderboard(limit).await
    }

    /// Total supply: the sum of every account's balance.
    pub async fn total_supply(&self) -> anyhow::Result<u64> {
        self.store.total_supply().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ai4a_store_memory::MemoryBackend;

    fn acct(tail: char) -> AccountId {
        AccountId::unchecked(format!("ai4a{}", tail.to_string().repeat(40)))
    }

    fn day() -> DayId {
        DayId::parse("2026-01-28").unwrap()
    }

    fn ledger() -> BalanceLedger {
        BalanceLedger::new(Arc::new(MemoryBackend::new()))
    }

    fn entry(tail: char, total: f64) -> RewardEntry {
        RewardEntry {
            account_id: acct(tail),
            base_pool_reward: total / 2.0,
            performance_pool_reward: total / 2.0,
            total_reward: total,
        }
    }

    #[test]
    fn micro_conversion_rounds_and_clamps() {
        assert_eq!(to_micro(1.0), 1_000_000);
        assert_eq!(to_micro(0.123_456_7), 123_457);
        assert_eq!(to_micro(0.0), 0);
        assert_eq!(to_micro(-0.5), 0);
        assert_eq!(to_micro(f64::NAN), 0);
    }

    #[tokio::test]
    async fn double_credit_has_single_effect() {
        let ledger = ledger();
        let rewards = vec![entry('a', 3.5), entry('b', 1.5)];

        let first = ledger.credit_rewards(&day(), &rewards).await.unwrap();
        assert_eq!(first, CreditOutcome::Credited { entries: 2 });
        let second = ledger.credit_rewards(&day(), &rewards).await.unwrap();
        assert_eq!(second, CreditOutcome::AlreadyCredited);

        assert_eq!(ledger.total_supply().await.unwrap(), 5_000_000);
        let row = ledger.balance(&acct('a')).await.unwrap().unwrap();
        assert_eq!(row.balance_micro, 3_500_000);
    }

    #[tokio::test]
    async fn zero_rewards_write_no_rows() {
        let ledger = ledger();
        let rewards = vec![entry('a', 0.0)];
        ledger.credit_rewards(&day(), &rewards).await.unwrap();
        assert!(ledger.balance(&acct('a')).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn external_credits_reject_reward_type() {
        let ledger = ledger();
        let err = ledger
            .credit_external(&day(), EntryType::Reward, &[(acct('a'), 1.0)])
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast::<LedgerError>().unwrap(),
            LedgerError::ReservedEntryType
        );

        ledger
            .credit_external(&day(), EntryType::Task, &[(acct('a'), 1.0)])
            .await
            .unwrap();
        assert_eq!(ledger.total_supply().await.unwrap(), 1_000_000);
    }
}
