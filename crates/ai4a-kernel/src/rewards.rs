//! Two-pool reward calculation.
//!
//! The daily emission splits into a base pool (equal share per active
//! contributor) and a performance pool (sqrt-weighted by lookback points).
//! The calculator runs with `current_time` pinned to the day's noon so a
//! replay recomputes the exact same distribution.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

use ai4a_types::{
    AccountId, Contributor, DayId, RewardConfig, RewardDistribution, RewardEntry,
};

fn is_active(
    contributor: &Contributor,
    points: f64,
    config: &RewardConfig,
    day: &DayId,
    current_time: DateTime<Utc>,
) -> bool {
    if let Some(failed_at) = contributor.last_canary_failure_time {
        // The calculation clock is pinned to the day's noon; a failure
        // stamped after it has not yet entered the cooldown window.
        let cooldown = Duration::hours(i64::from(config.canary_failure_cooldown_hours));
        if current_time >= failed_at && current_time - failed_at < cooldown {
            return false;
        }
    }
    contributor.blocks_on_day(day) >= config.min_blocks_for_active
        && contributor.reputation_multiplier >= config.reputation_floor
        && points > 0.0
}

/// Compute the day's distribution over all contributors.
pub fn calculate_rewards(
    contributors: &BTreeMap<AccountId, Contributor>,
    config: &RewardConfig,
    day: &DayId,
    current_time: DateTime<Utc>,
) -> RewardDistribution {
    let base_pool_total = config.daily_emissions * config.base_pool_percentage;
    let performance_pool_total = config.daily_emissions * config.performance_pool_percentage;

    // BTreeMap iteration keeps entries in account order throughout.
    let active: Vec<(&AccountId, f64)> = contributors
        .iter()
        .filter_map(|(account, contributor)| {
            let points =
                contributor.reward_points(config.performance_lookback_days, current_time);
            is_active(contributor, points, config, day, current_time)
                .then_some((account, points))
        })
        .collect();

    let active_count = active.len();
    let mut rewards = Vec::with_capacity(active_count);
    if active_count > 0 {
        let base_share = base_pool_total / active_count as f64;
        let sqrt_sum: f64 = active.iter().map(|(_, p)| p.sqrt()).sum();
        for (account, points) in &active {
            let performance_share = if sqrt_sum > 0.0 {
                points.sqrt() / sqrt_sum * performance_pool_total
            } else {
                performance_pool_total / active_count as f64
            };
            rewards.push(RewardEntry {
                account_id: (*account).clone(),
                base_pool_reward: base_share,
                performance_pool_reward: performance_share,
                total_reward: base_share + performance_share,
            });
        }
    }

    RewardDistribution {
        date: day.clone(),
        config: config.clone(),
        total_emissions: config.daily_emissions,
        base_pool_total,
        performance_pool_total,
        active_contributor_count: active_count,
        rewards,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ai4a_types::{BlockType, CompletedBlock};

    fn acct(tail: char) -> AccountId {
        AccountId::unchecked(format!("ai4a{}", tail.to_string().repeat(40)))
    }

    fn day() -> DayId {
        DayId::parse("2026-01-28").unwrap()
    }

    fn block(usage: f64, at: DateTime<Utc>) -> CompletedBlock {
        CompletedBlock {
            block_id: "2026-01-28-b0-0".into(),
            block_type: BlockType::Inference,
            resource_usage: usage,
            difficulty_multiplier: 1.0,
            validation_passed: true,
            timestamp: at,
            is_canary: false,
            canary_answer_correct: None,
        }
    }

    fn worker(tail: char, blocks: usize, usage: f64) -> Contributor {
        let mut c = Contributor::new(acct(tail), day().start());
        for _ in 0..blocks {
            c.completed_blocks
                .push(block(usage, day().pinned_noon() - Duration::hours(2)));
        }
        c
    }

    #[test]
    fn single_active_contributor_takes_both_pools() {
        let mut contributors = BTreeMap::new();
        contributors.insert(acct('a'), worker('a', 1, 0.9));

        let config = RewardConfig::default();
        let dist = calculate_rewards(&contributors, &config, &day(), day().pinned_noon());
        assert_eq!(dist.active_contributor_count, 1);
        assert_eq!(dist.rewards.len(), 1);

        let entry = &dist.rewards[0];
        assert!((entry.base_pool_reward - dist.base_pool_total).abs() < 1e-9);
        assert!((entry.performance_pool_reward - dist.performance_pool_total).abs() < 1e-9);
        assert!(
            (entry.total_reward - config.daily_emissions).abs() < 1e-9,
            "sole active contributor earns the full emission"
        );
    }

    #[test]
    fn pool_totals_split_the_emission() {
        let config = RewardConfig::default();
        let dist =
            calculate_rewards(&BTreeMap::new(), &config, &day(), day().pinned_noon());
        assert!(
            (dist.base_pool_total + dist.performance_pool_total - dist.total_emissions).abs()
                < 1e-9
        );
        assert!(dist.rewards.is_empty());
        assert_eq!(dist.active_contributor_count, 0);
    }

    #[test]
    fn reward_sums_never_exceed_emission() {
        let mut contributors = BTreeMap::new();
        contributors.insert(acct('a'), worker('a', 3, 1.0));
        contributors.insert(acct('b'), worker('b', 1, 0.2));
        contributors.insert(acct('c'), worker('c', 2, 0.7));

        let config = RewardConfig::default();
        let dist = calculate_rewards(&contributors, &config, &day(), day().pinned_noon());
        let total: f64 = dist.rewards.iter().map(|r| r.total_reward).sum();
        assert!(total <= dist.total_emissions + 1e-9);

        let base: f64 = dist.rewards.iter().map(|r| r.base_pool_reward).sum();
        let perf: f64 = dist.rewards.iter().map(|r| r.performance_pool_reward).sum();
        assert!((base - dist.base_pool_total).abs() < 1e-9);
        assert!((perf - dist.performance_pool_total).abs() < 1e-9);
    }

    #[test]
    fn sqrt_weighting_damps_large_operators() {
        let mut contributors = BTreeMap::new();
        contributors.insert(acct('a'), worker('a', 16, 1.0));
        contributors.insert(acct('b'), worker('b', 1, 1.0));

        let dist = calculate_rewards(
            &contributors,
            &RewardConfig::default(),
            &day(),
            day().pinned_noon(),
        );
        let a = &dist.rewards[0];
        let b = &dist.rewards[1];
        // 16x the points buys only 4x the performance share.
        let ratio = a.performance_pool_reward / b.performance_pool_reward;
        assert!((ratio - 4.0).abs() < 1e-6);
    }

    #[test]
    fn cooldown_excludes_recent_canary_failures() {
        let mut failed = worker('a', 2, 0.9);
        failed.last_canary_failure_time = Some(day().pinned_noon() - Duration::hours(2));
        let mut contributors = BTreeMap::new();
        contributors.insert(acct('a'), failed);
        contributors.insert(acct('b'), worker('b', 1, 0.5));

        let dist = calculate_rewards(
            &contributors,
            &RewardConfig::default(),
            &day(),
            day().pinned_noon(),
        );
        assert_eq!(dist.active_contributor_count, 1);
        assert_eq!(dist.rewards[0].account_id, acct('b'));
    }

    #[test]
    fn old_canary_failure_no_longer_excludes() {
        let mut recovered = worker('a', 1, 0.9);
        recovered.last_canary_failure_time = Some(day().pinned_noon() - Duration::hours(48));
        let mut contributors = BTreeMap::new();
        contributors.insert(acct('a'), recovered);

        let dist = calculate_rewards(
            &contributors,
            &RewardConfig::default(),
            &day(),
            day().pinned_noon(),
        );
        assert_eq!(dist.active_contributor_count, 1);
    }

    #[test]
    fn reputation_floor_excludes() {
        let mut degraded = worker('a', 1, 0.9);
        degraded.reputation_multiplier = 0.1;
        let mut contributors = BTreeMap::new();
        contributors.insert(acct('a'), degraded);

        let dist = calculate_rewards(
            &contributors,
            &RewardConfig::default(),
            &day(),
            day().pinned_noon(),
        );
        assert_eq!(dist.active_contributor_count, 0);
    }

    #[test]
    fn min_blocks_gate_applies_to_the_day() {
        // Blocks from yesterday keep points alive but miss the day gate.
        let mut stale = Contributor::new(acct('a'), day().start() - Duration::days(2));
        stale
            .completed_blocks
            .push(block(0.9, day().pinned_noon() - Duration::days(1)));
        let mut contributors = BTreeMap::new();
        contributors.insert(acct('a'), stale);

        let dist = calculate_rewards(
            &contributors,
            &RewardConfig::default(),
            &day(),
            day().pinned_noon(),
        );
        assert_eq!(dist.active_contributor_count, 0);
    }
}
