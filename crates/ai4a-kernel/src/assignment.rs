//! Deterministic work assignment: weighted lottery plus canary injection.
//!
//! Given the same (roster, day id, configs) the lottery produces identical
//! assignments and canaries on every run. Contributor weights favor recent
//! reward points with square-root damping so large operators cannot
//! monopolize the pool.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use ai4a_hash::DeterministicRng;
use ai4a_types::{
    AccountId, AssignmentConfig, BlockAssignment, CanaryConfig, Contributor, DayId,
};

/// Everything `day/start` needs from the lottery.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentOutcome {
    /// Aggregated per-contributor assignments, in account order.
    pub assignments: Vec<BlockAssignment>,
    /// Sorted canary block ids, a subset of all assigned ids.
    pub canary_block_ids: Vec<String>,
    /// The day's fixed throughput budget.
    pub total_blocks: u32,
}

/// Run the day's lottery over the locked roster.
///
/// Weights are `1 + sqrt(points)` with points aggregated over the trailing
/// lookback window, canaries excluded. Block ids are
/// `{day_id}-b{batch}-{index}`, globally unique within the day. The `rng`
/// must be freshly seeded from the day seed; the weight clock is pinned to
/// the day so the draw never depends on wall time.
pub fn assign_work(
    contributors: &BTreeMap<AccountId, Contributor>,
    roster: &[AccountId],
    day: &DayId,
    config: &AssignmentConfig,
    canary: &CanaryConfig,
    rng: &mut DeterministicRng,
    assigned_at: DateTime<Utc>,
) -> AssignmentOutcome {
    let total_blocks = config.total_blocks();
    if roster.is_empty() || total_blocks == 0 {
        return AssignmentOutcome {
            assignments: Vec::new(),
            canary_block_ids: Vec::new(),
            total_blocks,
        };
    }

    let weight_clock = day.pinned_noon();
    let weights: Vec<f64> = roster
        .iter()
        .map(|account| {
            let points = contributors
                .get(account)
                .map(|c| c.reward_points(config.lookback_days, weight_clock))
                .unwrap_or(0.0);
            1.0 + points.sqrt()
        })
        .collect();

    // Draw order is batch order; block ids record it permanently.
    let mut won_blocks: BTreeMap<AccountId, Vec<String>> = BTreeMap::new();
    let mut won_batches: BTreeMap<AccountId, u32> = BTreeMap::new();
    let mut all_blocks: Vec<String> = Vec::with_capacity(total_blocks as usize);

    for batch in 0..config.max_batches {
        let winner = &roster[rng.next_weighted(&weights)];
        let blocks = won_blocks.entry(winner.clone()).or_default();
        for index in 0..config.blocks_per_batch {
            let block_id = format!("{day}-b{batch}-{index}");
            blocks.push(block_id.clone());
            all_blocks.push(block_id);
        }
        *won_batches.entry(winner.clone()).or_default() += 1;
    }

    let assignments: Vec<BlockAssignment> = won_blocks
        .into_iter()
        .map(|(contributor_id, block_ids)| {
            let batch_number = won_batches[&contributor_id];
            BlockAssignment {
                contributor_id,
                block_ids,
                assigned_at,
                batch_number,
            }
        })
        .collect();

    let canary_count = (f64::from(total_blocks) * canary.canary_percentage).ceil() as usize;
    let mut canary_block_ids: Vec<String> = rng
        .sample_indices(all_blocks.len(), canary_count)
        .into_iter()
        .map(|i| all_blocks[i].clone())
        .collect();
    canary_block_ids.sort_unstable();

    AssignmentOutcome {
        assignments,
        canary_block_ids,
        total_blocks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ai4a_hash::{derive_day_seed, roster_hash};
    use std::collections::BTreeSet;

    fn acct(tail: char) -> AccountId {
        AccountId::unchecked(format!("ai4a{}", tail.to_string().repeat(40)))
    }

    fn day() -> DayId {
        DayId::parse("2026-01-28").unwrap()
    }

    fn setup(roster_tails: &[char]) -> (BTreeMap<AccountId, Contributor>, Vec<AccountId>) {
        let mut contributors = BTreeMap::new();
        let mut roster: Vec<AccountId> = roster_tails.iter().map(|&c| acct(c)).collect();
        roster.sort();
        for account in &roster {
            contributors.insert(
                account.clone(),
                Contributor::new(account.clone(), day().start()),
            );
        }
        (contributors, roster)
    }

    fn seeded_rng(roster: &[AccountId]) -> DeterministicRng {
        let rh = roster_hash(roster);
        DeterministicRng::from_seed(derive_day_seed(&day(), &rh))
    }

    #[test]
    fn identical_inputs_yield_identical_outcomes() {
        let (contributors, roster) = setup(&['a', 'b', 'c']);
        let config = AssignmentConfig::default();
        let canary = CanaryConfig::default();
        let at = day().start();

        let first = assign_work(
            &contributors,
            &roster,
            &day(),
            &config,
            &canary,
            &mut seeded_rng(&roster),
            at,
        );
        let second = assign_work(
            &contributors,
            &roster,
            &day(),
            &config,
            &canary,
            &mut seeded_rng(&roster),
            at,
        );
        assert_eq!(first, second);
    }

    #[test]
    fn block_ids_are_disjoint_across_contributors() {
        let (contributors, roster) = setup(&['a', 'b', 'c']);
        let outcome = assign_work(
            &contributors,
            &roster,
            &day(),
            &AssignmentConfig::default(),
            &CanaryConfig::default(),
            &mut seeded_rng(&roster),
            day().start(),
        );

        let mut seen = BTreeSet::new();
        let mut total = 0usize;
        for assignment in &outcome.assignments {
            for id in &assignment.block_ids {
                assert!(seen.insert(id.clone()), "duplicate block id {id}");
                total += 1;
            }
        }
        assert_eq!(total, outcome.total_blocks as usize);
    }

    #[test]
    fn canaries_are_a_subset_of_assigned_blocks() {
        let (contributors, roster) = setup(&['a', 'b', 'c']);
        let canary = CanaryConfig {
            canary_percentage: 0.1,
        };
        let config = AssignmentConfig::default();
        let outcome = assign_work(
            &contributors,
            &roster,
            &day(),
            &config,
            &canary,
            &mut seeded_rng(&roster),
            day().start(),
        );

        let assigned: BTreeSet<&String> = outcome
            .assignments
            .iter()
            .flat_map(|a| a.block_ids.iter())
            .collect();
        for id in &outcome.canary_block_ids {
            assert!(assigned.contains(id));
        }

        let expected = (f64::from(config.total_blocks()) * canary.canary_percentage).ceil() as usize;
        assert_eq!(outcome.canary_block_ids.len(), expected);
    }

    #[test]
    fn batch_counts_sum_to_max_batches() {
        let (contributors, roster) = setup(&['a', 'b']);
        let config = AssignmentConfig {
            blocks_per_batch: 5,
            max_batches: 20,
            lookback_days: 7,
        };
        let outcome = assign_work(
            &contributors,
            &roster,
            &day(),
            &config,
            &CanaryConfig::default(),
            &mut seeded_rng(&roster),
            day().start(),
        );
        let batches: u32 = outcome.assignments.iter().map(|a| a.batch_number).sum();
        assert_eq!(batches, config.max_batches);
    }

    #[test]
    fn empty_roster_assigns_nothing() {
        let outcome = assign_work(
            &BTreeMap::new(),
            &[],
            &day(),
            &AssignmentConfig::default(),
            &CanaryConfig::default(),
            &mut DeterministicRng::from_seed(1),
            day().start(),
        );
        assert!(outcome.assignments.is_empty());
        assert!(outcome.canary_block_ids.is_empty());
    }

    #[test]
    fn history_skews_the_lottery() {
        let (mut contributors, roster) = setup(&['a', 'b']);
        // Give one contributor heavy recent history.
        let strong = roster[0].clone();
        let c = contributors.get_mut(&strong).unwrap();
        for i in 0..200 {
            c.completed_blocks.push(ai4a_types::CompletedBlock {
                block_id: format!("2026-01-27-b0-{i}"),
                block_type: ai4a_types::BlockType::Inference,
                resource_usage: 1.0,
                difficulty_multiplier: 3.0,
                validation_passed: true,
                timestamp: day().pinned_noon() - chrono::Duration::hours(20),
                is_canary: false,
                canary_answer_correct: None,
            });
        }

        let outcome = assign_work(
            &contributors,
            &roster,
            &day(),
            &AssignmentConfig::default(),
            &CanaryConfig::default(),
            &mut seeded_rng(&roster),
            day().start(),
        );
        let strong_blocks = outcome
            .assignments
            .iter()
            .find(|a| a.contributor_id == strong)
            .map(|a| a.block_ids.len())
            .unwrap_or(0);
        let weak_blocks = outcome
            .assignments
            .iter()
            .find(|a| a.contributor_id != strong)
            .map(|a| a.block_ids.len())
            .unwrap_or(0);
        assert!(strong_blocks > weak_blocks);
    }
}
