//! End-to-end lifecycle tests over the in-memory backend: register, start,
//! submit, finalize, replay, and the phase/roster/idempotency edges.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use ai4a_events::EventKind;
use ai4a_hash::merkle;
use ai4a_kernel::{
    replay_day, ConflictKind, CoordinatorError, DayCoordinator,
};
use ai4a_store_core::{AssignmentStore, EventStore, Stores};
use ai4a_store_memory::MemoryBackend;
use ai4a_types::{
    AccountId, AssignmentConfig, BlockAssignment, BlockSubmission, BlockType, CanaryConfig,
    DayId, DayPhase, EpochConfig, RewardConfig,
};

fn memory_stores() -> Stores {
    let backend = Arc::new(MemoryBackend::new());
    Stores {
        events: backend.clone(),
        state: backend.clone(),
        assignments: backend.clone(),
        submissions: backend.clone(),
        operational: backend.clone(),
        balances: backend,
    }
}

fn test_config() -> EpochConfig {
    EpochConfig {
        assignment: AssignmentConfig {
            blocks_per_batch: 5,
            max_batches: 8,
            lookback_days: 7,
        },
        canary: CanaryConfig {
            canary_percentage: 0.1,
        },
        rewards: RewardConfig::default(),
    }
}

async fn coordinator() -> DayCoordinator {
    DayCoordinator::new(memory_stores(), test_config())
        .await
        .unwrap()
}

fn acct(tail: char) -> AccountId {
    AccountId::unchecked(format!("ai4a{}", tail.to_string().repeat(40)))
}

fn day() -> DayId {
    DayId::parse("2026-01-28").unwrap()
}

fn at_hour(hour: i64) -> DateTime<Utc> {
    day().start() + Duration::hours(hour)
}

fn submission(account: &AccountId, block_id: &str, answer: Option<bool>) -> BlockSubmission {
    BlockSubmission {
        contributor_id: account.clone(),
        block_id: block_id.to_string(),
        block_type: BlockType::Inference,
        resource_usage: 0.9,
        difficulty_multiplier: 1.0,
        validation_passed: true,
        canary_answer_correct: answer,
        timestamp: Utc::now(),
    }
}

async fn register(coordinator: &DayCoordinator, tail: char, at: DateTime<Utc>) -> AccountId {
    let account = acct(tail);
    coordinator
        .register(account.clone(), format!("{:064x}", tail as u32), at)
        .await
        .unwrap();
    account
}

fn first_normal_block(assignment: &BlockAssignment, canaries: &[String]) -> String {
    assignment
        .block_ids
        .iter()
        .find(|id| !canaries.contains(id))
        .expect("assignment has a non-canary block")
        .clone()
}

#[tokio::test]
async fn single_contributor_end_to_end() {
    let coordinator = coordinator().await;
    let alice = register(&coordinator, 'a', at_hour(1)).await;

    let started = coordinator
        .start_day(Some(day()), at_hour(2))
        .await
        .unwrap();
    assert_eq!(started.roster_size, 1);

    let work = coordinator.request_work(&alice).await.unwrap();
    assert_eq!(work.assignments.len(), 1);
    assert!(work.reason.is_none());
    let block_id = work.assignments[0].block_ids[0].clone();

    // Use a block that is not a canary so the submission earns points.
    let canaries: Vec<String> = coordinator
        .stores()
        .events
        .query_by_type(EventKind::CanariesSelected, None)
        .await
        .unwrap()
        .first()
        .map(|e| {
            e.decode_payload::<ai4a_events::payload::CanariesSelected>()
                .unwrap()
                .canary_block_ids
        })
        .unwrap();
    let block_id = if canaries.contains(&block_id) {
        first_normal_block(&work.assignments[0], &canaries)
    } else {
        block_id
    };

    let submitted = coordinator
        .submit_work(
            &alice,
            Some(day()),
            vec![submission(&alice, &block_id, None)],
            at_hour(3),
        )
        .await
        .unwrap();
    assert!(submitted.results[0].accepted);

    let finalized = coordinator.finalize_day(at_hour(23)).await.unwrap();
    assert_eq!(finalized.day_number, 1);
    assert_eq!(finalized.distribution.rewards.len(), 1);
    assert_eq!(finalized.distribution.rewards[0].account_id, alice);
    assert!(finalized.distribution.rewards[0].total_reward > 0.0);

    let status = coordinator.status().await;
    assert_eq!(status.phase, DayPhase::Idle);
    assert_eq!(status.day_number, 1);

    // The day replays cleanly (S6).
    let replayed = replay_day(coordinator.stores(), &day(), None, None)
        .await
        .unwrap();
    assert!(replayed.hash_chain_valid);
    assert!(replayed.state_match);
    assert!(replayed.rewards_match);

    // Balances were credited in micro-units.
    let row = coordinator.ledger().balance(&alice).await.unwrap().unwrap();
    assert!(row.balance_micro > 0);
    assert_eq!(row.last_reward_day, Some(day()));
}

#[tokio::test]
async fn determinism_across_fresh_instances() {
    let normalize = |assignments: Vec<BlockAssignment>| {
        assignments
            .into_iter()
            .map(|a| (a.contributor_id, a.block_ids, a.batch_number))
            .collect::<Vec<_>>()
    };

    let mut outcomes = Vec::new();
    for _ in 0..2 {
        let coordinator = coordinator().await;
        register(&coordinator, 'a', at_hour(1)).await;
        let started = coordinator
            .start_day(Some(day()), at_hour(2))
            .await
            .unwrap();
        let assignments = coordinator
            .stores()
            .assignments
            .get_by_day(&day())
            .await
            .unwrap();
        outcomes.push((
            started.seed,
            started.roster_hash,
            started.total_blocks,
            normalize(assignments),
        ));
    }
    assert_eq!(outcomes[0], outcomes[1]);
}

#[tokio::test]
async fn duplicate_submissions_replay_the_cached_result() {
    let coordinator = coordinator().await;
    let alice = register(&coordinator, 'a', at_hour(1)).await;
    coordinator
        .start_day(Some(day()), at_hour(2))
        .await
        .unwrap();

    let work = coordinator.request_work(&alice).await.unwrap();
    let block_id = work.assignments[0].block_ids[0].clone();

    let mut results = Vec::new();
    for _ in 0..3 {
        let outcome = coordinator
            .submit_work(
                &alice,
                None,
                vec![submission(&alice, &block_id, None)],
                at_hour(3),
            )
            .await
            .unwrap();
        results.push(outcome.results[0].clone());
        assert_eq!(outcome.pending_count, 1);
    }
    assert_eq!(results[0], results[1]);
    assert_eq!(results[1], results[2]);

    // Exactly one SUBMISSION_PROCESSED for the tuple.
    let processed = coordinator
        .stores()
        .events
        .query_by_type(EventKind::SubmissionProcessed, None)
        .await
        .unwrap();
    assert_eq!(processed.len(), 1);
}

#[tokio::test]
async fn late_registration_is_locked_out() {
    let coordinator = coordinator().await;
    register(&coordinator, 'a', at_hour(1)).await;
    coordinator
        .start_day(Some(day()), at_hour(2))
        .await
        .unwrap();

    let bob = register(&coordinator, 'b', at_hour(3)).await;
    let work = coordinator.request_work(&bob).await.unwrap();
    assert!(work.assignments.is_empty());
    assert_eq!(work.reason.as_deref(), Some("ROSTER_LOCKED"));
}

#[tokio::test]
async fn phase_gating() {
    let coordinator = coordinator().await;
    let alice = register(&coordinator, 'a', at_hour(1)).await;

    // (a) work/request before any day.
    match coordinator.request_work(&alice).await {
        Err(CoordinatorError::StateConflict(ConflictKind::DayNotStarted)) => {}
        other => panic!("expected DAY_NOT_STARTED, got {other:?}"),
    }

    // (c) finalize before any day.
    match coordinator.finalize_day(at_hour(2)).await {
        Err(CoordinatorError::StateConflict(ConflictKind::DayNotStarted)) => {}
        other => panic!("expected DAY_NOT_STARTED, got {other:?}"),
    }

    // (b) double start.
    coordinator
        .start_day(Some(day()), at_hour(2))
        .await
        .unwrap();
    match coordinator.start_day(Some(day()), at_hour(3)).await {
        Err(CoordinatorError::StateConflict(ConflictKind::DayAlreadyActive)) => {}
        other => panic!("expected DAY_ALREADY_ACTIVE, got {other:?}"),
    }
}

#[tokio::test]
async fn day_mismatch_is_rejected() {
    let coordinator = coordinator().await;
    let alice = register(&coordinator, 'a', at_hour(1)).await;
    coordinator
        .start_day(Some(day()), at_hour(2))
        .await
        .unwrap();

    let wrong_day = day().next();
    match coordinator
        .submit_work(&alice, Some(wrong_day), vec![], at_hour(3))
        .await
    {
        Err(CoordinatorError::StateConflict(ConflictKind::DayMismatch)) => {}
        other => panic!("expected DAY_MISMATCH, got {other:?}"),
    }
}

#[tokio::test]
async fn unassigned_block_is_rejected_and_cached() {
    let coordinator = coordinator().await;
    let alice = register(&coordinator, 'a', at_hour(1)).await;
    coordinator
        .start_day(Some(day()), at_hour(2))
        .await
        .unwrap();

    let outcome = coordinator
        .submit_work(
            &alice,
            None,
            vec![submission(&alice, "2026-01-28-b999-0", None)],
            at_hour(3),
        )
        .await
        .unwrap();
    assert!(!outcome.results[0].accepted);
    assert_eq!(outcome.results[0].reason.as_deref(), Some("NOT_ASSIGNED"));
    assert_eq!(outcome.pending_count, 0);

    // The rejection is cached like any other decision.
    let replay = coordinator
        .submit_work(
            &alice,
            None,
            vec![submission(&alice, "2026-01-28-b999-0", None)],
            at_hour(4),
        )
        .await
        .unwrap();
    assert_eq!(replay.results[0], outcome.results[0]);
}

#[tokio::test]
async fn canary_failure_penalizes_but_keeps_eligibility() {
    let coordinator = coordinator().await;
    let accounts = [
        register(&coordinator, 'a', at_hour(1)).await,
        register(&coordinator, 'b', at_hour(1)).await,
        register(&coordinator, 'c', at_hour(1)).await,
    ];
    coordinator
        .start_day(Some(day()), at_hour(2))
        .await
        .unwrap();

    // Find a contributor holding a canary block.
    let canaries: Vec<String> = coordinator
        .stores()
        .events
        .query_by_type(EventKind::CanariesSelected, None)
        .await
        .unwrap()[0]
        .decode_payload::<ai4a_events::payload::CanariesSelected>()
        .unwrap()
        .canary_block_ids;
    assert!(!canaries.is_empty());

    let assignments = coordinator
        .stores()
        .assignments
        .get_by_day(&day())
        .await
        .unwrap();
    let (victim, canary_block, normal_block) = assignments
        .iter()
        .find_map(|a| {
            let canary = a.block_ids.iter().find(|b| canaries.contains(b))?;
            let normal = a.block_ids.iter().find(|b| !canaries.contains(b))?;
            Some((a.contributor_id.clone(), canary.clone(), normal.clone()))
        })
        .expect("some contributor holds both a canary and a normal block");
    assert!(accounts.contains(&victim));

    // A normal block keeps the min-blocks gate satisfied; the canary
    // failure lands after the pinned noon so cooldown has not started yet.
    coordinator
        .submit_work(
            &victim,
            None,
            vec![submission(&victim, &normal_block, None)],
            at_hour(13),
        )
        .await
        .unwrap();
    let failed = coordinator
        .submit_work(
            &victim,
            None,
            vec![submission(&victim, &canary_block, Some(false))],
            at_hour(14),
        )
        .await
        .unwrap();
    assert!(failed.results[0].canary_detected);
    assert_eq!(failed.results[0].canary_passed, Some(false));
    assert!(failed.results[0].penalty_applied);

    let events = coordinator
        .stores()
        .events
        .query_by_type(EventKind::CanaryFailed, None)
        .await
        .unwrap();
    assert_eq!(events.len(), 1);

    let state = coordinator.network_state().await;
    let contributor = &state.contributors[&victim];
    assert_eq!(contributor.canary_failures, 1);
    assert!(contributor.reputation_multiplier < 1.0);

    let finalized = coordinator.finalize_day(at_hour(23)).await.unwrap();
    assert!(
        finalized
            .distribution
            .rewards
            .iter()
            .any(|r| r.account_id == victim),
        "fresh failure does not strip same-day eligibility"
    );
}

#[tokio::test]
async fn merkle_proofs_verify_for_every_rewarded_account() {
    let coordinator = coordinator().await;
    let alice = register(&coordinator, 'a', at_hour(1)).await;
    let bob = register(&coordinator, 'b', at_hour(1)).await;
    coordinator
        .start_day(Some(day()), at_hour(2))
        .await
        .unwrap();

    for account in [&alice, &bob] {
        let work = coordinator.request_work(account).await.unwrap();
        if let Some(assignment) = work.assignments.first() {
            let outcome = coordinator
                .submit_work(
                    account,
                    None,
                    vec![submission(account, &assignment.block_ids[0], Some(true))],
                    at_hour(3),
                )
                .await
                .unwrap();
            assert!(outcome.results[0].accepted);
        }
    }

    let finalized = coordinator.finalize_day(at_hour(23)).await.unwrap();
    for entry in &finalized.distribution.rewards {
        let (leaf, proof, root) = coordinator
            .reward_proof(&day(), &entry.account_id)
            .await
            .unwrap()
            .expect("proof for rewarded account");
        assert_eq!(root, finalized.reward_root);
        assert!(merkle::verify_proof(&leaf, &proof, &root));
    }
}

#[tokio::test]
async fn restart_restores_active_day_and_continues() {
    let stores = memory_stores();
    let alice;
    let block_id;
    {
        let coordinator = DayCoordinator::new(stores.clone(), test_config())
            .await
            .unwrap();
        alice = register(&coordinator, 'a', at_hour(1)).await;
        coordinator
            .start_day(Some(day()), at_hour(2))
            .await
            .unwrap();
        let work = coordinator.request_work(&alice).await.unwrap();
        block_id = work.assignments[0].block_ids[0].clone();
        coordinator
            .submit_work(
                &alice,
                None,
                vec![submission(&alice, &block_id, None)],
                at_hour(3),
            )
            .await
            .unwrap();
        // Coordinator dropped here: simulated crash mid-day.
    }

    let restored = DayCoordinator::new(stores.clone(), test_config())
        .await
        .unwrap();
    let status = restored.status().await;
    assert_eq!(status.phase, DayPhase::Active);
    assert_eq!(status.day_id, Some(day()));
    assert_eq!(status.pending_submissions, 1);

    // The idempotency cache survived the restart.
    let replayed = restored
        .submit_work(
            &alice,
            None,
            vec![submission(&alice, &block_id, None)],
            at_hour(4),
        )
        .await
        .unwrap();
    assert_eq!(replayed.pending_count, 1);

    // And the day still finalizes with an unbroken chain.
    let finalized = restored.finalize_day(at_hour(23)).await.unwrap();
    assert_eq!(finalized.day_number, 1);
    let replay = replay_day(&stores, &day(), None, None).await.unwrap();
    assert!(replay.hash_chain_valid);
    assert!(replay.state_match);
}

#[tokio::test]
async fn two_days_chain_and_replay_as_a_range() {
    let stores = memory_stores();
    let coordinator = DayCoordinator::new(stores.clone(), test_config())
        .await
        .unwrap();
    let alice = register(&coordinator, 'a', at_hour(1)).await;

    let d1 = day();
    let d2 = d1.next();
    for (current, base_hour) in [(d1.clone(), 2i64), (d2.clone(), 26i64)] {
        coordinator
            .start_day(Some(current.clone()), at_hour(base_hour))
            .await
            .unwrap();
        let work = coordinator.request_work(&alice).await.unwrap();
        coordinator
            .submit_work(
                &alice,
                None,
                vec![submission(&alice, &work.assignments[0].block_ids[0], Some(true))],
                at_hour(base_hour + 1),
            )
            .await
            .unwrap();
        coordinator
            .finalize_day(at_hour(base_hour + 10))
            .await
            .unwrap();
    }

    assert_eq!(coordinator.status().await.day_number, 2);

    let results = ai4a_kernel::replay_day_range(&stores, &d1, &d2, None)
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    for result in &results {
        assert!(result.hash_chain_valid, "day {}", result.day_id);
        assert!(result.state_match, "day {}", result.day_id);
        assert!(result.rewards_match, "day {}", result.day_id);
    }
}
