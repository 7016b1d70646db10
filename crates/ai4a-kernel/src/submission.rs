//! Submission processing: classification, canary handling, reputation.
//!
//! The processor is pure: it takes a contributor snapshot and returns an
//! updated copy plus the decision record. Preconditions (ACTIVE phase,
//! assignment ownership, idempotency-cache miss) are the coordinator's job;
//! nothing here is fatal — rejections surface as `accepted = false` with a
//! reason and no mutation.

use chrono::{DateTime, Duration, Utc};

use ai4a_types::{BlockSubmission, CompletedBlock, Contributor, RewardConfig, SubmissionResult};

/// Canary bookkeeping produced alongside the result, carrying the
/// post-decision values the coordinator records in `CANARY_*` events.
#[derive(Debug, Clone, PartialEq)]
pub enum CanaryOutcome {
    /// The known answer was reproduced.
    Passed {
        /// Lifetime pass counter after the update.
        passes: u32,
    },
    /// The known answer was missed.
    Failed {
        /// Lifetime failure counter after the update.
        failures: u32,
        /// Reputation multiplier after the update.
        reputation_multiplier: f64,
        /// Whether reputation actually decayed (false inside the cooldown).
        penalty_applied: bool,
        /// Timestamp stamped on the contributor.
        failure_time: DateTime<Utc>,
    },
}

/// Result of one trip through the processor.
#[derive(Debug, Clone, PartialEq)]
pub struct Processed {
    /// Updated contributor copy. Identical to the input on rejection.
    pub contributor: Contributor,
    /// The decision returned to the worker and cached for idempotency.
    pub result: SubmissionResult,
    /// The block appended to history, when the submission was accepted.
    pub block: Option<CompletedBlock>,
    /// Canary bookkeeping, when the block was a canary.
    pub canary: Option<CanaryOutcome>,
}

/// Process one submission against a contributor snapshot.
pub fn process_submission(
    contributor: &Contributor,
    submission: &BlockSubmission,
    is_canary: bool,
    config: &RewardConfig,
    now: DateTime<Utc>,
) -> Processed {
    if let Err(e) = submission.validate() {
        return Processed {
            contributor: contributor.clone(),
            result: SubmissionResult::rejected(e.to_string()),
            block: None,
            canary: None,
        };
    }

    let mut updated = contributor.clone();
    let block = CompletedBlock {
        block_id: submission.block_id.clone(),
        block_type: submission.block_type,
        resource_usage: submission.resource_usage,
        difficulty_multiplier: submission.difficulty_multiplier,
        validation_passed: submission.validation_passed,
        timestamp: now,
        is_canary,
        canary_answer_correct: if is_canary {
            Some(submission.canary_answer_correct == Some(true))
        } else {
            None
        },
    };

    if !is_canary {
        updated.completed_blocks.push(block.clone());
        return Processed {
            contributor: updated,
            result: SubmissionResult::accepted(),
            block: Some(block),
            canary: None,
        };
    }

    updated.completed_blocks.push(block.clone());
    if submission.canary_answer_correct == Some(true) {
        updated.canary_passes += 1;
        let result = SubmissionResult {
            accepted: true,
            canary_detected: true,
            canary_passed: Some(true),
            penalty_applied: false,
            reason: None,
        };
        return Processed {
            canary: Some(CanaryOutcome::Passed {
                passes: updated.canary_passes,
            }),
            contributor: updated,
            result,
            block: Some(block),
        };
    }

    // Canary failure: the counter always advances, but reputation only
    // decays once per cooldown window.
    updated.canary_failures += 1;
    let within_cooldown = updated
        .last_canary_failure_time
        .map(|t| now - t < Duration::hours(i64::from(config.canary_failure_cooldown_hours)))
        .unwrap_or(false);
    let penalty_applied = !within_cooldown;
    if penalty_applied {
        updated.reputation_multiplier =
            (updated.reputation_multiplier * config.canary_penalty).clamp(0.0, 1.0);
    }
    updated.last_canary_failure_time = Some(now);

    let result = SubmissionResult {
        accepted: true,
        canary_detected: true,
        canary_passed: Some(false),
        penalty_applied,
        reason: None,
    };
    Processed {
        canary: Some(CanaryOutcome::Failed {
            failures: updated.canary_failures,
            reputation_multiplier: updated.reputation_multiplier,
            penalty_applied,
            failure_time: now,
        }),
        contributor: updated,
        result,
        block: Some(block),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ai4a_types::{AccountId, BlockType, DayId};

    fn acct() -> AccountId {
        AccountId::unchecked(format!("ai4a{}", "a".repeat(40)))
    }

    fn now() -> DateTime<Utc> {
        DayId::parse("2026-01-28").unwrap().pinned_noon()
    }

    fn submission(answer: Option<bool>) -> BlockSubmission {
        BlockSubmission {
            contributor_id: acct(),
            block_id: "2026-01-28-b0-0".into(),
            block_type: BlockType::Inference,
            resource_usage: 0.9,
            difficulty_multiplier: 1.0,
            validation_passed: true,
            canary_answer_correct: answer,
            timestamp: now(),
        }
    }

    fn contributor() -> Contributor {
        Contributor::new(acct(), now() - Duration::days(1))
    }

    #[test]
    fn normal_block_is_appended() {
        let processed =
            process_submission(&contributor(), &submission(None), false, &RewardConfig::default(), now());
        assert!(processed.result.accepted);
        assert!(!processed.result.canary_detected);
        assert_eq!(processed.contributor.completed_blocks.len(), 1);
        assert!(!processed.contributor.completed_blocks[0].is_canary);
        assert!(processed.canary.is_none());
    }

    #[test]
    fn canary_pass_increments_counter_only() {
        let processed = process_submission(
            &contributor(),
            &submission(Some(true)),
            true,
            &RewardConfig::default(),
            now(),
        );
        assert!(processed.result.accepted);
        assert_eq!(processed.result.canary_passed, Some(true));
        assert_eq!(processed.contributor.canary_passes, 1);
        assert_eq!(processed.contributor.canary_failures, 0);
        assert!((processed.contributor.reputation_multiplier - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn canary_failure_decays_reputation() {
        let config = RewardConfig::default();
        let processed = process_submission(
            &contributor(),
            &submission(Some(false)),
            true,
            &config,
            now(),
        );
        assert_eq!(processed.result.canary_passed, Some(false));
        assert!(processed.result.penalty_applied);
        assert_eq!(processed.contributor.canary_failures, 1);
        assert!(
            (processed.contributor.reputation_multiplier - config.canary_penalty).abs()
                < f64::EPSILON
        );
        assert_eq!(processed.contributor.last_canary_failure_time, Some(now()));
    }

    #[test]
    fn missing_canary_answer_counts_as_failure() {
        let processed = process_submission(
            &contributor(),
            &submission(None),
            true,
            &RewardConfig::default(),
            now(),
        );
        assert_eq!(processed.result.canary_passed, Some(false));
        assert_eq!(processed.contributor.canary_failures, 1);
    }

    #[test]
    fn no_double_decay_within_cooldown() {
        let config = RewardConfig::default();
        let first = process_submission(
            &contributor(),
            &submission(Some(false)),
            true,
            &config,
            now(),
        );
        let second = process_submission(
            &first.contributor,
            &submission(Some(false)),
            true,
            &config,
            now() + Duration::hours(1),
        );
        assert_eq!(second.contributor.canary_failures, 2);
        assert!(!second.result.penalty_applied);
        // Reputation decayed exactly once.
        assert!(
            (second.contributor.reputation_multiplier - config.canary_penalty).abs()
                < f64::EPSILON
        );
    }

    #[test]
    fn decay_resumes_after_cooldown() {
        let config = RewardConfig::default();
        let first = process_submission(
            &contributor(),
            &submission(Some(false)),
            true,
            &config,
            now(),
        );
        let later = now() + Duration::hours(i64::from(config.canary_failure_cooldown_hours) + 1);
        let second = process_submission(
            &first.contributor,
            &submission(Some(false)),
            true,
            &config,
            later,
        );
        assert!(second.result.penalty_applied);
        let expected = config.canary_penalty * config.canary_penalty;
        assert!((second.contributor.reputation_multiplier - expected).abs() < f64::EPSILON);
    }

    #[test]
    fn out_of_range_submission_is_rejected_without_mutation() {
        let mut bad = submission(None);
        bad.resource_usage = 2.0;
        let before = contributor();
        let processed =
            process_submission(&before, &bad, false, &RewardConfig::default(), now());
        assert!(!processed.result.accepted);
        assert!(processed.result.reason.is_some());
        assert_eq!(processed.contributor, before);
        assert!(processed.block.is_none());
    }
}
