//! Pure state projection: `(NetworkState, DomainEvent) → NetworkState`.
//!
//! The projector consumes decisions, never raw inputs. `SUBMISSION_RECEIVED`
//! is informational; `SUBMISSION_PROCESSED` carries the accepted block and
//! is the only event that grows `completed_blocks`. Canary events carry the
//! post-decision counters and reputation, so replay applies exactly what the
//! live coordinator applied.

use ai4a_types::{Contributor, NetworkState};

use crate::event::{DomainEvent, EventKind};
use crate::payload;

/// Failures during projection. A well-formed event log never produces one.
#[derive(Debug, thiserror::Error)]
pub enum ProjectorError {
    /// Payload did not decode as the shape its kind requires.
    #[error(transparent)]
    Event(#[from] crate::event::EventError),
    /// An event references an account the projected state has never seen.
    #[error("event {sequence} references unknown contributor {account}")]
    UnknownContributor {
        /// Sequence number of the offending event.
        sequence: u64,
        /// The unknown account.
        account: String,
    },
}

/// Apply one event to the state.
pub fn apply(state: &mut NetworkState, event: &DomainEvent) -> Result<(), ProjectorError> {
    match event.event_type {
        EventKind::NodeRegistered => {
            let p: payload::NodeRegistered = event.decode_payload()?;
            state
                .contributors
                .entry(p.account_id.clone())
                .or_insert_with(|| Contributor::new(p.account_id, event.timestamp));
        }
        // Informational events: the decisions they describe arrive in
        // dedicated follow-up events.
        EventKind::RosterLocked
        | EventKind::WorkAssigned
        | EventKind::CanariesSelected
        | EventKind::SubmissionReceived
        | EventKind::DayFinalized => {}
        EventKind::SubmissionProcessed => {
            let p: payload::SubmissionProcessed = event.decode_payload()?;
            if let Some(block) = p.block {
                let contributor = lookup(state, event, &p.contributor_id)?;
                contributor.completed_blocks.push(block);
            }
        }
        EventKind::CanaryPassed => {
            let p: payload::CanaryPassed = event.decode_payload()?;
            let contributor = lookup(state, event, &p.contributor_id)?;
            contributor.canary_passes = p.canary_passes;
        }
        EventKind::CanaryFailed => {
            let p: payload::CanaryFailed = event.decode_payload()?;
            let contributor = lookup(state, event, &p.contributor_id)?;
            contributor.canary_failures = p.canary_failures;
            contributor.reputation_multiplier = p.reputation_multiplier;
            contributor.last_canary_failure_time = Some(p.failure_time);
        }
        EventKind::RewardsCommitted => {
            let p: payload::RewardsCommitted = event.decode_payload()?;
            state.day_number = p.day_number;
        }
    }
    Ok(())
}

fn lookup<'a>(
    state: &'a mut NetworkState,
    event: &DomainEvent,
    account: &ai4a_types::AccountId,
) -> Result<&'a mut Contributor, ProjectorError> {
    let sequence = event.sequence_number;
    state
        .contributors
        .get_mut(account)
        .ok_or_else(|| ProjectorError::UnknownContributor {
            sequence,
            account: account.to_string(),
        })
}

/// Fold a slice of events over an initial state.
pub fn project(
    events: &[DomainEvent],
    initial: NetworkState,
) -> Result<NetworkState, ProjectorError> {
    let mut state = initial;
    for event in events {
        apply(&mut state, event)?;
    }
    Ok(state)
}
