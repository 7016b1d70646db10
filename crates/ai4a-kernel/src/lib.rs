#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **ai4a-kernel** – Deterministic epoch core of the AI4All coordinator.
//!
//! The kernel owns the day lifecycle state machine (IDLE → ACTIVE →
//! FINALIZING → IDLE) and the three pure engines it orchestrates: the
//! weighted assignment lottery, the submission pipeline, and the two-pool
//! reward calculator. All mutations to the live [`ai4a_types::NetworkState`]
//! are serialized by a single coordinator mutex; every decision is recorded
//! as a hash-chained event, and the event-batch append is the only commit
//! boundary.
//!
//! The engines themselves are synchronous and deterministic: given the same
//! roster, day id, and configuration they produce byte-identical
//! assignments, canaries, and rewards on every platform. Wall-clock time
//! only enters through event timestamps; anything that feeds a hash is
//! pinned to the day.

use std::fmt;

pub mod assignment;
pub mod coordinator;
pub mod replay;
pub mod rewards;
pub mod submission;

pub use assignment::{assign_work, AssignmentOutcome};
pub use coordinator::{
    DayCoordinator, DayStartOutcome, FinalizeOutcome, RegisterOutcome, StatusReport, SubmitOutcome,
    WorkResponse,
};
pub use replay::{replay_day, replay_day_range, ReplayResult};
pub use rewards::calculate_rewards;
pub use submission::{process_submission, CanaryOutcome, Processed};

//─────────────────────────────
//  Error taxonomy
//─────────────────────────────

/// Machine-readable reasons for phase and day conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// The operation requires an ACTIVE day but none is in progress.
    DayNotStarted,
    /// `day/start` was called while a day is already ACTIVE.
    DayAlreadyActive,
    /// The day is mid-finalize and rejects the operation.
    DayFinalizing,
    /// A client-supplied day id does not match the current day.
    DayMismatch,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            ConflictKind::DayNotStarted => "DAY_NOT_STARTED",
            ConflictKind::DayAlreadyActive => "DAY_ALREADY_ACTIVE",
            ConflictKind::DayFinalizing => "DAY_FINALIZING",
            ConflictKind::DayMismatch => "DAY_MISMATCH",
        };
        f.write_str(tag)
    }
}

/// Deterministic error codes produced by the coordinator. The boundary maps
/// them onto HTTP statuses; none of the first four mutate state.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    /// Missing or malformed input.
    #[error("validation failed: {0}")]
    Validation(String),
    /// Wrong phase or day for the requested operation.
    #[error("{0}")]
    StateConflict(ConflictKind),
    /// The referenced account or day does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Persistence or serialization failure. Any in-progress phase
    /// transition is reverted before this surfaces.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Crate result helper.
pub type Result<T> = std::result::Result<T, CoordinatorError>;
