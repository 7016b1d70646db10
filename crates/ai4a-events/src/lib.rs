#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **ai4a-events** – Hash-chained domain events for the AI4All coordinator.
//!
//! Every state transition the coordinator performs is recorded as a
//! [`DomainEvent`] whose `event_hash` covers the whole record and whose
//! `prev_event_hash` links it to its predecessor, forming one unbroken chain
//! from genesis across every day. The [`projector`] module is the pure
//! reducer that rebuilds [`ai4a_types::NetworkState`] from that chain;
//! together they make the system replayable and auditable.
//!
//! Events carry *decisions*, never raw inputs: `SUBMISSION_PROCESSED`
//! records the accepted block attributes verbatim so replay can never drift
//! from what the live coordinator decided.

mod chain;
mod event;
pub mod payload;
pub mod projector;

pub use chain::{verify_chain, ChainError, EventChain, GENESIS_HASH};
pub use event::{DomainEvent, EventError, EventKind};
