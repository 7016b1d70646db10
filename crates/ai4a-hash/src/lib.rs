#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **ai4a-hash** – Deterministic primitives for the AI4All coordinator.
//!
//! Everything the network commits to cryptographically flows through this
//! crate: the canonical JSON serializer and SHA-256 wrapper that every hash
//! in the system is defined in terms of, the Merkle commitment over reward
//! entries, the seeded PRNG used by work assignment, and the roster/seed
//! derivation that ties a day's randomness to its locked roster.
//!
//! All functions here are pure and synchronous; no I/O, no wall-clock
//! entropy.

pub mod canonical;
pub mod merkle;
pub mod rng;
pub mod seed;

pub use canonical::{canonical_json, compute_hash, hash_of, sha256_hex, HashError};
pub use merkle::{MerkleProof, MerkleTree, ProofStep, Side};
pub use rng::DeterministicRng;
pub use seed::{derive_day_seed, roster_hash};
