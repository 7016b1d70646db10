//! Merkle commitment over a day's reward entries.
//!
//! Leaves are canonical hashes of `{accountId, totalReward, basePoolReward,
//! performancePoolReward}` with entries sorted by account id ascending.
//! Internal nodes hash the concatenated lowercase-hex forms of their
//! children; a level with an odd node count duplicates its last node. The
//! empty tree's root is `SHA-256("")` and a single-leaf tree's root is the
//! leaf itself.

use serde::{Deserialize, Serialize};
use serde_json::json;

use ai4a_types::{AccountId, RewardEntry};

use crate::canonical::{compute_hash, sha256_hex, HashError};

/// Which side of the parent a proof sibling sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Sibling is the left child; the proven node is on the right.
    Left,
    /// Sibling is the right child; the proven node is on the left.
    Right,
}

/// One sibling on the path from a leaf to the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofStep {
    /// Sibling hash, lowercase hex.
    pub hash: String,
    /// Side the sibling occupies.
    pub side: Side,
}

/// Inclusion proof for one reward leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleProof {
    /// Sibling path, leaf level first.
    pub steps: Vec<ProofStep>,
    /// Index of the proven leaf in the sorted entry order.
    pub leaf_index: usize,
    /// Total number of leaves in the tree.
    pub leaf_count: usize,
}

/// A fully materialized reward tree; retains every level so proofs are a
/// lookup rather than a rebuild.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    levels: Vec<Vec<String>>,
}

fn combine(left: &str, right: &str) -> String {
    let mut joined = String::with_capacity(left.len() + right.len());
    joined.push_str(left);
    joined.push_str(right);
    sha256_hex(joined.as_bytes())
}

/// Canonical leaf hash for one reward entry.
pub fn reward_leaf(entry: &RewardEntry) -> String {
    compute_hash(&json!({
        "accountId": entry.account_id,
        "totalReward": entry.total_reward,
        "basePoolReward": entry.base_pool_reward,
        "performancePoolReward": entry.performance_pool_reward,
    }))
}

impl MerkleTree {
    /// Build a tree from pre-computed leaf hashes.
    pub fn from_leaves(leaves: Vec<String>) -> Self {
        let mut levels = vec![leaves];
        while levels.last().map(Vec::len).unwrap_or(0) > 1 {
            let current = levels.last().expect("level stack is never empty");
            let mut next = Vec::with_capacity((current.len() + 1) / 2);
            for pair in current.chunks(2) {
                let left = &pair[0];
                // Odd count at this level: duplicate the last node.
                let right = pair.get(1).unwrap_or(left);
                next.push(combine(left, right));
            }
            levels.push(next);
        }
        Self { levels }
    }

    /// Build the reward tree for a day. Entries are sorted by account id
    /// before leaf formation so the commitment is order-independent.
    pub fn for_rewards(entries: &[RewardEntry]) -> Self {
        let mut sorted: Vec<&RewardEntry> = entries.iter().collect();
        sorted.sort_by(|a, b| a.account_id.cmp(&b.account_id));
        Self::from_leaves(sorted.iter().map(|e| reward_leaf(e)).collect())
    }

    /// Root hash. The empty tree commits to `SHA-256("")`.
    pub fn root(&self) -> String {
        match self.levels.last().and_then(|l| l.first()) {
            Some(root) => root.clone(),
            None => sha256_hex(b""),
        }
    }

    /// Number of leaves.
    pub fn leaf_count(&self) -> usize {
        self.levels.first().map(Vec::len).unwrap_or(0)
    }

    /// Inclusion proof for the leaf at `index`, or `None` when out of range.
    pub fn proof(&self, index: usize) -> Option<MerkleProof> {
        let leaf_count = self.leaf_count();
        if index >= leaf_count {
            return None;
        }
        let mut steps = Vec::new();
        let mut cursor = index;
        for level in &self.levels[..self.levels.len().saturating_sub(1)] {
            if cursor % 2 == 0 {
                // Sibling on the right; a missing one means this level was
                // odd and the node pairs with its own duplicate.
                let sibling = level.get(cursor + 1).unwrap_or(&level[cursor]);
                steps.push(ProofStep {
                    hash: sibling.clone(),
                    side: Side::Right,
                });
            } else {
                steps.push(ProofStep {
                    hash: level[cursor - 1].clone(),
                    side: Side::Left,
                });
            }
            cursor /= 2;
        }
        Some(MerkleProof {
            steps,
            leaf_index: index,
            leaf_count,
        })
    }
}

/// Root of the reward tree for `entries`.
pub fn reward_root(entries: &[RewardEntry]) -> String {
    MerkleTree::for_rewards(entries).root()
}

/// Leaf hash and inclusion proof for one account within `entries`, or
/// `None` when the account earned nothing that day.
pub fn reward_proof(
    entries: &[RewardEntry],
    account: &AccountId,
) -> Result<Option<(String, MerkleProof)>, HashError> {
    let mut sorted: Vec<&RewardEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.account_id.cmp(&b.account_id));
    let index = match sorted.iter().position(|e| e.account_id == *account) {
        Some(i) => i,
        None => return Ok(None),
    };
    let tree = MerkleTree::from_leaves(sorted.iter().map(|e| reward_leaf(e)).collect());
    let leaf = reward_leaf(sorted[index]);
    Ok(tree.proof(index).map(|p| (leaf, p)))
}

/// Recompute the root from a leaf and its proof and compare.
pub fn verify_proof(leaf: &str, proof: &MerkleProof, root: &str) -> bool {
    let mut current = leaf.to_string();
    for step in &proof.steps {
        current = match step.side {
            Side::Right => combine(&current, &step.hash),
            Side::Left => combine(&step.hash, &current),
        };
    }
    current == root
}
