//! Seeded 32-bit linear congruential PRNG.
//!
//! Work assignment and canary selection must produce identical output on
//! every platform given the same seed, so this generator uses only wrapping
//! 32-bit integer arithmetic and IEEE-754 division. It is not
//! cryptographically secure and must never be; unpredictability comes from
//! the seed derivation, which binds the sequence to the day's locked roster.

/// Numerical Recipes LCG constants.
const MULTIPLIER: u32 = 1_664_525;
const INCREMENT: u32 = 1_013_904_223;

/// Deterministic PRNG with 32 bits of state.
#[derive(Debug, Clone)]
pub struct DeterministicRng {
    state: u32,
}

impl DeterministicRng {
    /// Start a sequence from the given seed.
    pub fn from_seed(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Next raw 32-bit value.
    pub fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(MULTIPLIER).wrapping_add(INCREMENT);
        self.state
    }

    /// Next float in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        f64::from(self.next_u32()) / (u64::from(u32::MAX) + 1) as f64
    }

    /// Uniform index in `[0, n)`. `n` must be non-zero.
    pub fn next_index(&mut self, n: usize) -> usize {
        debug_assert!(n > 0);
        let idx = (self.next_f64() * n as f64) as usize;
        idx.min(n - 1)
    }

    /// Draw one index with probability proportional to its weight. Weights
    /// must be non-negative; when they sum to zero the draw is uniform.
    pub fn next_weighted(&mut self, weights: &[f64]) -> usize {
        debug_assert!(!weights.is_empty());
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return self.next_index(weights.len());
        }
        let target = self.next_f64() * total;
        let mut cumulative = 0.0;
        for (i, w) in weights.iter().enumerate() {
            cumulative += w;
            if target < cumulative {
                return i;
            }
        }
        weights.len() - 1
    }

    /// Sample `k` distinct indices from `[0, n)` via a partial Fisher-Yates
    /// shuffle. Returns all of `[0, n)` when `k >= n`.
    pub fn sample_indices(&mut self, n: usize, k: usize) -> Vec<usize> {
        let k = k.min(n);
        let mut pool: Vec<usize> = (0..n).collect();
        for i in 0..k {
            let j = i + self.next_index(n - i);
            pool.swap(i, j);
        }
        pool.truncate(k);
        pool
    }
}
