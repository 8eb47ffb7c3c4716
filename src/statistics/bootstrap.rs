//! With-replacement bootstrap resampling.
//!
//! Each bootstrap round draws N indices with replacement from N live points;
//! points never drawn form the held-out set. Rounds are seeded from a base
//! seed and the round counter so any subset of rounds can be recomputed
//! independently (and in any order) with identical results.

use rand::Rng;

/// Derive a well-mixed seed for round `counter` from a base seed.
///
/// Uses the SplitMix64 finalizer so that adjacent counters give
/// uncorrelated streams.
pub fn counter_rng_seed(seed: u64, counter: u64) -> u64 {
    let mut z = seed ^ counter.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Outcome of one with-replacement resample.
#[derive(Debug, Clone)]
pub struct BootstrapSample {
    /// `selected[i]` is true if point `i` was drawn at least once.
    pub selected: Vec<bool>,
}

impl BootstrapSample {
    /// Indices of held-out points (never drawn).
    pub fn held_out_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.selected
            .iter()
            .enumerate()
            .filter_map(|(i, &s)| (!s).then_some(i))
    }
}

/// Draw `n` indices with replacement from `0..n`.
pub fn resample_with_replacement<R: Rng + ?Sized>(n: usize, rng: &mut R) -> BootstrapSample {
    let mut selected = vec![false; n];
    for _ in 0..n {
        selected[rng.random_range(0..n)] = true;
    }
    BootstrapSample { selected }
}
