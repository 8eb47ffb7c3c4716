//! Bootstrap estimate of the ball radius.
//!
//! The squared radius must be large enough that a live point not used to
//! build the balls still falls inside them. Each round resamples the live
//! points with replacement and measures how far the held-out points are from
//! the nearest resampled point of their own cluster; the largest such
//! distance over all rounds is the enlargement.

use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::constants::MIN_RADIUSSQ;
use crate::statistics::{counter_rng_seed, resample_with_replacement};
use crate::types::{row_distance_sq, Points};

/// Largest squared distance from a held-out point to its nearest resampled
/// same-cluster neighbour, for bootstrap round `round`.
///
/// Returns 0 when no held-out point has a resampled neighbour.
pub(crate) fn bootstrap_round(
    unormed: &Points,
    labels: &[usize],
    members: &[Vec<usize>],
    seed: u64,
    round: u64,
) -> f64 {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(counter_rng_seed(seed, round));
    let sample = resample_with_replacement(unormed.nrows(), &mut rng);

    let mut worst: f64 = 0.0;
    for i in sample.held_out_indices() {
        let nearest = members[labels[i]]
            .iter()
            .filter(|&&j| sample.selected[j])
            .map(|&j| row_distance_sq(unormed, i, unormed, j))
            .fold(f64::INFINITY, f64::min);
        if nearest.is_finite() {
            worst = worst.max(nearest);
        }
    }
    worst
}

/// Maximum of [`bootstrap_round`] over `nbootstraps` rounds, floored at
/// [`MIN_RADIUSSQ`].
pub(crate) fn bootstrap_enlargement(
    unormed: &Points,
    labels: &[usize],
    members: &[Vec<usize>],
    nbootstraps: usize,
    seed: u64,
) -> f64 {
    #[cfg(feature = "parallel")]
    let worst: f64 = (0..nbootstraps as u64)
        .into_par_iter()
        .map(|b| bootstrap_round(unormed, labels, members, seed, b))
        .reduce(|| 0.0, f64::max);

    #[cfg(not(feature = "parallel"))]
    let worst: f64 = {
        let mut worst: f64 = 0.0;
        for b in 0..nbootstraps as u64 {
            let stat = bootstrap_round(unormed, labels, members, seed, b);
            tracing::trace!(round = b, stat, "bootstrap round");
            worst = worst.max(stat);
        }
        worst
    };

    worst.max(MIN_RADIUSSQ)
}
