//! Sampling strategies and adaptive strategy selection.
//!
//! Every strategy is a [`CandidateGenerator`] that proposes a batch of
//! candidates together with an acceptance mask. Filters such as
//! [`ConeFilter`] wrap a generator and narrow its mask, and [`draw_loop`]
//! drives a generator until enough candidates were accepted or the draw cap
//! is hit.

use std::fmt;

use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::error::{RegionError, Result};
use crate::types::{Points, Vector};

use super::cones::Cone;
use super::ellipsoid::Ellipsoid;
use super::Region;

/// A registered region sampling method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SamplingMethod {
    /// MLFriends ball-union draws, cone-filtered.
    BallUnion,
    /// Bounding-ellipsoid draws filtered by full region membership.
    Ellipsoid,
}

impl SamplingMethod {
    /// All registered methods in registration order.
    pub const ALL: [SamplingMethod; 2] = [SamplingMethod::BallUnion, SamplingMethod::Ellipsoid];

    fn index(self) -> usize {
        match self {
            SamplingMethod::BallUnion => 0,
            SamplingMethod::Ellipsoid => 1,
        }
    }
}

impl fmt::Display for SamplingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplingMethod::BallUnion => write!(f, "ball-union"),
            SamplingMethod::Ellipsoid => write!(f, "ellipsoid"),
        }
    }
}

/// Accepted samples of one sampling call.
#[derive(Debug, Clone)]
pub struct SampleBatch {
    /// Accepted points, one per row.
    pub points: Points,
    /// Number of candidates drawn, rejected ones included.
    pub ncalls: usize,
}

impl SampleBatch {
    /// Number of accepted points.
    pub fn len(&self) -> usize {
        self.points.nrows()
    }

    /// True if no point was accepted.
    pub fn is_empty(&self) -> bool {
        self.points.nrows() == 0
    }

    /// Accepted fraction of drawn candidates.
    pub fn efficiency(&self) -> f64 {
        if self.ncalls == 0 {
            0.0
        } else {
            self.len() as f64 / self.ncalls as f64
        }
    }
}

/// Picks the sampling method for the next call from the smoothed
/// efficiencies observed so far.
#[derive(Debug, Clone)]
pub struct StrategySelector {
    smoothing: f64,
    efficiencies: [Option<f64>; 2],
    current: SamplingMethod,
}

impl StrategySelector {
    /// New selector starting at [`SamplingMethod::BallUnion`].
    ///
    /// `smoothing` is the weight of the newest observation, in (0, 1].
    pub fn new(smoothing: f64) -> Self {
        Self {
            smoothing,
            efficiencies: [None; 2],
            current: SamplingMethod::BallUnion,
        }
    }

    /// Method for the next call.
    pub fn current(&self) -> SamplingMethod {
        self.current
    }

    /// Smoothed efficiency of `method`, if it was tried.
    pub fn efficiency(&self, method: SamplingMethod) -> Option<f64> {
        self.efficiencies[method.index()]
    }

    /// Record the outcome of a call and choose the next method.
    ///
    /// Untried methods are tried first in registration order; afterwards the
    /// best smoothed efficiency wins, ties going to the earlier method.
    pub fn record(&mut self, method: SamplingMethod, accepted: usize, ncalls: usize) {
        if ncalls == 0 {
            return;
        }
        let observed = accepted as f64 / ncalls as f64;
        let slot = &mut self.efficiencies[method.index()];
        *slot = Some(match *slot {
            Some(previous) => previous + self.smoothing * (observed - previous),
            None => observed,
        });

        if let Some(untried) = SamplingMethod::ALL
            .into_iter()
            .find(|m| self.efficiencies[m.index()].is_none())
        {
            self.current = untried;
            return;
        }

        let mut best = SamplingMethod::BallUnion;
        let mut best_eff = f64::NEG_INFINITY;
        for m in SamplingMethod::ALL {
            let eff = self.efficiencies[m.index()].unwrap_or(0.0);
            if eff > best_eff {
                best = m;
                best_eff = eff;
            }
        }
        if best != self.current {
            tracing::debug!(
                from = %self.current,
                to = %best,
                efficiency = best_eff,
                "switching sampling method"
            );
        }
        self.current = best;
    }
}

// ============================================================================
// Candidate generators
// ============================================================================

/// Source of candidate batches with an acceptance mask.
pub trait CandidateGenerator {
    /// Propose `size` candidates, one per row, and whether each is accepted.
    fn propose<R: Rng + ?Sized>(&mut self, size: usize, rng: &mut R)
        -> Result<(Points, Vec<bool>)>;
}

/// Uniform point in the D-dimensional unit ball.
pub(crate) fn unit_ball<R: Rng + ?Sized>(dim: usize, rng: &mut R) -> Vector {
    loop {
        let v = Vector::from_fn(dim, |_, _| rng.sample::<f64, _>(StandardNormal));
        let norm = v.norm();
        if norm > 0.0 {
            let radius = rng.random::<f64>().powf(1.0 / dim as f64);
            return v * (radius / norm);
        }
    }
}

fn in_unit_cube(points: &Points, i: usize) -> bool {
    points.row(i).iter().all(|&x| (0.0..1.0).contains(&x))
}

/// Unconditional uniform draws from the bounding ellipsoid.
pub struct EllipsoidDraws<'e> {
    ellipsoid: &'e Ellipsoid,
}

impl<'e> EllipsoidDraws<'e> {
    /// Generator over `ellipsoid`.
    pub fn new(ellipsoid: &'e Ellipsoid) -> Self {
        Self { ellipsoid }
    }
}

impl CandidateGenerator for EllipsoidDraws<'_> {
    fn propose<R: Rng + ?Sized>(
        &mut self,
        size: usize,
        rng: &mut R,
    ) -> Result<(Points, Vec<bool>)> {
        let dim = self.ellipsoid.center.len();
        let mut candidates = Points::zeros(size, dim);
        for i in 0..size {
            candidates.set_row(i, &self.ellipsoid.draw(rng).transpose());
        }
        Ok((candidates, vec![true; size]))
    }
}

/// MLFriends draws: uniform on the union of the live-point balls.
///
/// A ball is chosen with probability proportional to its unit-cube volume,
/// a point is drawn uniformly inside it, and the point is kept only if no
/// earlier ball contains it, so overlaps are counted once.
pub(crate) struct BallDraws<'r, 'a> {
    region: &'r Region<'a>,
    chooser: WeightedIndex<f64>,
    radius: f64,
}

impl<'r, 'a> BallDraws<'r, 'a> {
    pub(crate) fn new(region: &'r Region<'a>) -> Result<Self> {
        let clusters = region.layer.clusters();
        let min_log_det = region
            .labels
            .iter()
            .map(|&c| clusters[c].log_det())
            .fold(f64::INFINITY, f64::min);
        let weights: Vec<f64> = region
            .labels
            .iter()
            .map(|&c| (min_log_det - clusters[c].log_det()).exp())
            .collect();
        let chooser = WeightedIndex::new(&weights)
            .map_err(|e| RegionError::invalid(format!("ball weights: {e}")))?;
        Ok(Self {
            region,
            chooser,
            radius: region.ball_radiussq()?.sqrt(),
        })
    }
}

impl CandidateGenerator for BallDraws<'_, '_> {
    fn propose<R: Rng + ?Sized>(
        &mut self,
        size: usize,
        rng: &mut R,
    ) -> Result<(Points, Vec<bool>)> {
        let region = self.region;
        let dim = region.unormed.ncols();
        let mut candidates = Points::zeros(size, dim);
        let mut mask = vec![false; size];
        for s in 0..size {
            let i = self.chooser.sample(rng);
            let cluster = &region.layer.clusters()[region.labels[i]];
            let w = Vector::from_fn(dim, |k, _| region.unormed[(i, k)])
                + unit_ball(dim, rng) * self.radius;
            candidates.set_row(s, &cluster.backward(&w).transpose());
            mask[s] = in_unit_cube(&candidates, s) && !region.ball_hit(&candidates, s, i);
        }
        Ok((candidates, mask))
    }
}

/// Narrows a generator's mask to candidates inside every cone.
pub struct ConeFilter<'c, G> {
    cones: &'c [Cone],
    inner: G,
}

impl<'c, G> ConeFilter<'c, G> {
    /// Wrap `inner` with the intersection of `cones`.
    pub fn new(cones: &'c [Cone], inner: G) -> Self {
        Self { cones, inner }
    }
}

/// True if row `i` lies inside every cone.
pub(crate) fn inside_all_cones(cones: &[Cone], points: &Points, i: usize) -> bool {
    cones.iter().all(|c| c.contains(points, i))
}

impl<G: CandidateGenerator> CandidateGenerator for ConeFilter<'_, G> {
    fn propose<R: Rng + ?Sized>(
        &mut self,
        size: usize,
        rng: &mut R,
    ) -> Result<(Points, Vec<bool>)> {
        let (candidates, mut mask) = self.inner.propose(size, rng)?;
        for (i, ok) in mask.iter_mut().enumerate() {
            *ok = *ok && inside_all_cones(self.cones, &candidates, i);
        }
        Ok((candidates, mask))
    }
}

/// Narrows a generator's mask to region members inside the unit cube.
pub(crate) struct MembershipFilter<'r, 'a, G> {
    region: &'r Region<'a>,
    inner: G,
}

impl<'r, 'a, G> MembershipFilter<'r, 'a, G> {
    pub(crate) fn new(region: &'r Region<'a>, inner: G) -> Self {
        Self { region, inner }
    }
}

impl<G: CandidateGenerator> CandidateGenerator for MembershipFilter<'_, '_, G> {
    fn propose<R: Rng + ?Sized>(
        &mut self,
        size: usize,
        rng: &mut R,
    ) -> Result<(Points, Vec<bool>)> {
        let (candidates, mut mask) = self.inner.propose(size, rng)?;
        let limit = self.region.unormed.nrows();
        for (i, ok) in mask.iter_mut().enumerate() {
            *ok = *ok
                && in_unit_cube(&candidates, i)
                && self.region.ball_hit(&candidates, i, limit)
                && inside_all_cones(&self.region.cones, &candidates, i);
        }
        Ok((candidates, mask))
    }
}

/// Drive `generator` until `nsamples` candidates are accepted or
/// `max_draws` candidates were drawn.
///
/// Batch sizes follow the acceptance rate seen so far, capped at
/// `batch_size`. Candidates after the last needed acceptance are discarded
/// uncounted, so `ncalls` reflects the draws actually consumed.
pub fn draw_loop<G, R>(
    generator: &mut G,
    ndim: usize,
    nsamples: usize,
    max_draws: usize,
    batch_size: usize,
    rng: &mut R,
) -> Result<SampleBatch>
where
    G: CandidateGenerator,
    R: Rng + ?Sized,
{
    let mut rows: Vec<f64> = Vec::with_capacity(nsamples * ndim);
    let mut accepted = 0;
    let mut ncalls = 0;

    while accepted < nsamples && ncalls < max_draws {
        let rate = if ncalls == 0 {
            1.0
        } else {
            (accepted as f64 / ncalls as f64).max(1.0 / batch_size as f64)
        };
        let wanted = ((nsamples - accepted) as f64 / rate).ceil() as usize;
        let size = wanted.clamp(1, batch_size).min(max_draws - ncalls);

        let (candidates, mask) = generator.propose(size, rng)?;
        for (i, &ok) in mask.iter().enumerate() {
            ncalls += 1;
            if ok {
                rows.extend(candidates.row(i).iter());
                accepted += 1;
                if accepted == nsamples {
                    break;
                }
            }
        }
    }

    if accepted < nsamples {
        tracing::warn!(
            accepted,
            requested = nsamples,
            ncalls,
            "candidate draw cap reached, returning partial batch"
        );
    }

    Ok(SampleBatch {
        points: Points::from_row_slice(accepted, ndim, &rows),
        ncalls,
    })
}
