//! The constrained region: ball union, bounding ellipsoid and cones.
//!
//! A [`Region`] is built per iteration from the live points and a fitted
//! [`TransformLayer`], and moves through three stages:
//!
//! 1. [`Region::new`] whitens the live points.
//! 2. [`Region::apply_enlargement`] sizes the balls by bootstrap.
//! 3. [`Region::create_wrapping_geometry`] fits the ellipsoid and cones.
//!
//! Membership tests and sampling need all three; calling them earlier
//! returns [`RegionError::NotReady`].

mod cones;
mod ellipsoid;
mod enlargement;
pub mod sampling;

pub use cones::Cone;
pub use ellipsoid::Ellipsoid;
pub use sampling::{
    CandidateGenerator, ConeFilter, EllipsoidDraws, SampleBatch, SamplingMethod,
    StrategySelector,
};

use rand::Rng;
use serde::Serialize;

use crate::config::RegionConfig;
use crate::error::{RegionError, Result};
use crate::transform::TransformLayer;
use crate::types::{row_distance_sq, Matrix, Points, Vector};

use cones::fit_cone;
use ellipsoid::fit_ellipsoid;
use enlargement::bootstrap_enlargement;
use sampling::{draw_loop, inside_all_cones, BallDraws, MembershipFilter};

/// Diagnostics of a region, for outer-loop logging.
#[derive(Debug, Clone, Serialize)]
pub struct RegionSummary {
    /// Number of live points.
    pub npoints: usize,
    /// Number of transform clusters.
    pub nclusters: usize,
    /// Bootstrap enlargement, once applied.
    pub enlarge: Option<f64>,
    /// Radius override, if set.
    pub maxradiussq: Option<f64>,
    /// Number of accepted cones.
    pub ncones: usize,
    /// Method the next [`Region::sample`] call will use.
    pub current_method: SamplingMethod,
    /// Smoothed efficiency of every registered method, `None` if untried.
    pub efficiencies: Vec<(SamplingMethod, Option<f64>)>,
}

/// Wrapped region around a set of live points.
#[derive(Debug, Clone)]
pub struct Region<'a> {
    points: &'a Points,
    layer: &'a TransformLayer,
    config: RegionConfig,
    unormed: Points,
    labels: Vec<usize>,
    /// Live-point indices per cluster, ascending.
    members: Vec<Vec<usize>>,
    enlarge: Option<f64>,
    maxradiussq: Option<f64>,
    ellipsoid: Option<Ellipsoid>,
    cones: Vec<Cone>,
    selector: StrategySelector,
}

impl<'a> Region<'a> {
    /// Whiten `points` with `layer`.
    ///
    /// The configuration is validated against the point dimensionality and
    /// the layer's wrapped dimensions before any work is done.
    pub fn new(
        points: &'a Points,
        layer: &'a TransformLayer,
        config: RegionConfig,
    ) -> Result<Self> {
        let ndim = layer.ndim().ok_or(RegionError::NotReady { stage: "optimize" })?;
        config.validate(ndim, layer.wrapped_dims())?;
        if points.ncols() != ndim {
            return Err(RegionError::DimensionMismatch {
                expected: ndim,
                actual: points.ncols(),
            });
        }
        if points.nrows() == 0 {
            return Err(RegionError::InsufficientPoints {
                needed: 1,
                actual: 0,
            });
        }
        if points.iter().any(|v| !v.is_finite()) {
            return Err(RegionError::invalid("points contain non-finite coordinates"));
        }

        let labels = layer.assign_clusters(points)?;
        let mut members = vec![Vec::new(); layer.nclusters()];
        let mut unormed = Points::zeros(points.nrows(), ndim);
        for (i, &c) in labels.iter().enumerate() {
            members[c].push(i);
            unormed.set_row(i, &layer.clusters()[c].forward_row(points, i).transpose());
        }

        let selector = StrategySelector::new(config.efficiency_smoothing);
        Ok(Self {
            points,
            layer,
            config,
            unormed,
            labels,
            members,
            enlarge: None,
            maxradiussq: None,
            ellipsoid: None,
            cones: Vec::new(),
            selector,
        })
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Estimate the enlargement from `nbootstraps` bootstrap rounds.
    ///
    /// Discards any previously built geometry.
    pub fn apply_enlargement(&mut self, nbootstraps: usize) -> Result<f64> {
        if nbootstraps == 0 {
            return Err(RegionError::invalid("nbootstraps must be positive"));
        }
        let enlarge = bootstrap_enlargement(
            &self.unormed,
            &self.labels,
            &self.members,
            nbootstraps,
            self.config.seed,
        );
        tracing::debug!(enlarge, nbootstraps, "bootstrap enlargement");
        self.enlarge = Some(enlarge);
        self.ellipsoid = None;
        self.cones.clear();
        Ok(enlarge)
    }

    /// [`apply_enlargement`](Self::apply_enlargement) with the configured
    /// number of rounds.
    pub fn apply_default_enlargement(&mut self) -> Result<f64> {
        self.apply_enlargement(self.config.nbootstraps)
    }

    /// Fit the bounding ellipsoid and the cones.
    pub fn create_wrapping_geometry(&mut self) -> Result<()> {
        let enlarge = self.enlarge()?;
        self.ellipsoid = Some(self.fit_ellipsoid(enlarge)?);
        let wrapped = self.layer.wrap_mask_fitted();
        self.cones = self
            .config
            .sigma_dims
            .iter()
            .filter_map(|&j| fit_cone(self.points, j, wrapped))
            .collect();
        tracing::debug!(
            ncones = self.cones.len(),
            nclusters = self.layer.nclusters(),
            "wrapping geometry created"
        );
        Ok(())
    }

    /// Override the squared ball radius.
    ///
    /// The ellipsoid, if already built, is refitted around the resized
    /// balls. Every live point stays inside the region however small the
    /// radius.
    pub fn set_maxradiussq(&mut self, radiussq: f64) -> Result<()> {
        if !(radiussq.is_finite() && radiussq > 0.0) {
            return Err(RegionError::invalid(format!(
                "maxradiussq must be positive and finite, got {radiussq}"
            )));
        }
        self.maxradiussq = Some(radiussq);
        if self.ellipsoid.is_some() {
            let enlarge = self.enlarge()?;
            self.ellipsoid = Some(self.fit_ellipsoid(enlarge)?);
        }
        Ok(())
    }

    fn fit_ellipsoid(&self, enlarge: f64) -> Result<Ellipsoid> {
        Ok(fit_ellipsoid(
            self.points,
            &self.labels,
            self.layer.clusters(),
            self.layer.wrap_mask_fitted(),
            self.ball_radiussq()?,
            enlarge,
        ))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Bootstrap enlargement.
    pub fn enlarge(&self) -> Result<f64> {
        self.enlarge.ok_or(RegionError::NotReady {
            stage: "apply_enlargement",
        })
    }

    /// Radius override, if set.
    pub fn maxradiussq(&self) -> Option<f64> {
        self.maxradiussq
    }

    /// Squared radius of every ball: the override if set, else the
    /// enlargement.
    pub fn ball_radiussq(&self) -> Result<f64> {
        match self.maxradiussq {
            Some(r) => Ok(r),
            None => self.enlarge(),
        }
    }

    /// Whitened live points.
    pub fn unormed(&self) -> &Points {
        &self.unormed
    }

    /// Live points.
    pub fn points(&self) -> &Points {
        self.points
    }

    /// Cluster label of each live point.
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Transform layer the region was built with.
    pub fn transform_layer(&self) -> &TransformLayer {
        self.layer
    }

    /// Bounding ellipsoid.
    pub fn ellipsoid(&self) -> Result<&Ellipsoid> {
        self.ellipsoid.as_ref().ok_or(RegionError::NotReady {
            stage: "create_wrapping_geometry",
        })
    }

    /// Ellipsoid center.
    pub fn ellipsoid_center(&self) -> Result<&Vector> {
        Ok(self.ellipsoid()?.center())
    }

    /// Ellipsoid inverse covariance.
    pub fn ellipsoid_invcov(&self) -> Result<&Matrix> {
        Ok(self.ellipsoid()?.invcov())
    }

    /// Accepted cones.
    pub fn cones(&self) -> &[Cone] {
        &self.cones
    }

    /// True if at least one cone was accepted.
    pub fn has_cones(&self) -> bool {
        !self.cones.is_empty()
    }

    /// Registered sampling methods, in selection order.
    pub fn sampling_methods(&self) -> &'static [SamplingMethod] {
        &SamplingMethod::ALL
    }

    /// Method the next [`sample`](Self::sample) call will use.
    pub fn current_sampling_method(&self) -> SamplingMethod {
        self.selector.current()
    }

    /// Snapshot of the region's diagnostics.
    pub fn summary(&self) -> RegionSummary {
        RegionSummary {
            npoints: self.points.nrows(),
            nclusters: self.layer.nclusters(),
            enlarge: self.enlarge,
            maxradiussq: self.maxradiussq,
            ncones: self.cones.len(),
            current_method: self.selector.current(),
            efficiencies: SamplingMethod::ALL
                .iter()
                .map(|&m| (m, self.selector.efficiency(m)))
                .collect(),
        }
    }

    /// Mean Euclidean distance between pairs of whitened live points.
    pub fn compute_mean_pair_distance(&self) -> f64 {
        let n = self.unormed.nrows();
        if n < 2 {
            return 0.0;
        }
        let mut total = 0.0;
        for i in 0..n {
            for j in 0..i {
                total += row_distance_sq(&self.unormed, i, &self.unormed, j).sqrt();
            }
        }
        total / (n * (n - 1) / 2) as f64
    }

    // =========================================================================
    // Membership
    // =========================================================================

    /// True if any ball of a live point with index below `limit` contains
    /// row `i` of `points`.
    pub(crate) fn ball_hit(&self, points: &Points, i: usize, limit: usize) -> bool {
        let Ok(radiussq) = self.ball_radiussq() else {
            return false;
        };
        for (c, members) in self.members.iter().enumerate() {
            if members.first().map_or(true, |&first| first >= limit) {
                continue;
            }
            let w = self.layer.clusters()[c].forward_row(points, i);
            for &j in members {
                if j >= limit {
                    break;
                }
                let mut d2 = 0.0;
                for k in 0..w.len() {
                    let d = w[k] - self.unormed[(j, k)];
                    d2 += d * d;
                }
                if d2 <= radiussq {
                    return true;
                }
            }
        }
        false
    }

    fn check_ready(&self, points: &Points) -> Result<()> {
        self.ellipsoid()?;
        if points.ncols() != self.unormed.ncols() {
            return Err(RegionError::DimensionMismatch {
                expected: self.unormed.ncols(),
                actual: points.ncols(),
            });
        }
        Ok(())
    }

    /// Region membership of every row: inside the ball union and inside
    /// every cone.
    pub fn inside(&self, points: &Points) -> Result<Vec<bool>> {
        self.check_ready(points)?;
        let limit = self.unormed.nrows();
        Ok((0..points.nrows())
            .map(|i| {
                self.ball_hit(points, i, limit) && inside_all_cones(&self.cones, points, i)
            })
            .collect())
    }

    /// Ellipsoid membership of every row.
    pub fn inside_ellipsoid(&self, points: &Points) -> Result<Vec<bool>> {
        self.check_ready(points)?;
        let ellipsoid = self.ellipsoid()?;
        Ok((0..points.nrows())
            .map(|i| ellipsoid.contains(points, i))
            .collect())
    }

    /// Cone membership of every row; all true without cones.
    pub fn inside_cones(&self, points: &Points) -> Result<Vec<bool>> {
        self.check_ready(points)?;
        Ok((0..points.nrows())
            .map(|i| inside_all_cones(&self.cones, points, i))
            .collect())
    }

    // =========================================================================
    // Sampling
    // =========================================================================

    /// Draw `nsamples` region members with the currently selected method and
    /// update the method selection.
    pub fn sample<R: Rng + ?Sized>(
        &mut self,
        nsamples: usize,
        rng: &mut R,
    ) -> Result<SampleBatch> {
        let method = self.selector.current();
        let batch = self.sample_with(method, nsamples, rng)?;
        self.selector.record(method, batch.len(), batch.ncalls);
        Ok(batch)
    }

    /// Draw `nsamples` region members with a specific method.
    pub fn sample_with<R: Rng + ?Sized>(
        &self,
        method: SamplingMethod,
        nsamples: usize,
        rng: &mut R,
    ) -> Result<SampleBatch> {
        let ellipsoid = self.ellipsoid()?;
        let ndim = self.unormed.ncols();
        let (max_draws, batch) = (self.config.max_candidate_draws, self.config.draw_batch_size);
        match method {
            SamplingMethod::BallUnion => {
                let mut gen = ConeFilter::new(&self.cones, BallDraws::new(self)?);
                draw_loop(&mut gen, ndim, nsamples, max_draws, batch, rng)
            }
            SamplingMethod::Ellipsoid => {
                let mut gen = MembershipFilter::new(self, EllipsoidDraws::new(ellipsoid));
                draw_loop(&mut gen, ndim, nsamples, max_draws, batch, rng)
            }
        }
    }

    /// Uniform draws from the ball union, ignoring cones.
    pub fn sample_from_balls<R: Rng + ?Sized>(
        &self,
        nsamples: usize,
        rng: &mut R,
    ) -> Result<SampleBatch> {
        self.ellipsoid()?;
        let mut gen = BallDraws::new(self)?;
        draw_loop(
            &mut gen,
            self.unormed.ncols(),
            nsamples,
            self.config.max_candidate_draws,
            self.config.draw_batch_size,
            rng,
        )
    }

    /// Unconditional uniform draws from the bounding ellipsoid.
    ///
    /// Every draw is accepted; the points are not checked against the ball
    /// union, the cones or the unit cube.
    pub fn sample_from_ellipsoid<R: Rng + ?Sized>(
        &self,
        nsamples: usize,
        rng: &mut R,
    ) -> Result<SampleBatch> {
        let mut gen = EllipsoidDraws::new(self.ellipsoid()?);
        draw_loop(
            &mut gen,
            self.unormed.ncols(),
            nsamples,
            self.config.max_candidate_draws,
            self.config.draw_batch_size,
            rng,
        )
    }
}
