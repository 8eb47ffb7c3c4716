//! Bounding ellipsoid of the ball union in unit-cube coordinates.

use nalgebra::SymmetricEigen;
use rand::Rng;

use crate::statistics::{regularized_cholesky, symmetric_sqrt_pair, WelfordCovariance};
use crate::transform::metric::{axis_diff, fold, wrapped_mean};
use crate::transform::ClusterTransform;
use crate::types::{Matrix, Points, Vector};

use super::sampling::unit_ball;

/// Ellipsoid `{x : (x − center)ᵀ invcov (x − center) ≤ enlarge}`.
///
/// Differences along wrapped dimensions are circular.
#[derive(Debug, Clone)]
pub struct Ellipsoid {
    pub(crate) center: Vector,
    pub(crate) invcov: Matrix,
    /// Maps the unit ball onto the ellipsoid.
    pub(crate) axes: Matrix,
    pub(crate) enlarge: f64,
    pub(crate) wrapped: Vec<bool>,
}

impl Ellipsoid {
    /// Center in unit-cube coordinates.
    pub fn center(&self) -> &Vector {
        &self.center
    }

    /// Scaled inverse covariance (symmetric positive definite).
    pub fn invcov(&self) -> &Matrix {
        &self.invcov
    }

    /// Linear map from the unit ball onto the ellipsoid.
    pub fn axes(&self) -> &Matrix {
        &self.axes
    }

    /// Threshold of the quadratic form.
    pub fn enlarge(&self) -> f64 {
        self.enlarge
    }

    fn offset(&self, points: &Points, i: usize) -> Vector {
        Vector::from_fn(points.ncols(), |k, _| {
            axis_diff(points[(i, k)], self.center[k], self.wrapped[k])
        })
    }

    /// Quadratic form `(x − c)ᵀ invcov (x − c)` of row `i`.
    pub fn mahalanobis_sq(&self, points: &Points, i: usize) -> f64 {
        let d = self.offset(points, i);
        d.dot(&(&self.invcov * &d))
    }

    /// True if row `i` lies inside the ellipsoid.
    pub fn contains(&self, points: &Points, i: usize) -> bool {
        self.mahalanobis_sq(points, i) <= self.enlarge
    }

    /// One uniform draw from the ellipsoid, wrapped dimensions folded.
    pub(crate) fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Vector {
        let u = unit_ball(self.center.len(), rng);
        let mut x = &self.center + &self.axes * u;
        for k in 0..x.len() {
            if self.wrapped[k] {
                x[k] = fold(x[k]);
            }
        }
        x
    }
}

/// Fit the ellipsoid around the live points so that it contains every ball
/// of squared radius `radiussq` in the whitened space of each point's
/// cluster.
pub(crate) fn fit_ellipsoid(
    points: &Points,
    labels: &[usize],
    clusters: &[ClusterTransform],
    wrapped: &[bool],
    radiussq: f64,
    enlarge: f64,
) -> Ellipsoid {
    let (n, dim) = points.shape();

    let center = Vector::from_fn(dim, |k, _| {
        wrapped_mean(points.column(k).iter().copied(), wrapped[k])
    });
    let offsets: Vec<Vector> = (0..n)
        .map(|i| Vector::from_fn(dim, |k, _| axis_diff(points[(i, k)], center[k], wrapped[k])))
        .collect();

    let mut welford = WelfordCovariance::new(dim);
    for d in &offsets {
        welford.update(d);
    }
    let cov = welford
        .finalize()
        .unwrap_or_else(|| Matrix::zeros(dim, dim));
    let precision = match regularized_cholesky(&cov) {
        Some((chol, ridge)) => {
            tracing::trace!(ridge, "ellipsoid covariance factorized");
            chol.inverse()
        }
        None => Matrix::identity(dim, dim),
    };

    // Largest P-norm of a unit whitened step, per cluster
    let radius = radiussq.sqrt();
    let stretch: Vec<f64> = clusters
        .iter()
        .map(|c| {
            let m = c.inverse().transpose() * &precision * c.inverse();
            let m = (&m + m.transpose()) * 0.5;
            SymmetricEigen::new(m).eigenvalues.max().max(0.0).sqrt()
        })
        .collect();

    let mut reach_sq: f64 = 0.0;
    for (i, d) in offsets.iter().enumerate() {
        let m = d.dot(&(&precision * d)).max(0.0).sqrt();
        let reach = m + radius * stretch[labels[i]];
        reach_sq = reach_sq.max(reach * reach);
    }
    // Relative pad so rounding in later membership tests never pushes the
    // outermost live point out
    let reach_sq = reach_sq * (1.0 + 1e-12);
    let factor = if reach_sq > 0.0 && reach_sq.is_finite() {
        enlarge / reach_sq
    } else {
        1.0
    };
    let invcov = &precision * factor;
    let invcov = (&invcov + invcov.transpose()) * 0.5;

    let roots = symmetric_sqrt_pair(&invcov, f64::MIN_POSITIVE);
    let axes = roots.inv_sqrt * enlarge.sqrt();

    tracing::debug!(factor, reach_sq, "ellipsoid fitted");

    Ellipsoid {
        center,
        invcov,
        axes,
        enlarge,
        wrapped: wrapped.to_vec(),
    }
}
