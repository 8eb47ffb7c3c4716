//! Per-cluster linear whitening maps.

use serde::{Deserialize, Serialize};

use crate::constants::MIN_SCALE;
use crate::statistics::{add_diagonal_jitter, symmetric_sqrt_pair, WelfordCovariance};
use crate::types::{Matrix, Points, Vector};

use super::metric::{largest_gap_cut, rewrap_coordinate, unwrap_coordinate};

/// Transform variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransformKind {
    /// Independent per-dimension rescaling by the cluster's standard
    /// deviation.
    Scaling,
    /// Full whitening by the inverse square root of the cluster covariance.
    Affine,
}

/// Whitening map of one cluster: `w = map · (unwrap(u) − center)`.
#[derive(Debug, Clone)]
pub struct ClusterTransform {
    pub(crate) center: Vector,
    pub(crate) cuts: Vec<f64>,
    pub(crate) wrapped: Vec<bool>,
    pub(crate) map: Matrix,
    pub(crate) inverse: Matrix,
    pub(crate) log_det: f64,
    pub(crate) size: usize,
    pub(crate) fallback: bool,
}

impl ClusterTransform {
    /// Cluster center in unwrapped coordinates.
    pub fn center(&self) -> &Vector {
        &self.center
    }

    /// Linear whitening map.
    pub fn map(&self) -> &Matrix {
        &self.map
    }

    /// Inverse of [`map`](Self::map).
    pub fn inverse(&self) -> &Matrix {
        &self.inverse
    }

    /// ln |det map|. A whitened volume V corresponds to raw volume
    /// `V · exp(−log_det)`.
    pub fn log_det(&self) -> f64 {
        self.log_det
    }

    /// Number of fit points in the cluster.
    pub fn size(&self) -> usize {
        self.size
    }

    /// True if the cluster was too small or degenerate for its own fit and
    /// uses the pooled diagonal scales instead.
    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    /// Offset of row `i` from the cluster center, in unwrapped coordinates.
    pub(crate) fn offset_row(&self, points: &Points, i: usize) -> Vector {
        Vector::from_fn(points.ncols(), |k, _| {
            unwrap_coordinate(points[(i, k)], self.cuts[k], self.wrapped[k]) - self.center[k]
        })
    }

    /// Whitened coordinates of row `i`.
    pub(crate) fn forward_row(&self, points: &Points, i: usize) -> Vector {
        &self.map * self.offset_row(points, i)
    }

    /// Raw unit-cube coordinates of a whitened vector.
    pub(crate) fn backward(&self, w: &Vector) -> Vector {
        let mut x = &self.inverse * w + &self.center;
        for k in 0..x.len() {
            x[k] = rewrap_coordinate(x[k], self.cuts[k], self.wrapped[k]);
        }
        x
    }
}

/// Seam positions that make a cluster contiguous in every wrapped dimension.
pub(crate) fn cluster_cuts(points: &Points, members: &[usize], wrapped: &[bool]) -> Vec<f64> {
    (0..points.ncols())
        .map(|k| {
            if wrapped[k] {
                largest_gap_cut(members.iter().map(|&i| points[(i, k)]))
            } else {
                0.0
            }
        })
        .collect()
}

/// Mean of the unwrapped member coordinates.
pub(crate) fn cluster_center(
    points: &Points,
    members: &[usize],
    cuts: &[f64],
    wrapped: &[bool],
) -> Vector {
    let n = members.len().max(1) as f64;
    Vector::from_fn(points.ncols(), |k, _| {
        members
            .iter()
            .map(|&i| unwrap_coordinate(points[(i, k)], cuts[k], wrapped[k]))
            .sum::<f64>()
            / n
    })
}

/// Diagonal map from per-dimension standard deviations.
pub(crate) fn diagonal_transform(
    center: Vector,
    cuts: Vec<f64>,
    wrapped: Vec<bool>,
    scales: &Vector,
    size: usize,
    fallback: bool,
) -> ClusterTransform {
    let map = Matrix::from_diagonal(&scales.map(|s| 1.0 / s));
    let inverse = Matrix::from_diagonal(scales);
    let log_det = -scales.iter().map(|s| s.ln()).sum::<f64>();
    ClusterTransform {
        center,
        cuts,
        wrapped,
        map,
        inverse,
        log_det,
        size,
        fallback,
    }
}

/// Standard deviations from a covariance diagonal, after jitter.
pub(crate) fn jittered_scales(variances: &Vector) -> Vector {
    let (jittered, _) = add_diagonal_jitter(Matrix::from_diagonal(variances));
    jittered.diagonal().map(f64::sqrt)
}

/// Fit one cluster's transform, or `None` if the cluster is too small for
/// the requested variant or has a dimension without spread.
pub(crate) fn fit_cluster(
    kind: TransformKind,
    points: &Points,
    members: &[usize],
    wrapped: &[bool],
) -> Option<ClusterTransform> {
    let dim = points.ncols();
    let cuts = cluster_cuts(points, members, wrapped);
    let center = cluster_center(points, members, &cuts, wrapped);

    let needed = match kind {
        TransformKind::Scaling => 2,
        TransformKind::Affine => dim + 1,
    };
    if members.len() < needed {
        return None;
    }

    let provisional = ClusterTransform {
        center: center.clone(),
        cuts: cuts.clone(),
        wrapped: wrapped.to_vec(),
        map: Matrix::identity(dim, dim),
        inverse: Matrix::identity(dim, dim),
        log_det: 0.0,
        size: members.len(),
        fallback: false,
    };
    let mut welford = WelfordCovariance::new(dim);
    for &i in members {
        welford.update(&provisional.offset_row(points, i));
    }
    let cov = welford.finalize()?;
    if cov.diagonal().iter().any(|&v| v <= MIN_SCALE * MIN_SCALE) {
        return None;
    }

    match kind {
        TransformKind::Scaling => {
            let scales = jittered_scales(&cov.diagonal());
            Some(diagonal_transform(
                center,
                cuts,
                wrapped.to_vec(),
                &scales,
                members.len(),
                false,
            ))
        }
        TransformKind::Affine => {
            let (jittered, jitter) = add_diagonal_jitter(cov);
            let roots = symmetric_sqrt_pair(&jittered, jitter);
            Some(ClusterTransform {
                center,
                cuts,
                wrapped: wrapped.to_vec(),
                map: roots.inv_sqrt,
                inverse: roots.sqrt,
                log_det: roots.log_det_inv_sqrt,
                size: members.len(),
                fallback: false,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn correlated_points(n: usize, seed: u64) -> Points {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let mut p = Points::zeros(n, 2);
        for i in 0..n {
            let a: f64 = rng.random();
            let b: f64 = rng.random();
            p[(i, 0)] = 0.3 + 0.2 * a;
            p[(i, 1)] = 0.3 + 0.1 * a + 0.02 * b;
        }
        p
    }

    #[test]
    fn test_affine_whitens() {
        let points = correlated_points(500, 1);
        let members: Vec<usize> = (0..500).collect();
        let t = fit_cluster(TransformKind::Affine, &points, &members, &[false, false]).unwrap();

        let mut welford = WelfordCovariance::new(2);
        for i in 0..500 {
            welford.update(&t.forward_row(&points, i));
        }
        let cov = welford.finalize().unwrap();
        assert!((cov[(0, 0)] - 1.0).abs() < 1e-3);
        assert!((cov[(1, 1)] - 1.0).abs() < 1e-3);
        assert!(cov[(0, 1)].abs() < 1e-3);
    }

    #[test]
    fn test_scaling_is_diagonal() {
        let points = correlated_points(200, 2);
        let members: Vec<usize> = (0..200).collect();
        let t = fit_cluster(TransformKind::Scaling, &points, &members, &[false, false]).unwrap();
        assert_eq!(t.map[(0, 1)], 0.0);
        assert_eq!(t.map[(1, 0)], 0.0);
        assert!(t.map[(0, 0)] > 0.0);
    }

    #[test]
    fn test_forward_backward_roundtrip() {
        let points = correlated_points(100, 3);
        let members: Vec<usize> = (0..100).collect();
        let t = fit_cluster(TransformKind::Affine, &points, &members, &[false, true]).unwrap();
        for i in [0, 17, 99] {
            let w = t.forward_row(&points, i);
            let back = t.backward(&w);
            for k in 0..2 {
                assert!((back[k] - points[(i, k)]).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn test_too_small_for_affine() {
        let points = correlated_points(3, 4);
        let members: Vec<usize> = (0..2).collect();
        assert!(fit_cluster(TransformKind::Affine, &points, &members, &[false, false]).is_none());
        assert!(fit_cluster(TransformKind::Scaling, &points, &members, &[false, false]).is_some());
    }

    #[test]
    fn test_flat_dimension_rejected() {
        let mut points = correlated_points(50, 5);
        points.column_mut(1).fill(0.4);
        let members: Vec<usize> = (0..50).collect();
        assert!(fit_cluster(TransformKind::Scaling, &points, &members, &[false, false]).is_none());
        assert!(fit_cluster(TransformKind::Affine, &points, &members, &[false, false]).is_none());
    }
}
