//! Funnel ("cone") detection along a control dimension.
//!
//! In a funnel the spread of the other coordinates shrinks exponentially as
//! the control coordinate decreases, so a ball union or ellipsoid sized for
//! the wide end wastes most of its volume near the tip. A [`Cone`] models
//! the local half-width along every other dimension as
//!
//! ```text
//! s_k(x_j) = exp(slopes[k] · (x_j − sigma0) + ymins[k])
//! ```
//!
//! and bounds the live points by `Σ_k ((x_k − centers[k]) / s_k(x_j))² ≤
//! radiussq`.
//!
//! A cone is only accepted when the log-linear trend is significant, has
//! the same direction in every dimension and encloses less volume than a
//! constant-width tube around the same axis. Clouds without a funnel, such as
//! uniform boxes, discs, ellipses or funnels along another dimension, yield
//! none. Offsets from the axis are circular along wrapped dimensions.

use serde::{Deserialize, Serialize};

use crate::constants::{
    CONE_MAX_RADIUSSQ_PER_DIM, CONE_MIN_DEVIATION, CONE_MIN_LOG_SCALE_CHANGE, CONE_MIN_POINTS,
    CONE_MIN_SLOPE_T,
};
use crate::statistics::fit_line;
use crate::transform::metric::{axis_diff, wrapped_mean};
use crate::types::{Points, Vector};

/// Funnel bound along one control dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cone {
    /// Control dimension `j`.
    pub control_dim: usize,
    /// Funnel axis; entry `j` holds `sigma0`.
    pub centers: Vector,
    /// Smallest observed control coordinate.
    pub sigma0: f64,
    /// Log half-width at `x_j = sigma0`; zero at `j`.
    pub ymins: Vector,
    /// Growth rate of the log half-width; zero at `j`.
    pub slopes: Vector,
    /// Squared normalized radius enclosing every live point.
    pub radiussq: f64,
    /// Wrapped dimensions, where offsets from the axis are circular.
    pub wrapped: Vec<bool>,
}

impl Cone {
    /// Half-width scale along dimension `k` at control coordinate `xj`.
    pub fn scale(&self, k: usize, xj: f64) -> f64 {
        (self.slopes[k] * (xj - self.sigma0) + self.ymins[k]).exp()
    }

    /// Squared normalized distance of row `i` from the funnel axis.
    pub fn normalized_radiussq(&self, points: &Points, i: usize) -> f64 {
        let xj = points[(i, self.control_dim)];
        let mut r2 = 0.0;
        for k in 0..points.ncols() {
            if k == self.control_dim {
                continue;
            }
            let z = axis_diff(points[(i, k)], self.centers[k], self.wrapped[k]) / self.scale(k, xj);
            r2 += z * z;
        }
        r2
    }

    /// True if row `i` lies inside the cone.
    pub fn contains(&self, points: &Points, i: usize) -> bool {
        self.normalized_radiussq(points, i) <= self.radiussq
    }
}

/// `ln((e^x − 1) / x)`: log of the mean of `e^{x·u}` over `u ∈ [0, 1]`.
fn log_mean_growth(x: f64) -> f64 {
    if x == 0.0 {
        0.0
    } else if x > 0.0 {
        x + (-(-x).exp_m1() / x).ln()
    } else {
        (x.exp_m1() / x).ln()
    }
}

/// Fit a cone along control dimension `j`, or `None` if the live points show
/// no funnel there.
///
/// Each non-control dimension gets its own log-linear fit of |deviation|
/// against the control coordinate. The slopes must share a sign, and their
/// mean must be significant when the per-dimension standard errors are
/// pooled, so a weak but consistent trend across many dimensions still
/// counts. Finally the padded cone must enclose less volume than a tube of
/// constant width fitted the same way.
pub(crate) fn fit_cone(points: &Points, j: usize, wrapped: &[bool]) -> Option<Cone> {
    let (n, dim) = points.shape();
    if dim < 2 {
        return None;
    }
    if n == 0 || n - 1 < CONE_MIN_POINTS {
        tracing::debug!(control_dim = j, npoints = n, "cone rejected: too few points");
        return None;
    }

    let mut anchor = 0;
    for i in 1..n {
        if points[(i, j)] < points[(anchor, j)] {
            anchor = i;
        }
    }
    let sigma0 = points[(anchor, j)];

    let mut centers = Vector::from_fn(dim, |k, _| {
        wrapped_mean(points.column(k).iter().copied(), wrapped[k])
    });
    centers[j] = sigma0;

    let fit_rows: Vec<usize> = (0..n).filter(|&i| i != anchor).collect();
    let t: Vec<f64> = fit_rows.iter().map(|&i| points[(i, j)] - sigma0).collect();
    let t_max = t.iter().cloned().fold(0.0, f64::max);

    let mut ymins = Vector::zeros(dim);
    let mut slopes = Vector::zeros(dim);
    let mut tube_ymins = Vector::zeros(dim);
    let mut direction = 0.0;
    let mut se_sq = 0.0;
    for k in (0..dim).filter(|&k| k != j) {
        let y: Vec<f64> = fit_rows
            .iter()
            .map(|&i| {
                axis_diff(points[(i, k)], centers[k], wrapped[k])
                    .abs()
                    .max(CONE_MIN_DEVIATION)
                    .ln()
            })
            .collect();
        let fit = fit_line(&t, &y)?;

        if fit.slope == 0.0 || (direction != 0.0 && fit.slope.signum() != direction) {
            tracing::debug!(
                control_dim = j,
                dim = k,
                slope = fit.slope,
                "cone rejected: inconsistent slope signs"
            );
            return None;
        }
        direction = fit.slope.signum();

        ymins[k] = fit.intercept;
        slopes[k] = fit.slope;
        tube_ymins[k] = y.iter().sum::<f64>() / y.len() as f64;
        se_sq += fit.slope_se * fit.slope_se;
    }

    let m = (dim - 1) as f64;
    let mean_slope = slopes.sum() / m;
    let pooled_se = se_sq.sqrt() / m;
    let pooled_t = if pooled_se > 0.0 {
        mean_slope.abs() / pooled_se
    } else {
        f64::INFINITY
    };
    if pooled_t < CONE_MIN_SLOPE_T {
        tracing::debug!(control_dim = j, t = pooled_t, "cone rejected: weak slope");
        return None;
    }
    let change = mean_slope.abs() * t_max;
    if change < CONE_MIN_LOG_SCALE_CHANGE {
        tracing::debug!(control_dim = j, change, "cone rejected: scale barely changes");
        return None;
    }

    let enclosing = |cone: &Cone| {
        (0..n)
            .map(|i| cone.normalized_radiussq(points, i))
            .fold(0.0, f64::max)
    };
    let mut cone = Cone {
        control_dim: j,
        centers,
        sigma0,
        ymins,
        slopes,
        radiussq: 0.0,
        wrapped: wrapped.to_vec(),
    };
    cone.radiussq = enclosing(&cone);

    let limit = CONE_MAX_RADIUSSQ_PER_DIM * m;
    if !cone.radiussq.is_finite() || cone.radiussq > limit {
        tracing::debug!(
            control_dim = j,
            radiussq = cone.radiussq,
            "cone rejected: padding too large"
        );
        return None;
    }

    // Same axis with zero slopes, padded to enclose every point
    let mut tube = Cone {
        ymins: tube_ymins,
        slopes: Vector::zeros(dim),
        radiussq: 0.0,
        ..cone.clone()
    };
    tube.radiussq = enclosing(&tube);
    let log_volume_ratio = 0.5 * m * (cone.radiussq / tube.radiussq).ln()
        + (cone.ymins.sum() - tube.ymins.sum())
        + log_mean_growth(cone.slopes.sum() * t_max);
    if log_volume_ratio.is_nan() || log_volume_ratio >= 0.0 {
        tracing::debug!(
            control_dim = j,
            log_volume_ratio,
            "cone rejected: no smaller than a tube"
        );
        return None;
    }

    tracing::debug!(
        control_dim = j,
        t = pooled_t,
        radiussq = cone.radiussq,
        log_volume_ratio,
        "cone accepted"
    );
    Some(cone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_distr::StandardNormal;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn funnel(n: usize, dim: usize, seed: u64) -> Points {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let mut p = Points::zeros(n, dim);
        for i in 0..n {
            let t: f64 = rng.random();
            p[(i, 0)] = t;
            let width = 0.1 * (4.0 * (t - 1.0)).exp();
            for k in 1..dim {
                let z: f64 = rng.sample(StandardNormal);
                p[(i, k)] = (0.5 + width * z).clamp(0.0, 1.0);
            }
        }
        p
    }

    #[test]
    fn test_funnel_detected() {
        let points = funnel(400, 2, 1);
        let cone = fit_cone(&points, 0, &[false; 2]).expect("funnel should yield a cone");
        let min = points.column(0).iter().cloned().fold(f64::INFINITY, f64::min);
        assert_eq!(cone.sigma0.to_bits(), min.to_bits());
        assert_eq!(cone.centers[0], cone.sigma0);
        assert_eq!(cone.slopes[0], 0.0);
        assert_eq!(cone.ymins[0], 0.0);
        assert!(cone.slopes[1] > 2.0 && cone.slopes[1] < 6.0, "slope {}", cone.slopes[1]);
    }

    #[test]
    fn test_every_live_point_inside() {
        let points = funnel(300, 3, 2);
        let cone = fit_cone(&points, 0, &[false; 3]).unwrap();
        for i in 0..points.nrows() {
            assert!(cone.contains(&points, i));
        }
    }

    #[test]
    fn test_wrapped_axis_follows_the_seam() {
        let points = funnel(400, 2, 5);
        let shifted = Points::from_fn(400, 2, |i, k| {
            if k == 1 {
                (points[(i, 1)] + 0.5).rem_euclid(1.0)
            } else {
                points[(i, 0)]
            }
        });
        let plain = fit_cone(&points, 0, &[false; 2]).unwrap();
        let cone = fit_cone(&shifted, 0, &[false, true]).unwrap();

        let expected = (plain.centers[1] + 0.5).rem_euclid(1.0);
        assert!(axis_diff(cone.centers[1], expected, true).abs() < 1e-9);
        assert!((cone.slopes[1] - plain.slopes[1]).abs() < 1e-6);
        assert!((cone.radiussq - plain.radiussq).abs() < 1e-6 * plain.radiussq);
        for i in 0..shifted.nrows() {
            assert!(cone.contains(&shifted, i));
        }
    }

    #[test]
    fn test_log_mean_growth() {
        assert_eq!(log_mean_growth(0.0), 0.0);
        for &x in &[-30.0_f64, -2.0, -1e-8, 1e-8, 0.5, 3.0, 40.0] {
            let direct = (x.exp_m1() / x).ln();
            assert!((log_mean_growth(x) - direct).abs() < 1e-9, "x = {x}");
        }
        // No overflow where e^x does
        assert!(log_mean_growth(1000.0).is_finite());
    }

    #[test]
    fn test_uniform_rejected() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
        let points = Points::from_fn(400, 2, |_, _| rng.random::<f64>());
        assert!(fit_cone(&points, 0, &[false; 2]).is_none());
        assert!(fit_cone(&points, 1, &[false; 2]).is_none());
    }

    #[test]
    fn test_too_few_points() {
        let points = funnel(CONE_MIN_POINTS, 2, 4);
        assert!(fit_cone(&points, 0, &[false; 2]).is_none());
    }

    #[test]
    fn test_one_dimension_has_no_cone() {
        let points = Points::from_fn(50, 1, |i, _| i as f64 / 50.0);
        assert!(fit_cone(&points, 0, &[false]).is_none());
    }
}
