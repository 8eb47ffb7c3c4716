//! Distances on the unit cube with optional circular (wrapped) dimensions.
//!
//! A wrapped dimension has period 1: the difference between two coordinates
//! is the shorter of the direct and the wrap-around distance. To fit linear
//! maps in wrapped dimensions, a point group is "unwrapped" by cutting the
//! circle in the middle of its largest empty arc, which makes the group
//! contiguous on [0, 1).

use crate::types::{Points, Vector};

/// Signed circular difference, mapped into [-0.5, 0.5].
#[inline]
pub fn wrap_diff(d: f64) -> f64 {
    d - d.round()
}

/// Difference `a - b` along one dimension.
#[inline]
pub fn axis_diff(a: f64, b: f64, wrapped: bool) -> f64 {
    if wrapped {
        wrap_diff(a - b)
    } else {
        a - b
    }
}

/// Fold a coordinate back onto [0, 1).
#[inline]
pub fn fold(x: f64) -> f64 {
    let f = x.rem_euclid(1.0);
    // rem_euclid can round up to exactly 1.0 for tiny negative inputs
    if f >= 1.0 {
        0.0
    } else {
        f
    }
}

/// Position of the seam that leaves `values` contiguous once unwrapped.
///
/// Returns the midpoint of the largest gap between circularly sorted
/// values, in [0, 1). An empty input yields 0.
pub fn largest_gap_cut(values: impl IntoIterator<Item = f64>) -> f64 {
    let mut sorted: Vec<f64> = values.into_iter().map(fold).collect();
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.sort_by(f64::total_cmp);

    // Gap between the last and first value, going around the seam at 1 → 0
    let mut best_gap = sorted[0] + 1.0 - sorted[sorted.len() - 1];
    let mut best_mid = fold(sorted[sorted.len() - 1] + 0.5 * best_gap);
    for pair in sorted.windows(2) {
        let gap = pair[1] - pair[0];
        if gap > best_gap {
            best_gap = gap;
            best_mid = pair[0] + 0.5 * gap;
        }
    }
    best_mid
}

/// Unwrap a coordinate relative to a seam position.
#[inline]
pub fn unwrap_coordinate(x: f64, cut: f64, wrapped: bool) -> f64 {
    if wrapped {
        fold(x - cut)
    } else {
        x
    }
}

/// Re-apply the seam to an unwrapped coordinate.
#[inline]
pub fn rewrap_coordinate(x: f64, cut: f64, wrapped: bool) -> f64 {
    if wrapped {
        fold(x + cut)
    } else {
        x
    }
}

/// Mean of one coordinate, taken across the largest-gap seam when the
/// dimension is wrapped. The result lies on [0, 1) for wrapped dimensions.
pub fn wrapped_mean<I>(values: I, wrapped: bool) -> f64
where
    I: IntoIterator<Item = f64>,
    I::IntoIter: Clone,
{
    let values = values.into_iter();
    let cut = if wrapped {
        largest_gap_cut(values.clone())
    } else {
        0.0
    };
    let (sum, n) = values.fold((0.0, 0usize), |(sum, n), x| {
        (sum + unwrap_coordinate(x, cut, wrapped), n + 1)
    });
    rewrap_coordinate(sum / n as f64, cut, wrapped)
}

/// Squared distance between row `i` of `a` and row `j` of `b`, with each
/// dimension divided by `scales[k]`.
pub fn scaled_distance_sq(
    a: &Points,
    i: usize,
    b: &Points,
    j: usize,
    scales: &Vector,
    wrapped: &[bool],
) -> f64 {
    let mut d2 = 0.0;
    for k in 0..a.ncols() {
        let d = axis_diff(a[(i, k)], b[(j, k)], wrapped[k]) / scales[k];
        d2 += d * d;
    }
    d2
}

/// Per-dimension standard deviation, unwrapping wrapped dimensions first.
///
/// Dimensions without spread get scale 1 so they do not dominate a scaled
/// distance.
pub fn dimension_scales(points: &Points, wrapped: &[bool]) -> Vector {
    let n = points.nrows();
    Vector::from_fn(points.ncols(), |k, _| {
        if n < 2 {
            return 1.0;
        }
        let cut = if wrapped[k] {
            largest_gap_cut(points.column(k).iter().copied())
        } else {
            0.0
        };
        let values: Vec<f64> = points
            .column(k)
            .iter()
            .map(|&x| unwrap_coordinate(x, cut, wrapped[k]))
            .collect();
        let mean = values.iter().sum::<f64>() / n as f64;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        let std = var.sqrt();
        if std > crate::constants::MIN_SCALE {
            std
        } else {
            1.0
        }
    })
}
