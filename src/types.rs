//! Type aliases and common types.

use nalgebra::{DMatrix, DVector};

/// N×D point set, one point per row.
pub type Points = DMatrix<f64>;

/// D-dimensional vector (centers, scales, slopes).
pub type Vector = DVector<f64>;

/// D×D matrix (linear maps, covariances).
pub type Matrix = DMatrix<f64>;

/// Copy row `i` of a point set into a column vector.
#[inline]
pub(crate) fn row_vector(points: &Points, i: usize) -> Vector {
    Vector::from_iterator(points.ncols(), points.row(i).iter().copied())
}

/// Squared Euclidean distance between row `i` of `a` and row `j` of `b`.
#[inline]
pub(crate) fn row_distance_sq(a: &Points, i: usize, b: &Points, j: usize) -> f64 {
    let mut d2 = 0.0;
    for k in 0..a.ncols() {
        let d = a[(i, k)] - b[(j, k)];
        d2 += d * d;
    }
    d2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_vector_copies_row() {
        let p = Points::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let v = row_vector(&p, 1);
        assert_eq!(v.as_slice(), &[4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_row_distance_sq() {
        let a = Points::from_row_slice(1, 2, &[0.0, 0.0]);
        let b = Points::from_row_slice(2, 2, &[3.0, 4.0, 1.0, 1.0]);
        assert_eq!(row_distance_sq(&a, 0, &b, 0), 25.0);
        assert_eq!(row_distance_sq(&a, 0, &b, 1), 2.0);
    }
}
