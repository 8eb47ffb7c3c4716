//! Covariance estimation and symmetric matrix square roots.
//!
//! Covariances feed two consumers: the Affine transform, which whitens with
//! the inverse symmetric square root, and the bounding ellipsoid, which needs
//! a positive-definite inverse. Both must survive rank-deficient input
//! (collinear or duplicated points), so every covariance passes through
//! [`add_diagonal_jitter`] before it is factorized.

use nalgebra::{Cholesky, Dyn, SymmetricEigen};

use crate::constants::{BASE_JITTER, MAX_RIDGE_ESCALATIONS, RELATIVE_JITTER};
use crate::types::{Matrix, Vector};

/// Online covariance accumulator using Welford's algorithm.
///
/// Uses Welford's numerically stable online algorithm for mean and M2 (sum
/// of outer products), which converts to covariance via M2/(n-1).
#[derive(Debug, Clone)]
pub struct WelfordCovariance {
    /// Count of vectors accumulated so far.
    n: usize,
    /// Running mean of vectors.
    mean: Vector,
    /// Sum of outer products: Σ(x - μ)(x - μ)^T
    m2: Matrix,
}

impl WelfordCovariance {
    /// Create a new accumulator for `dim`-dimensional vectors.
    pub fn new(dim: usize) -> Self {
        Self {
            n: 0,
            mean: Vector::zeros(dim),
            m2: Matrix::zeros(dim, dim),
        }
    }

    /// Update the accumulator with a new vector.
    ///
    /// ```text
    /// δ = x - μₙ₋₁
    /// μₙ = μₙ₋₁ + δ/n
    /// δ' = x - μₙ
    /// M2ₙ = M2ₙ₋₁ + δ·δ'^T
    /// ```
    pub fn update(&mut self, x: &Vector) {
        self.n += 1;
        let n = self.n as f64;

        let delta = x - &self.mean;
        self.mean += &delta / n;
        let delta2 = x - &self.mean;
        self.m2 += &delta * delta2.transpose();
    }

    /// Unbiased sample covariance M2/(n-1), or `None` for fewer than two
    /// vectors.
    ///
    /// The outer-product update is only symmetric up to rounding, so the
    /// result is explicitly symmetrized.
    pub fn finalize(&self) -> Option<Matrix> {
        if self.n < 2 {
            return None;
        }
        let cov = &self.m2 / (self.n - 1) as f64;
        Some((&cov + cov.transpose()) * 0.5)
    }
}

/// Add small jitter to the diagonal for numerical stability.
///
/// The jitter is data-adaptive: a fixed floor plus a fraction of the mean
/// diagonal element. Returns the jittered matrix and the jitter added.
pub fn add_diagonal_jitter(mut matrix: Matrix) -> (Matrix, f64) {
    let dim = matrix.nrows();
    if dim == 0 {
        return (matrix, 0.0);
    }
    let trace = matrix.trace().abs();
    let jitter = BASE_JITTER + (trace / dim as f64) * RELATIVE_JITTER;

    for i in 0..dim {
        matrix[(i, i)] += jitter;
    }

    (matrix, jitter)
}

/// Cholesky-factorize a covariance matrix, escalating a ridge term until
/// the factorization succeeds.
///
/// Starts from [`add_diagonal_jitter`] and multiplies the ridge by 10 per
/// failed attempt. Returns the factorization and the total ridge added, or
/// `None` if the matrix holds non-finite entries.
pub fn regularized_cholesky(matrix: &Matrix) -> Option<(Cholesky<f64, Dyn>, f64)> {
    if matrix.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let (jittered, mut ridge) = add_diagonal_jitter(matrix.clone());
    if let Some(chol) = Cholesky::new(jittered) {
        return Some((chol, ridge));
    }

    for _ in 0..MAX_RIDGE_ESCALATIONS {
        ridge *= 10.0;
        let mut candidate = matrix.clone();
        for i in 0..candidate.nrows() {
            candidate[(i, i)] += ridge;
        }
        if let Some(chol) = Cholesky::new(candidate) {
            tracing::debug!(ridge, "covariance regularized by ridge escalation");
            return Some((chol, ridge));
        }
    }
    None
}

/// Symmetric square root and inverse square root of an SPD matrix.
#[derive(Debug, Clone)]
pub struct SymmetricSqrt {
    /// M^{1/2}
    pub sqrt: Matrix,
    /// M^{-1/2}
    pub inv_sqrt: Matrix,
    /// ln det(M^{-1/2}) = -½ Σ ln λ
    pub log_det_inv_sqrt: f64,
}

/// Compute `M^{1/2}` and `M^{-1/2}` via symmetric eigendecomposition.
///
/// Eigenvalues are floored at `floor` so the inverse root stays finite for
/// rank-deficient input.
pub fn symmetric_sqrt_pair(matrix: &Matrix, floor: f64) -> SymmetricSqrt {
    let eigen = SymmetricEigen::new(matrix.clone());
    let values = eigen.eigenvalues.map(|l| l.max(floor));
    let vectors = &eigen.eigenvectors;

    let sqrt_diag = Matrix::from_diagonal(&values.map(f64::sqrt));
    let inv_sqrt_diag = Matrix::from_diagonal(&values.map(|l| 1.0 / l.sqrt()));

    let sqrt = vectors * sqrt_diag * vectors.transpose();
    let inv_sqrt = vectors * inv_sqrt_diag * vectors.transpose();
    let log_det_inv_sqrt = -0.5 * values.iter().map(|l| l.ln()).sum::<f64>();

    SymmetricSqrt {
        sqrt,
        inv_sqrt,
        log_det_inv_sqrt,
    }
}

#[cfg(test)]
fn compute_sample_covariance(vectors: &[Vector]) -> Matrix {
    let n = vectors.len();
    let dim = vectors[0].len();
    let mut mean = Vector::zeros(dim);
    for v in vectors {
        mean += v;
    }
    mean /= n as f64;

    let mut cov = Matrix::zeros(dim, dim);
    for v in vectors {
        let centered = v - &mean;
        cov += &centered * centered.transpose();
    }
    cov / (n - 1) as f64
}


/// Property-based tests using proptest
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Welford covariance is symmetric with a non-negative diagonal
        #[test]
        fn prop_welford_symmetric(data in prop::collection::vec(
            prop::collection::vec(-100.0f64..100.0, 3), 2..60)
        ) {
            let mut welford = WelfordCovariance::new(3);
            for row in &data {
                welford.update(&Vector::from_column_slice(row));
            }
            let cov = welford.finalize().unwrap();
            for i in 0..3 {
                prop_assert!(cov[(i, i)] >= -1e-9);
                for j in 0..3 {
                    prop_assert!((cov[(i, j)] - cov[(j, i)]).abs() < 1e-12);
                }
            }
        }

        /// Jittered covariances always factorize
        #[test]
        fn prop_regularized_always_factorizes(data in prop::collection::vec(
            prop::collection::vec(-1.0f64..1.0, 4), 2..10)
        ) {
            let mut welford = WelfordCovariance::new(4);
            for row in &data {
                welford.update(&Vector::from_column_slice(row));
            }
            let cov = welford.finalize().unwrap();
            prop_assert!(regularized_cholesky(&cov).is_some());
        }
    }
}
