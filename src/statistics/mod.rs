//! Statistical building blocks for region construction.
//!
//! This module provides the numeric infrastructure the transform and region
//! layers are built on:
//! - With-replacement bootstrap resampling with counter-based seeding
//! - Covariance estimation (Welford) with adaptive diagonal jitter
//! - Symmetric matrix square roots for whitening
//! - Ordinary least squares line fits for funnel detection

mod bootstrap;
mod covariance;
mod regression;

pub use bootstrap::{counter_rng_seed, resample_with_replacement, BootstrapSample};
pub use covariance::{
    add_diagonal_jitter, regularized_cholesky, symmetric_sqrt_pair, SymmetricSqrt,
    WelfordCovariance,
};
pub use regression::{fit_line, LineFit};
