//! # mlfriends
//!
//! Constrained-prior-volume region sampling for nested sampling.
//!
//! Given live points that satisfy the current likelihood threshold, this
//! crate builds a region that tightly wraps them and draws new candidates
//! uniformly from it:
//! - Per-cluster whitening transforms, refitted every iteration
//! - A bootstrap estimate of how far the balls around live points must reach
//! - Ball-union (MLFriends), ellipsoid and funnel ("cone") bounds
//! - Adaptive choice between sampling methods by observed efficiency
//!
//! ## Quick Start
//!
//! ```ignore
//! use mlfriends::{Region, RegionConfig, TransformLayer};
//! use rand::SeedableRng;
//!
//! let mut layer = TransformLayer::affine(vec![]);
//! layer.optimize(&live_points, &live_points)?;
//!
//! let mut region = Region::new(&live_points, &layer, RegionConfig::default())?;
//! region.apply_default_enlargement()?;
//! region.create_wrapping_geometry()?;
//!
//! let mut rng = rand_xoshiro::Xoshiro256PlusPlus::seed_from_u64(1);
//! let batch = region.sample(100, &mut rng)?;
//! println!("{} samples from {} draws", batch.len(), batch.ncalls);
//! ```
//!
//! Regions borrow the live points and the transform layer, so a new region
//! is built whenever the outer loop replaces live points.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
mod config;
mod error;
mod types;

// Functional modules
pub mod constants;
pub mod region;
pub mod statistics;
pub mod transform;

// Re-exports for public API
pub use config::RegionConfig;
pub use error::{RegionError, Result};
pub use region::{
    CandidateGenerator, Cone, ConeFilter, Ellipsoid, EllipsoidDraws, Region, RegionSummary,
    SampleBatch, SamplingMethod, StrategySelector,
};
pub use transform::{ClusterTransform, TransformKind, TransformLayer};
pub use types::{Matrix, Points, Vector};
