//! Configuration for region construction and sampling.

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_DRAW_BATCH_SIZE, DEFAULT_EFFICIENCY_SMOOTHING, DEFAULT_MAX_CANDIDATE_DRAWS,
    DEFAULT_NBOOTSTRAPS, DEFAULT_SEED,
};
use crate::error::{RegionError, Result};

/// Configuration options for [`Region`](crate::Region).
///
/// Wrapped (periodic) dimensions belong to the
/// [`TransformLayer`](crate::TransformLayer), since they change the metric
/// the transform is fitted in; everything else about a region lives here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionConfig {
    // =========================================================================
    // Geometry
    // =========================================================================
    /// Candidate control dimensions for funnel (cone) detection.
    ///
    /// A cone is only fitted along these dimensions, and only kept if the
    /// live points actually show a funnel trend. Must not overlap the
    /// transform's wrapped dimensions. Default: empty.
    pub sigma_dims: Vec<usize>,

    // =========================================================================
    // Bootstrap
    // =========================================================================
    /// Seed for bootstrap resampling.
    ///
    /// Round `b` uses an independent stream derived from this seed and `b`,
    /// so the enlargement is reproducible and does not depend on whether the
    /// rounds run sequentially or in parallel.
    pub seed: u64,

    /// Default number of bootstrap rounds used by
    /// [`Region::apply_default_enlargement`](crate::Region::apply_default_enlargement).
    ///
    /// Default: 30.
    pub nbootstraps: usize,

    // =========================================================================
    // Sampling
    // =========================================================================
    /// Weight of the newest efficiency observation in the running estimate
    /// used for strategy selection, in (0, 1]. Default: 0.5.
    pub efficiency_smoothing: f64,

    /// Maximum number of candidate draws per sampling call.
    ///
    /// Bounds the work of a single call when a region has very low
    /// acceptance; the call returns the samples accepted so far. Default:
    /// 50,000,000.
    pub max_candidate_draws: usize,

    /// Number of candidates generated per internal batch. Default: 1,000.
    pub draw_batch_size: usize,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            sigma_dims: Vec::new(),
            seed: DEFAULT_SEED,
            nbootstraps: DEFAULT_NBOOTSTRAPS,
            efficiency_smoothing: DEFAULT_EFFICIENCY_SMOOTHING,
            max_candidate_draws: DEFAULT_MAX_CANDIDATE_DRAWS,
            draw_batch_size: DEFAULT_DRAW_BATCH_SIZE,
        }
    }
}

impl RegionConfig {
    /// Create a new configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Builder methods
    // =========================================================================

    /// Set the candidate control dimensions for cone detection.
    pub fn sigma_dims(mut self, dims: impl Into<Vec<usize>>) -> Self {
        self.sigma_dims = dims.into();
        self
    }

    /// Set the bootstrap seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the default number of bootstrap rounds.
    pub fn nbootstraps(mut self, rounds: usize) -> Self {
        assert!(rounds > 0, "nbootstraps must be positive");
        self.nbootstraps = rounds;
        self
    }

    /// Set the efficiency smoothing weight.
    pub fn efficiency_smoothing(mut self, weight: f64) -> Self {
        assert!(
            weight > 0.0 && weight <= 1.0,
            "efficiency_smoothing must be in (0, 1]"
        );
        self.efficiency_smoothing = weight;
        self
    }

    /// Set the per-call candidate draw cap.
    pub fn max_candidate_draws(mut self, draws: usize) -> Self {
        assert!(draws > 0, "max_candidate_draws must be positive");
        self.max_candidate_draws = draws;
        self
    }

    /// Set the internal candidate batch size.
    pub fn draw_batch_size(mut self, size: usize) -> Self {
        assert!(size > 0, "draw_batch_size must be positive");
        self.draw_batch_size = size;
        self
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Check the configuration against a point dimensionality and the
    /// transform's wrapped dimensions.
    ///
    /// Control dimensions must be in range, unique, and not wrapped: a funnel
    /// is a monotone trend along its control coordinate, which a circular
    /// coordinate cannot carry.
    pub fn validate(&self, ndim: usize, wrapped_dims: &[usize]) -> Result<()> {
        for (pos, &j) in self.sigma_dims.iter().enumerate() {
            if j >= ndim {
                return Err(RegionError::invalid(format!(
                    "control dimension {j} out of range for {ndim}-dimensional points"
                )));
            }
            if wrapped_dims.contains(&j) {
                return Err(RegionError::invalid(format!(
                    "control dimension {j} is also a wrapped dimension"
                )));
            }
            if self.sigma_dims[..pos].contains(&j) {
                return Err(RegionError::invalid(format!(
                    "control dimension {j} listed more than once"
                )));
            }
        }
        if self.nbootstraps == 0 {
            return Err(RegionError::invalid("nbootstraps must be positive"));
        }
        if !(self.efficiency_smoothing > 0.0 && self.efficiency_smoothing <= 1.0) {
            return Err(RegionError::invalid(
                "efficiency_smoothing must be in (0, 1]",
            ));
        }
        if self.max_candidate_draws == 0 {
            return Err(RegionError::invalid("max_candidate_draws must be positive"));
        }
        if self.draw_batch_size == 0 {
            return Err(RegionError::invalid("draw_batch_size must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegionConfig::default();
        assert!(config.sigma_dims.is_empty());
        assert_eq!(config.seed, DEFAULT_SEED);
        assert_eq!(config.nbootstraps, 30);
        assert_eq!(config.efficiency_smoothing, 0.5);
        assert!(config.validate(2, &[]).is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = RegionConfig::new()
            .sigma_dims(vec![0])
            .seed(7)
            .nbootstraps(50)
            .efficiency_smoothing(0.25)
            .max_candidate_draws(1_000)
            .draw_batch_size(64);

        assert_eq!(config.sigma_dims, vec![0]);
        assert_eq!(config.seed, 7);
        assert_eq!(config.nbootstraps, 50);
        assert_eq!(config.efficiency_smoothing, 0.25);
        assert_eq!(config.max_candidate_draws, 1_000);
        assert_eq!(config.draw_batch_size, 64);
    }

    #[test]
    fn test_validation() {
        let config = RegionConfig::new().sigma_dims(vec![2]);
        assert!(config.validate(2, &[]).is_err());
        assert!(config.validate(3, &[]).is_ok());
        assert!(config.validate(3, &[2]).is_err());

        let config = RegionConfig::new().sigma_dims(vec![0, 0]);
        assert!(config.validate(3, &[]).is_err());

        let mut config = RegionConfig::default();
        config.efficiency_smoothing = 0.0;
        assert!(config.validate(2, &[]).is_err());
    }

    #[test]
    #[should_panic]
    fn test_invalid_nbootstraps() {
        RegionConfig::new().nbootstraps(0);
    }

    #[test]
    #[should_panic]
    fn test_invalid_smoothing() {
        RegionConfig::new().efficiency_smoothing(1.5);
    }
}
