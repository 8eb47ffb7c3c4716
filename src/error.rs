//! Error types for region construction and sampling.
//!
//! Only contract violations are surfaced. Geometric degeneracies (too few
//! points for a covariance fit, singular covariance) are absorbed into more
//! conservative bounds where they occur and never reach the caller.

/// Error returned by transform fitting, region construction and sampling.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegionError {
    /// Configuration rejected before any fitting work.
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// What was wrong.
        message: String,
    },

    /// A cluster lost all of its members when fit points were reassigned.
    ///
    /// Clustering guarantees non-empty clusters, so this indicates a defect
    /// in the caller's inputs (e.g. fit and assignment sets that do not
    /// overlap) rather than a recoverable condition.
    #[error("Cluster {cluster} has no members after reassignment")]
    EmptyCluster {
        /// Index of the empty cluster.
        cluster: usize,
    },

    /// A point set does not have the expected number of columns.
    #[error("Dimension mismatch: expected {expected} columns, got {actual}")]
    DimensionMismatch {
        /// Expected dimensionality.
        expected: usize,
        /// Dimensionality supplied.
        actual: usize,
    },

    /// Not enough points for the requested operation.
    #[error("Insufficient points: need at least {needed}, got {actual}")]
    InsufficientPoints {
        /// Minimum number of points.
        needed: usize,
        /// Number of points supplied.
        actual: usize,
    },

    /// An operation was called before the lifecycle stage it depends on.
    #[error("Region not ready: {stage} has not been run")]
    NotReady {
        /// The missing stage.
        stage: &'static str,
    },
}

impl RegionError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, RegionError>;
