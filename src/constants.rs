//! Numeric constants used throughout the crate.

/// Default deterministic seed for bootstrap resampling.
///
/// Same seed + same live points = same enlargement factor.
/// The value `0x6D6C667269656E64` is "mlfriend" encoded in ASCII.
pub const DEFAULT_SEED: u64 = 0x6D6C_6672_6965_6E64;

/// Default number of bootstrap rounds for the enlargement estimate.
pub const DEFAULT_NBOOTSTRAPS: usize = 30;

/// Smallest squared ball radius a region may use.
///
/// Keeps the ball union a positive-measure set when every cluster is a
/// singleton or all live points coincide.
pub const MIN_RADIUSSQ: f64 = 1e-300;

/// Standard deviations below this are treated as zero spread.
pub const MIN_SCALE: f64 = 1e-12;

/// Base diagonal jitter added before inverting a covariance matrix.
pub const BASE_JITTER: f64 = 1e-10;

/// Jitter relative to the mean diagonal element (trace / D).
pub const RELATIVE_JITTER: f64 = 1e-8;

/// Maximum number of ridge escalations before giving up on Cholesky.
pub const MAX_RIDGE_ESCALATIONS: usize = 40;

/// Linkage threshold as a multiple of the largest nearest-neighbour distance.
///
/// Single linkage at exactly the largest NN distance connects every point to
/// at least one neighbour but can still split a homogeneous cloud into a few
/// chains; doubling it keeps homogeneous clouds in one cluster while gaps of
/// more than twice the sparsest spacing still separate modes.
pub const CLUSTER_LINK_FACTOR: f64 = 2.0;

// ============================================================================
// Cone (funnel) acceptance thresholds
// ============================================================================

/// Minimum number of fit points (anchor excluded) for a cone fit.
pub const CONE_MIN_POINTS: usize = 20;

/// Minimum t-statistic of the mean log-scale slope, with the per-dimension
/// standard errors pooled.
pub const CONE_MIN_SLOPE_T: f64 = 3.0;

/// Minimum change of the mean fitted log half-width across the control range.
pub const CONE_MIN_LOG_SCALE_CHANGE: f64 = 0.5;

/// Upper bound on the cone padding per non-control dimension.
pub const CONE_MAX_RADIUSSQ_PER_DIM: f64 = 1e4;

/// Floor for |deviation| before taking its logarithm.
pub const CONE_MIN_DEVIATION: f64 = 1e-12;

// ============================================================================
// Sampling
// ============================================================================

/// Default smoothing weight of the newest efficiency observation.
pub const DEFAULT_EFFICIENCY_SMOOTHING: f64 = 0.5;

/// Default cap on candidate draws per sampling call.
pub const DEFAULT_MAX_CANDIDATE_DRAWS: usize = 50_000_000;

/// Default number of candidates drawn per internal batch.
pub const DEFAULT_DRAW_BATCH_SIZE: usize = 1_000;
