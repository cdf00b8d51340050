//! Default tuning constants shared across the registration and pipeline
//! components.

/// Cap on the number of keypoints detected per image. Keeps matching cost
/// bounded on pathological inputs (a blank or noise page would otherwise
/// explode the brute-force matcher).
pub const DEFAULT_MAX_KEYPOINTS: usize = 5000;

/// Fraction of accepted matches retained (best-distance prefix) for
/// geometric fitting.
pub const DEFAULT_GOOD_MATCH_FRACTION: f32 = 0.10;

/// Minimum number of retained good matches for an alignment to be
/// considered valid. Below this, fitting geometry would be fitting noise.
pub const DEFAULT_MIN_MATCH_COUNT: usize = 10;

/// RANSAC reprojection-error tolerance in template-space pixels.
pub const DEFAULT_REPROJECTION_TOLERANCE_PX: f64 = 5.0;

/// Default deadline for a single external collaborator call, in seconds.
pub const DEFAULT_COLLABORATOR_TIMEOUT_SECS: u64 = 60;

/// Item-count threshold at or below which batch helpers stay sequential.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 1;
