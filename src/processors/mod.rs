//! Algorithmic building blocks of geometric registration: feature
//! detection and matching, robust homography estimation, and perspective
//! resampling.

pub mod features;
pub mod homography;
pub mod warp;

pub use features::{
    Correspondence, CorrespondenceSet, Feature, FeatureMatcher, FeatureMatcherConfig,
};
pub use homography::{
    estimate_homography_dlt, fit_homography_ransac, matrix3_to_array, project,
    reprojection_error, HomographyError, RansacHomographyConfig, RansacHomographyResult,
};
pub use warp::warp_to_template;
