//! Projective transform estimation from point correspondences.
//!
//! Fits the 3×3 homography mapping scan coordinates onto template
//! coordinates: Direct Linear Transform with Hartley normalization for the
//! minimal and refit solves, wrapped in a seeded RANSAC loop so outlier
//! correspondences from descriptor mismatches cannot skew the fit. The
//! sampling seed lives in the configuration; identical inputs with the
//! same seed reproduce the identical transform.

use nalgebra::{DMatrix, Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::constants::DEFAULT_REPROJECTION_TOLERANCE_PX;

/// Errors from homography estimation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HomographyError {
    /// Fewer correspondences than the minimal solve requires.
    #[error("too few correspondences: need {needed}, got {got}")]
    TooFewPoints {
        /// Minimum required.
        needed: usize,
        /// Actually supplied.
        got: usize,
    },

    /// The linear solve or a normalization transform was degenerate.
    #[error("numerical failure: {0}")]
    Numerical(String),

    /// RANSAC found a model but not enough correspondences agree with it.
    #[error("insufficient inliers: need {needed}, found {found}")]
    InsufficientInliers {
        /// Minimum inlier count for a valid model.
        needed: usize,
        /// Best inlier count found.
        found: usize,
    },
}

/// RANSAC configuration for homography fitting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RansacHomographyConfig {
    /// Maximum number of RANSAC iterations.
    #[serde(default = "RansacHomographyConfig::default_max_iters")]
    pub max_iters: usize,

    /// Reprojection-error inlier threshold, template-space pixels.
    #[serde(default = "RansacHomographyConfig::default_inlier_threshold")]
    pub inlier_threshold: f64,

    /// Minimum inlier count for a model to be accepted.
    #[serde(default = "RansacHomographyConfig::default_min_inliers")]
    pub min_inliers: usize,

    /// Sampling seed; fixing it makes fitting reproducible.
    #[serde(default)]
    pub seed: u64,
}

impl RansacHomographyConfig {
    fn default_max_iters() -> usize {
        2000
    }

    fn default_inlier_threshold() -> f64 {
        DEFAULT_REPROJECTION_TOLERANCE_PX
    }

    fn default_min_inliers() -> usize {
        4
    }

    /// Sets the sampling seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the inlier threshold in pixels.
    pub fn with_inlier_threshold(mut self, threshold: f64) -> Self {
        self.inlier_threshold = threshold;
        self
    }
}

impl Default for RansacHomographyConfig {
    fn default() -> Self {
        Self {
            max_iters: Self::default_max_iters(),
            inlier_threshold: Self::default_inlier_threshold(),
            min_inliers: Self::default_min_inliers(),
            seed: 0,
        }
    }
}

/// Result of RANSAC homography fitting.
#[derive(Debug, Clone)]
pub struct RansacHomographyResult {
    /// The fitted transform, src → dst.
    pub h: Matrix3<f64>,
    /// Per-correspondence inlier mask against the refit transform.
    pub inlier_mask: Vec<bool>,
    /// Number of inliers in the mask.
    pub n_inliers: usize,
}

/// Projects a 2D point through a 3×3 homography.
pub fn project(h: &Matrix3<f64>, x: f64, y: f64) -> [f64; 2] {
    let p = h * Vector3::new(x, y, 1.0);
    if p[2].abs() < 1e-15 {
        return [f64::NAN, f64::NAN];
    }
    [p[0] / p[2], p[1] / p[2]]
}

/// Euclidean distance between `project(h, src)` and `dst`.
pub fn reprojection_error(h: &Matrix3<f64>, src: &[f64; 2], dst: &[f64; 2]) -> f64 {
    let p = project(h, src[0], src[1]);
    let dx = p[0] - dst[0];
    let dy = p[1] - dst[1];
    (dx * dx + dy * dy).sqrt()
}

/// Converts a homography to a row-major nested array, for persistence.
pub fn matrix3_to_array(h: &Matrix3<f64>) -> [[f64; 3]; 3] {
    [
        [h[(0, 0)], h[(0, 1)], h[(0, 2)]],
        [h[(1, 0)], h[(1, 1)], h[(1, 2)]],
        [h[(2, 0)], h[(2, 1)], h[(2, 2)]],
    ]
}

/// Hartley normalization: translate the centroid to the origin and scale
/// so the mean distance from it is sqrt(2).
fn normalize_points(pts: &[[f64; 2]]) -> (Matrix3<f64>, Vec<[f64; 2]>) {
    let n = pts.len() as f64;
    let cx: f64 = pts.iter().map(|p| p[0]).sum::<f64>() / n;
    let cy: f64 = pts.iter().map(|p| p[1]).sum::<f64>() / n;

    let mean_dist: f64 = pts
        .iter()
        .map(|p| ((p[0] - cx).powi(2) + (p[1] - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;

    let s = if mean_dist > 1e-15 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };

    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let normalized = pts.iter().map(|p| [s * (p[0] - cx), s * (p[1] - cy)]).collect();
    (t, normalized)
}

/// Estimates a homography from ≥4 correspondences via DLT.
///
/// Returns H such that `dst ≈ project(H, src)`, scaled so `h33 = 1` when
/// possible.
pub fn estimate_homography_dlt(
    src: &[[f64; 2]],
    dst: &[[f64; 2]],
) -> Result<Matrix3<f64>, HomographyError> {
    let n = src.len();
    if n < 4 || dst.len() < 4 {
        return Err(HomographyError::TooFewPoints {
            needed: 4,
            got: n.min(dst.len()),
        });
    }
    if src.len() != dst.len() {
        return Err(HomographyError::Numerical(
            "src and dst lengths differ".into(),
        ));
    }

    let (t_src, src_n) = normalize_points(src);
    let (t_dst, dst_n) = normalize_points(dst);

    // Stack the 2n × 9 DLT constraint matrix.
    let mut a = DMatrix::zeros(2 * n, 9);
    for i in 0..n {
        let (sx, sy) = (src_n[i][0], src_n[i][1]);
        let (dx, dy) = (dst_n[i][0], dst_n[i][1]);

        a[(2 * i, 3)] = -sx;
        a[(2 * i, 4)] = -sy;
        a[(2 * i, 5)] = -1.0;
        a[(2 * i, 6)] = dy * sx;
        a[(2 * i, 7)] = dy * sy;
        a[(2 * i, 8)] = dy;

        a[(2 * i + 1, 0)] = sx;
        a[(2 * i + 1, 1)] = sy;
        a[(2 * i + 1, 2)] = 1.0;
        a[(2 * i + 1, 6)] = -dx * sx;
        a[(2 * i + 1, 7)] = -dx * sy;
        a[(2 * i + 1, 8)] = -dx;
    }

    // The solution is the eigenvector of A^T A with the smallest
    // eigenvalue; solving the 9×9 symmetric problem sidesteps thin-SVD
    // shape issues on the minimal 4-point case.
    let ata = a.transpose() * &a;
    let eig = nalgebra::SymmetricEigen::new(ata);

    let mut min_idx = 0;
    let mut min_val = eig.eigenvalues[0].abs();
    for i in 1..9 {
        let v = eig.eigenvalues[i].abs();
        if v < min_val {
            min_val = v;
            min_idx = i;
        }
    }

    let h_norm = Matrix3::new(
        eig.eigenvectors[(0, min_idx)],
        eig.eigenvectors[(1, min_idx)],
        eig.eigenvectors[(2, min_idx)],
        eig.eigenvectors[(3, min_idx)],
        eig.eigenvectors[(4, min_idx)],
        eig.eigenvectors[(5, min_idx)],
        eig.eigenvectors[(6, min_idx)],
        eig.eigenvectors[(7, min_idx)],
        eig.eigenvectors[(8, min_idx)],
    );

    let t_dst_inv = t_dst
        .try_inverse()
        .ok_or_else(|| HomographyError::Numerical("destination normalization not invertible".into()))?;
    let h = t_dst_inv * h_norm * t_src;

    let scale = h[(2, 2)];
    if scale.abs() < 1e-15 {
        Ok(h)
    } else {
        Ok(h / scale)
    }
}

/// Fits a homography with RANSAC and refits over the inlier set.
///
/// `src` and `dst` are parallel point slices (scan and template
/// coordinates respectively, in the registration use).
pub fn fit_homography_ransac(
    src: &[[f64; 2]],
    dst: &[[f64; 2]],
    config: &RansacHomographyConfig,
) -> Result<RansacHomographyResult, HomographyError> {
    use rand::prelude::*;

    let n = src.len();
    if n < 4 {
        return Err(HomographyError::TooFewPoints { needed: 4, got: n });
    }

    let mut rng = rand::rngs::StdRng::seed_from_u64(config.seed);
    let mut best_inliers = 0usize;
    let mut best_mask = vec![false; n];
    let mut best_h = Matrix3::identity();

    for _ in 0..config.max_iters {
        let indices = rand::seq::index::sample(&mut rng, n, 4);
        let s4: Vec<[f64; 2]> = indices.iter().map(|i| src[i]).collect();
        let d4: Vec<[f64; 2]> = indices.iter().map(|i| dst[i]).collect();

        let h = match estimate_homography_dlt(&s4, &d4) {
            Ok(h) => h,
            Err(_) => continue,
        };

        let mut count = 0usize;
        let mut mask = vec![false; n];
        for i in 0..n {
            if reprojection_error(&h, &src[i], &dst[i]) < config.inlier_threshold {
                mask[i] = true;
                count += 1;
            }
        }

        if count > best_inliers {
            best_inliers = count;
            best_mask = mask;
            best_h = h;

            // Early exit above 90% inliers.
            if count * 10 > n * 9 {
                break;
            }
        }
    }

    if best_inliers < config.min_inliers {
        return Err(HomographyError::InsufficientInliers {
            needed: config.min_inliers,
            found: best_inliers,
        });
    }

    // Refit on the consensus set for a tighter estimate.
    let inlier_src: Vec<[f64; 2]> = (0..n).filter(|&i| best_mask[i]).map(|i| src[i]).collect();
    let inlier_dst: Vec<[f64; 2]> = (0..n).filter(|&i| best_mask[i]).map(|i| dst[i]).collect();
    let h_refit = estimate_homography_dlt(&inlier_src, &inlier_dst).unwrap_or(best_h);

    let mut final_mask = vec![false; n];
    let mut n_inliers = 0usize;
    for i in 0..n {
        if reprojection_error(&h_refit, &src[i], &dst[i]) < config.inlier_threshold {
            final_mask[i] = true;
            n_inliers += 1;
        }
    }

    Ok(RansacHomographyResult {
        h: h_refit,
        inlier_mask: final_mask,
        n_inliers,
    })
}
