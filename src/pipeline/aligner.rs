//! Registration of one (template, scan) pair.
//!
//! The aligner walks a fixed progression for each pair: both rasters are
//! already decoded (Loaded), the feature matcher produces the retained
//! correspondence set (Matched), the match count is validated against the
//! minimum-confidence floor (Validated), and only then is the homography
//! fitted and the scan resampled into the template grid (Warped). Every
//! failure on that path degrades to a rejection carrying the confidence
//! reached; nothing propagates as an error.

use std::path::Path;

use image::GrayImage;
use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::constants::DEFAULT_MIN_MATCH_COUNT;
use crate::domain::{Scan, Template};
use crate::processors::{
    fit_homography_ransac, warp_to_template, FeatureMatcher, FeatureMatcherConfig,
    RansacHomographyConfig,
};

/// Configuration for the per-pair aligner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignerConfig {
    /// Minimum retained good matches for an alignment to be accepted.
    #[serde(default = "AlignerConfig::default_min_match_count")]
    pub min_match_count: usize,

    /// Feature detection and matching parameters.
    #[serde(default)]
    pub matcher: FeatureMatcherConfig,

    /// Homography fitting parameters.
    #[serde(default)]
    pub ransac: RansacHomographyConfig,
}

impl AlignerConfig {
    fn default_min_match_count() -> usize {
        DEFAULT_MIN_MATCH_COUNT
    }

    /// Sets the minimum good-match count.
    pub fn with_min_match_count(mut self, count: usize) -> Self {
        self.min_match_count = count;
        self
    }

    /// Sets the RANSAC seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.ransac.seed = seed;
        self
    }
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            min_match_count: Self::default_min_match_count(),
            matcher: FeatureMatcherConfig::default(),
            ransac: RansacHomographyConfig::default(),
        }
    }
}

/// A successful registration of one scan against one template.
#[derive(Debug, Clone)]
pub struct AlignmentResult {
    /// The scan resampled into the template's pixel grid.
    pub aligned: GrayImage,
    /// Homography mapping scan coordinates onto template coordinates.
    pub homography: Matrix3<f64>,
    /// Count of retained good matches; higher is more reliable.
    pub confidence: usize,
    /// Identifier of the template the scan was registered against.
    pub template_id: String,
}

/// Outcome of one aligner invocation: exactly one of an accepted
/// alignment or a rejection with the confidence reached.
#[derive(Debug, Clone)]
pub enum AlignmentOutcome {
    /// The pair registered successfully.
    Aligned(AlignmentResult),
    /// The pair was rejected; `confidence` is the good-match count at the
    /// point of rejection (0 for decode failures).
    Rejected {
        /// Good matches retained before rejection.
        confidence: usize,
    },
}

impl AlignmentOutcome {
    /// The confidence score regardless of outcome.
    pub fn confidence(&self) -> usize {
        match self {
            AlignmentOutcome::Aligned(result) => result.confidence,
            AlignmentOutcome::Rejected { confidence } => *confidence,
        }
    }

    /// Consumes the outcome, returning the result if aligned.
    pub fn into_result(self) -> Option<AlignmentResult> {
        match self {
            AlignmentOutcome::Aligned(result) => Some(result),
            AlignmentOutcome::Rejected { .. } => None,
        }
    }
}

/// Registers one scan against one template.
#[derive(Debug, Clone, Default)]
pub struct Aligner {
    config: AlignerConfig,
    matcher: FeatureMatcher,
}

impl Aligner {
    /// Creates an aligner with the given configuration.
    pub fn new(config: AlignerConfig) -> Self {
        let matcher = FeatureMatcher::new(config.matcher.clone());
        Self { config, matcher }
    }

    /// Aligns a decoded scan against a decoded template.
    pub fn align(&self, template: &Template, scan: &Scan) -> AlignmentOutcome {
        let matches = self.matcher.detect_and_match(&template.image, &scan.image);
        let confidence = matches.len();
        debug!(
            template = %template.id,
            scan = %scan.id,
            confidence,
            "feature matching complete"
        );

        if confidence < self.config.min_match_count {
            debug!(
                template = %template.id,
                scan = %scan.id,
                confidence,
                min = self.config.min_match_count,
                "alignment rejected below match floor"
            );
            return AlignmentOutcome::Rejected { confidence };
        }

        let fit = match fit_homography_ransac(
            &matches.scan_points(),
            &matches.template_points(),
            &self.config.ransac,
        ) {
            Ok(fit) => fit,
            Err(err) => {
                warn!(
                    template = %template.id,
                    scan = %scan.id,
                    %err,
                    "homography fit failed, rejecting alignment"
                );
                return AlignmentOutcome::Rejected { confidence };
            }
        };

        let (width, height) = template.image.dimensions();
        let aligned = match warp_to_template(&scan.image, &fit.h, width, height) {
            Some(aligned) => aligned,
            None => {
                warn!(
                    template = %template.id,
                    scan = %scan.id,
                    "homography not invertible, rejecting alignment"
                );
                return AlignmentOutcome::Rejected { confidence };
            }
        };

        AlignmentOutcome::Aligned(AlignmentResult {
            aligned,
            homography: fit.h,
            confidence,
            template_id: template.id.clone(),
        })
    }

    /// Loads both images from disk and aligns them.
    ///
    /// A decode failure on either path is a terminal rejection with
    /// confidence 0, mirroring the in-memory contract.
    pub fn align_files(&self, template_path: &Path, scan_path: &Path) -> AlignmentOutcome {
        let template = match Template::from_path(template_path) {
            Ok(template) => template,
            Err(err) => {
                warn!(path = %template_path.display(), %err, "template decode failed");
                return AlignmentOutcome::Rejected { confidence: 0 };
            }
        };
        let scan = match Scan::from_path(scan_path) {
            Ok(scan) => scan,
            Err(err) => {
                warn!(path = %scan_path.display(), %err, "scan decode failed");
                return AlignmentOutcome::Rejected { confidence: 0 };
            }
        };
        self.align(&template, &scan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{synthetic_sheet, translated_sheet};

    fn sheet_template(id: &str, image: GrayImage) -> Template {
        Template::new(id, image)
    }

    #[test]
    fn identical_pair_aligns_with_near_identity_transform() {
        let sheet = synthetic_sheet(400, 400);
        let template = sheet_template("t1", sheet.clone());
        let scan = Scan::new("s1", sheet);

        let aligner = Aligner::default();
        let result = aligner.align(&template, &scan).into_result().expect("aligned");

        assert!(result.confidence >= DEFAULT_MIN_MATCH_COUNT);
        assert_eq!(result.template_id, "t1");
        assert_eq!(result.aligned.dimensions(), (400, 400));
        // Identity up to small numerical noise.
        assert!((result.homography[(0, 0)] - 1.0).abs() < 0.05);
        assert!(result.homography[(0, 2)].abs() < 2.0);
        assert!(result.homography[(1, 2)].abs() < 2.0);
    }

    #[test]
    fn translated_scan_recovers_the_shift() {
        let sheet = synthetic_sheet(400, 400);
        let shifted = translated_sheet(&sheet, 14, -9);
        let template = sheet_template("t1", sheet);
        let scan = Scan::new("s1", shifted);

        let aligner = Aligner::default();
        let result = aligner.align(&template, &scan).into_result().expect("aligned");

        // Scan→template homography must undo the (+14, -9) shift.
        assert!((result.homography[(0, 2)] + 14.0).abs() < 2.0);
        assert!((result.homography[(1, 2)] - 9.0).abs() < 2.0);
    }

    #[test]
    fn blank_scan_is_rejected_with_zero_confidence() {
        let template = sheet_template("t1", synthetic_sheet(300, 300));
        let blank = Scan::new("s1", GrayImage::from_pixel(300, 300, image::Luma([255u8])));

        let aligner = Aligner::default();
        match aligner.align(&template, &blank) {
            AlignmentOutcome::Rejected { confidence } => assert_eq!(confidence, 0),
            AlignmentOutcome::Aligned(_) => panic!("blank scan must not align"),
        }
    }

    #[test]
    fn below_floor_confidence_is_rejected_before_fitting() {
        let sheet = synthetic_sheet(400, 400);
        let config = AlignerConfig::default().with_min_match_count(1_000_000);
        let aligner = Aligner::new(config);
        let template = sheet_template("t1", sheet.clone());
        let scan = Scan::new("s1", sheet);

        match aligner.align(&template, &scan) {
            AlignmentOutcome::Rejected { confidence } => assert!(confidence < 1_000_000),
            AlignmentOutcome::Aligned(_) => panic!("floor must reject"),
        }
    }

    #[test]
    fn alignment_is_reproducible_for_a_fixed_seed() {
        let sheet = synthetic_sheet(400, 400);
        let shifted = translated_sheet(&sheet, 6, 11);
        let template = sheet_template("t1", sheet);
        let scan = Scan::new("s1", shifted);

        let aligner = Aligner::new(AlignerConfig::default().with_seed(42));
        let first = aligner.align(&template, &scan).into_result().expect("aligned");
        let second = aligner.align(&template, &scan).into_result().expect("aligned");

        assert_eq!(first.confidence, second.confidence);
        assert_eq!(
            crate::processors::matrix3_to_array(&first.homography),
            crate::processors::matrix3_to_array(&second.homography)
        );
    }

    #[test]
    fn missing_files_reject_with_zero_confidence() {
        let aligner = Aligner::default();
        let outcome = aligner.align_files(
            Path::new("/nonexistent/template.png"),
            Path::new("/nonexistent/scan.png"),
        );
        assert_eq!(outcome.confidence(), 0);
    }
}
