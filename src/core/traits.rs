//! Collaborator traits for the external services the pipeline calls out to.
//!
//! The grading core does not implement text recognition or answer scoring;
//! both are consumed through these seams. Implementations wrap whatever
//! backend is in use (an OCR service, a grading language model) and are
//! expected to surface deadline overruns as
//! [`GradeError::CollaboratorTimeout`](crate::core::GradeError::CollaboratorTimeout)
//! so the orchestrator can degrade the affected item without aborting the
//! batch.

use std::collections::BTreeMap;

use image::GrayImage;

use crate::core::errors::GradeResult;
use crate::domain::RegionOfInterest;

/// Recognizes the text content of each requested region on an aligned
/// raster.
///
/// The returned map must contain an entry (possibly an empty string) for
/// every requested region label; the orchestrator treats an omitted label
/// as a collaborator contract violation for that scan.
pub trait RegionRecognizer {
    /// Runs recognition over the given aligned image and region set.
    fn recognize(
        &self,
        aligned: &GrayImage,
        regions: &[RegionOfInterest],
    ) -> GradeResult<BTreeMap<String, String>>;
}

/// Scores one student answer against its reference answer.
///
/// Implementations should fail closed: an internal backend error is
/// reported as an `Err`, which the orchestrator converts into a zero-score
/// entry whose feedback carries the error text. Awarded marks outside
/// `[0, max_marks]` are clamped by the orchestrator.
pub trait AnswerScorer {
    /// Returns `(awarded_marks, feedback)` for the given answer.
    fn score(&self, answer: &str, reference: &str, max_marks: f64) -> GradeResult<(f64, String)>;
}

/// Provides a refreshed region-of-interest set for an aligned raster.
///
/// Refresh is best-effort: when it fails the orchestrator logs a warning
/// and proceeds with the session's static region set.
pub trait RegionSource {
    /// Derives a region set from the given aligned image.
    fn refresh(&self, aligned: &GrayImage) -> GradeResult<Vec<RegionOfInterest>>;
}

/// A [`RegionSource`] that always returns a fixed region set.
#[derive(Debug, Clone, Default)]
pub struct StaticRegions {
    regions: Vec<RegionOfInterest>,
}

impl StaticRegions {
    /// Creates a static source over the given regions.
    pub fn new(regions: Vec<RegionOfInterest>) -> Self {
        Self { regions }
    }
}

impl RegionSource for StaticRegions {
    fn refresh(&self, _aligned: &GrayImage) -> GradeResult<Vec<RegionOfInterest>> {
        Ok(self.regions.clone())
    }
}
