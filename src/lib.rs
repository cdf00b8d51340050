//! # scangrade
//!
//! Automated grading core for scanned answer sheets. The crate registers
//! each scan against a set of known question-paper templates, extracts
//! the answer regions from the aligned raster, and drives external
//! recognition and scoring collaborators over the results, accumulating
//! per-student evaluation records in a durable, append-only collection.
//!
//! ## Components
//!
//! * [`processors`] - registration building blocks: ORB-style feature
//!   detection with cross-checked Hamming matching, RANSAC homography
//!   estimation, perspective warping
//! * [`pipeline`] - the per-pair [`Aligner`](pipeline::Aligner), the
//!   best-template [`TemplateSelector`](pipeline::TemplateSelector), and
//!   the batch [`GradingSession`](pipeline::GradingSession) orchestrator
//! * [`domain`] - templates, scans, regions of interest, and the record
//!   formats persisted between stages
//! * [`core`] - error taxonomy, collaborator traits, parallel policy
//! * [`utils`] - image loading helpers
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use scangrade::prelude::*;
//! use std::collections::BTreeMap;
//!
//! # struct MyOcr;
//! # impl scangrade::core::traits::RegionRecognizer for MyOcr {
//! #     fn recognize(
//! #         &self,
//! #         _aligned: &image::GrayImage,
//! #         regions: &[RegionOfInterest],
//! #     ) -> GradeResult<BTreeMap<String, String>> {
//! #         Ok(regions.iter().map(|r| (r.label.clone(), String::new())).collect())
//! #     }
//! # }
//! # struct MyGrader;
//! # impl scangrade::core::traits::AnswerScorer for MyGrader {
//! #     fn score(&self, _a: &str, _r: &str, max: f64) -> GradeResult<(f64, String)> {
//! #         Ok((max, "ok".to_string()))
//! #     }
//! # }
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut reference = ReferenceTable::new();
//! reference.insert("Q1", "b", 2.0);
//!
//! let config = SessionConfig::new("sessions/midterm")
//!     .with_regions(vec![RegionOfInterest::new("Q1", 1434, 930, 57, 60)])
//!     .with_reference(reference);
//!
//! let mut session = GradingSession::new(config, MyOcr, MyGrader)?;
//! session.ingest_files(&["uploads/key.png"], &["uploads/sheet_042.png"])?;
//!
//! let report = session.run_batch()?;
//! println!("align: {}", report.align.message);
//! for record in &session.running_collection()?.students {
//!     println!(
//!         "{}: {}/{}",
//!         record.student_info.roll_no,
//!         record.total_awarded_marks,
//!         record.total_possible_marks
//!     );
//! }
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod domain;
pub mod pipeline;
pub mod processors;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_utils;

/// Prelude module for convenient imports.
///
/// Brings the session entry points, the registration components, and the
/// persisted record types into scope:
///
/// ```rust
/// use scangrade::prelude::*;
/// ```
pub mod prelude {
    pub use crate::core::{GradeError, GradeResult, StageKind};
    pub use crate::domain::{
        EvaluationRecord, ReferenceTable, RegionOfInterest, RunningCollection, Scan,
        StudentAnswerRecord, Template,
    };
    pub use crate::pipeline::{
        Aligner, AlignerConfig, AlignmentOutcome, AlignmentResult, BatchReport, GradingSession,
        SessionConfig, StageState, StageStatus, TemplateSelector,
    };
    pub use crate::utils::load_gray;
}
