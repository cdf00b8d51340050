//! Error types for the grading pipeline.
//!
//! This module defines the error taxonomy shared by every stage of the
//! grading pipeline: image decoding failures, collaborator (recognition and
//! scoring service) failures, reference-coverage violations, and artifact
//! persistence problems. Helper constructors keep call sites terse.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Enum naming the ordered stages of the grading pipeline.
///
/// Used in stage status reports and to attribute errors to the stage
/// they occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Geometric registration of scans against candidate templates.
    Align,
    /// Refresh (or fall back to) the region-of-interest set.
    SelectRegions,
    /// Text recognition over the extracted regions.
    Recognize,
    /// Scoring recognized answers against the reference table.
    Score,
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageKind::Align => write!(f, "align"),
            StageKind::SelectRegions => write!(f, "select regions"),
            StageKind::Recognize => write!(f, "recognize"),
            StageKind::Score => write!(f, "score"),
        }
    }
}

/// Errors that can occur in the grading pipeline.
#[derive(Error, Debug)]
pub enum GradeError {
    /// An input image could not be decoded.
    #[error("image load")]
    ImageLoad(#[source] image::ImageError),

    /// An image artifact could not be encoded or written.
    #[error("image encode")]
    ImageEncode(#[source] image::ImageError),

    /// A stage failed with context that is not covered by a more
    /// specific variant.
    #[error("{stage} failed: {message}")]
    Stage {
        /// The stage the failure occurred in.
        stage: StageKind,
        /// Human-readable failure context.
        message: String,
    },

    /// Recognized answers reference question labels with no reference
    /// answer or point value. Scoring refuses to run until the reference
    /// table covers every recognized label.
    #[error("missing reference answers for questions: {}", labels.join(", "))]
    MissingReference {
        /// The uncovered question labels, sorted and deduplicated.
        labels: Vec<String>,
    },

    /// An external collaborator call exceeded the configured deadline.
    #[error("{stage} collaborator timed out after {elapsed:?}")]
    CollaboratorTimeout {
        /// The stage whose collaborator timed out.
        stage: StageKind,
        /// How long the call actually took.
        elapsed: Duration,
    },

    /// An external collaborator (recognition or scoring service) failed.
    #[error("{stage} collaborator: {message}")]
    Collaborator {
        /// The stage whose collaborator failed.
        stage: StageKind,
        /// The collaborator's error text.
        message: String,
    },

    /// A persisted JSON artifact exists but cannot be parsed. The
    /// orchestrator never fabricates data to paper over this.
    #[error("artifact corrupt: {}", path.display())]
    ArtifactCorrupt {
        /// Path of the unreadable artifact.
        path: PathBuf,
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// A configuration problem.
    #[error("configuration: {message}")]
    Config {
        /// A message describing the configuration error.
        message: String,
    },

    /// Invalid input supplied by the caller.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// A message describing the invalid input.
        message: String,
    },

    /// IO error.
    #[error("io")]
    Io(#[from] std::io::Error),

    /// JSON serialization error outside the artifact-read path.
    #[error("json")]
    Json(#[from] serde_json::Error),

    /// CSV export error.
    #[error("csv export")]
    Csv(#[from] csv::Error),
}

impl GradeError {
    /// Creates a stage failure with context.
    pub fn stage(stage: StageKind, message: impl Into<String>) -> Self {
        GradeError::Stage {
            stage,
            message: message.into(),
        }
    }

    /// Creates a collaborator failure for the given stage.
    pub fn collaborator(stage: StageKind, message: impl Into<String>) -> Self {
        GradeError::Collaborator {
            stage,
            message: message.into(),
        }
    }

    /// Creates a collaborator timeout for the given stage.
    pub fn timeout(stage: StageKind, elapsed: Duration) -> Self {
        GradeError::CollaboratorTimeout { stage, elapsed }
    }

    /// Creates a missing-reference error from the uncovered labels.
    ///
    /// The labels are sorted and deduplicated so callers can compare the
    /// reported set against expectations directly.
    pub fn missing_reference(mut labels: Vec<String>) -> Self {
        labels.sort();
        labels.dedup();
        GradeError::MissingReference { labels }
    }

    /// Creates an artifact-corruption error for a JSON artifact.
    pub fn artifact_corrupt(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        GradeError::ArtifactCorrupt {
            path: path.into(),
            source,
        }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        GradeError::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid-input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        GradeError::InvalidInput {
            message: message.into(),
        }
    }
}

/// Convenient result alias for grading operations.
pub type GradeResult<T> = Result<T, GradeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_reference_sorts_and_dedups() {
        let err = GradeError::missing_reference(vec![
            "Q3".to_string(),
            "Q1".to_string(),
            "Q3".to_string(),
        ]);
        match err {
            GradeError::MissingReference { labels } => {
                assert_eq!(labels, vec!["Q1", "Q3"]);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn missing_reference_display_lists_labels() {
        let err = GradeError::missing_reference(vec!["Q2".to_string()]);
        assert_eq!(
            err.to_string(),
            "missing reference answers for questions: Q2"
        );
    }

    #[test]
    fn stage_kind_display_names() {
        assert_eq!(StageKind::Align.to_string(), "align");
        assert_eq!(StageKind::SelectRegions.to_string(), "select regions");
        assert_eq!(StageKind::Recognize.to_string(), "recognize");
        assert_eq!(StageKind::Score.to_string(), "score");
    }
}
