//! Stage status and batch report types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::StageKind;
use crate::pipeline::stats::BatchStats;

/// Terminal state of one pipeline stage for a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    /// The stage ran and produced output (possibly with per-item
    /// failures).
    Completed,
    /// The stage ran and produced nothing usable.
    Failed,
    /// The stage did not run because an upstream stage failed.
    Skipped,
}

/// Result of one stage for a batch run: its state plus a human-readable
/// message. A skipped stage's message names the upstream stage
/// responsible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageStatus {
    /// Terminal state of the stage.
    pub state: StageState,
    /// What happened, for operators and logs.
    pub message: String,
}

impl StageStatus {
    /// Creates a completed status.
    pub fn completed(message: impl Into<String>) -> Self {
        Self {
            state: StageState::Completed,
            message: message.into(),
        }
    }

    /// Creates a failed status.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            state: StageState::Failed,
            message: message.into(),
        }
    }

    /// Creates a skipped status naming the upstream stage responsible.
    pub fn skipped_after(upstream: StageKind) -> Self {
        Self {
            state: StageState::Skipped,
            message: format!("skipped: upstream {upstream} stage failed"),
        }
    }

    /// Returns true when the stage completed.
    pub fn is_completed(&self) -> bool {
        self.state == StageState::Completed
    }
}

/// Per-scan outcome summary within a batch run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanReport {
    /// Id of the template the scan registered against, if any.
    pub template_id: Option<String>,
    /// Alignment confidence, if the scan reached the matching stage.
    pub confidence: Option<usize>,
    /// Whether the alignment artifact was reused from a previous run.
    pub reused: bool,
    /// Whether recognition produced an answer record for the scan.
    pub recognized: bool,
    /// Whether the scan's evaluation record was finalized.
    pub scored: bool,
    /// Failure or skip context for the scan, when any stage degraded it.
    pub note: Option<String>,
}

/// Full report for one orchestrator run over a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    /// Alignment stage status.
    pub align: StageStatus,
    /// Region-selection stage status.
    pub select_regions: StageStatus,
    /// Recognition stage status.
    pub recognize: StageStatus,
    /// Scoring stage status.
    pub score: StageStatus,
    /// Per-scan outcomes keyed by scan id.
    pub scans: BTreeMap<String, ScanReport>,
    /// Question labels that blocked scoring, when the coverage gate
    /// tripped; empty otherwise.
    pub missing_reference: Vec<String>,
    /// Aggregate counters for the run.
    pub stats: BatchStats,
}

impl BatchReport {
    /// Returns true when every stage completed.
    pub fn all_completed(&self) -> bool {
        self.align.is_completed()
            && self.select_regions.is_completed()
            && self.recognize.is_completed()
            && self.score.is_completed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skipped_status_names_the_upstream_stage() {
        let status = StageStatus::skipped_after(StageKind::Align);
        assert_eq!(status.state, StageState::Skipped);
        assert!(status.message.contains("align"));

        let status = StageStatus::skipped_after(StageKind::Recognize);
        assert!(status.message.contains("recognize"));
    }

    #[test]
    fn stage_state_serializes_snake_case() {
        let json = serde_json::to_string(&StageState::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
    }
}
