//! Best-template search across all candidates for one scan.

use std::panic::{catch_unwind, AssertUnwindSafe};

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::core::ParallelPolicy;
use crate::domain::{Scan, Template};
use crate::pipeline::aligner::{Aligner, AlignmentOutcome, AlignmentResult};

/// Runs the aligner against every candidate template and keeps the
/// maximum-confidence alignment.
///
/// Template attempts are independent and share no mutable state, so they
/// fan out across rayon workers when the candidate count exceeds the
/// policy threshold. Selection is stable: only strictly greater confidence
/// replaces the current best, so equal scores keep the first-listed
/// template regardless of completion order.
#[derive(Debug, Clone, Default)]
pub struct TemplateSelector {
    aligner: Aligner,
    policy: ParallelPolicy,
}

impl TemplateSelector {
    /// Creates a selector around the given aligner and parallel policy.
    pub fn new(aligner: Aligner, policy: ParallelPolicy) -> Self {
        Self { aligner, policy }
    }

    /// Returns the best-scoring alignment for `scan` across `templates`,
    /// or `None` when every attempt is rejected.
    ///
    /// An attempt that panics is logged and skipped; one bad template
    /// never aborts evaluation of the remaining candidates.
    pub fn select_best(&self, templates: &[Template], scan: &Scan) -> Option<AlignmentResult> {
        let attempt = |template: &Template| -> Option<AlignmentOutcome> {
            match catch_unwind(AssertUnwindSafe(|| self.aligner.align(template, scan))) {
                Ok(outcome) => Some(outcome),
                Err(_) => {
                    warn!(
                        template = %template.id,
                        scan = %scan.id,
                        "aligner panicked for template, skipping candidate"
                    );
                    None
                }
            }
        };

        let outcomes: Vec<Option<AlignmentOutcome>> =
            if self.policy.parallelize_templates(templates.len()) {
                templates.par_iter().map(attempt).collect()
            } else {
                templates.iter().map(attempt).collect()
            };

        // Fold in listed order with a strict comparison so ties keep the
        // first-seen template.
        let mut best: Option<AlignmentResult> = None;
        for outcome in outcomes.into_iter().flatten() {
            match outcome {
                AlignmentOutcome::Aligned(result) => {
                    let current = best.as_ref().map(|b| b.confidence);
                    if current.is_none_or(|c| result.confidence > c) {
                        best = Some(result);
                    }
                }
                AlignmentOutcome::Rejected { confidence } => {
                    debug!(scan = %scan.id, confidence, "template attempt rejected");
                }
            }
        }

        best
    }
}
