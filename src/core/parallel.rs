//! Parallel processing policy.
//!
//! Template attempts within a scan and scans within a batch share no
//! mutable state, so both fan out safely across rayon workers. The policy
//! centralizes the sequential/parallel thresholds so small batches avoid
//! the fork-join overhead.

use serde::{Deserialize, Serialize};

use crate::core::constants::DEFAULT_PARALLEL_THRESHOLD;

/// Thresholds controlling when the pipeline dispatches work in parallel.
///
/// A stage goes parallel when its item count exceeds the matching
/// threshold; at or below it, items are processed sequentially.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelPolicy {
    /// Maximum number of worker threads for a batch run. `None` uses the
    /// rayon default (number of CPU cores). Concurrent image buffers cost
    /// memory, so sessions on small machines cap this.
    #[serde(default)]
    pub max_threads: Option<usize>,

    /// Threshold for candidate templates per scan (<= this uses sequential).
    #[serde(default = "ParallelPolicy::default_threshold")]
    pub template_threshold: usize,

    /// Threshold for scans per batch (<= this uses sequential).
    #[serde(default = "ParallelPolicy::default_threshold")]
    pub scan_threshold: usize,
}

impl ParallelPolicy {
    fn default_threshold() -> usize {
        DEFAULT_PARALLEL_THRESHOLD
    }

    /// Sets the worker-thread cap.
    pub fn with_max_threads(mut self, max_threads: Option<usize>) -> Self {
        self.max_threads = max_threads;
        self
    }

    /// Returns true if the given number of template attempts should be
    /// dispatched in parallel.
    pub fn parallelize_templates(&self, count: usize) -> bool {
        count > self.template_threshold
    }

    /// Returns true if the given number of scans should be dispatched in
    /// parallel.
    pub fn parallelize_scans(&self, count: usize) -> bool {
        count > self.scan_threshold
    }
}

impl Default for ParallelPolicy {
    fn default() -> Self {
        Self {
            max_threads: None,
            template_threshold: Self::default_threshold(),
            scan_threshold: Self::default_threshold(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_gate_parallel_dispatch() {
        let policy = ParallelPolicy::default();
        assert!(!policy.parallelize_templates(1));
        assert!(policy.parallelize_templates(2));
        assert!(!policy.parallelize_scans(0));
        assert!(policy.parallelize_scans(3));
    }

    #[test]
    fn default_policy_does_not_cap_threads() {
        assert!(ParallelPolicy::default().max_threads.is_none());
        let capped = ParallelPolicy::default().with_max_threads(Some(4));
        assert_eq!(capped.max_threads, Some(4));
    }
}
