//! Immutable session configuration for the batch orchestrator.
//!
//! One `SessionConfig` is passed in at batch start and read-only from
//! then on; there is no ambient process-wide state. Templates and scans
//! are uploaded separately, the configuration carries everything else a
//! batch shares: the region set, the reference table, registration
//! tuning, parallelism, the collaborator deadline, and the artifact root.

use std::path::PathBuf;
use std::time::Duration;

use crate::core::constants::DEFAULT_COLLABORATOR_TIMEOUT_SECS;
use crate::core::ParallelPolicy;
use crate::domain::{ReferenceTable, RegionOfInterest};
use crate::pipeline::aligner::AlignerConfig;

/// Shared, read-only configuration for one grading session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Root directory for persisted stage artifacts.
    pub artifact_root: PathBuf,
    /// Static region-of-interest set, template coordinate space.
    pub regions: Vec<RegionOfInterest>,
    /// Reference answers and point values.
    pub reference: ReferenceTable,
    /// Registration tuning.
    pub aligner: AlignerConfig,
    /// Parallel dispatch thresholds.
    pub parallel: ParallelPolicy,
    /// Deadline for a single external collaborator call.
    pub collaborator_timeout: Duration,
}

impl SessionConfig {
    /// Creates a configuration rooted at the given artifact directory,
    /// with default tuning and an empty region/reference setup.
    pub fn new(artifact_root: impl Into<PathBuf>) -> Self {
        Self {
            artifact_root: artifact_root.into(),
            regions: Vec::new(),
            reference: ReferenceTable::new(),
            aligner: AlignerConfig::default(),
            parallel: ParallelPolicy::default(),
            collaborator_timeout: Duration::from_secs(DEFAULT_COLLABORATOR_TIMEOUT_SECS),
        }
    }

    /// Sets the static region set.
    pub fn with_regions(mut self, regions: Vec<RegionOfInterest>) -> Self {
        self.regions = regions;
        self
    }

    /// Sets the reference answer table.
    pub fn with_reference(mut self, reference: ReferenceTable) -> Self {
        self.reference = reference;
        self
    }

    /// Sets the registration tuning.
    pub fn with_aligner(mut self, aligner: AlignerConfig) -> Self {
        self.aligner = aligner;
        self
    }

    /// Sets the parallel dispatch policy.
    pub fn with_parallel(mut self, parallel: ParallelPolicy) -> Self {
        self.parallel = parallel;
        self
    }

    /// Sets the collaborator deadline.
    pub fn with_collaborator_timeout(mut self, timeout: Duration) -> Self {
        self.collaborator_timeout = timeout;
        self
    }
}
