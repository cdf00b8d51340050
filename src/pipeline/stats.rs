//! Batch-level counters.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Counters for one orchestrator run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BatchStats {
    /// Scans present in the batch.
    pub total_scans: usize,
    /// Scans that registered against some template.
    pub aligned: usize,
    /// Scans rejected by every candidate template.
    pub rejected: usize,
    /// Scans with a finalized recognition record.
    pub recognized: usize,
    /// Scans with a finalized evaluation record.
    pub scored: usize,
}

impl BatchStats {
    /// Fraction of scans that aligned, as a percentage.
    pub fn alignment_rate(&self) -> f64 {
        if self.total_scans == 0 {
            0.0
        } else {
            (self.aligned as f64 / self.total_scans as f64) * 100.0
        }
    }
}

impl fmt::Display for BatchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "scans: {} (aligned {}, rejected {}, recognized {}, scored {})",
            self.total_scans, self.aligned, self.rejected, self.recognized, self.scored
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_rate_handles_empty_batch() {
        assert_eq!(BatchStats::default().alignment_rate(), 0.0);
    }

    #[test]
    fn alignment_rate_computes_percentage() {
        let stats = BatchStats {
            total_scans: 4,
            aligned: 3,
            rejected: 1,
            recognized: 3,
            scored: 3,
        };
        assert_eq!(stats.alignment_rate(), 75.0);
        assert!(stats.to_string().contains("aligned 3"));
    }
}
