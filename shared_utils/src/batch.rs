//! Batch Processing Counters
//!
//! Terminal-outcome tallies for one batch run.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCounts {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl BatchCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn success(&mut self) {
        self.succeeded += 1;
    }

    pub fn fail(&mut self) {
        self.failed += 1;
    }

    pub fn skip(&mut self) {
        self.skipped += 1;
    }

    /// Items with a terminal outcome of any kind.
    pub fn processed(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }

    /// Items that were handed to a worker (success or failure).
    pub fn attempted(&self) -> usize {
        self.succeeded + self.failed
    }

    pub fn success_rate(&self) -> f64 {
        let processed = self.processed();
        if processed == 0 {
            100.0
        } else {
            (self.succeeded as f64 / processed as f64) * 100.0
        }
    }
}
