//! Progress and result accounting for one batch.
//!
//! All shared batch state lives behind one mutex: the per-candidate status
//! table, the processed counter, the progress fraction/status text and the
//! failure list are updated together, so a reader never sees a count that
//! disagrees with the records.

use crate::candidate::{Candidate, CandidateStatus};
use crate::error::{ConvertError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use shared_utils::{size_reduction_percent, BatchCounts};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

/// Terminal result of one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Success { output: PathBuf, output_size: u64 },
    Failure(String),
    Skipped(String),
}

impl JobOutcome {
    fn status(&self) -> CandidateStatus {
        match self {
            JobOutcome::Success { .. } => CandidateStatus::Done,
            JobOutcome::Failure(_) => CandidateStatus::Failed,
            JobOutcome::Skipped(_) => CandidateStatus::Skipped,
        }
    }
}

/// A file that did not convert, with a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub name: String,
    pub path: PathBuf,
    pub reason: String,
    pub skipped: bool,
}

impl FailureRecord {
    pub fn line(&self) -> String {
        format!("{}: {}", self.name, self.reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConvertedFile {
    pub input: PathBuf,
    pub output: PathBuf,
    pub input_size: u64,
    pub output_size: u64,
}

/// Externally visible progress, taken inside the critical section.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub processed: usize,
    pub total: usize,
    /// `processed / total`, in `[0, 1]`.
    pub fraction: f64,
    pub text: String,
    pub last_file: Option<String>,
}

/// Aggregate outcome of one batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub processed: usize,
    #[serde(flatten)]
    pub counts: BatchCounts,
    /// Completion order, not selection order.
    pub failures: Vec<FailureRecord>,
    pub converted: Vec<ConvertedFile>,
    pub statuses: Vec<CandidateStatus>,
    pub input_bytes: u64,
    pub output_bytes: u64,
    /// Every candidate reached a terminal outcome.
    pub completed: bool,
    pub cancelled: bool,
    /// End-of-batch message, from [`Reporter::finalize`].
    pub report: Summary,
    pub finished_at: DateTime<Utc>,
}

impl BatchSummary {
    pub fn size_reduction_percent(&self) -> f64 {
        size_reduction_percent(self.input_bytes, self.output_bytes)
    }

    /// `Err(Interrupted)` when the batch stopped before every candidate
    /// reached a terminal outcome.
    pub fn ensure_complete(&self) -> Result<()> {
        if self.completed {
            Ok(())
        } else {
            Err(ConvertError::Interrupted {
                processed: self.processed,
                total: self.total,
            })
        }
    }
}

/// End-of-batch message for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub success: bool,
    pub title: String,
    pub message: String,
}

impl Summary {
    /// One success line, or every failure on its own line. Never truncated.
    pub fn from_failures(failures: &[FailureRecord]) -> Self {
        if failures.is_empty() {
            return Self {
                success: true,
                title: "Conversion Completed".to_string(),
                message: "All files have been successfully converted.".to_string(),
            };
        }

        let mut message = String::from(
            "Conversion completed with errors.\n\nIssues occurred with the following files:\n",
        );
        for failure in failures {
            message.push_str("- ");
            message.push_str(&failure.line());
            message.push('\n');
        }
        Self {
            success: false,
            title: "Conversion Completed".to_string(),
            message,
        }
    }
}

#[derive(Debug)]
struct ReporterState {
    total: usize,
    processed: usize,
    counts: BatchCounts,
    statuses: Vec<CandidateStatus>,
    failures: Vec<FailureRecord>,
    converted: Vec<ConvertedFile>,
    input_bytes: u64,
    output_bytes: u64,
    fraction: f64,
    text: String,
    last_file: Option<String>,
}

impl ReporterState {
    fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            processed: self.processed,
            total: self.total,
            fraction: self.fraction,
            text: self.text.clone(),
            last_file: self.last_file.clone(),
        }
    }
}

fn status_text(processed: usize, total: usize) -> String {
    format!("Processed files: {} of {}", processed, total)
}

/// Thread-safe accumulator shared by the coordinator and its workers.
#[derive(Debug)]
pub struct Reporter {
    state: Mutex<ReporterState>,
}

impl Reporter {
    pub fn new(total: usize) -> Self {
        Self {
            state: Mutex::new(ReporterState {
                total,
                processed: 0,
                counts: BatchCounts::new(),
                statuses: vec![CandidateStatus::Pending; total],
                failures: Vec::new(),
                converted: Vec::new(),
                input_bytes: 0,
                output_bytes: 0,
                fraction: if total == 0 { 1.0 } else { 0.0 },
                text: status_text(0, total),
                last_file: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ReporterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// `Pending -> Converting`. Returns false if the candidate was not pending.
    pub fn mark_converting(&self, index: usize) -> bool {
        let mut state = self.lock();
        match state.statuses.get(index).copied() {
            Some(current) if current.can_transition_to(CandidateStatus::Converting) => {
                state.statuses[index] = CandidateStatus::Converting;
                true
            }
            other => {
                warn!(index, status = ?other, "Candidate cannot start converting");
                false
            }
        }
    }

    /// Fold one terminal outcome into the batch and publish progress.
    ///
    /// This is the only place that mutates shared progress. `on_progress`
    /// runs while the lock is held so observers see snapshots in order; keep
    /// it short. A second outcome for the same candidate is ignored.
    pub fn record<F>(
        &self,
        index: usize,
        candidate: &Candidate,
        outcome: JobOutcome,
        on_progress: F,
    ) -> ProgressSnapshot
    where
        F: FnOnce(&ProgressSnapshot),
    {
        let mut guard = self.lock();
        let state = &mut *guard;
        let next = outcome.status();

        let current = match state.statuses.get(index).copied() {
            Some(current) => current,
            None => {
                warn!(index, total = state.total, "Outcome for unknown candidate ignored");
                return state.snapshot();
            }
        };
        if !current.can_transition_to(next) {
            warn!(
                index,
                file = %candidate.path.display(),
                from = ?current,
                to = ?next,
                "Duplicate or out-of-order outcome ignored"
            );
            return state.snapshot();
        }

        let name = candidate.name();
        match outcome {
            JobOutcome::Success { output, output_size } => {
                state.counts.success();
                state.input_bytes += candidate.size;
                state.output_bytes += output_size;
                state.converted.push(ConvertedFile {
                    input: candidate.path.clone(),
                    output,
                    input_size: candidate.size,
                    output_size,
                });
            }
            JobOutcome::Failure(reason) => {
                state.counts.fail();
                state.failures.push(FailureRecord {
                    name: name.clone(),
                    path: candidate.path.clone(),
                    reason,
                    skipped: false,
                });
            }
            JobOutcome::Skipped(reason) => {
                state.counts.skip();
                state.failures.push(FailureRecord {
                    name: name.clone(),
                    path: candidate.path.clone(),
                    reason,
                    skipped: true,
                });
            }
        }

        state.statuses[index] = next;
        state.processed += 1;
        state.fraction = state.processed as f64 / state.total as f64;
        state.text = status_text(state.processed, state.total);
        state.last_file = Some(name);

        let snapshot = state.snapshot();
        on_progress(&snapshot);
        snapshot
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.lock().snapshot()
    }

    /// Success message, or every recorded issue on its own line.
    pub fn finalize(&self) -> Summary {
        Summary::from_failures(&self.lock().failures)
    }

    /// Freeze the current state into a summary.
    pub fn summary(&self, cancelled: bool) -> BatchSummary {
        let report = self.finalize();
        let state = self.lock();
        let completed = state.processed == state.total;
        if completed {
            info!(
                total = state.total,
                succeeded = state.counts.succeeded,
                failed = state.counts.failed,
                skipped = state.counts.skipped,
                "Batch finished"
            );
        } else {
            warn!(
                processed = state.processed,
                total = state.total,
                cancelled,
                "Batch stopped before all files were processed"
            );
        }
        BatchSummary {
            total: state.total,
            processed: state.processed,
            counts: state.counts,
            failures: state.failures.clone(),
            converted: state.converted.clone(),
            statuses: state.statuses.clone(),
            input_bytes: state.input_bytes,
            output_bytes: state.output_bytes,
            completed,
            cancelled,
            report,
            finished_at: Utc::now(),
        }
    }
}
