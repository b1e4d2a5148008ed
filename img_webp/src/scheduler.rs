//! Batch conversion scheduler
//!
//! One coordinator plus a fixed-size rayon pool:
//! 1. validate the selection size
//! 2. record directories, unsupported files and skipped destinations as
//!    `Skipped` without using a worker
//! 3. run the remaining jobs on the pool; each job checks the cancellation
//!    token before it starts and, once started, always runs to completion
//! 4. `pool.install` returns only after every started job finished (drain)
//!
//! Every outcome goes through [`Reporter::record`], the single critical
//! section for shared progress.

use crate::candidate::{validate_selection, Candidate, CollisionPolicy, OutputPlan, OutputPlanner, DEFAULT_MAX_FILES};
use crate::codec::{convert_to_file, WebpCodec, WebpEncode};
use crate::error::{panic_message, ConvertError, Result};
use crate::estimator::{self, EstimationRecord};
use crate::reporter::{BatchSummary, JobOutcome, ProgressSnapshot, Reporter};
use rayon::prelude::*;
use shared_utils::{build_pool, resolve_pool_size, CancellationToken};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Worker count. `None` means one worker per selectable file
    /// (`max_files`).
    pub pool_size: Option<usize>,
    /// Largest selection accepted.
    pub max_files: usize,
    pub collision: CollisionPolicy,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            pool_size: None,
            max_files: DEFAULT_MAX_FILES,
            collision: CollisionPolicy::Overwrite,
        }
    }
}

impl SchedulerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = Some(size);
        self
    }

    pub fn with_max_files(mut self, max: usize) -> Self {
        self.max_files = max;
        self
    }

    pub fn with_collision(mut self, policy: CollisionPolicy) -> Self {
        self.collision = policy;
        self
    }

    pub fn pool_size_for(&self, job_count: usize) -> usize {
        resolve_pool_size(Some(self.pool_size.unwrap_or(self.max_files)), job_count)
    }
}

/// One unit of real conversion work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionJob {
    pub index: usize,
    pub input: PathBuf,
    pub output: PathBuf,
}

impl ConversionJob {
    /// Run the conversion. Never returns an error or unwinds: every problem,
    /// panics included, becomes a `Failure` outcome.
    pub fn execute<E: WebpEncode + ?Sized>(&self, encoder: &E) -> JobOutcome {
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            convert_to_file(encoder, &self.input, &self.output)
        }));

        match result {
            Ok(Ok(output_size)) => {
                debug!(
                    input = %self.input.display(),
                    output = %self.output.display(),
                    output_size,
                    "Converted"
                );
                JobOutcome::Success {
                    output: self.output.clone(),
                    output_size,
                }
            }
            Ok(Err(e)) => {
                warn!(file = %self.input.display(), error = %e, "Conversion failed");
                JobOutcome::Failure(format!("Conversion error ({})", e))
            }
            Err(payload) => {
                let msg = panic_message(payload.as_ref());
                error!(file = %self.input.display(), panic = %msg, "Conversion worker panicked");
                JobOutcome::Failure(format!("Conversion error (worker panicked: {})", msg))
            }
        }
    }
}

pub struct Scheduler<E = WebpCodec> {
    encoder: E,
    options: SchedulerOptions,
}

impl Scheduler<WebpCodec> {
    pub fn with_webp_codec(options: SchedulerOptions) -> Self {
        Self::new(WebpCodec::new(), options)
    }
}

impl<E: WebpEncode> Scheduler<E> {
    pub fn new(encoder: E, options: SchedulerOptions) -> Self {
        Self { encoder, options }
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    /// Dry run on the same encoder, with the same selection rules as
    /// [`Scheduler::run`].
    pub fn estimate<F>(&self, candidates: &[Candidate], on_progress: F) -> Result<Vec<EstimationRecord>>
    where
        F: Fn(usize, &EstimationRecord) + Sync,
    {
        validate_selection(candidates.len(), self.options.max_files)?;
        estimator::estimate(&self.encoder, candidates, self.options.pool_size, on_progress)
    }

    /// Convert `candidates`, blocking until every started job has finished.
    ///
    /// Returns `Err` only for a rejected selection or a pool that cannot be
    /// built; per-file problems land in the summary. After cancellation the
    /// summary holds only the outcomes that were reached and has
    /// `completed == false`.
    pub fn run<F>(
        &self,
        candidates: &[Candidate],
        cancel: &CancellationToken,
        on_progress: F,
    ) -> Result<BatchSummary>
    where
        F: Fn(&ProgressSnapshot) + Sync,
    {
        validate_selection(candidates.len(), self.options.max_files)?;
        let reporter = Reporter::new(candidates.len());
        self.execute(candidates, cancel, &reporter, on_progress)
    }

    fn plan_jobs<F>(
        &self,
        candidates: &[Candidate],
        reporter: &Reporter,
        on_progress: &F,
    ) -> Vec<ConversionJob>
    where
        F: Fn(&ProgressSnapshot) + Sync,
    {
        let mut planner = OutputPlanner::new(self.options.collision);
        let mut jobs = Vec::with_capacity(candidates.len());

        for (index, candidate) in candidates.iter().enumerate() {
            let outcome = if candidate.is_dir {
                JobOutcome::Skipped("Directory".to_string())
            } else if !candidate.is_supported() {
                JobOutcome::Skipped("Unsupported format".to_string())
            } else {
                match planner.plan(&candidate.path) {
                    Ok(OutputPlan::Write(output)) => {
                        jobs.push(ConversionJob {
                            index,
                            input: candidate.path.clone(),
                            output,
                        });
                        continue;
                    }
                    Ok(OutputPlan::Skip(reason)) => JobOutcome::Skipped(reason),
                    Err(e) => JobOutcome::Failure(e.to_string()),
                }
            };

            debug!(file = %candidate.path.display(), outcome = ?outcome, "Not dispatched");
            reporter.record(index, candidate, outcome, on_progress);
        }

        jobs
    }

    fn execute<F>(
        &self,
        candidates: &[Candidate],
        cancel: &CancellationToken,
        reporter: &Reporter,
        on_progress: F,
    ) -> Result<BatchSummary>
    where
        F: Fn(&ProgressSnapshot) + Sync,
    {
        let jobs = self.plan_jobs(candidates, reporter, &on_progress);
        if jobs.is_empty() {
            return Ok(reporter.summary(cancel.is_cancelled()));
        }

        let pool_size = self.options.pool_size_for(jobs.len());
        let pool = build_pool(pool_size, "webp-worker").map_err(ConvertError::ThreadPool)?;
        info!(
            total = candidates.len(),
            jobs = jobs.len(),
            pool_size,
            "Starting WebP conversion batch"
        );

        pool.install(|| {
            jobs.par_iter().for_each(|job| {
                if cancel.is_cancelled() {
                    return;
                }
                if !reporter.mark_converting(job.index) {
                    return;
                }
                let outcome = job.execute(&self.encoder);
                reporter.record(job.index, &candidates[job.index], outcome, &on_progress);
            });
        });

        Ok(reporter.summary(cancel.is_cancelled()))
    }
}

impl<E: WebpEncode + 'static> Scheduler<E> {
    /// Run the batch on a dedicated coordinator thread.
    ///
    /// The selection is validated before the thread starts, so a rejected
    /// batch never spawns anything.
    pub fn spawn<F>(
        self: Arc<Self>,
        candidates: Vec<Candidate>,
        cancel: CancellationToken,
        on_progress: F,
    ) -> Result<BatchHandle>
    where
        F: Fn(&ProgressSnapshot) + Send + Sync + 'static,
    {
        validate_selection(candidates.len(), self.options.max_files)?;

        let reporter = Arc::new(Reporter::new(candidates.len()));
        let thread_reporter = Arc::clone(&reporter);
        let thread_cancel = cancel.clone();

        let handle = std::thread::Builder::new()
            .name("webp-coordinator".to_string())
            .spawn(move || self.execute(&candidates, &thread_cancel, &thread_reporter, on_progress))?;

        Ok(BatchHandle {
            reporter,
            cancel,
            handle,
        })
    }
}

/// A batch running on its coordinator thread.
pub struct BatchHandle {
    reporter: Arc<Reporter>,
    cancel: CancellationToken,
    handle: JoinHandle<Result<BatchSummary>>,
}

impl BatchHandle {
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.reporter.snapshot()
    }

    /// Stop dispatching; running jobs still finish.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the coordinator (and therefore the pool drain).
    pub fn join(self) -> Result<BatchSummary> {
        match self.handle.join() {
            Ok(result) => result,
            Err(payload) => Err(ConvertError::ThreadPool(format!(
                "Coordinator thread panicked: {}",
                panic_message(payload.as_ref())
            ))),
        }
    }
}
