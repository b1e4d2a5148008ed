//! Dry-run size estimation
//!
//! Every supported candidate is encoded to memory on a bounded worker pool and
//! only the encoded length is kept. Nothing is written to disk.

use crate::candidate::{Candidate, CandidateStatus};
use crate::codec::WebpEncode;
use crate::error::{panic_message, ConvertError, Result};
use rayon::prelude::*;
use serde::Serialize;
use shared_utils::{build_pool, format_bytes, format_optional_bytes, format_percentage};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimationStatus {
    Pending,
    Estimating,
    Estimated,
    Unsupported,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EstimationRecord {
    pub index: usize,
    pub path: PathBuf,
    pub name: String,
    pub source_size: u64,
    pub estimated_size: Option<u64>,
    /// Only set together with `estimated_size`, and only for non-empty sources.
    pub reduction_percent: Option<f64>,
    pub status: EstimationStatus,
}

impl EstimationRecord {
    fn pending(index: usize, candidate: &Candidate) -> Self {
        Self {
            index,
            path: candidate.path.clone(),
            name: candidate.name(),
            source_size: candidate.size,
            estimated_size: None,
            reduction_percent: None,
            status: EstimationStatus::Pending,
        }
    }

    fn set_estimate(&mut self, estimated: u64) {
        self.estimated_size = Some(estimated);
        self.reduction_percent = reduction_percent(self.source_size, estimated);
        self.status = EstimationStatus::Estimated;
    }

    fn set_error(&mut self, reason: String) {
        self.estimated_size = None;
        self.reduction_percent = None;
        self.status = EstimationStatus::Error(reason);
    }

    pub fn candidate_status(&self) -> CandidateStatus {
        match self.status {
            EstimationStatus::Pending => CandidateStatus::Pending,
            EstimationStatus::Estimating => CandidateStatus::Estimating,
            EstimationStatus::Estimated => CandidateStatus::Done,
            EstimationStatus::Unsupported => CandidateStatus::Skipped,
            EstimationStatus::Error(_) => CandidateStatus::Failed,
        }
    }

    pub fn current_size_cell(&self) -> String {
        format_bytes(self.source_size)
    }

    pub fn estimated_size_cell(&self) -> String {
        match self.status {
            EstimationStatus::Pending | EstimationStatus::Estimating => "Estimating...".to_string(),
            EstimationStatus::Error(_) => "Error".to_string(),
            EstimationStatus::Unsupported => "Unsupported".to_string(),
            EstimationStatus::Estimated => format_optional_bytes(self.estimated_size),
        }
    }

    pub fn reduction_cell(&self) -> String {
        match self.status {
            EstimationStatus::Pending | EstimationStatus::Estimating => "Estimating...".to_string(),
            EstimationStatus::Error(_) => "Error".to_string(),
            EstimationStatus::Unsupported => "N/A".to_string(),
            EstimationStatus::Estimated => format_percentage(self.reduction_percent),
        }
    }
}

/// `(source - estimated) / source` in percent; `None` for an empty source.
/// Negative when the WebP would be larger.
pub fn reduction_percent(source_size: u64, estimated_size: u64) -> Option<f64> {
    if source_size == 0 {
        return None;
    }
    Some((source_size as f64 - estimated_size as f64) / source_size as f64 * 100.0)
}

/// Estimate the WebP size of every candidate.
///
/// Unsupported candidates (and directories) are marked immediately on the
/// calling thread. The rest run on a pool of `resolve_pool_size(limit)`
/// workers. `on_progress(index, record)` fires exactly once per candidate with
/// its terminal record, from whichever thread finished it, in no particular
/// order. The returned records are in input order. Per-file failures,
/// panics included, are logged and recorded, never returned as `Err`.
pub fn estimate<E, F>(
    encoder: &E,
    candidates: &[Candidate],
    concurrency_limit: Option<usize>,
    on_progress: F,
) -> Result<Vec<EstimationRecord>>
where
    E: WebpEncode + ?Sized,
    F: Fn(usize, &EstimationRecord) + Sync,
{
    let mut records: Vec<EstimationRecord> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| EstimationRecord::pending(i, c))
        .collect();

    let mut jobs = Vec::new();
    for (record, candidate) in records.iter_mut().zip(candidates) {
        if candidate.is_supported() {
            jobs.push(record.index);
        } else {
            record.status = EstimationStatus::Unsupported;
            on_progress(record.index, record);
        }
    }

    if jobs.is_empty() {
        return Ok(records);
    }

    let pool_size = shared_utils::resolve_pool_size(concurrency_limit, jobs.len());
    let pool = build_pool(pool_size, "webp-estimate").map_err(ConvertError::ThreadPool)?;
    debug!(jobs = jobs.len(), pool_size, "Starting size estimation");

    let finished: Vec<EstimationRecord> = pool.install(|| {
        jobs.par_iter()
            .map(|&index| {
                let mut record = records[index].clone();
                record.status = EstimationStatus::Estimating;
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    encoder.encode(&candidates[index].path)
                }));
                match result {
                    Ok(Ok(bytes)) => record.set_estimate(bytes.len() as u64),
                    Ok(Err(e)) => {
                        warn!(file = %record.path.display(), error = %e, "Size estimation failed");
                        record.set_error(e.to_string());
                    }
                    Err(payload) => {
                        let msg = panic_message(payload.as_ref());
                        error!(file = %record.path.display(), panic = %msg, "Size estimation panicked");
                        record.set_error(format!("worker panicked: {}", msg));
                    }
                }
                on_progress(index, &record);
                record
            })
            .collect()
    });

    for record in finished {
        let index = record.index;
        records[index] = record;
    }

    Ok(records)
}
