//! Worker pool sizing and construction
//!
//! Batches here are small (a handful of files), so the pool size is a fixed
//! number rather than a fraction of the CPU count:
//! - an explicit request wins
//! - otherwise [`DEFAULT_POOL_SIZE`]
//! - never more workers than jobs, never fewer than one

/// Default worker count for both size estimation and conversion.
pub const DEFAULT_POOL_SIZE: usize = 5;

/// Resolve the number of worker threads for a batch of `job_count` jobs.
pub fn resolve_pool_size(requested: Option<usize>, job_count: usize) -> usize {
    let size = requested.unwrap_or(DEFAULT_POOL_SIZE).max(1);
    size.min(job_count.max(1))
}

/// Build a fixed-size rayon pool whose threads are named `{prefix}-{index}`.
///
/// Falls back to a two-thread pool if the requested size cannot be built.
pub fn build_pool(threads: usize, prefix: &str) -> Result<rayon::ThreadPool, String> {
    let name = prefix.to_string();
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(move |i| format!("{}-{}", name, i))
        .build()
        .or_else(|e| {
            tracing::warn!(threads, error = %e, "Thread pool build failed, retrying with 2 threads");
            rayon::ThreadPoolBuilder::new().num_threads(2).build()
        })
        .map_err(|e| format!("Failed to create thread pool: {}", e))
}
