//! Shared Utilities for the img-webp tools
//!
//! - Logging setup (tracing + rolling log file)
//! - Progress bar and size/percentage formatting
//! - Cooperative cancellation with Ctrl-C wiring
//! - Worker pool sizing
//! - Batch counters and summary reporting

pub mod batch;
pub mod cancel;
pub mod common_utils;
pub mod logging;
pub mod progress;
pub mod report;
pub mod thread_manager;
pub mod unified_progress;

pub use batch::BatchCounts;
pub use cancel::{install_ctrlc_handler, CancellationToken};
pub use common_utils::{display_name, get_extension_lowercase, has_extension};
pub use progress::{
    format_bytes, format_decimal, format_duration, format_optional_bytes, format_percentage,
};
pub use report::{print_summary_report, render_summary_report, size_reduction_percent};
pub use thread_manager::{build_pool, resolve_pool_size, DEFAULT_POOL_SIZE};
pub use unified_progress::UnifiedProgressBar;
