//! Cooperative cancellation shared between a coordinator, its workers and
//! a Ctrl-C handler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable cancel flag. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            tracing::info!("Cancellation requested");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Route Ctrl-C to `token`. A second Ctrl-C after cancellation is already
/// pending exits immediately with status 130.
pub fn install_ctrlc_handler(token: &CancellationToken) -> anyhow::Result<()> {
    let token = token.clone();
    ctrlc::set_handler(move || {
        if token.is_cancelled() {
            eprintln!("\nForced exit");
            std::process::exit(130);
        }
        eprintln!("\nCancelling: waiting for running conversions to finish (Ctrl-C again to force)");
        token.cancel();
    })?;
    Ok(())
}
