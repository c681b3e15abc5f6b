//! Build cancellation.
//!
//! A [`CancellationToken`] is shared between the executor's workers and
//! whoever may stop the build: a library caller, or the Ctrl-C handler that
//! [`CancellationToken::cancel_on_ctrl_c`] installs.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use tracing::{debug, warn};

/// Cloneable flag that stops scheduling once raised.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag. Idempotent.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            debug!("build cancellation requested");
        }
    }

    /// Whether the flag has been raised.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Cancel this token when the process receives Ctrl-C.
    ///
    /// The signal is awaited on a detached thread running a single-threaded
    /// Tokio runtime, so the synchronous executor needs no async context.
    ///
    /// # Errors
    ///
    /// Returns an error when the runtime or the listener thread cannot be
    /// created.
    pub fn cancel_on_ctrl_c(&self) -> io::Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let token = self.clone();
        thread::Builder::new()
            .name("simbuild-ctrl-c".into())
            .spawn(move || {
                runtime.block_on(async {
                    match tokio::signal::ctrl_c().await {
                        Ok(()) => {
                            warn!("interrupt received; stopping the build");
                            token.cancel();
                        }
                        Err(err) => warn!(error = %err, "failed to listen for Ctrl-C"),
                    }
                });
            })?;
        Ok(())
    }
}
