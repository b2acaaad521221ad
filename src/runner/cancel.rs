//! Run-global cancellation: one atomic flag, set by the first SIGINT/SIGTERM.
//!
//! Uses the `signal-hook` crate for safe signal registration. The pipeline
//! polls the flag at folder boundaries, before each subprocess spawn, between
//! videos, and between retry passes rather than blocking on signals. A second
//! signal bypasses graceful shutdown and exits the process immediately.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::{SIGINT, SIGTERM};

/// Process exit code reported for an interrupted run.
pub const CANCEL_EXIT_CODE: i32 = 130;

/// Thread-safe cancellation state shared between the signal handler and the
/// pipeline. All loads/stores use `Ordering::Relaxed`: the flag is polled and
/// exact ordering with other atomics is not required.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token with no OS hooks (tests, library embedding).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register OS signal hooks: first SIGINT/SIGTERM sets the flag, a
    /// second one exits the process immediately.
    ///
    /// Registration is best-effort; failures are logged to stderr but not
    /// fatal — the run still works, it just cannot be interrupted cleanly.
    pub fn install_signal_hooks(&self) {
        for sig in [SIGINT, SIGTERM] {
            // Immediate exit when the flag is already set (second signal).
            // Registered first so it observes the flag set by the hook below.
            if let Err(e) = signal_hook::flag::register_conditional_shutdown(
                sig,
                CANCEL_EXIT_CODE,
                Arc::clone(&self.flag),
            ) {
                eprintln!("unpackr: failed to register shutdown hook for signal {sig}: {e}");
            }
            if let Err(e) = signal_hook::flag::register(sig, Arc::clone(&self.flag)) {
                eprintln!("unpackr: failed to register signal {sig}: {e}");
            }
        }
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Programmatically request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }
}
