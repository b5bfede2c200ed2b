//! Operation-wide cancellation
//!
//! A [`CancelFlag`] is threaded into every long-running stage. Stages check
//! it at entry boundaries; in-flight work on a single entry is always
//! allowed to finish, so cancellation never leaves a path half-applied.
//!
//! The flag stores the raw signal number that triggered it, which the
//! process reports as its exit status after a graceful drain.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Signals that trigger a graceful drain instead of immediate death.
pub const HANDLED_SIGNALS: [i32; 3] = [
    signal_hook::consts::SIGINT,
    signal_hook::consts::SIGTERM,
    signal_hook::consts::SIGHUP,
];

/// Shared cancellation flag carrying the delivering signal number.
///
/// Zero means "not cancelled"; any other value is the signal number (no
/// real signal is numbered zero).
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicUsize>);

impl CancelFlag {
    /// Create an unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed) != 0
    }

    /// The signal that requested cancellation, if any.
    #[must_use]
    pub fn signal(&self) -> Option<i32> {
        match self.0.load(Ordering::Relaxed) {
            0 => None,
            n => i32::try_from(n).ok(),
        }
    }

    /// Flag cancellation on behalf of `signal`.
    pub fn trigger(&self, signal: i32) {
        if signal > 0 {
            // Keep the first signal; a second Ctrl-C doesn't rewrite history.
            let _ = self.0.compare_exchange(
                0,
                signal as usize,
                Ordering::Relaxed,
                Ordering::Relaxed,
            );
        }
    }

    /// Register `self` to be triggered by the handled termination signals.
    ///
    /// # Errors
    ///
    /// Propagates `sigaction` registration failures.
    pub fn register_signals(&self) -> std::io::Result<()> {
        for sig in HANDLED_SIGNALS {
            #[allow(clippy::cast_sign_loss)]
            signal_hook::flag::register_usize(sig, Arc::clone(&self.0), sig as usize)?;
        }
        Ok(())
    }
}
