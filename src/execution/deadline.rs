//! Evaluation Deadline Module
//!
//! Timeout enforcement for query evaluation.
//!
//! ## Design
//!
//! Uses a combination of:
//! - Atomic flag for cooperative cancellation
//! - Instant-based deadline checked at suspension points
//!
//! The evaluator checks the deadline at each pull; an external holder
//! of the [`CancelHandle`] can abort a long evaluation from another
//! thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Timeout error
#[derive(Debug, Clone, thiserror::Error)]
#[error("evaluation exceeded timeout of {timeout:?} (ran for {elapsed:?})")]
pub struct TimeoutError {
    /// The timeout duration that was exceeded
    pub timeout: Duration,
    /// How long the evaluation actually ran
    pub elapsed: Duration,
}

/// Cooperative cancellation and deadline for one evaluation
#[derive(Clone)]
pub struct EvalDeadline {
    cancelled: Arc<AtomicBool>,
    started: Instant,
    timeout: Option<Duration>,
}

impl EvalDeadline {
    /// Deadline with the given duration (None = no timeout)
    pub fn new(timeout: Option<Duration>) -> Self {
        EvalDeadline {
            cancelled: Arc::new(AtomicBool::new(false)),
            started: Instant::now(),
            timeout,
        }
    }

    /// No timeout, cancellation only
    pub fn unbounded() -> Self {
        EvalDeadline::new(None)
    }

    /// Handle that can cancel this evaluation from elsewhere
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            cancelled: Arc::clone(&self.cancelled),
        }
    }

    /// Check cancellation and the deadline.
    ///
    /// Called at each suspension point; returns Err when the
    /// evaluation should stop.
    pub fn check(&self) -> Result<(), TimeoutError> {
        if self.cancelled.load(Ordering::Relaxed) {
            return Err(TimeoutError {
                timeout: self.timeout.unwrap_or(Duration::ZERO),
                elapsed: self.started.elapsed(),
            });
        }
        if let Some(timeout) = self.timeout {
            let elapsed = self.started.elapsed();
            if elapsed > timeout {
                self.cancelled.store(true, Ordering::Relaxed);
                return Err(TimeoutError { timeout, elapsed });
            }
        }
        Ok(())
    }
}

impl Default for EvalDeadline {
    fn default() -> Self {
        EvalDeadline::unbounded()
    }
}

/// Shared cancellation flag for an in-flight evaluation
#[derive(Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Abort the evaluation at its next suspension point
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Has the evaluation been cancelled?
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}
