//! Cooperative cancellation, in the shape of the teacher crate's
//! `execution::timeout::QueryTimeout` / `CancelHandle` pair: an atomic flag
//! plus an optional deadline, polled at every suspension point named in
//! §5 (before each child, before each parallel chunk dispatch, between
//! compile steps in a mutation batch).

use crate::error::IndigoError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A cancellable, deadline-aware handle threaded through every recursive
/// traversal call and every parallel worker.
#[derive(Clone)]
pub struct EvalContext {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl EvalContext {
    /// A context with no deadline, cancellable only via its `CancelHandle`.
    pub fn new() -> Self {
        EvalContext {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }

    /// A context that cancels itself once `timeout` elapses from this call.
    pub fn with_timeout(timeout: Duration) -> Self {
        EvalContext {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Check this context at a suspension point. Returns `Canceled` if
    /// explicitly cancelled, `DeadlineExceeded` if the deadline elapsed.
    pub fn poll(&self) -> Result<(), IndigoError> {
        if self.cancelled.load(Ordering::Acquire) {
            return Err(IndigoError::Canceled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                self.cancelled.store(true, Ordering::Release);
                return Err(IndigoError::DeadlineExceeded);
            }
        }
        Ok(())
    }

    /// Whether this context has already been cancelled or timed out.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Obtain a handle that can cancel this context from another thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            cancelled: Arc::clone(&self.cancelled),
        }
    }
}

impl Default for EvalContext {
    fn default() -> Self {
        Self::new()
    }
}

/// A handle that can cancel an `EvalContext` from another thread, without
/// otherwise granting access to it.
#[derive(Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_context_polls_clean() {
        let ctx = EvalContext::new();
        assert!(ctx.poll().is_ok());
    }

    #[test]
    fn cancel_handle_cancels_context() {
        let ctx = EvalContext::new();
        let handle = ctx.cancel_handle();
        assert!(ctx.poll().is_ok());
        handle.cancel();
        assert!(matches!(ctx.poll(), Err(IndigoError::Canceled)));
    }

    #[test]
    fn deadline_trips_after_timeout() {
        let ctx = EvalContext::with_timeout(Duration::from_millis(5));
        std::thread::sleep(Duration::from_millis(20));
        assert!(matches!(ctx.poll(), Err(IndigoError::DeadlineExceeded)));
    }
}
