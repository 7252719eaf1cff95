//! Cooperative cancellation shared by the recorders of one capture session.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Why a session was asked to stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum CancelReason {
    /// External interrupt (Ctrl+C or an explicit call)
    Interrupted,
    /// The configured capture duration elapsed
    DeadlineReached,
    /// A stream failed fatally and stopped its sibling
    StreamFault { device_id: usize },
    /// A recorder thread panicked
    WorkerPanicked { device_id: usize },
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    reason: OnceLock<CancelReason>,
}

/// A clonable stop flag.
///
/// Every clone observes the same flag. Only the first reason passed to
/// [`cancel_with`](Self::cancel_with) is kept.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation as an external interrupt.
    pub fn cancel(&self) {
        self.cancel_with(CancelReason::Interrupted);
    }

    /// Request cancellation, recording the reason if none was recorded yet.
    pub fn cancel_with(&self, reason: CancelReason) {
        let _ = self.inner.reason.set(reason);
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// The reason recorded by the first cancellation, if any.
    pub fn reason(&self) -> Option<CancelReason> {
        self.inner.reason.get().cloned()
    }
}
