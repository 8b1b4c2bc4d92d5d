use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender, bounded};

/// Cooperative cancellation signal shared by every stage of a run.
///
/// Cancelling drops the only sender of an internal channel, so the receiver
/// returned by [`CancelToken::watch`] becomes disconnected. Blocking stages put
/// that receiver in a `crossbeam_channel::select!` next to their queue
/// operation; the cancel arm then fires immediately and stays ready forever.
///
/// # Example
/// ```
/// use qbench_core::CancelToken;
///
/// let token = CancelToken::new();
/// let observer = token.clone();
/// token.cancel();
/// assert!(observer.is_cancelled());
/// assert!(observer.watch().recv().is_err());
/// ```
#[derive(Debug, Clone)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug)]
struct CancelInner {
    cancelled: AtomicBool,
    trigger: Mutex<Option<Sender<Infallible>>>,
    watch: Receiver<Infallible>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (trigger, watch) = bounded(0);
        Self {
            inner: Arc::new(CancelInner {
                cancelled: AtomicBool::new(false),
                trigger: Mutex::new(Some(trigger)),
                watch,
            }),
        }
    }

    /// Signals cancellation. Calling this more than once is harmless.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut trigger = match self.inner.trigger.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        trigger.take();
        tracing::debug!("cancellation requested");
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Receiver that never yields a message and disconnects on cancellation.
    pub fn watch(&self) -> &Receiver<Infallible> {
        &self.inner.watch
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
