use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

type Cleanup = Box<dyn FnOnce() + Send>;

/// Cooperative cancellation shared between the orchestrator, the bus
/// controller loops and the signal handlers.
///
/// Cancellation is single-fire: the first `cancel` flips the state and runs
/// the registered cleanups in reverse registration order, later calls are
/// no-ops. Poll loops observe the token once per iteration, so a slow native
/// call inside one iteration is never interrupted.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    cleanups: Mutex<Vec<Cleanup>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        !self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Register a cleanup action. Each owner of a cancellable resource
    /// (adapter connection, key sink, ...) registers its own; nothing is
    /// overwritten. If the token is already cancelled the action runs now.
    pub fn on_cancel<F: FnOnce() + Send + 'static>(&self, f: F) {
        // The cancelled flag is re-checked under the same lock `cancel`
        // drains with, so a registration racing a concurrent `cancel` either
        // lands in the vector before the drain or runs here, never neither.
        match self.inner.cleanups.lock() {
            Ok(mut cleanups) => {
                if self.is_cancelled() {
                    drop(cleanups);
                    f();
                } else {
                    cleanups.push(Box::new(f));
                }
            }
            Err(_) => f(),
        }
    }

    /// Flip to cancelled and run the cleanups, newest first. Idempotent.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        let cleanups = match self.inner.cleanups.lock() {
            Ok(mut cleanups) => std::mem::take(&mut *cleanups),
            Err(_) => return,
        };
        for cleanup in cleanups.into_iter().rev() {
            cleanup();
        }
    }
}
