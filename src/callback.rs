//! Callback registration handles.

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

/// Process-wide id source, so ids from different components never collide.
static NEXT_CALLBACK_ID: AtomicU64 = AtomicU64::new(0);

/// Callback handle for unregistering callbacks.
///
/// Dropping the handle unregisters the callback too.
pub struct CallbackHandle {
    id: u64,
    unregister_fn: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl CallbackHandle {
    /// Create a new callback handle.
    pub(crate) fn new(id: u64, unregister_fn: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            unregister_fn: Some(Box::new(unregister_fn)),
        }
    }

    /// Unregister this callback.
    pub fn unregister(mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }

    /// Get the callback ID.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }
}

impl std::fmt::Debug for CallbackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackHandle").field("id", &self.id).finish()
    }
}

/// Run `callback` for every value received on `rx` until the sender goes
/// away or the returned handle is dropped.
///
/// A callback that falls behind skips the missed values and keeps going.
pub(crate) fn spawn_callback<T, F>(mut rx: broadcast::Receiver<T>, callback: F) -> CallbackHandle
where
    T: Clone + Send + 'static,
    F: Fn(T) + Send + Sync + 'static,
{
    let callback_id = NEXT_CALLBACK_ID.fetch_add(1, Ordering::SeqCst);

    let handle = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(value) => callback(value),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Callback {} lagged, skipped {} events", callback_id, skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    CallbackHandle::new(callback_id, move || {
        handle.abort();
    })
}
