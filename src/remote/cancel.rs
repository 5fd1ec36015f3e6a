//! Cooperative cancellation for in-flight remote requests.
//!
//! A `Canceler` is handed to long-running operations; callers keep a clone
//! and fire it once. Cancellation is latched: once fired it stays fired, late
//! subscribers observe it immediately, and callbacks registered after the
//! fact run at registration time.

use std::sync::{Arc, Mutex};
use tokio::sync::watch;

type Callback = Box<dyn FnOnce() + Send>;

struct CancelerInner {
    tx: watch::Sender<bool>,
    callbacks: Mutex<Vec<Callback>>,
}

#[derive(Clone)]
pub struct Canceler {
    inner: Arc<CancelerInner>,
}

impl Canceler {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            inner: Arc::new(CancelerInner {
                tx,
                callbacks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn is_canceled(&self) -> bool {
        *self.inner.tx.borrow()
    }

    /// Registers a callback to run when the canceler fires. If it already
    /// fired, the callback runs immediately on the current task.
    pub fn on_cancel(&self, callback: impl FnOnce() + Send + 'static) {
        if self.is_canceled() {
            callback();
            return;
        }
        let mut callbacks = self
            .inner
            .callbacks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Re-check under the lock so a concurrent cancel cannot strand us.
        if *self.inner.tx.borrow() {
            drop(callbacks);
            callback();
        } else {
            callbacks.push(Box::new(callback));
        }
    }

    /// Fires the canceler: runs registered callbacks and wakes every task
    /// waiting in [`Canceler::canceled`]. Idempotent.
    pub fn cancel(&self) {
        let callbacks = {
            let mut guard = self
                .inner
                .callbacks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::take(&mut *guard)
        };
        // send() refuses to update the value when no receiver is subscribed;
        // send_replace latches it unconditionally.
        self.inner.tx.send_replace(true);
        for callback in callbacks {
            callback();
        }
    }

    /// Resolves when the canceler fires; resolves immediately if it already
    /// has. Never resolves otherwise.
    pub async fn canceled(&self) {
        let mut rx = self.inner.tx.subscribe();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                // Sender dropped without firing; this cannot happen while the
                // inner Arc is alive, but park forever rather than resolve.
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for Canceler {
    fn default() -> Self {
        Self::new()
    }
}
