//! Cooperative cancellation
//!
//! The engine accepts one token per run; `run_to_completion` checks it
//! between ticks only, preserving tick atomicity. Child tokens let a
//! caller cancel a subtree of work without touching siblings.

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Notify;

/// Clonable cancellation token
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

struct Inner {
    cancelled: RwLock<bool>,
    notify: Notify,
    parent: Option<CancelToken>,
    children: RwLock<Vec<CancelToken>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: RwLock::new(false),
                notify: Notify::new(),
                parent: None,
                children: RwLock::new(Vec::new()),
            }),
        }
    }

    /// A child cancelled together with this token, but not vice versa
    pub fn child_token(&self) -> Self {
        let child = Self {
            inner: Arc::new(Inner {
                cancelled: RwLock::new(false),
                notify: Notify::new(),
                parent: Some(self.clone()),
                children: RwLock::new(Vec::new()),
            }),
        };
        self.inner.children.write().push(child.clone());
        child
    }

    /// Cancel this token and every child
    pub fn cancel(&self) {
        *self.inner.cancelled.write() = true;
        self.inner.notify.notify_waiters();
        let children = self.inner.children.read().clone();
        for child in children {
            child.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        if *self.inner.cancelled.read() {
            return true;
        }
        self.inner
            .parent
            .as_ref()
            .map(|p| p.is_cancelled())
            .unwrap_or(false)
    }

    /// Resolve when the token is cancelled
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            self.inner.notify.notified().await;
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
