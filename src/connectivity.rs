//! Injected online/offline signal.
//!
//! The host environment owns the actual detection (browser events,
//! NetworkManager, a periodic probe) and drives [`Connectivity`];
//! the managers only observe it. This keeps the core testable
//! without a real network stack.

use std::sync::Arc;
use tokio::sync::watch;

/// Shared connectivity handle.
#[derive(Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    /// Create a handle with the given initial state.
    pub fn new(online: bool) -> Self {
        let (tx, _) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    /// Current state.
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Report a connectivity transition. No-op if the state is
    /// unchanged, so subscribers only wake on real transitions.
    pub fn set_online(&self, online: bool) {
        self.tx.send_if_modified(|current| {
            if *current != online {
                *current = online;
                true
            } else {
                false
            }
        });
    }

    /// Subscribe to transitions. The receiver sees the current state
    /// immediately.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}
