//! Cancellation flag for one separation job

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

use crate::error::{Result, StemError};

/// Set once, never cleared. Waiters on [`CancelFlag::cancelled`] are woken
/// when it is set, which is how pending poll timers are stopped.
#[derive(Debug, Default)]
pub struct CancelFlag {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once the flag is set
    pub fn checkpoint(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(StemError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves when the flag is set
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}
