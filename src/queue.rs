//! Shared work queue.
//!
//! Every item is loaded before any worker starts and the sending side is
//! dropped right after, so a disconnected channel means the queue is drained.
//! Each item is handed to exactly one claimer.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, unbounded};

/// Multi-consumer FIFO of items, loaded once.
pub struct WorkQueue<I> {
    rx: Receiver<I>,
}

impl<I> Clone for WorkQueue<I> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

impl<I> WorkQueue<I> {
    /// Load `items` and close the queue to further additions.
    pub fn sealed(items: impl IntoIterator<Item = I>) -> Self {
        let (tx, rx) = unbounded();
        for item in items {
            // The receiver is alive in this scope, so sending cannot fail.
            let _ = tx.send(item);
        }
        Self { rx }
    }

    /// Claim the next item, waiting at most `wait`. `None` means there is
    /// nothing left to claim.
    pub fn claim(&self, wait: Duration) -> Option<I> {
        match self.rx.recv_timeout(wait) {
            Ok(item) => Some(item),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Items not yet claimed.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
