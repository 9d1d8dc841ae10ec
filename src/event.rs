use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::tree::NodeId;

/// Tree notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeEvent {
    /// The tree changed as a whole (e.g. the root was replaced).
    Changed,
    /// A composite node's children were resolved, sorted and installed.
    NodeRefreshed(NodeId),
}

/// Fan-out of tree events to every live subscriber.
#[derive(Debug, Default)]
pub struct EventEmitter {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<TreeEvent>>>,
    disposed: AtomicBool,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber.
    ///
    /// After `dispose` the returned stream is already closed.
    pub fn subscribe(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.disposed.load(Ordering::Acquire) {
            subscribers.push(tx);
        }
        EventStream { rx }
    }

    /// Deliver `event` to all subscribers, dropping the ones that hung up.
    pub fn fire(&self, event: TreeEvent) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| tx.send(event).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Release every subscription; their streams end once drained.
    pub fn dispose(&self) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        self.disposed.store(true, Ordering::Release);
        subscribers.clear();
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

/// Receiving side of a subscription.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<TreeEvent>,
}

impl EventStream {
    /// Receive the next event, or `None` once the tree is disposed.
    pub async fn next(&mut self) -> Option<TreeEvent> {
        self.rx.recv().await
    }

    /// Non-blocking receive of an already delivered event.
    pub fn try_next(&mut self) -> Option<TreeEvent> {
        self.rx.try_recv().ok()
    }
}
