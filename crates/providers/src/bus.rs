//! One-writer / many-reader broadcast with back-pressure
//!
//! A naive channel cannot fan one offer stream out to two readers, so the
//! adapters publish into this subscriber-list broadcaster instead.
//! `publish` is serialized under a mutex and waits until every current
//! subscriber has taken the message; a slow reader therefore slows the
//! whole fetch rather than dropping offers. `close` takes the same mutex,
//! which makes it wait for any in-flight publish before ending the
//! subscriber streams.

use tokio::sync::{mpsc, Mutex};

/// In-memory pub/sub channel.
///
/// Subscribers added after publishing has begun do not receive earlier
/// messages. Subscribers that dropped their receiver are pruned on the
/// next publish so a dead reader cannot wedge the publisher.
pub struct PubSub<T> {
    inner: Mutex<Inner<T>>,
}

struct Inner<T> {
    subs: Vec<mpsc::Sender<T>>,
    closed: bool,
}

impl<T: Clone> PubSub<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                subs: Vec::with_capacity(2),
                closed: false,
            }),
        }
    }

    /// Deliver a message to every current subscriber.
    ///
    /// Blocks until each subscriber has room for the message. Publishing
    /// on a closed bus is a no-op.
    pub async fn publish(&self, message: T) {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return;
        }

        let subs = std::mem::take(&mut inner.subs);
        let mut alive = Vec::with_capacity(subs.len());
        for sub in subs {
            if sub.send(message.clone()).await.is_ok() {
                alive.push(sub);
            }
        }
        inner.subs = alive;
    }

    /// Register a new subscriber.
    ///
    /// Returns `None` once the bus is closed.
    pub async fn subscribe(&self) -> Option<mpsc::Receiver<T>> {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return None;
        }

        let (tx, rx) = mpsc::channel(1);
        inner.subs.push(tx);
        Some(rx)
    }

    /// Close the bus and end all subscriber streams.
    ///
    /// Waits for an in-flight publish to finish first.
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return;
        }
        inner.closed = true;
        inner.subs.clear();
    }
}

impl<T: Clone> Default for PubSub<T> {
    fn default() -> Self {
        Self::new()
    }
}
