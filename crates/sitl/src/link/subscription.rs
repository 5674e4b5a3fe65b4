use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Default number of undelivered samples buffered per subscriber.
pub const DEFAULT_CAPACITY: usize = 256;

/// Receiving end of a telemetry stream.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> Subscription<T> {
    pub fn new(rx: mpsc::Receiver<T>) -> Self {
        Self { rx }
    }

    /// Next sample in arrival order, `None` once the stream has ended.
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv().await
    }
}

/// Fan-out point for one telemetry stream.
///
/// Each subscriber gets its own bounded queue. A subscriber that falls
/// behind loses new samples instead of stalling the publisher; dropped
/// subscribers are pruned on the next publish.
#[derive(Debug)]
pub struct Topic<T> {
    name: &'static str,
    capacity: usize,
    subscribers: Mutex<Vec<mpsc::Sender<T>>>,
}

impl<T: Clone> Topic<T> {
    pub fn new(name: &'static str) -> Self {
        Self::with_capacity(name, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity,
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.lock().push(tx);
        Subscription::new(rx)
    }

    pub fn publish(&self, value: T) {
        let name = self.name;
        self.lock().retain(|tx| match tx.try_send(value.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::debug!(topic = name, "Subscriber lagging, sample dropped");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.lock().iter().filter(|tx| !tx.is_closed()).count()
    }

    /// End every subscription.
    pub fn close(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::Sender<T>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
