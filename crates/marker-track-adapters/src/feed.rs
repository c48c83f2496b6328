//! Queues carrying raw backend events from SDK callbacks to the adapter.
//!
//! SDK callbacks may fire on any thread. They push into a [`RawSender`]; the
//! adapter drains the queue from the engine's thread in `poll`, so intake and
//! reconciliation never run concurrently.

use crossbeam_channel::{unbounded, Receiver, Sender};

/// Producer side handed to the SDK integration.
#[derive(Debug)]
pub struct RawSender<T> {
    tx: Sender<T>,
}

impl<T> Clone for RawSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> RawSender<T> {
    /// Queue one raw event. Returns `false` once the adapter is gone.
    pub fn send(&self, event: T) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Consumer side owned by an adapter.
#[derive(Debug)]
pub struct RawFeed<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> Default for RawFeed<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RawFeed<T> {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn sender(&self) -> RawSender<T> {
        RawSender {
            tx: self.tx.clone(),
        }
    }

    /// Take every queued event without blocking.
    pub fn drain(&self) -> Vec<T> {
        self.rx.try_iter().collect()
    }

    /// Throw queued events away. Returns how many were dropped.
    pub fn discard(&self) -> usize {
        self.rx.try_iter().count()
    }

    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}
