//! Bounded queue plumbing shared by every stage

use crossbeam_channel::{Receiver, SendTimeoutError, Sender, TryRecvError};
use std::time::Duration;

/// Outcome of a non-blocking fetch
#[derive(Debug, PartialEq)]
pub enum Fetch<T> {
    Ready(T),
    /// Nothing pending; the caller keeps its previous value
    Empty,
    /// The producing stage is gone
    Closed,
}

/// Outcome of a bounded blocking put
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Put {
    Sent,
    /// The consumer fell a full queue behind; fatal outside shutdown
    TimedOut,
    /// The consuming stage is gone
    Closed,
}

pub(crate) fn queue<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    crossbeam_channel::bounded(capacity)
}

pub(crate) fn fetch<T>(rx: &Receiver<T>) -> Fetch<T> {
    match rx.try_recv() {
        Ok(item) => Fetch::Ready(item),
        Err(TryRecvError::Empty) => Fetch::Empty,
        Err(TryRecvError::Disconnected) => Fetch::Closed,
    }
}

pub(crate) fn put<T>(tx: &Sender<T>, item: T, timeout: Duration) -> Put {
    match tx.send_timeout(item, timeout) {
        Ok(()) => Put::Sent,
        Err(SendTimeoutError::Timeout(_)) => Put::TimedOut,
        Err(SendTimeoutError::Disconnected(_)) => Put::Closed,
    }
}
