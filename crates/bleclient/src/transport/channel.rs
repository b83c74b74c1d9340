//! Bounded queue between the adapter's thread and the dispatcher

use super::events::TransportEvent;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError};
use std::time::Duration;

/// Creates a queue holding at most `capacity` undelivered events
pub fn event_channel(capacity: usize) -> (EventSink, EventQueue) {
    let (tx, rx) = mpsc::sync_channel(capacity);
    (EventSink { tx }, EventQueue { rx })
}

/// Producer side, handed to the adapter layer. Cloneable; events keep the
/// order in which `push` calls complete.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: SyncSender<TransportEvent>,
}

impl EventSink {
    /// Queues an event, blocking while the queue is full. Returns `false`
    /// once the client side has gone away.
    pub fn push(&self, event: TransportEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Outcome of waiting on the queue
#[derive(Debug, PartialEq, Eq)]
pub enum Received {
    Event(TransportEvent),
    TimedOut,
    /// Every sink is gone and the queue is drained
    Closed,
}

/// Consumer side, owned by the client
#[derive(Debug)]
pub struct EventQueue {
    rx: Receiver<TransportEvent>,
}

impl EventQueue {
    /// Waits for the next event; `None` waits indefinitely
    pub fn recv(&self, timeout: Option<Duration>) -> Received {
        match timeout {
            None => match self.rx.recv() {
                Ok(event) => Received::Event(event),
                Err(_) => Received::Closed,
            },
            Some(timeout) => match self.rx.recv_timeout(timeout) {
                Ok(event) => Received::Event(event),
                Err(RecvTimeoutError::Timeout) => Received::TimedOut,
                Err(RecvTimeoutError::Disconnected) => Received::Closed,
            },
        }
    }

    /// Takes the next event if one is already queued
    pub fn try_recv(&self) -> Received {
        match self.rx.try_recv() {
            Ok(event) => Received::Event(event),
            Err(TryRecvError::Empty) => Received::TimedOut,
            Err(TryRecvError::Disconnected) => Received::Closed,
        }
    }
}
