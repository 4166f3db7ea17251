//! Per-node packet queue.
//!
//! Each node owns one mailbox: a FIFO of packets with a blocking receive
//! and an optional timeout. The sending half never disconnects while the
//! node is alive, so a receive either yields a packet or times out.

use crate::bus::packet::Packet;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// Outcome of a mailbox receive.
pub enum Received {
    /// A packet arrived.
    Packet(Packet),
    /// The configured timeout elapsed with nothing in the queue.
    TimedOut,
}

/// FIFO packet queue with blocking/timeout receive.
pub struct Mailbox {
    tx: Sender<Packet>,
    rx: Receiver<Packet>,
}

impl Mailbox {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Enqueues a packet.
    pub fn push(&self, pkt: Packet) {
        // The receiver lives as long as self, so this cannot fail.
        let _ = self.tx.send(pkt);
    }

    /// Blocks until a packet arrives, or until `timeout` elapses when one
    /// is configured. A timed-out receive consumes nothing.
    pub fn recv(&self, timeout: Option<Duration>) -> Received {
        match timeout {
            None => match self.rx.recv() {
                Ok(pkt) => Received::Packet(pkt),
                // Unreachable while self holds the sender; treat as idle.
                Err(_) => Received::TimedOut,
            },
            Some(t) => match self.rx.recv_timeout(t) {
                Ok(pkt) => Received::Packet(pkt),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    Received::TimedOut
                }
            },
        }
    }

    /// Number of packets currently queued.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}
