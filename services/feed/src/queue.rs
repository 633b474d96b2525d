//! Per-client outbound queues
//!
//! Each session owns one queue with two lanes. Snapshot-class messages
//! (order book snapshots) are bounded and drop-oldest on overflow; a
//! lagging client only loses stale views it would supersede anyway.
//! Critical messages (trades, notifications, system) are never dropped;
//! if that lane overflows the client is disconnected instead.

use std::collections::VecDeque;

/// Which delivery lane a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageClass {
    /// Bounded, drop-oldest on overflow.
    Snapshot,
    /// Never dropped; overflow disconnects the client.
    Critical,
}

/// Action the registry must take after an enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// An old snapshot was evicted to make room.
    DroppedOldest,
    /// The critical lane overflowed; disconnect this client.
    Disconnect,
}

#[derive(Debug)]
pub struct ClientQueue {
    snapshots: VecDeque<String>,
    critical: VecDeque<String>,
    snapshot_capacity: usize,
    critical_capacity: usize,
    snapshots_dropped: u64,
}

impl ClientQueue {
    pub fn new(snapshot_capacity: usize, critical_capacity: usize) -> Self {
        Self {
            snapshots: VecDeque::new(),
            critical: VecDeque::new(),
            snapshot_capacity,
            critical_capacity,
            snapshots_dropped: 0,
        }
    }

    pub fn enqueue(&mut self, class: MessageClass, payload: String) -> EnqueueOutcome {
        match class {
            MessageClass::Snapshot => {
                let mut outcome = EnqueueOutcome::Queued;
                if self.snapshots.len() >= self.snapshot_capacity {
                    self.snapshots.pop_front();
                    self.snapshots_dropped += 1;
                    outcome = EnqueueOutcome::DroppedOldest;
                }
                self.snapshots.push_back(payload);
                outcome
            }
            MessageClass::Critical => {
                if self.critical.len() >= self.critical_capacity {
                    return EnqueueOutcome::Disconnect;
                }
                self.critical.push_back(payload);
                EnqueueOutcome::Queued
            }
        }
    }

    /// Take everything queued, critical lane first.
    pub fn drain(&mut self) -> Vec<String> {
        let mut drained = Vec::with_capacity(self.critical.len() + self.snapshots.len());
        drained.extend(self.critical.drain(..));
        drained.extend(self.snapshots.drain(..));
        drained
    }

    pub fn len(&self) -> usize {
        self.snapshots.len() + self.critical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty() && self.critical.is_empty()
    }

    pub fn snapshots_dropped(&self) -> u64 {
        self.snapshots_dropped
    }
}
