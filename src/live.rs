//! Recent-sample ring and live subscriber fan-out
//!
//! New subscribers first get a replay of the ring, oldest first, then every
//! record pushed after they attached. Attaching snapshots the ring and
//! subscribes under the same lock that pushes take, so nothing is missed or
//! delivered twice at the seam.

use crate::record::Record;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Fixed-capacity ring of recent records; the oldest is overwritten when full.
#[derive(Debug, Clone)]
pub struct LiveRingBuffer {
    records: VecDeque<Record>,
    capacity: usize,
}

impl LiveRingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, record: Record) {
        if self.capacity == 0 {
            return;
        }
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Records oldest to newest
    pub fn snapshot(&self) -> Vec<Record> {
        self.records.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// What a new subscriber receives: the replay, then the live channel
pub struct LiveSubscription {
    pub replay: Vec<Record>,
    pub receiver: broadcast::Receiver<Record>,
}

pub struct LiveFeed {
    ring: Mutex<LiveRingBuffer>,
    sender: broadcast::Sender<Record>,
}

impl LiveFeed {
    pub fn new(ring_capacity: usize, channel_capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            ring: Mutex::new(LiveRingBuffer::new(ring_capacity)),
            sender,
        }
    }

    /// Publish a record to subscribers, optionally keeping it for replay.
    pub fn publish(&self, record: Record, keep_for_replay: bool) {
        let mut ring = self.ring.lock().unwrap();
        if keep_for_replay {
            ring.push(record);
        }
        // no receivers is fine
        let _ = self.sender.send(record);
    }

    pub fn attach(&self) -> LiveSubscription {
        let ring = self.ring.lock().unwrap();
        LiveSubscription {
            replay: ring.snapshot(),
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn replay_len(&self) -> usize {
        self.ring.lock().unwrap().len()
    }

    pub fn clear(&self) {
        let mut ring = self.ring.lock().unwrap();
        *ring = LiveRingBuffer::new(ring.capacity());
    }
}
