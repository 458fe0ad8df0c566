use crate::record::Record;
use crossbeam_queue::ArrayQueue;

/// Bounded FIFO between the sampler and the flush task
///
/// Lock-free on both ends: a full queue rejects the push instead of waiting.
pub struct RecordQueue {
    records: ArrayQueue<Record>,
}

impl RecordQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: ArrayQueue::new(capacity.max(1)),
        }
    }

    /// Enqueue a record; false when the queue is full.
    pub fn push(&self, record: Record) -> bool {
        self.records.push(record).is_ok()
    }

    pub fn drain_one(&self) -> Option<Record> {
        self.records.pop()
    }

    pub fn pending_count(&self) -> usize {
        self.records.len()
    }

    pub fn capacity(&self) -> usize {
        self.records.capacity()
    }

    pub fn clear(&self) {
        while self.records.pop().is_some() {}
    }
}
