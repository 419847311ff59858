//! Bounded global priority queue (§4.2): ordered by priority (follow-ups
//! before fresh queries), then FIFO by enqueue order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Mutex;
use tokio::sync::oneshot;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum RequestPriority {
    Fresh,
    FollowUp,
}

struct Entry {
    priority: RequestPriority,
    seq: u64,
    notify: oneshot::Sender<()>,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for Entry {}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: higher priority wins; among equal
        // priorities, the smaller (earlier) seq must pop first, so reverse it.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}
impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub struct PriorityQueue {
    capacity: usize,
    heap: Mutex<BinaryHeap<Entry>>,
    next_seq: AtomicU64,
}

impl PriorityQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            heap: Mutex::new(BinaryHeap::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.heap.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueue; returns a receiver that resolves once this request is
    /// dispatched, or `None` if the queue is at `Q_max`.
    pub fn try_enqueue(&self, priority: RequestPriority) -> Option<oneshot::Receiver<()>> {
        let mut heap = self.heap.lock().unwrap();
        if heap.len() >= self.capacity {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        let seq = self.next_seq.fetch_add(1, AtomicOrdering::SeqCst);
        heap.push(Entry { priority, seq, notify: tx });
        Some(rx)
    }

    /// Dispatch the highest-priority, earliest-enqueued waiter, if any.
    /// Returns `true` if a waiter was dispatched.
    pub fn dispatch_next(&self) -> bool {
        let mut heap = self.heap.lock().unwrap();
        while let Some(entry) = heap.pop() {
            if entry.notify.send(()).is_ok() {
                return true;
            }
            // Receiver already dropped (caller gave up) — try the next one.
        }
        false
    }
}
