//! Task queues: FIFOs that producers push onto from any thread and one
//! consumer drains cooperatively. Three shapes are provided, matching the
//! hatn queue hierarchy: a mutex-protected default, a lock-light MPSC
//! variant, and a single-consumer-no-contention variant for queues that are
//! provably only ever touched by their own owning thread.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

/// One queued item plus the timestamp it was enqueued at, used for
/// queueing-latency statistics.
struct Item<T> {
    value: T,
    enqueued_at: Instant,
}

/// Optional min/max depth and min/max queueing-duration statistics. Kept
/// behind an explicit `enable_stats` flag so the default path pays nothing
/// for them, matching the original queue's `m_enableStats` gate.
#[derive(Debug, Default)]
pub struct QueueStats {
    max_size: AtomicUsize,
    min_size: AtomicUsize,
    max_duration_us: AtomicI64,
    min_duration_us: AtomicI64,
}

impl QueueStats {
    fn record_push(&self, size: usize) {
        self.max_size.fetch_max(size, Ordering::Relaxed);
        loop {
            let min = self.min_size.load(Ordering::Relaxed);
            if size >= min && min != 0 {
                break;
            }
            if self
                .min_size
                .compare_exchange_weak(min, size, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
    }

    fn record_pop(&self, wait: std::time::Duration) {
        let us = wait.as_micros() as i64;
        self.max_duration_us.fetch_max(us, Ordering::Relaxed);
        loop {
            let min = self.min_duration_us.load(Ordering::Relaxed);
            if us >= min && min != 0 {
                break;
            }
            if self
                .min_duration_us
                .compare_exchange_weak(min, us, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_size.load(Ordering::Relaxed)
    }

    pub fn min_depth(&self) -> usize {
        self.min_size.load(Ordering::Relaxed)
    }

    pub fn max_queue_duration_us(&self) -> i64 {
        self.max_duration_us.load(Ordering::Relaxed)
    }

    pub fn min_queue_duration_us(&self) -> i64 {
        self.min_duration_us.load(Ordering::Relaxed)
    }
}

/// A FIFO task queue. Implementations must be safe for many producers to
/// `push` concurrently with one consumer draining via `pop_item`.
pub trait Queue<T>: Send + Sync {
    fn push(&self, value: T);
    fn pop_item(&self) -> Option<T>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn clear(&self);
    fn stats(&self) -> Option<&QueueStats> {
        None
    }
}

/// Mutex-protected `VecDeque`. The default variant: simple, correct, and
/// fast enough unless profiling says otherwise.
pub struct MutexQueue<T> {
    items: Mutex<VecDeque<Item<T>>>,
    stats: Option<QueueStats>,
}

impl<T> MutexQueue<T> {
    pub fn new(enable_stats: bool) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            stats: enable_stats.then(QueueStats::default),
        }
    }
}

impl<T> Default for MutexQueue<T> {
    fn default() -> Self {
        Self::new(false)
    }
}

impl<T: Send> Queue<T> for MutexQueue<T> {
    fn push(&self, value: T) {
        let mut items = self.items.lock();
        items.push_back(Item {
            value,
            enqueued_at: Instant::now(),
        });
        if let Some(stats) = &self.stats {
            stats.record_push(items.len());
        }
    }

    fn pop_item(&self) -> Option<T> {
        let mut items = self.items.lock();
        let item = items.pop_front()?;
        if let Some(stats) = &self.stats {
            stats.record_pop(item.enqueued_at.elapsed());
        }
        Some(item.value)
    }

    fn len(&self) -> usize {
        self.items.lock().len()
    }

    fn clear(&self) {
        self.items.lock().clear();
    }

    fn stats(&self) -> Option<&QueueStats> {
        self.stats.as_ref()
    }
}

/// Multiple-producer, single-consumer queue backed by `tokio::sync::mpsc`.
/// Posting bumps the channel's own internal counters, which is hatn's
/// "pending producers" device by another name: the channel will not report
/// closed/empty while a send is in flight.
pub struct MpscQueue<T> {
    sender: tokio::sync::mpsc::UnboundedSender<Item<T>>,
    receiver: Mutex<tokio::sync::mpsc::UnboundedReceiver<Item<T>>>,
    len: AtomicUsize,
    stats: Option<QueueStats>,
}

impl<T> MpscQueue<T> {
    pub fn new(enable_stats: bool) -> Self {
        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
            len: AtomicUsize::new(0),
            stats: enable_stats.then(QueueStats::default),
        }
    }
}

impl<T: Send> Queue<T> for MpscQueue<T> {
    fn push(&self, value: T) {
        let item = Item {
            value,
            enqueued_at: Instant::now(),
        };
        // An error here means the receiver half was dropped, which only
        // happens when the owning thread has already torn the queue down.
        if self.sender.send(item).is_ok() {
            let size = self.len.fetch_add(1, Ordering::AcqRel) + 1;
            if let Some(stats) = &self.stats {
                stats.record_push(size);
            }
        }
    }

    fn pop_item(&self) -> Option<T> {
        let item = self.receiver.lock().try_recv().ok()?;
        self.len.fetch_sub(1, Ordering::AcqRel);
        if let Some(stats) = &self.stats {
            stats.record_pop(item.enqueued_at.elapsed());
        }
        Some(item.value)
    }

    fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    fn clear(&self) {
        let mut receiver = self.receiver.lock();
        while receiver.try_recv().is_ok() {
            self.len.fetch_sub(1, Ordering::AcqRel);
        }
    }

    fn stats(&self) -> Option<&QueueStats> {
        self.stats.as_ref()
    }
}

/// Single-consumer queue for the case where no other thread will ever call
/// `pop_item`: still guards `push` for multiple producers, but skips the
/// generality (and the stats bookkeeping) the other two variants carry.
pub struct SimpleQueue<T> {
    items: Mutex<VecDeque<T>>,
}

impl<T> SimpleQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
        }
    }
}

impl<T> Default for SimpleQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> Queue<T> for SimpleQueue<T> {
    fn push(&self, value: T) {
        self.items.lock().push_back(value);
    }

    fn pop_item(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    fn len(&self) -> usize {
        self.items.lock().len()
    }

    fn clear(&self) {
        self.items.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutex_queue_is_fifo() {
        let q = MutexQueue::new(false);
        q.push(1);
        q.push(2);
        q.push(3);
        assert_eq!(q.pop_item(), Some(1));
        assert_eq!(q.pop_item(), Some(2));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn mutex_queue_tracks_depth_stats_when_enabled() {
        let q = MutexQueue::new(true);
        q.push(1);
        q.push(2);
        q.pop_item();
        let stats = q.stats().unwrap();
        assert_eq!(stats.max_depth(), 2);
    }

    #[test]
    fn mpsc_queue_is_fifo_across_producers() {
        let q = MpscQueue::new(false);
        q.push("a");
        q.push("b");
        assert_eq!(q.pop_item(), Some("a"));
        assert_eq!(q.pop_item(), Some("b"));
        assert_eq!(q.pop_item(), None);
    }

    #[test]
    fn clear_drains_everything() {
        let q = MutexQueue::new(false);
        q.push(1);
        q.push(2);
        q.clear();
        assert!(q.is_empty());
    }

    #[test]
    fn simple_queue_is_fifo() {
        let q = SimpleQueue::new();
        q.push(10);
        q.push(20);
        assert_eq!(q.pop_item(), Some(10));
        assert_eq!(q.len(), 1);
    }
}
