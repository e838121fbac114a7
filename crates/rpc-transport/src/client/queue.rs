//! Three-tier client priority queue (§4.4.2, §5). The sender drains High
//! before Normal before Low; within one band, FIFO order holds.

use task_runtime::queue::{MutexQueue, Queue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Low,
    Normal,
    High,
}

/// Holds one FIFO per priority band; `pop_next` always drains the highest
/// non-empty band, so cross-priority FIFO order is not preserved by design
/// (§5: "Cross-priority ordering is not preserved").
pub struct PriorityQueue<T> {
    high: MutexQueue<T>,
    normal: MutexQueue<T>,
    low: MutexQueue<T>,
}

impl<T: Send> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> PriorityQueue<T> {
    pub fn new() -> Self {
        Self {
            high: MutexQueue::new(false),
            normal: MutexQueue::new(false),
            low: MutexQueue::new(false),
        }
    }

    pub fn push(&self, priority: Priority, value: T) {
        match priority {
            Priority::High => self.high.push(value),
            Priority::Normal => self.normal.push(value),
            Priority::Low => self.low.push(value),
        }
    }

    pub fn pop_next(&self) -> Option<T> {
        self.high
            .pop_item()
            .or_else(|| self.normal.pop_item())
            .or_else(|| self.low.pop_item())
    }

    pub fn is_empty(&self) -> bool {
        self.high.is_empty() && self.normal.is_empty() && self.low.is_empty()
    }

    pub fn len(&self) -> usize {
        self.high.len() + self.normal.len() + self.low.len()
    }
}
