//! Drop-on-full hand-off queue between the tick thread and the worker.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, TrySendError};

/// Bounded MPMC queue whose `push` never blocks: when full, the new item is
/// discarded and counted.
pub struct DropQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    capacity: usize,
    dropped: AtomicU64,
}

impl<T> DropQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        Self {
            tx,
            rx,
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue `item`. Returns `false` when it was dropped.
    pub fn push(&self, item: T) -> bool {
        match self.tx.try_send(item) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn pop(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Items discarded since creation or the last [`reset_dropped`](Self::reset_dropped).
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn reset_dropped(&self) {
        self.dropped.store(0, Ordering::Relaxed);
    }

    /// Discard everything queued. Returns how many items were removed.
    pub fn clear(&self) -> usize {
        self.rx.try_iter().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_queue_drops_newest() {
        let queue = DropQueue::new(3);
        for i in 0..5 {
            queue.push(i);
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dropped(), 2);
        assert_eq!(queue.pop(), Some(0));
        assert!(queue.push(9));
        let rest: Vec<_> = std::iter::from_fn(|| queue.pop()).collect();
        assert_eq!(rest, vec![1, 2, 9]);
    }

    #[test]
    fn clear_empties_without_touching_drop_count() {
        let queue = DropQueue::new(2);
        queue.push("a");
        queue.push("b");
        queue.push("c");
        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
        assert_eq!(queue.dropped(), 1);
        queue.reset_dropped();
        assert_eq!(queue.dropped(), 0);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let queue = DropQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        assert!(queue.push(1u8));
        assert!(!queue.push(2u8));
    }

    #[test]
    fn concurrent_producers_never_exceed_capacity() {
        let queue = std::sync::Arc::new(DropQueue::new(30));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let queue = std::sync::Arc::clone(&queue);
                std::thread::spawn(move || {
                    for i in 0..50u32 {
                        queue.push(i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(queue.len(), 30);
        assert_eq!(queue.dropped(), 170);
    }
}
