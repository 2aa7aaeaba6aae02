// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Unbounded multi-producer/multi-consumer work queues.

use crossbeam_queue::SegQueue;

/// An opaque, zero-argument unit of deferred execution.
///
/// Ownership transfers to the queue on enqueue and to exactly one consuming
/// thread on dequeue. Items carry no identity and are never resubmitted by
/// the pool.
pub type WorkItem = Box<dyn FnOnce() + Send + 'static>;

/// An unbounded MPMC FIFO queue of [`WorkItem`]s.
///
/// Enqueues always succeed without blocking. Dequeues never block and may
/// spuriously report a miss while concurrent enqueues are still in flight;
/// callers tolerate the miss and retry. Delivery is exact: an item observed
/// enqueued is dequeued exactly once — no loss, no duplication — as long as
/// some thread keeps dequeuing.
#[derive(Debug, Default)]
pub struct WorkQueue {
    items: SegQueue<WorkItem>,
}

impl WorkQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: SegQueue::new(),
        }
    }

    /// Enqueues one item. Never blocks; callable from any thread.
    pub fn enqueue(&self, item: WorkItem) {
        self.items.push(item);
    }

    /// Tries to dequeue one item.
    ///
    /// `None` means nothing was extractable at this instant, which is a
    /// legitimate outcome under concurrent mutation.
    #[must_use]
    pub fn dequeue(&self) -> Option<WorkItem> {
        self.items.pop()
    }

    /// Liveness hint only: may be stale under concurrent mutation. Useful
    /// to skip wake cycles cheaply, never as a correctness gate.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of queued items at this instant, with the same staleness
    /// caveat as [`is_empty`](Self::is_empty).
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn dequeue_on_an_empty_queue_misses() {
        let queue = WorkQueue::new();
        assert!(queue.is_empty());
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn items_dequeue_in_submission_order() {
        let queue = WorkQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for label in 0..3 {
            let order = Arc::clone(&order);
            queue.enqueue(Box::new(move || order.lock().unwrap().push(label)));
        }
        assert_eq!(queue.len(), 3);

        while let Some(item) = queue.dequeue() {
            item();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn concurrent_enqueue_and_dequeue_delivers_every_item_once() {
        const PRODUCERS: usize = 4;
        const ITEMS_PER_PRODUCER: usize = 100;
        const TOTAL: usize = PRODUCERS * ITEMS_PER_PRODUCER;

        let queue = Arc::new(WorkQueue::new());
        let executed = Arc::new(AtomicUsize::new(0));

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let executed = Arc::clone(&executed);
                thread::spawn(move || {
                    for _ in 0..ITEMS_PER_PRODUCER {
                        let executed = Arc::clone(&executed);
                        queue.enqueue(Box::new(move || {
                            executed.fetch_add(1, Ordering::SeqCst);
                        }));
                    }
                })
            })
            .collect();

        let consumers: Vec<_> = (0..2)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let executed = Arc::clone(&executed);
                thread::spawn(move || {
                    let deadline = Instant::now() + Duration::from_secs(5);
                    while executed.load(Ordering::SeqCst) < TOTAL && Instant::now() < deadline {
                        match queue.dequeue() {
                            Some(item) => item(),
                            // A miss is legitimate mid-stream; retry.
                            None => thread::yield_now(),
                        }
                    }
                })
            })
            .collect();

        for producer in producers {
            producer.join().expect("producer panicked");
        }
        for consumer in consumers {
            consumer.join().expect("consumer panicked");
        }

        assert_eq!(executed.load(Ordering::SeqCst), TOTAL);
        assert!(queue.is_empty());
    }
}
