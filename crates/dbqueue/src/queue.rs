use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::semaphore::CountingSemaphore;
use crate::types::QueryRequest;

/// FIFO of pending `QueryRequest`, paired with a counted semaphore whose
/// value tracks queue depth. Bounded-from-below (never negative), unbounded
/// upwards — there is no backpressure at this layer.
pub struct UnderlyingQueue {
    items: Mutex<VecDeque<QueryRequest>>,
    semaphore: CountingSemaphore,
    shutdown_requested: AtomicBool,
}

impl UnderlyingQueue {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            semaphore: CountingSemaphore::new(),
            shutdown_requested: AtomicBool::new(false),
        }
    }

    /// Always succeeds unless shutdown has been requested; posts the
    /// semaphore only after the item is visible to a concurrent dequeue.
    pub fn enqueue(&self, req: QueryRequest) -> bool {
        if self.shutdown_requested.load(Ordering::SeqCst) {
            return false;
        }
        self.items.lock().unwrap().push_back(req);
        self.semaphore.post();
        true
    }

    /// Push back to the tail without posting again — used by the worker loop
    /// to requeue a request that arrived before bootstrap completed. The
    /// semaphore count already reflects this item; re-posting would double
    /// count it relative to `depth()`.
    pub fn requeue_front_wait(&self, req: QueryRequest) {
        self.items.lock().unwrap().push_back(req);
        self.semaphore.post();
    }

    /// Wait on the semaphore up to `timeout`; on wake, pop the head under the
    /// depth mutex. Returns `None` on timeout or on an empty pop race (the
    /// latter should not happen under correct post/wait pairing, but is
    /// handled defensively since shutdown posts the semaphore without adding
    /// an item).
    pub fn dequeue(&self, timeout: Duration) -> Option<QueryRequest> {
        if !self.semaphore.wait_timeout(timeout) {
            return None;
        }
        self.items.lock().unwrap().pop_front()
    }

    pub fn depth(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    /// Flip the shutdown flag and post the semaphore enough times to wake
    /// every waiter currently blocked in `dequeue` (at most one worker per
    /// queue in this core, but the interface matches the source's
    /// multi-waiter design).
    pub fn request_shutdown(&self, waiters_to_wake: u64) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
        self.semaphore.post_n(waiters_to_wake.max(1));
    }
}

impl Default for UnderlyingQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::QueueClass;

    fn req(id: &str) -> QueryRequest {
        QueryRequest::new(id, "SELECT 1").with_queue_class(QueueClass::Medium)
    }

    #[test]
    fn fifo_order_preserved() {
        let q = UnderlyingQueue::new();
        assert!(q.enqueue(req("a")));
        assert!(q.enqueue(req("b")));
        assert_eq!(q.depth(), 2);

        let first = q.dequeue(Duration::from_millis(50)).unwrap();
        let second = q.dequeue(Duration::from_millis(50)).unwrap();
        assert_eq!(first.query_id, "a");
        assert_eq!(second.query_id, "b");
    }

    #[test]
    fn dequeue_times_out_on_empty_queue() {
        let q = UnderlyingQueue::new();
        assert!(q.dequeue(Duration::from_millis(20)).is_none());
    }

    #[test]
    fn enqueue_after_shutdown_fails() {
        let q = UnderlyingQueue::new();
        q.request_shutdown(1);
        assert!(!q.enqueue(req("late")));
    }
}
