use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// A counted semaphore built directly on `Mutex`/`Condvar`, matching the
/// source's hand-rolled synchronization primitive rather than anything
/// runtime-provided. Used to give `UnderlyingQueue::dequeue` a single wait
/// point that is both bounded (by a timeout) and wakeable by shutdown.
pub struct CountingSemaphore {
    count: Mutex<u64>,
    cond: Condvar,
}

impl CountingSemaphore {
    pub fn new() -> Self {
        Self {
            count: Mutex::new(0),
            cond: Condvar::new(),
        }
    }

    /// Increment the count and wake one waiter.
    pub fn post(&self) {
        let mut count = self.count.lock().unwrap();
        *count += 1;
        self.cond.notify_one();
    }

    /// Increment the count `n` times and wake up to `n` waiters. Used by
    /// `request_shutdown` to make sure every blocked worker wakes.
    pub fn post_n(&self, n: u64) {
        let mut count = self.count.lock().unwrap();
        *count += n;
        self.cond.notify_all();
    }

    /// Block until the count is positive or `timeout` elapses, then
    /// decrement and return `true`; returns `false` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut count = self.count.lock().unwrap();
        let deadline = std::time::Instant::now() + timeout;
        while *count == 0 {
            let now = std::time::Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, result) = self.cond.wait_timeout(count, deadline - now).unwrap();
            count = guard;
            if result.timed_out() && *count == 0 {
                return false;
            }
        }
        *count -= 1;
        true
    }
}

impl Default for CountingSemaphore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn post_then_wait_succeeds_immediately() {
        let sem = CountingSemaphore::new();
        sem.post();
        assert!(sem.wait_timeout(Duration::from_millis(50)));
    }

    #[test]
    fn wait_without_post_times_out() {
        let sem = CountingSemaphore::new();
        assert!(!sem.wait_timeout(Duration::from_millis(20)));
    }

    #[test]
    fn post_wakes_a_blocked_waiter() {
        let sem = Arc::new(CountingSemaphore::new());
        let sem2 = sem.clone();
        let handle = thread::spawn(move || sem2.wait_timeout(Duration::from_secs(2)));
        thread::sleep(Duration::from_millis(30));
        sem.post();
        assert!(handle.join().unwrap());
    }
}
