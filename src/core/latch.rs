//! One-shot completion latch.
//!
//! A set that happens before `wait()` is never lost: the value lives behind the
//! mutex and waiters check it before parking on the condvar. The mutex gives the
//! release/acquire edge between the finalizing thread and the waiter, so the
//! waiter always observes the fully written value.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Persistent (level-triggered) completion signal carrying a value.
pub struct CompletionLatch<T> {
    slot: Mutex<Option<T>>,
    ready: Condvar,
}

impl<T> Default for CompletionLatch<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CompletionLatch<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    /// Store `value` and wake every waiter. A second call overwrites (last write wins).
    pub fn set(&self, value: T) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(value);
        self.ready.notify_all();
    }

    pub fn is_set(&self) -> bool {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }
}

impl<T: Clone> CompletionLatch<T> {
    /// Block until the latch is set, then return a copy of the value.
    pub fn wait(&self) -> T {
        let slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        let slot = self
            .ready
            .wait_while(slot, |v| v.is_none())
            .unwrap_or_else(|e| e.into_inner());
        match slot.as_ref() {
            Some(v) => v.clone(),
            // wait_while only returns once the predicate is false
            None => unreachable!("latch woke without a value"),
        }
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(v) = slot.as_ref() {
                return Some(v.clone());
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self
                .ready
                .wait_timeout(slot, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            slot = guard;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_set_before_wait_is_not_lost() {
        let latch = CompletionLatch::new();
        latch.set(7);
        assert_eq!(latch.wait(), 7);
        // Level-triggered: a second wait sees the same value
        assert_eq!(latch.wait(), 7);
    }

    #[test]
    fn test_last_write_wins() {
        let latch = CompletionLatch::new();
        latch.set("first");
        latch.set("second");
        assert_eq!(latch.wait(), "second");
    }

    #[test]
    fn test_wait_timeout_expires_when_unset() {
        let latch: CompletionLatch<u32> = CompletionLatch::new();
        assert_eq!(latch.wait_timeout(Duration::from_millis(20)), None);
        assert!(!latch.is_set());
    }

    #[test]
    fn test_cross_thread_wake() {
        let latch = Arc::new(CompletionLatch::new());
        let waiter = {
            let latch = Arc::clone(&latch);
            thread::spawn(move || latch.wait())
        };
        thread::sleep(Duration::from_millis(10));
        latch.set(vec![1u8, 2, 3]);
        assert_eq!(waiter.join().unwrap(), vec![1, 2, 3]);
    }
}
