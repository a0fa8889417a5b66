use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// How long [`SpscQueue::consume_one`] may block.
#[derive(Clone, Copy, Debug, Default)]
pub struct BlockingWait<'a> {
    /// Zero waits forever.
    pub timeout_ms: u64,
    /// Raised while the queue lock is held, right before the element is
    /// popped.
    pub pop_flag: Option<&'a AtomicBool>,
}

impl<'a> BlockingWait<'a> {
    pub fn forever() -> Self {
        Self::default()
    }

    pub fn timeout_ms(timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            pop_flag: None,
        }
    }

    pub fn with_pop_flag(mut self, flag: &'a AtomicBool) -> Self {
        self.pop_flag = Some(flag);
        self
    }
}

/// Unbounded FIFO connecting one producer thread to one consumer thread.
///
/// The consumer callback always runs with the lock released, so it may push
/// back into the same queue.
#[derive(Debug)]
pub struct SpscQueue<T> {
    items: Mutex<VecDeque<T>>,
    ready: Condvar,
}

impl<T> Default for SpscQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SpscQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
        }
    }

    pub fn push(&self, item: T) {
        self.lock().push_back(item);
        self.ready.notify_one();
    }

    /// Pushes `item` and lowers `flag` while holding the lock, pairing with
    /// [`Self::is_empty_and_lowered`].
    pub fn push_lowering(&self, item: T, flag: &AtomicBool) {
        let mut items = self.lock();
        items.push_back(item);
        flag.store(false, AtomicOrdering::SeqCst);
        drop(items);
        self.ready.notify_one();
    }

    /// True when the queue is empty and `flag` is lowered, both read under
    /// one lock.
    pub fn is_empty_and_lowered(&self, flag: &AtomicBool) -> bool {
        let items = self.lock();
        items.is_empty() && !flag.load(AtomicOrdering::SeqCst)
    }

    /// Pops one element without blocking. Returns false when the queue was
    /// empty.
    pub fn try_consume_one<F>(&self, consume: F) -> bool
    where
        F: FnOnce(T),
    {
        let item = self.lock().pop_front();
        match item {
            Some(item) => {
                consume(item);
                true
            }
            None => false,
        }
    }

    /// Pops one element, blocking until one arrives or the timeout elapses.
    /// Returns false on timeout.
    pub fn consume_one<F>(&self, wait: BlockingWait<'_>, consume: F) -> bool
    where
        F: FnOnce(T),
    {
        let guard = self.lock();
        let mut guard = if wait.timeout_ms > 0 {
            let (guard, _) = self
                .ready
                .wait_timeout_while(guard, Duration::from_millis(wait.timeout_ms), |items| {
                    items.is_empty()
                })
                .unwrap_or_else(PoisonError::into_inner);
            guard
        } else {
            self.ready
                .wait_while(guard, |items| items.is_empty())
                .unwrap_or_else(PoisonError::into_inner)
        };

        if guard.is_empty() {
            return false;
        }
        if let Some(flag) = wait.pop_flag {
            flag.store(true, AtomicOrdering::SeqCst);
        }
        let item = guard.pop_front();
        drop(guard);

        match item {
            Some(item) => {
                consume(item);
                true
            }
            None => false,
        }
    }

    /// Removes every queued element and hands them back so they are dropped
    /// outside the lock.
    pub fn clear(&self) -> Vec<T> {
        self.lock().drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
