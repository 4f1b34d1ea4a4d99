//! Blocking multi-producer channel.
//!
//! [`Channel`] wraps a [`RingQueue`] with a mutex and a condition variable.
//! Every operation exists in two forms: an auto-locking method on the
//! channel itself, and the same method on a [`ChannelGuard`] obtained from
//! [`Channel::lock`], so that a consumer can inspect several conditions under
//! one lock acquisition.
//!
//! # Example
//! ```
//! use vkplay_core::Channel;
//!
//! let channel = Channel::new(4);
//! channel.push(7);
//! assert_eq!(channel.pop_nowait(), Some(7));
//! assert_eq!(channel.pop_nowait(), None);
//! ```

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::RingQueue;

/// Thread-safe FIFO with blocking and non-blocking pop.
#[derive(Debug)]
pub struct Channel<T> {
    queue: Mutex<RingQueue<T>>,
    cond: Condvar,
}

impl<T> Channel<T> {
    /// Create a channel whose queue starts with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(RingQueue::with_capacity(capacity)),
            cond: Condvar::new(),
        }
    }

    /// Lock the channel for a sequence of caller-locked operations.
    pub fn lock(&self) -> ChannelGuard<'_, T> {
        ChannelGuard {
            queue: self.queue.lock(),
            cond: &self.cond,
        }
    }

    /// Push an element and wake every waiter.
    pub fn push(&self, value: T) {
        self.lock().push(value);
    }

    /// Block until an element is available, then pop it.
    pub fn pop_wait(&self) -> T {
        self.lock().pop_wait()
    }

    /// Pop an element if one is queued.
    pub fn pop_nowait(&self) -> Option<T> {
        self.lock().pop_nowait()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self::new(8)
    }
}

/// Exclusive access to a locked [`Channel`].
///
/// The lock is released when the guard is dropped, and temporarily while
/// [`pop_wait`](Self::pop_wait) sleeps.
pub struct ChannelGuard<'a, T> {
    queue: MutexGuard<'a, RingQueue<T>>,
    cond: &'a Condvar,
}

impl<T> ChannelGuard<'_, T> {
    pub fn push(&mut self, value: T) {
        self.queue.push(value);
        self.cond.notify_all();
    }

    pub fn pop_wait(&mut self) -> T {
        loop {
            if let Some(value) = self.queue.pop() {
                return value;
            }
            self.cond.wait(&mut self.queue);
        }
    }

    pub fn pop_nowait(&mut self) -> Option<T> {
        self.queue.pop()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_channel_is_send_sync() {
        assert_send_sync::<Channel<u32>>();
    }

    #[test]
    fn test_pop_nowait_on_empty() {
        let channel: Channel<u32> = Channel::new(2);
        assert!(channel.is_empty());
        assert_eq!(channel.pop_nowait(), None);
    }

    #[test]
    fn test_pop_wait_blocks_until_push() {
        let channel = Arc::new(Channel::new(2));
        let consumer = {
            let channel = Arc::clone(&channel);
            thread::spawn(move || channel.pop_wait())
        };
        thread::sleep(Duration::from_millis(20));
        channel.push(42);
        assert_eq!(consumer.join().unwrap(), 42);
    }

    #[test]
    fn test_push_wakes_all_waiters() {
        let channel = Arc::new(Channel::new(2));
        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let channel = Arc::clone(&channel);
                thread::spawn(move || channel.pop_wait())
            })
            .collect();
        for i in 0..3 {
            channel.push(i);
        }
        let mut got: Vec<_> = consumers.into_iter().map(|c| c.join().unwrap()).collect();
        got.sort();
        assert_eq!(got, vec![0, 1, 2]);
    }

    #[test]
    fn test_guard_checks_under_one_lock() {
        let channel = Channel::new(1);
        {
            let mut guard = channel.lock();
            guard.push(1);
            guard.push(2);
            assert_eq!(guard.len(), 2);
            assert_eq!(guard.pop_nowait(), Some(1));
        }
        assert_eq!(channel.len(), 1);
        assert_eq!(channel.pop_wait(), 2);
    }

    #[test]
    fn test_many_producers() {
        let channel = Arc::new(Channel::new(1));
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let channel = Arc::clone(&channel);
                thread::spawn(move || {
                    for i in 0..100 {
                        channel.push(p * 100 + i);
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }
        let mut got: Vec<_> = std::iter::from_fn(|| channel.pop_nowait()).collect();
        got.sort();
        assert_eq!(got, (0..400).collect::<Vec<_>>());
    }
}
