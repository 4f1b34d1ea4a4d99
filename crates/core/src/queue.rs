//! Growable ring queue.
//!
//! A FIFO backed by a circular array that doubles its capacity when full.
//! It carries no synchronization of its own; see [`Channel`](crate::Channel)
//! for the thread-safe wrapper.

/// Circular FIFO queue with amortized O(1) push.
///
/// `pop` and `peek` never block; they return `None` on an empty queue.
#[derive(Debug)]
pub struct RingQueue<T> {
    slots: Vec<Option<T>>,
    head: usize,
    len: usize,
}

impl<T> RingQueue<T> {
    /// Create a queue with room for `capacity` elements before the first growth.
    ///
    /// A zero capacity is bumped to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            head: 0,
            len: 0,
        }
    }

    /// Current capacity of the backing array.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append an element at the tail, doubling the capacity if needed.
    pub fn push(&mut self, value: T) {
        if self.len == self.capacity() {
            self.grow();
        }
        let tail = (self.head + self.len) % self.capacity();
        self.slots[tail] = Some(value);
        self.len += 1;
    }

    /// Remove and return the element at the head.
    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let value = self.slots[self.head].take();
        self.head = (self.head + 1) % self.capacity();
        self.len -= 1;
        value
    }

    /// Borrow the element at the head without removing it.
    pub fn peek(&self) -> Option<&T> {
        if self.len == 0 {
            return None;
        }
        self.slots[self.head].as_ref()
    }

    /// Iterate from head to tail.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        (0..self.len).filter_map(move |i| self.slots[(self.head + i) % self.capacity()].as_ref())
    }

    fn grow(&mut self) {
        let old_capacity = self.capacity();
        self.slots.resize_with(old_capacity * 2, || None);

        // Elements that wrapped past the old end move to the new upper half,
        // directly after the run that starts at `head`.
        let wrapped = (self.head + self.len).saturating_sub(old_capacity);
        for i in 0..wrapped {
            self.slots[old_capacity + i] = self.slots[i].take();
        }
    }
}

impl<T> Default for RingQueue<T> {
    fn default() -> Self {
        Self::with_capacity(8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut queue = RingQueue::with_capacity(4);
        for i in 0..3 {
            queue.push(i);
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.peek(), Some(&0));
        assert_eq!(queue.pop(), Some(0));
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_zero_capacity_is_usable() {
        let mut queue = RingQueue::with_capacity(0);
        assert_eq!(queue.capacity(), 1);
        queue.push("a");
        queue.push("b");
        assert_eq!(queue.capacity(), 2);
        assert_eq!(queue.pop(), Some("a"));
        assert_eq!(queue.pop(), Some("b"));
    }

    #[test]
    fn test_growth_preserves_order_across_wrap() {
        let mut queue = RingQueue::with_capacity(4);
        for i in 0..4 {
            queue.push(i);
        }
        // Move head to the middle so the logical window wraps.
        assert_eq!(queue.pop(), Some(0));
        assert_eq!(queue.pop(), Some(1));
        queue.push(4);
        queue.push(5);
        assert_eq!(queue.capacity(), 4);

        // Full and wrapped: this push doubles the capacity.
        queue.push(6);
        assert_eq!(queue.capacity(), 8);

        let drained: Vec<_> = std::iter::from_fn(|| queue.pop()).collect();
        assert_eq!(drained, vec![2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_iter_follows_head() {
        let mut queue = RingQueue::with_capacity(2);
        queue.push(1);
        queue.push(2);
        queue.pop();
        queue.push(3);
        queue.push(4);
        assert_eq!(queue.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
    }

    #[test]
    fn test_many_pushes_and_pops() {
        let mut queue = RingQueue::with_capacity(3);
        let mut expected = std::collections::VecDeque::new();
        for round in 0..50 {
            for i in 0..(round % 5 + 1) {
                queue.push(round * 10 + i);
                expected.push_back(round * 10 + i);
            }
            for _ in 0..(round % 3) {
                assert_eq!(queue.pop(), expected.pop_front());
            }
        }
        assert_eq!(queue.len(), expected.len());
        assert!(queue.iter().eq(expected.iter()));
    }
}
