use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Bounded FIFO shared by every worker.
///
/// A power-of-two ring indexed by monotonic head and tail counters, guarded
/// by one mutex with a condition variable for each direction.
#[derive(Debug)]
pub struct RingQueue<T> {
    ring: Mutex<Ring<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

#[derive(Debug)]
struct Ring<T> {
    buf: Box<[Option<T>]>,
    head: usize,
    tail: usize,
    closed: bool,
}

impl<T> Ring<T> {
    fn mask(&self) -> usize {
        self.buf.len() - 1
    }

    fn len(&self) -> usize {
        self.tail.wrapping_sub(self.head)
    }

    fn is_full(&self) -> bool {
        self.len() == self.buf.len()
    }
}

impl<T> RingQueue<T> {
    /// Creates a queue holding at least `capacity` items.
    pub fn new(capacity: usize) -> Self {
        let size = capacity.max(1).next_power_of_two();

        Self {
            ring: Mutex::new(Ring {
                buf: (0..size).map(|_| None).collect(),
                head: 0,
                tail: 0,
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Ring<T>> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.lock().buf.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends `item`, waiting for room while the ring is full.
    pub fn push(&self, item: T) {
        let mut ring = self.lock();

        while ring.is_full() && !ring.closed {
            ring = self.not_full.wait(ring).unwrap_or_else(PoisonError::into_inner);
        }

        if ring.closed {
            return;
        }

        let index = ring.tail & ring.mask();
        ring.buf[index] = Some(item);
        ring.tail = ring.tail.wrapping_add(1);
        drop(ring);

        self.not_empty.notify_one();
    }

    /// Removes the oldest item, waiting while the ring is empty.
    /// Returns `None` once the queue is closed.
    pub fn pop(&self) -> Option<T> {
        let mut ring = self.lock();

        loop {
            if ring.closed {
                return None;
            }

            if ring.len() > 0 {
                break;
            }

            ring = self.not_empty.wait(ring).unwrap_or_else(PoisonError::into_inner);
        }

        let index = ring.head & ring.mask();
        let item = ring.buf[index].take();
        ring.head = ring.head.wrapping_add(1);
        drop(ring);

        self.not_full.notify_one();
        item
    }

    /// Wakes every waiter; later pushes are dropped and pops return `None`.
    pub fn close(&self) {
        self.lock().closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }
}

/// Wake-up signal for idle workers of the work-stealing scheduler.
///
/// Workers read the epoch before searching for work and sleep only while it
/// has not moved, so a push between the search and the wait is never lost.
#[derive(Debug, Default)]
pub struct Signal {
    epoch: Mutex<u64>,
    cond: Condvar,
}

impl Signal {
    pub fn epoch(&self) -> u64 {
        *self.epoch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn notify(&self) {
        let mut epoch = self.epoch.lock().unwrap_or_else(PoisonError::into_inner);
        *epoch = epoch.wrapping_add(1);
        drop(epoch);
        self.cond.notify_one();
    }

    pub fn notify_all(&self) {
        let mut epoch = self.epoch.lock().unwrap_or_else(PoisonError::into_inner);
        *epoch = epoch.wrapping_add(1);
        drop(epoch);
        self.cond.notify_all();
    }

    /// Blocks until the epoch differs from `seen` or `stop` returns true.
    pub fn wait(&self, seen: u64, stop: impl Fn() -> bool) {
        let mut epoch = self.epoch.lock().unwrap_or_else(PoisonError::into_inner);

        while *epoch == seen && !stop() {
            epoch = self.cond.wait(epoch).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::zero(0, 1)]
    #[case::exact(4, 4)]
    #[case::rounded(5, 8)]
    fn test_capacity_is_power_of_two(#[case] requested: usize, #[case] expected: usize) {
        assert_eq!(RingQueue::<u32>::new(requested).capacity(), expected);
    }

    #[test]
    fn test_fifo_order_across_wraparound() {
        let queue = RingQueue::new(2);

        for round in 0..5 {
            queue.push(round * 2);
            queue.push(round * 2 + 1);
            assert_eq!(queue.pop(), Some(round * 2));
            assert_eq!(queue.pop(), Some(round * 2 + 1));
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_push_blocks_until_pop() {
        let queue = Arc::new(RingQueue::new(1));
        queue.push(1);

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(2))
        };

        assert_eq!(queue.pop(), Some(1));
        producer.join().unwrap();
        assert_eq!(queue.pop(), Some(2));
    }

    #[test]
    fn test_close_wakes_consumers() {
        let queue = Arc::new(RingQueue::<u32>::new(1));

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop())
        };

        queue.close();
        assert_eq!(consumer.join().unwrap(), None);
    }

    #[test]
    fn test_signal_wait_returns_after_notify() {
        let signal = Arc::new(Signal::default());
        let seen = signal.epoch();

        let waiter = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || signal.wait(seen, || false))
        };

        signal.notify_all();
        waiter.join().unwrap();
        assert_ne!(signal.epoch(), seen);
    }
}
