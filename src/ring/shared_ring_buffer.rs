use crate::ring::ring_buffer::{Occupancy, RingBuffer, RingBufferError, Sample};
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Consistent `(head, tail, count)` triple read under the lock. Stale as soon
/// as it is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OccupancySnapshot {
    pub capacity: usize,
    pub head: usize,
    pub tail: usize,
    pub count: usize,
}

impl OccupancySnapshot {
    pub fn free_slots(&self) -> usize {
        self.capacity - self.count
    }

    pub fn occupancy(&self) -> Occupancy {
        match self.count {
            0 => Occupancy::Empty,
            c if c == self.capacity => Occupancy::Full,
            _ => Occupancy::Partial,
        }
    }
}

impl fmt::Display for OccupancySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} occupied (head={}, tail={})",
            self.count, self.capacity, self.head, self.tail
        )
    }
}

/// Thread-safe ring buffer for one producer and one consumer.
///
/// Every read and write of the cursors goes through a single mutex, so a push
/// or pop is observed either completely or not at all. The two condition
/// variables let callers wait for space or data instead of polling.
///
/// FIFO order is only guaranteed with exactly one producer and one consumer.
pub struct SharedRingBuffer<T = Sample> {
    state: Mutex<RingBuffer<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T: Copy + Default> SharedRingBuffer<T> {
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        SharedRingBuffer {
            state: Mutex::new(RingBuffer::new(capacity)),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }
}

impl<T: Copy> SharedRingBuffer<T> {
    // The guarded buffer never panics halfway through an update, so a
    // poisoned lock still holds consistent state.
    #[inline(always)]
    fn lock(&self) -> MutexGuard<'_, RingBuffer<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn occupied_count(&self) -> usize {
        self.lock().occupied_count()
    }

    pub fn free_slots(&self) -> usize {
        self.lock().free_slots()
    }

    pub fn snapshot(&self) -> OccupancySnapshot {
        let rb = self.lock();
        OccupancySnapshot {
            capacity: rb.capacity(),
            head: rb.head(),
            tail: rb.tail(),
            count: rb.occupied_count(),
        }
    }

    pub fn try_push(&self, batch: &[T]) -> Result<(), RingBufferError> {
        self.lock().push(batch)?;
        self.not_empty.notify_all();
        Ok(())
    }

    pub fn try_pop(&self) -> Result<T, RingBufferError> {
        let value = self.lock().pop()?;
        self.not_full.notify_all();
        Ok(value)
    }

    /// Batch pop; returns the number of samples moved into `out`.
    pub fn try_pop_into(&self, out: &mut [T]) -> usize {
        let n = self.lock().pop_into(out);
        if n > 0 {
            self.not_full.notify_all();
        }
        n
    }

    // Blocks on `cond` until notified or `deadline` passes. `None` as the
    // deadline waits without a bound. Returns `None` once the deadline is over.
    fn wait_until<'a>(
        &self,
        cond: &Condvar,
        rb: MutexGuard<'a, RingBuffer<T>>,
        deadline: Option<Instant>,
    ) -> Option<MutexGuard<'a, RingBuffer<T>>> {
        match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return None;
                }
                let (guard, _) = cond
                    .wait_timeout(rb, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner);
                Some(guard)
            }
            None => Some(cond.wait(rb).unwrap_or_else(PoisonError::into_inner)),
        }
    }

    /// Waits up to `timeout` for enough free slots, then pushes the whole
    /// batch. Returns `BufferFull` on timeout, or at once when the batch is
    /// larger than the capacity. A timeout too large to represent as an
    /// `Instant` (e.g. `Duration::MAX`) waits forever.
    pub fn push_timeout(&self, batch: &[T], timeout: Duration) -> Result<(), RingBufferError> {
        let deadline = Instant::now().checked_add(timeout);
        let mut rb = self.lock();
        loop {
            let err = match rb.push(batch) {
                Ok(()) => {
                    drop(rb);
                    self.not_empty.notify_all();
                    return Ok(());
                }
                Err(err) => err,
            };
            if batch.len() > self.capacity {
                return Err(err);
            }
            trace!("push of {} samples waiting for space", batch.len());
            rb = match self.wait_until(&self.not_full, rb, deadline) {
                Some(guard) => guard,
                None => return Err(err),
            };
        }
    }

    /// Waits up to `timeout` for a sample. Returns `BufferEmpty` on timeout.
    /// `Duration::MAX` waits forever.
    pub fn pop_timeout(&self, timeout: Duration) -> Result<T, RingBufferError> {
        let deadline = Instant::now().checked_add(timeout);
        let mut rb = self.lock();
        loop {
            let err = match rb.pop() {
                Ok(value) => {
                    drop(rb);
                    self.not_full.notify_all();
                    return Ok(value);
                }
                Err(err) => err,
            };
            trace!("pop waiting for data");
            rb = match self.wait_until(&self.not_empty, rb, deadline) {
                Some(guard) => guard,
                None => return Err(err),
            };
        }
    }

    pub fn clear(&self) {
        let dropped = {
            let mut rb = self.lock();
            let dropped = rb.occupied_count();
            rb.clear();
            dropped
        };
        debug!("ring buffer cleared, {} unread samples dropped", dropped);
        self.not_full.notify_all();
    }
}

impl<T: Copy + fmt::Display> SharedRingBuffer<T> {
    /// Layout dump of the guarded buffer, see the `Display` impl of
    /// [`RingBuffer`].
    pub fn dump(&self) -> String {
        self.lock().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_try_push_and_pop() {
        let rb: SharedRingBuffer = SharedRingBuffer::new(4);
        rb.try_push(&[1, 2, 3]).unwrap();
        assert_eq!(
            rb.try_push(&[4, 5]),
            Err(RingBufferError::BufferFull { requested: 2, free: 1 })
        );
        assert_eq!(rb.try_pop(), Ok(1));
        assert_eq!(rb.occupied_count(), 2);
        assert_eq!(rb.free_slots(), 2);
    }

    #[test]
    fn test_snapshot_is_consistent() {
        let rb: SharedRingBuffer = SharedRingBuffer::new(4);
        rb.try_push(&[1, 2, 3, 4]).unwrap();
        let snap = rb.snapshot();
        assert_eq!(snap.occupancy(), Occupancy::Full);
        assert_eq!(snap.head, snap.tail);
        assert_eq!(snap.free_slots(), 0);
        assert_eq!(snap.to_string(), "4/4 occupied (head=0, tail=0)");
    }

    #[test]
    fn test_pop_timeout_on_empty() {
        let rb: SharedRingBuffer = SharedRingBuffer::new(4);
        let before = Instant::now();
        assert_eq!(
            rb.pop_timeout(Duration::from_millis(20)),
            Err(RingBufferError::BufferEmpty)
        );
        assert!(before.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_push_timeout_rejects_oversize_batch_immediately() {
        let rb: SharedRingBuffer = SharedRingBuffer::new(2);
        let before = Instant::now();
        assert_eq!(
            rb.push_timeout(&[1, 2, 3], Duration::from_secs(5)),
            Err(RingBufferError::BufferFull { requested: 3, free: 2 })
        );
        assert!(before.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_blocked_push_wakes_on_pop() {
        let rb: SharedRingBuffer = SharedRingBuffer::new(3);
        rb.try_push(&[1, 2, 3]).unwrap();

        thread::scope(|s| {
            let producer = s.spawn(|| rb.push_timeout(&[4, 5], Duration::from_secs(5)));
            thread::sleep(Duration::from_millis(20));
            assert_eq!(rb.try_pop(), Ok(1));
            assert_eq!(rb.try_pop(), Ok(2));
            assert_eq!(producer.join().unwrap(), Ok(()));
        });

        let mut out = [0u16; 3];
        assert_eq!(rb.try_pop_into(&mut out), 3);
        assert_eq!(out, [3, 4, 5]);
    }

    #[test]
    fn test_blocked_pop_wakes_on_push() {
        let rb: SharedRingBuffer = SharedRingBuffer::new(3);
        thread::scope(|s| {
            let consumer = s.spawn(|| rb.pop_timeout(Duration::from_secs(5)));
            thread::sleep(Duration::from_millis(20));
            rb.try_push(&[9]).unwrap();
            assert_eq!(consumer.join().unwrap(), Ok(9));
        });
    }

    #[test]
    fn test_unbounded_timeout_completes_without_waiting() {
        let rb: SharedRingBuffer = SharedRingBuffer::new(3);
        assert_eq!(rb.push_timeout(&[1, 2], Duration::MAX), Ok(()));
        assert_eq!(rb.pop_timeout(Duration::MAX), Ok(1));
        assert_eq!(rb.occupied_count(), 1);
    }

    #[test]
    fn test_unbounded_pop_waits_for_push() {
        let rb: SharedRingBuffer = SharedRingBuffer::new(3);
        thread::scope(|s| {
            let consumer = s.spawn(|| rb.pop_timeout(Duration::MAX));
            thread::sleep(Duration::from_millis(20));
            rb.try_push(&[7]).unwrap();
            assert_eq!(consumer.join().unwrap(), Ok(7));
        });
    }

    #[test]
    fn test_unbounded_push_of_oversize_batch_fails_at_once() {
        let rb: SharedRingBuffer = SharedRingBuffer::new(2);
        assert_eq!(
            rb.push_timeout(&[1, 2, 3], Duration::MAX),
            Err(RingBufferError::BufferFull { requested: 3, free: 2 })
        );
    }

    #[test]
    fn test_poisoned_lock_is_recovered() {
        let rb: SharedRingBuffer = SharedRingBuffer::new(4);
        rb.try_push(&[1]).unwrap();

        let result = thread::scope(|s| {
            s.spawn(|| {
                let _guard = rb.lock();
                panic!("worker died holding the ring buffer lock");
            })
            .join()
        });
        assert!(result.is_err());
        assert!(rb.state.is_poisoned());

        assert_eq!(rb.try_push(&[2, 3]), Ok(()));
        assert_eq!(rb.try_pop(), Ok(1));
        assert_eq!(rb.try_pop(), Ok(2));
        assert_eq!(rb.snapshot().count, 1);
    }

    #[test]
    fn test_clear_and_dump() {
        let rb: SharedRingBuffer = SharedRingBuffer::new(3);
        rb.try_push(&[1, 2]).unwrap();
        rb.clear();
        assert_eq!(rb.occupied_count(), 0);
        assert!(rb.dump().ends_with("item count: 0"));
    }
}
