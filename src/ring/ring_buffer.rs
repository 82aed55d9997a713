use std::error::Error;
use std::fmt;

/// Fixed-width sample carried by the acquisition pipeline.
pub type Sample = u16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingBufferError {
    /// The batch does not fit into the free slots. Nothing was written.
    BufferFull { requested: usize, free: usize },
    /// No sample is available. Nothing was read.
    BufferEmpty,
}

impl fmt::Display for RingBufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RingBufferError::BufferFull { requested, free } => write!(
                f,
                "Ring buffer full: {} samples requested, {} slots free",
                requested, free
            ),
            RingBufferError::BufferEmpty => write!(f, "Ring buffer empty"),
        }
    }
}
impl Error for RingBufferError {}

/// Coarse fill level of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occupancy {
    Empty,
    Partial,
    Full,
}

/// Fixed-capacity FIFO over a flat, preallocated storage array.
///
/// `head` is the next slot to write, `tail` the next slot to read and `count`
/// the number of unread samples. When the buffer is full `head == tail`, so
/// `count` is what tells full and empty apart.
///
/// This type does no locking; share it between threads through
/// [`SharedRingBuffer`](crate::ring::shared_ring_buffer::SharedRingBuffer).
#[derive(Debug, Clone)]
pub struct RingBuffer<T = Sample> {
    buffer: Vec<T>,
    capacity: usize,
    head: usize,
    tail: usize,
    count: usize,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Ring buffer capacity must be non-zero");
        // Pre-allocate the storage once; it is never resized.
        RingBuffer {
            buffer: vec![T::default(); capacity],
            capacity,
            head: 0,
            tail: 0,
            count: 0,
        }
    }
}

impl<T: Copy> RingBuffer<T> {
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn free_slots(&self) -> usize {
        self.capacity - self.count
    }

    /// Returns the number of samples currently stored in the buffer.
    #[inline]
    pub fn occupied_count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.count == self.capacity
    }

    pub fn occupancy(&self) -> Occupancy {
        if self.is_empty() {
            Occupancy::Empty
        } else if self.is_full() {
            Occupancy::Full
        } else {
            Occupancy::Partial
        }
    }

    #[inline]
    pub fn head(&self) -> usize {
        self.head
    }

    #[inline]
    pub fn tail(&self) -> usize {
        self.tail
    }

    /// Raw storage access, including stale slots outside the occupied region.
    pub fn slot(&self, index: usize) -> Option<T> {
        self.buffer.get(index).copied()
    }

    #[inline]
    fn distance_to_wrap(&self, pos: usize) -> usize {
        self.capacity - pos
    }

    /// Appends the whole batch or nothing.
    ///
    /// A batch that runs past the end of the storage is split in two: the
    /// first `capacity - head` samples fill the tail end of the array and the
    /// remainder, starting at that same offset in `batch`, lands at index 0.
    pub fn push(&mut self, batch: &[T]) -> Result<(), RingBufferError> {
        op_span!("ring_buffer.push");

        let size = batch.len();
        if size > self.free_slots() {
            return Err(RingBufferError::BufferFull {
                requested: size,
                free: self.free_slots(),
            });
        }
        if size == 0 {
            return Ok(());
        }

        let head = self.head;
        let w1 = self.distance_to_wrap(head);
        if size <= w1 {
            self.buffer[head..head + size].copy_from_slice(batch);
        } else {
            let w2 = size - w1;
            self.buffer[head..].copy_from_slice(&batch[..w1]);
            self.buffer[..w2].copy_from_slice(&batch[w1..]);
        }

        self.head = (head + size) % self.capacity;
        self.count += size;
        Ok(())
    }

    pub fn pop(&mut self) -> Result<T, RingBufferError> {
        op_span!("ring_buffer.pop");

        if self.count == 0 {
            return Err(RingBufferError::BufferEmpty);
        }
        let value = self.buffer[self.tail];
        self.tail = (self.tail + 1) % self.capacity;
        self.count -= 1;
        Ok(value)
    }

    /// Moves up to `out.len()` samples into `out` and returns how many were
    /// copied. Returns 0 on an empty buffer.
    pub fn pop_into(&mut self, out: &mut [T]) -> usize {
        op_span!("ring_buffer.pop_into");

        let n = out.len().min(self.count);
        if n == 0 {
            return 0;
        }

        let tail = self.tail;
        let first = n.min(self.distance_to_wrap(tail));
        out[..first].copy_from_slice(&self.buffer[tail..tail + first]);
        out[first..n].copy_from_slice(&self.buffer[..n - first]);

        self.tail = (tail + n) % self.capacity;
        self.count -= n;
        n
    }

    /// Forgets every stored sample. Storage is left as is; stale values are
    /// never read back because they sit outside the occupied region.
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.count = 0;
    }
}

// Layout dump: slot values, then the head row, then the tail row.
impl<T: Copy + fmt::Display> fmt::Display for RingBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for value in &self.buffer {
            write!(f, "[{}]", value)?;
        }
        writeln!(f)?;
        for i in 0..self.capacity {
            write!(f, "[{}]", if i == self.head { "H" } else { "0" })?;
        }
        writeln!(f)?;
        for i in 0..self.capacity {
            write!(f, "[{}]", if i == self.tail { "T" } else { "0" })?;
        }
        writeln!(f)?;
        write!(f, "item count: {}", self.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_conserved(rb: &RingBuffer<u16>) {
        assert_eq!(rb.occupied_count() + rb.free_slots(), rb.capacity());
        assert!(rb.head() < rb.capacity());
        assert!(rb.tail() < rb.capacity());
        if rb.is_full() {
            assert_eq!(rb.head(), rb.tail());
        } else {
            assert_eq!(
                rb.occupied_count(),
                (rb.head() + rb.capacity() - rb.tail()) % rb.capacity()
            );
        }
    }

    #[test]
    fn test_new_ring_buffer_is_empty() {
        let rb: RingBuffer = RingBuffer::new(10);
        assert_eq!(rb.capacity(), 10);
        assert_eq!(rb.free_slots(), 10);
        assert_eq!(rb.occupied_count(), 0);
        assert_eq!(rb.occupancy(), Occupancy::Empty);
        assert_conserved(&rb);
    }

    #[test]
    #[should_panic(expected = "capacity must be non-zero")]
    fn test_zero_capacity_panics() {
        let _rb: RingBuffer = RingBuffer::new(0);
    }

    #[test]
    fn test_round_trip_scenario() {
        let mut rb: RingBuffer = RingBuffer::new(5);

        assert_eq!(rb.push(&[1, 2, 3]), Ok(()));
        assert_eq!(
            rb.push(&[4, 5, 6]),
            Err(RingBufferError::BufferFull { requested: 3, free: 2 })
        );
        assert_eq!(rb.occupied_count(), 3);
        assert_eq!(rb.head(), 3);

        assert_eq!(rb.push(&[4, 5]), Ok(()));
        assert_eq!(rb.occupancy(), Occupancy::Full);
        assert_conserved(&rb);

        for expected in 1..=4 {
            assert_eq!(rb.pop(), Ok(expected));
        }
        assert_eq!(rb.occupied_count(), 1);
        assert_eq!(rb.pop(), Ok(5));
        assert_eq!(rb.pop(), Err(RingBufferError::BufferEmpty));
        assert_conserved(&rb);
    }

    #[test]
    fn test_wraparound_copies_second_segment_from_split_offset() {
        let mut rb: RingBuffer = RingBuffer::new(10);

        // Walk the cursors to index 8.
        rb.push(&[0; 8]).unwrap();
        for _ in 0..8 {
            rb.pop().unwrap();
        }
        assert_eq!(rb.head(), 8);
        assert_eq!(rb.tail(), 8);

        rb.push(&[0xa, 0xb, 0xc, 0xd]).unwrap();
        assert_eq!(rb.slot(8), Some(0xa));
        assert_eq!(rb.slot(9), Some(0xb));
        assert_eq!(rb.slot(0), Some(0xc));
        assert_eq!(rb.slot(1), Some(0xd));
        assert_eq!(rb.head(), 2);
        assert_conserved(&rb);

        let popped: Vec<u16> = (0..4).map(|_| rb.pop().unwrap()).collect();
        assert_eq!(popped, vec![0xa, 0xb, 0xc, 0xd]);
    }

    #[test]
    fn test_push_that_does_not_fit_leaves_buffer_untouched() {
        let mut rb: RingBuffer = RingBuffer::new(4);
        rb.push(&[7, 8, 9]).unwrap();
        let before = rb.clone();

        let result = rb.push(&[1, 2]);
        assert_eq!(result, Err(RingBufferError::BufferFull { requested: 2, free: 1 }));
        assert_eq!(rb.occupied_count(), before.occupied_count());
        assert_eq!(rb.head(), before.head());
        assert_eq!(rb.tail(), before.tail());
        assert_eq!(rb.slot(3), before.slot(3));
    }

    #[test]
    fn test_batch_larger_than_capacity_is_rejected() {
        let mut rb: RingBuffer = RingBuffer::new(3);
        assert_eq!(
            rb.push(&[1, 2, 3, 4]),
            Err(RingBufferError::BufferFull { requested: 4, free: 3 })
        );
        assert!(rb.is_empty());
    }

    #[test]
    fn test_empty_batch_is_a_no_op() {
        let mut rb: RingBuffer = RingBuffer::new(3);
        rb.push(&[1, 2, 3]).unwrap();
        assert_eq!(rb.push(&[]), Ok(()));
        assert_eq!(rb.head(), 0);
        assert_eq!(rb.occupied_count(), 3);
    }

    #[test]
    fn test_pop_on_empty_keeps_state() {
        let mut rb: RingBuffer = RingBuffer::new(6);
        rb.push(&[1, 2]).unwrap();
        rb.pop().unwrap();
        rb.pop().unwrap();

        assert_eq!(rb.pop(), Err(RingBufferError::BufferEmpty));
        assert_eq!(rb.head(), 2);
        assert_eq!(rb.tail(), 2);
        assert_eq!(rb.occupied_count(), 0);
    }

    #[test]
    fn test_clear_resets_cursors() {
        let mut rb: RingBuffer = RingBuffer::new(5);
        rb.push(&[1, 2, 3, 4]).unwrap();
        rb.pop().unwrap();
        rb.clear();

        assert_eq!(rb.occupied_count(), 0);
        assert_eq!(rb.free_slots(), 5);
        assert_eq!(rb.pop(), Err(RingBufferError::BufferEmpty));

        rb.push(&[42]).unwrap();
        assert_eq!(rb.slot(0), Some(42));
        assert_eq!(rb.pop(), Ok(42));
    }

    #[test]
    fn test_pop_into_wraps_and_keeps_order() {
        let mut rb: RingBuffer = RingBuffer::new(5);
        rb.push(&[1, 2, 3, 4]).unwrap();
        rb.pop().unwrap();
        rb.pop().unwrap();
        rb.push(&[5, 6, 7]).unwrap();
        assert_eq!(rb.tail(), 2);

        let mut out = [0u16; 4];
        assert_eq!(rb.pop_into(&mut out), 4);
        assert_eq!(out, [3, 4, 5, 6]);

        let mut rest = [0u16; 8];
        assert_eq!(rb.pop_into(&mut rest), 1);
        assert_eq!(rest[0], 7);
        assert_eq!(rb.pop_into(&mut rest), 0);
        assert_conserved(&rb);
    }

    #[test]
    fn test_layout_dump_marks_cursors() {
        let mut rb: RingBuffer = RingBuffer::new(4);
        rb.push(&[1, 2, 3]).unwrap();
        rb.pop().unwrap();

        let dump = rb.to_string();
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines[0], "[1][2][3][0]");
        assert_eq!(lines[1], "[0][0][0][H]");
        assert_eq!(lines[2], "[0][T][0][0]");
        assert_eq!(lines[3], "item count: 2");
    }

    #[test]
    fn test_generic_over_element_type() {
        let mut rb: RingBuffer<i32> = RingBuffer::new(3);
        rb.push(&[-1, -2]).unwrap();
        rb.push(&[-3]).unwrap();
        assert_eq!(rb.pop(), Ok(-1));
        rb.push(&[-4]).unwrap();
        assert_eq!(rb.slot(0), Some(-4));
    }
}
