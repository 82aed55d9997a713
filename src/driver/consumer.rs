use crate::config::WaitMode;
use crate::ring::ring_buffer::Sample;
use crate::ring::shared_ring_buffer::SharedRingBuffer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerStats {
    pub samples: u64,
    /// Pop attempts that found the buffer empty.
    pub empty_polls: u64,
    /// Wrapping sum of every sample popped.
    pub checksum: u64,
    /// Samples that did not follow their predecessor. Only counted when the
    /// producer emits a sequential counter.
    pub order_violations: u64,
}

pub struct Consumer<'a> {
    ring: &'a SharedRingBuffer<Sample>,
    wait_mode: WaitMode,
    backoff: Duration,
    expected: Option<Sample>,
}

impl<'a> Consumer<'a> {
    pub fn new(ring: &'a SharedRingBuffer<Sample>, wait_mode: WaitMode, backoff: Duration) -> Self {
        Self {
            ring,
            wait_mode,
            backoff,
            expected: None,
        }
    }

    /// Checks that samples arrive as a counter starting at `first`.
    pub fn expect_sequence(mut self, first: Sample) -> Self {
        self.expected = Some(first);
        self
    }

    /// Pops single samples until `producer_done` is set and the buffer has
    /// been drained.
    ///
    /// In poll mode every attempt, successful or not, is followed by the
    /// backoff sleep. In block mode the backoff is the wait timeout instead.
    pub fn run(mut self, producer_done: &AtomicBool) -> ConsumerStats {
        let mut stats = ConsumerStats::default();

        loop {
            // Read the flag before popping: if it was already set, an empty
            // pop means nothing is left to come.
            let done = producer_done.load(Ordering::Acquire);
            let result = match self.wait_mode {
                WaitMode::Poll => self.ring.try_pop(),
                WaitMode::Block => self.ring.pop_timeout(self.backoff),
            };

            match result {
                Ok(sample) => {
                    stats.samples += 1;
                    stats.checksum = stats.checksum.wrapping_add(sample as u64);
                    if let Some(expected) = self.expected {
                        if sample != expected {
                            stats.order_violations += 1;
                            warn!("[consumer] expected sample {} but got {}", expected, sample);
                        }
                        self.expected = Some(sample.wrapping_add(1));
                    }
                }
                Err(_) if done => break,
                Err(_) => stats.empty_polls += 1,
            }

            if self.wait_mode == WaitMode::Poll {
                thread::sleep(self.backoff);
            }
        }

        debug!(
            "[consumer] done: {} samples, {} empty polls",
            stats.samples, stats.empty_polls
        );
        stats
    }
}
