use crate::config::{WaitMode, Workload};
use crate::ring::ring_buffer::Sample;
use crate::ring::shared_ring_buffer::SharedRingBuffer;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Generates the sample batches a producer pushes.
pub enum SampleSource {
    Sequential { next: Sample },
    Random(StdRng),
}

impl SampleSource {
    pub fn new(workload: Workload) -> Self {
        match workload {
            Workload::Sequential => SampleSource::Sequential { next: 0 },
            Workload::Random => SampleSource::Random(StdRng::from_entropy()),
        }
    }

    pub fn fill(&mut self, batch: &mut [Sample]) {
        match self {
            SampleSource::Sequential { next } => {
                for sample in batch.iter_mut() {
                    *sample = *next;
                    *next = next.wrapping_add(1);
                }
            }
            SampleSource::Random(rng) => {
                for sample in batch.iter_mut() {
                    *sample = rng.gen();
                }
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProducerStats {
    pub batches: u64,
    pub samples: u64,
    /// Push attempts rejected with `BufferFull`.
    pub full_retries: u64,
    /// Wrapping sum of every sample pushed.
    pub checksum: u64,
}

pub struct Producer<'a> {
    ring: &'a SharedRingBuffer<Sample>,
    source: SampleSource,
    batch: Vec<Sample>,
    wait_mode: WaitMode,
    backoff: Duration,
}

impl<'a> Producer<'a> {
    pub fn new(
        ring: &'a SharedRingBuffer<Sample>,
        source: SampleSource,
        batch_size: usize,
        wait_mode: WaitMode,
        backoff: Duration,
    ) -> Self {
        Self {
            ring,
            source,
            batch: vec![0; batch_size],
            wait_mode,
            backoff,
        }
    }

    /// Pushes batches until `limit` samples went in or `deadline` passes.
    ///
    /// A rejected batch is retried as is after the backoff. The last batch is
    /// shortened so exactly `limit` samples are produced.
    pub fn run(mut self, limit: Option<u64>, deadline: Instant) -> ProducerStats {
        let mut stats = ProducerStats::default();

        while Instant::now() < deadline {
            let remaining = limit.map_or(u64::MAX, |l| l - stats.samples);
            if remaining == 0 {
                break;
            }
            let len = (self.batch.len() as u64).min(remaining) as usize;
            let batch = &mut self.batch[..len];
            self.source.fill(batch);

            loop {
                let result = match self.wait_mode {
                    WaitMode::Poll => self.ring.try_push(batch),
                    WaitMode::Block => self.ring.push_timeout(batch, self.backoff),
                };
                match result {
                    Ok(()) => {
                        stats.batches += 1;
                        stats.samples += len as u64;
                        stats.checksum = batch
                            .iter()
                            .fold(stats.checksum, |acc, s| acc.wrapping_add(*s as u64));
                        break;
                    }
                    Err(err) => {
                        stats.full_retries += 1;
                        trace!("[producer] {}, retrying", err);
                        if self.wait_mode == WaitMode::Poll {
                            thread::sleep(self.backoff);
                        }
                        if Instant::now() >= deadline {
                            debug!("[producer] deadline reached, dropping pending batch of {}", len);
                            return stats;
                        }
                    }
                }
            }
        }

        debug!(
            "[producer] done: {} batches, {} samples, {} retries",
            stats.batches, stats.samples, stats.full_retries
        );
        stats
    }
}
