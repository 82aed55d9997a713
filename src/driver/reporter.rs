use crate::driver::session::SessionError;
use crate::ring::ring_buffer::Sample;
use crate::ring::shared_ring_buffer::SharedRingBuffer;
use crossbeam::channel::{tick, Receiver};
use crossbeam::select;
use hdrhistogram::Histogram;
use std::time::Duration;
use tracing::{debug, info};

/// Periodically samples the buffer occupancy, logs it and keeps its
/// distribution.
pub struct Reporter<'a> {
    ring: &'a SharedRingBuffer<Sample>,
    interval: Duration,
}

impl<'a> Reporter<'a> {
    pub fn new(ring: &'a SharedRingBuffer<Sample>, interval: Duration) -> Self {
        Self { ring, interval }
    }

    /// Runs until `stop` receives a message or its sender is dropped.
    pub fn run(self, stop: Receiver<()>) -> Result<Histogram<u64>, SessionError> {
        let high = (self.ring.capacity() as u64).max(2);
        let mut hist: Histogram<u64> = Histogram::new_with_bounds(1u64, high, 3)
            .map_err(|e| SessionError::Histogram(format!("{:?}", e)))?;
        let ticker = tick(self.interval);

        loop {
            select! {
                recv(ticker) -> _ => {
                    let snapshot = self.ring.snapshot();
                    hist.saturating_record(snapshot.count as u64);
                    info!("[reporter] {}", snapshot);
                    debug!("[reporter] layout:\n{}", self.ring.dump());
                }
                recv(stop) -> _ => break,
            }
        }

        Ok(hist)
    }
}
