use crate::config::{SessionConfig, Workload};
use crate::driver::consumer::{Consumer, ConsumerStats};
use crate::driver::producer::{Producer, ProducerStats, SampleSource};
use crate::driver::reporter::Reporter;
use crate::ring::ring_buffer::Sample;
use crate::ring::shared_ring_buffer::{OccupancySnapshot, SharedRingBuffer};
use crossbeam::channel::bounded;
use hdrhistogram::Histogram;
use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use std::{fmt, io};
use tracing::{info, warn};

#[derive(Debug)]
pub enum SessionError {
    InvalidConfig(String),
    FailedThreadSpawn(&'static str, io::Error),
    WorkerPanicked(&'static str),
    Histogram(String),
}
impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::InvalidConfig(msg) => write!(f, "Invalid session config: {}", msg),
            SessionError::FailedThreadSpawn(role, e) => {
                write!(f, "Failed to spawn {} thread: {}", role, e)
            }
            SessionError::WorkerPanicked(role) => write!(f, "{} thread panicked", role),
            SessionError::Histogram(msg) => write!(f, "Failed to create histogram: {}", msg),
        }
    }
}
impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SessionError::FailedThreadSpawn(_, e) => Some(e),
            _ => None,
        }
    }
}

/// Distribution of the occupancy values seen by the reporter.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct OccupancyStats {
    pub observations: u64,
    pub mean: f64,
    pub p50: u64,
    pub p90: u64,
    pub p99: u64,
    pub max: u64,
}

impl From<&Histogram<u64>> for OccupancyStats {
    fn from(hist: &Histogram<u64>) -> Self {
        if hist.len() == 0 {
            return OccupancyStats::default();
        }
        OccupancyStats {
            observations: hist.len(),
            mean: hist.mean(),
            p50: hist.value_at_quantile(0.50),
            p90: hist.value_at_quantile(0.90),
            p99: hist.value_at_quantile(0.99),
            max: hist.max(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionReport {
    pub producer: ProducerStats,
    pub consumer: ConsumerStats,
    pub occupancy: OccupancyStats,
    pub final_snapshot: OccupancySnapshot,
    pub elapsed: Duration,
}

impl SessionReport {
    /// Every produced sample reached the consumer, unchanged and in order.
    pub fn is_lossless(&self) -> bool {
        self.producer.samples == self.consumer.samples
            && self.producer.checksum == self.consumer.checksum
            && self.consumer.order_violations == 0
    }

    pub fn samples_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0f64 {
            0f64
        } else {
            self.consumer.samples as f64 / secs
        }
    }
}

// Marks the producer finished even if it unwinds, so the consumer never
// waits on a producer that is gone.
struct DoneOnDrop<'a>(&'a AtomicBool);

impl Drop for DoneOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Creates a buffer for `config` and runs a session on it.
pub fn run_session(config: &SessionConfig) -> Result<SessionReport, SessionError> {
    config.validate()?;
    let ring = SharedRingBuffer::new(config.capacity);
    run_session_on(&ring, config)
}

/// Runs one producer, one consumer and the reporter against `ring`, which
/// stays owned by the caller.
///
/// The producer stops after `total_samples` or at the end of `duration`; the
/// consumer then drains what is left, so the buffer is empty on return unless
/// a worker failed.
pub fn run_session_on(
    ring: &SharedRingBuffer<Sample>,
    config: &SessionConfig,
) -> Result<SessionReport, SessionError> {
    config.validate()?;
    if ring.capacity() < config.batch_size {
        return Err(SessionError::InvalidConfig(format!(
            "batch_size {} exceeds buffer capacity {}",
            config.batch_size,
            ring.capacity()
        )));
    }

    info!(
        "session starting: capacity={} batch_size={} wait_mode={} workload={}",
        ring.capacity(),
        config.batch_size,
        config.wait_mode,
        config.workload
    );

    let producer_done = AtomicBool::new(false);
    let (stop_tx, stop_rx) = bounded::<()>(1);
    let start = Instant::now();
    let deadline = start.checked_add(config.duration).ok_or_else(|| {
        SessionError::InvalidConfig(format!("duration {:?} is too large", config.duration))
    })?;

    let outcome = crossbeam::thread::scope(|s| {
        let producer_handle = s
            .builder()
            .name("producer".to_string())
            .spawn(|_| {
                let _done = DoneOnDrop(&producer_done);
                Producer::new(
                    ring,
                    SampleSource::new(config.workload),
                    config.batch_size,
                    config.wait_mode,
                    config.producer_backoff,
                )
                .run(config.total_samples, deadline)
            })
            .map_err(|e| SessionError::FailedThreadSpawn("producer", e))?;

        let consumer_handle = s
            .builder()
            .name("consumer".to_string())
            .spawn(|_| {
                let consumer = Consumer::new(ring, config.wait_mode, config.consumer_backoff);
                match config.workload {
                    Workload::Sequential => consumer.expect_sequence(0).run(&producer_done),
                    Workload::Random => consumer.run(&producer_done),
                }
            })
            .map_err(|e| SessionError::FailedThreadSpawn("consumer", e))?;

        // Spawned last: it only stops on `stop_tx`, which an early return
        // above would never send.
        let reporter_handle = s
            .builder()
            .name("reporter".to_string())
            .spawn(|_| Reporter::new(ring, config.report_interval).run(stop_rx))
            .map_err(|e| SessionError::FailedThreadSpawn("reporter", e))?;

        let producer = producer_handle.join();
        let consumer = consumer_handle.join();
        let _ = stop_tx.send(());
        let histogram = reporter_handle.join();

        let producer = producer.map_err(|_| SessionError::WorkerPanicked("producer"))?;
        let consumer = consumer.map_err(|_| SessionError::WorkerPanicked("consumer"))?;
        let histogram = histogram.map_err(|_| SessionError::WorkerPanicked("reporter"))??;
        Ok::<_, SessionError>((producer, consumer, histogram))
    })
    .map_err(|_| SessionError::WorkerPanicked("session"))?;

    let (producer, consumer, histogram) = outcome?;
    let report = SessionReport {
        producer,
        consumer,
        occupancy: OccupancyStats::from(&histogram),
        final_snapshot: ring.snapshot(),
        elapsed: start.elapsed(),
    };

    if report.is_lossless() {
        info!(
            "session finished: {} samples in {:.3}s",
            report.consumer.samples,
            report.elapsed.as_secs_f64()
        );
    } else {
        warn!(
            "session finished with mismatch: produced {} consumed {} order violations {}",
            report.producer.samples, report.consumer.samples, report.consumer.order_violations
        );
    }
    Ok(report)
}
