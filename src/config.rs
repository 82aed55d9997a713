use crate::driver::session::SessionError;
use clap::ValueEnum;
use std::fmt;
use std::time::{Duration, Instant};

/// How producer and consumer back off when the buffer is full or empty.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    /// Sleep for the backoff interval, then retry.
    Poll,
    /// Wait on the buffer's condition variable, using the backoff interval as
    /// the timeout.
    Block,
}

impl fmt::Display for WaitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WaitMode::Poll => "poll",
            WaitMode::Block => "block",
        };
        write!(f, "{}", s)
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workload {
    /// Wrapping counter; the consumer checks every sample arrives in order.
    Sequential,
    Random,
}

impl fmt::Display for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Workload::Sequential => "sequential",
            Workload::Random => "random",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Number of sample slots in the ring buffer.
    pub capacity: usize,
    /// Samples per producer push.
    pub batch_size: usize,
    /// Stop producing after this many samples. `None` runs until `duration`.
    pub total_samples: Option<u64>,
    pub duration: Duration,
    pub producer_backoff: Duration,
    pub consumer_backoff: Duration,
    pub report_interval: Duration,
    pub wait_mode: WaitMode,
    pub workload: Workload,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            capacity: 10,
            batch_size: 4,
            total_samples: None,
            duration: Duration::from_secs(10),
            producer_backoff: Duration::from_millis(10),
            consumer_backoff: Duration::from_millis(1),
            report_interval: Duration::from_millis(1000),
            wait_mode: WaitMode::Poll,
            workload: Workload::Sequential,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.capacity == 0 {
            return Err(SessionError::InvalidConfig(
                "capacity must be non-zero".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(SessionError::InvalidConfig(
                "batch_size must be non-zero".into(),
            ));
        }
        // A batch that can never fit would make the producer retry forever.
        if self.batch_size > self.capacity {
            return Err(SessionError::InvalidConfig(format!(
                "batch_size {} exceeds capacity {}",
                self.batch_size, self.capacity
            )));
        }
        if Instant::now().checked_add(self.duration).is_none() {
            return Err(SessionError::InvalidConfig(format!(
                "duration {:?} is too large",
                self.duration
            )));
        }
        if self.report_interval.is_zero() {
            return Err(SessionError::InvalidConfig(
                "report_interval must be non-zero".into(),
            ));
        }
        Ok(())
    }
}
