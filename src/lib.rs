//! Fixed-capacity sample ring buffer shared between one producer thread and
//! one consumer thread, plus the drivers that exercise it.

pub mod config;
pub mod driver;
pub mod ring;

pub use config::{SessionConfig, WaitMode, Workload};
pub use driver::session::{run_session, run_session_on, SessionError, SessionReport};
pub use ring::ring_buffer::{Occupancy, RingBuffer, RingBufferError, Sample};
pub use ring::shared_ring_buffer::{OccupancySnapshot, SharedRingBuffer};
