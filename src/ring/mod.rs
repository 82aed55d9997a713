#[macro_use]
mod macros;
pub mod ring_buffer;
pub mod shared_ring_buffer;
