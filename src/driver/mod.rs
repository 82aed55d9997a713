//! Scheduling around the ring buffer: one producer, one consumer and a
//! periodic reporter, wired together by [`session::run_session`].

pub mod consumer;
pub mod producer;
pub mod reporter;
pub mod session;
