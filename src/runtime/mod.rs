//! Core asynchronous primitives: readiness signals, pipes, task tracking.

pub(crate) mod pipe;
pub(crate) mod signal;
pub(crate) mod waitgroup;

pub(crate) use pipe::Pipe;
pub(crate) use signal::{Signal, SignalWaiter};
pub(crate) use waitgroup::WaitGroup;
