use std::io;
use thiserror::Error;

/// Errors surfaced by sockets, contexts and messages.
///
/// `WouldBlock` and `Timeout` are control signals rather than failures: the
/// operation could not proceed now and the caller still decides what to do.
/// `TransientTransport` never leaves the crate; endpoints retry on it.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ZmqError {
  // --- I/O Errors ---
  #[error("I/O error: {0}")]
  Io(#[from] io::Error),

  #[error("Invalid argument provided: {0}")]
  InvalidArgument(String),

  // --- Flow control ---
  #[error("Operation would block")]
  WouldBlock, // EAGAIN
  #[error("Operation timed out")]
  Timeout, // EAGAIN after SNDTIMEO/RCVTIMEO

  // --- Connection/Binding Errors ---
  #[error("Address already in use: {0}")]
  AddrInUse(String),
  #[error("Address not available: {0}")]
  AddrNotAvailable(String),
  #[error("Connection refused by peer: {0}")]
  ConnectionRefused(String),
  #[error("Host is unreachable: {0}")]
  HostUnreachable(String),
  #[error("Connection closed by peer or transport")]
  ConnectionClosed,
  #[error("Transient transport failure: {0}")]
  TransientTransport(String),

  // --- Endpoint Errors ---
  #[error("Invalid endpoint format: {0}")]
  InvalidEndpoint(String),
  #[error("Transport scheme not supported or enabled: {0}")]
  UnsupportedTransport(String),

  // --- Option Errors ---
  #[error("Invalid socket option ID: {0}")]
  InvalidOption(i32),
  #[error("Invalid value provided for option ID {0}")]
  InvalidOptionValue(i32),

  // --- State Errors ---
  #[error("Operation is invalid for the socket type ({0})")]
  InvalidSocketType(&'static str),
  #[error("Operation is invalid for the current socket state: {0}")]
  InvalidState(&'static str), // EFSM on closed handles
  #[error("Context was terminated")]
  ContextTerminated, // ETERM

  // --- Protocol Errors ---
  #[error("Protocol violation: {0}")]
  ProtocolViolation(String),
  #[error("Invalid message format for operation: {0}")]
  InvalidMessage(String),

  // --- Resource Limits ---
  #[error("Resource exhausted: {0}")]
  ResourceExhausted(String), // ENOMEM

  // --- Internal Errors ---
  #[error("Internal library error: {0}")]
  Internal(String),
}

/// Convenience alias used throughout the crate.
pub type ZmqResult<T, E = ZmqError> = std::result::Result<T, E>;

impl ZmqError {
  /// Maps common `io::Error` kinds to endpoint-aware variants.
  pub fn from_io_endpoint(e: io::Error, endpoint: &str) -> Self {
    match e.kind() {
      io::ErrorKind::AddrInUse => ZmqError::AddrInUse(endpoint.to_string()),
      io::ErrorKind::AddrNotAvailable => ZmqError::AddrNotAvailable(endpoint.to_string()),
      io::ErrorKind::ConnectionRefused => ZmqError::ConnectionRefused(endpoint.to_string()),
      io::ErrorKind::TimedOut => ZmqError::Timeout,
      io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted | io::ErrorKind::BrokenPipe => {
        ZmqError::ConnectionClosed
      }
      io::ErrorKind::OutOfMemory => ZmqError::ResourceExhausted(format!("{} ({})", e, endpoint)),
      _ => ZmqError::Io(e),
    }
  }

  /// True for the two "try again later" outcomes of send/recv.
  pub fn is_would_block(&self) -> bool {
    matches!(self, ZmqError::WouldBlock | ZmqError::Timeout)
  }

  /// True when the owning context is shutting down; nothing further will succeed.
  pub fn is_terminal(&self) -> bool {
    matches!(self, ZmqError::ContextTerminated | ZmqError::InvalidState(_))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn io_errors_map_to_endpoint_variants() {
    let err = ZmqError::from_io_endpoint(io::Error::from(io::ErrorKind::AddrInUse), "tcp://127.0.0.1:1");
    assert!(matches!(err, ZmqError::AddrInUse(ref uri) if uri == "tcp://127.0.0.1:1"));

    let err = ZmqError::from_io_endpoint(io::Error::from(io::ErrorKind::BrokenPipe), "tcp://x:1");
    assert!(matches!(err, ZmqError::ConnectionClosed));

    let err = ZmqError::from_io_endpoint(io::Error::from(io::ErrorKind::Other), "tcp://x:1");
    assert!(matches!(err, ZmqError::Io(_)));
  }

  #[test]
  fn would_block_classification() {
    assert!(ZmqError::WouldBlock.is_would_block());
    assert!(ZmqError::Timeout.is_would_block());
    assert!(!ZmqError::ConnectionClosed.is_would_block());
    assert!(ZmqError::ContextTerminated.is_terminal());
  }
}
