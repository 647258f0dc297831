//! Transports: address parsing, endpoint bookkeeping and the stream
//! adapters the ZMTP engine runs over.

pub(crate) mod endpoint;
pub(crate) mod inproc;
#[cfg(all(unix, feature = "ipc"))]
pub(crate) mod ipc;
pub(crate) mod reconnect;
pub(crate) mod tcp;

pub use endpoint::EndpointState;

use crate::error::ZmqError;
use futures::future::BoxFuture;
use std::io;
#[cfg(all(unix, feature = "ipc"))]
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncWrite};

/// A parsed `scheme://target` address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Endpoint {
  Tcp { host: String, port: Option<u16> },
  #[cfg(all(unix, feature = "ipc"))]
  Ipc(PathBuf),
  Inproc(String),
}

/// Parses an endpoint string.
///
/// A malformed address yields `InvalidEndpoint`; a well-formed address with
/// an unknown (or disabled) scheme yields `UnsupportedTransport`.
pub(crate) fn parse_endpoint(uri: &str) -> Result<Endpoint, ZmqError> {
  let invalid = || ZmqError::InvalidEndpoint(uri.to_string());
  let (scheme, target) = uri.split_once("://").ok_or_else(invalid)?;
  if target.is_empty() || target.contains('\0') {
    return Err(invalid());
  }
  match scheme {
    "tcp" => {
      let (host, port) = tcp::parse_host_port(target).ok_or_else(invalid)?;
      Ok(Endpoint::Tcp { host, port })
    }
    #[cfg(all(unix, feature = "ipc"))]
    "ipc" => Ok(Endpoint::Ipc(PathBuf::from(target))),
    "inproc" => Ok(Endpoint::Inproc(target.to_string())),
    "" => Err(invalid()),
    _ => Err(ZmqError::UnsupportedTransport(uri.to_string())),
  }
}

/// Outbound connection factory, invoked once per (re)connect attempt.
pub(crate) trait StreamConnector: Send + Sync + 'static {
  type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;
  fn connect(&self) -> BoxFuture<'_, io::Result<Self::Stream>>;
}

/// Accept side of a bound endpoint. Yields the stream and a printable peer
/// address.
pub(crate) trait StreamListener: Send + 'static {
  type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;
  fn accept(&mut self) -> BoxFuture<'_, io::Result<(Self::Stream, String)>>;
}
