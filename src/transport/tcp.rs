use crate::error::ZmqError;
use crate::socket::options::SocketOptions;
use crate::transport::{StreamConnector, StreamListener};

use futures::future::BoxFuture;
use futures::FutureExt;
use socket2::{SockRef, TcpKeepalive};
use std::io;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

/// Splits `host:port`. `*` as host means all interfaces and `*` as port
/// means an ephemeral port (returned as `None`). IPv6 hosts are bracketed.
pub(crate) fn parse_host_port(target: &str) -> Option<(String, Option<u16>)> {
  let (host, port) = target.rsplit_once(':')?;
  let host = match host {
    "" => return None,
    "*" => "0.0.0.0".to_string(),
    h if h.starts_with('[') && h.ends_with(']') => h[1..h.len() - 1].to_string(),
    h => h.to_string(),
  };
  let port = match port {
    "*" | "0" => None,
    p => Some(p.parse::<u16>().ok()?),
  };
  Some((host, port))
}

/// TCP settings applied to every accepted or connected stream.
#[derive(Debug, Clone, Default)]
pub(crate) struct TcpConfig {
  /// -1 leave the OS default, 0 off, 1 on.
  pub keepalive: i32,
  pub keepalive_idle: Option<Duration>,
}

impl From<&SocketOptions> for TcpConfig {
  fn from(options: &SocketOptions) -> Self {
    Self {
      keepalive: options.tcp_keepalive,
      keepalive_idle: options.tcp_keepalive_idle,
    }
  }
}

pub(crate) fn configure_stream(stream: &TcpStream, config: &TcpConfig) -> io::Result<()> {
  stream.set_nodelay(true)?;
  let socket_ref = SockRef::from(stream);
  match config.keepalive {
    0 => socket_ref.set_keepalive(false)?,
    1 => {
      let mut keepalive = TcpKeepalive::new();
      if let Some(idle) = config.keepalive_idle {
        keepalive = keepalive.with_time(idle);
      }
      socket_ref.set_tcp_keepalive(&keepalive)?;
    }
    _ => {}
  }
  Ok(())
}

/// Binds synchronously so address errors reach the caller of `bind`.
/// Returns the listener and the resolved `tcp://ip:port` address.
pub(crate) fn bind_std(host: &str, port: Option<u16>, uri: &str) -> Result<(std::net::TcpListener, String), ZmqError> {
  let listener = std::net::TcpListener::bind((host, port.unwrap_or(0))).map_err(|e| ZmqError::from_io_endpoint(e, uri))?;
  listener.set_nonblocking(true)?;
  let local = listener.local_addr()?;
  Ok((listener, format!("tcp://{}", local)))
}

pub(crate) struct TcpConnector {
  pub host: String,
  pub port: u16,
  pub config: TcpConfig,
}

impl StreamConnector for TcpConnector {
  type Stream = TcpStream;

  fn connect(&self) -> BoxFuture<'_, io::Result<TcpStream>> {
    async move {
      let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
      configure_stream(&stream, &self.config)?;
      Ok(stream)
    }
    .boxed()
  }
}

pub(crate) struct TcpAcceptor {
  listener: TcpListener,
  config: TcpConfig,
}

impl TcpAcceptor {
  /// Must run inside the context's runtime.
  pub fn from_std(listener: std::net::TcpListener, config: TcpConfig) -> io::Result<Self> {
    Ok(Self {
      listener: TcpListener::from_std(listener)?,
      config,
    })
  }
}

impl StreamListener for TcpAcceptor {
  type Stream = TcpStream;

  fn accept(&mut self) -> BoxFuture<'_, io::Result<(TcpStream, String)>> {
    async move {
      let (stream, addr) = self.listener.accept().await?;
      if let Err(e) = configure_stream(&stream, &self.config) {
        tracing::warn!(peer = %addr, error = %e, "Failed to apply TCP options to accepted stream");
      }
      Ok((stream, addr.to_string()))
    }
    .boxed()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn host_port_forms() {
    assert_eq!(parse_host_port("*:5555"), Some(("0.0.0.0".into(), Some(5555))));
    assert_eq!(parse_host_port("localhost:*"), Some(("localhost".into(), None)));
    assert_eq!(parse_host_port("[::]:1"), Some(("::".into(), Some(1))));
    assert_eq!(parse_host_port("nohost"), None);
    assert_eq!(parse_host_port(":5"), None);
  }

  #[test]
  fn bind_reports_resolved_port() {
    let (listener, uri) = bind_std("127.0.0.1", None, "tcp://127.0.0.1:*").unwrap();
    let port = listener.local_addr().unwrap().port();
    assert_ne!(port, 0);
    assert_eq!(uri, format!("tcp://127.0.0.1:{}", port));
  }

  #[test]
  fn bind_conflict_is_addr_in_use() {
    let (listener, _) = bind_std("127.0.0.1", None, "tcp://127.0.0.1:*").unwrap();
    let port = listener.local_addr().unwrap().port();
    let err = bind_std("127.0.0.1", Some(port), "tcp://127.0.0.1:x").unwrap_err();
    assert!(matches!(err, ZmqError::AddrInUse(_)));
  }
}
