use crate::error::ZmqError;
use crate::message::{Blob, Msg};
use crate::protocol::zmtp::{
  ZmtpCodec, ZmtpCommand, ZmtpGreeting, GREETING_LENGTH, NULL_MECHANISM, PROPERTY_IDENTITY, PROPERTY_SOCKET_TYPE,
};
use crate::runtime::Pipe;
use crate::socket::SocketType;
use crate::transport::endpoint::EndpointLink;

use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite};

pub(crate) const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// What the local socket announces during the handshake.
#[derive(Debug, Clone)]
pub(crate) struct HandshakeConfig {
  pub socket_type: SocketType,
  pub routing_id: Option<Blob>,
  pub maxmsgsize: Option<usize>,
}

/// A stream that completed the NULL handshake.
pub(crate) struct ZmtpConnection<S> {
  reader: FramedRead<ReadHalf<S>, ZmtpCodec>,
  writer: FramedWrite<WriteHalf<S>, ZmtpCodec>,
  pub peer_type: SocketType,
  pub peer_identity: Option<Blob>,
}

/// Why a session ended.
#[derive(Debug)]
pub(crate) enum SessionEnd {
  /// The remote side closed the connection.
  PeerClosed,
  /// Transport or protocol failure.
  Failed(ZmqError),
  /// The socket closed the outbound pipe and everything queued was written.
  Drained,
  /// The linger period ran out before the outbound pipe drained.
  LingerExpired,
}

/// Performs the ZMTP 3.0 greeting and NULL-mechanism READY exchange.
pub(crate) async fn handshake<S>(mut stream: S, config: &HandshakeConfig) -> Result<ZmtpConnection<S>, ZmqError>
where
  S: AsyncRead + AsyncWrite + Send + Unpin,
{
  let mut greeting = BytesMut::with_capacity(GREETING_LENGTH);
  ZmtpGreeting::encode(NULL_MECHANISM, false, &mut greeting);
  stream.write_all(&greeting).await?;
  stream.flush().await?;

  let mut incoming = BytesMut::zeroed(GREETING_LENGTH);
  stream.read_exact(&mut incoming).await?;
  let peer_greeting = ZmtpGreeting::decode(&mut incoming)?
    .ok_or_else(|| ZmqError::ProtocolViolation("short greeting".into()))?;
  if peer_greeting.mechanism_name() != "NULL" {
    return Err(ZmqError::ProtocolViolation(format!(
      "unsupported security mechanism {}",
      peer_greeting.mechanism_name()
    )));
  }

  let (read_half, write_half) = tokio::io::split(stream);
  let mut reader = FramedRead::new(read_half, ZmtpCodec::new(config.maxmsgsize));
  let mut writer = FramedWrite::new(write_half, ZmtpCodec::new(None));

  let mut properties: Vec<(&str, &[u8])> = vec![(PROPERTY_SOCKET_TYPE, config.socket_type.as_str().as_bytes())];
  if let Some(id) = &config.routing_id {
    properties.push((PROPERTY_IDENTITY, &id[..]));
  }
  writer.send(ZmtpCommand::create_ready(&properties)).await?;

  let frame = reader.next().await.ok_or(ZmqError::ConnectionClosed)??;
  let ready = match ZmtpCommand::parse(&frame)? {
    cmd @ ZmtpCommand::Ready(_) => cmd,
    ZmtpCommand::Error(reason) => {
      return Err(ZmqError::ProtocolViolation(format!("peer rejected handshake: {}", reason)))
    }
    ZmtpCommand::Unknown(name) => {
      return Err(ZmqError::ProtocolViolation(format!(
        "expected READY, got {}",
        String::from_utf8_lossy(&name)
      )))
    }
  };

  let peer_type = ready
    .property(PROPERTY_SOCKET_TYPE)
    .and_then(|name| SocketType::from_name(&String::from_utf8_lossy(name)))
    .ok_or_else(|| ZmqError::ProtocolViolation("READY without a valid Socket-Type".into()))?;
  if !config.socket_type.is_compatible(peer_type) {
    let _ = writer.send(ZmtpCommand::create_error("Invalid socket type")).await;
    return Err(ZmqError::ProtocolViolation(format!(
      "incompatible socket types {} and {}",
      config.socket_type.as_str(),
      peer_type.as_str()
    )));
  }
  let peer_identity = ready
    .property(PROPERTY_IDENTITY)
    .filter(|id| !id.is_empty())
    .map(|id| Blob::from_bytes(id.clone()));

  Ok(ZmtpConnection {
    reader,
    writer,
    peer_type,
    peer_identity,
  })
}

/// Pumps messages between the connection and the peer's pipes until one
/// side finishes.
///
/// Inbound messages are handed to `inbound` only once all their frames
/// arrived. When `inbound` is closed by the socket, reading stops but the
/// session keeps draining `outbound` until it is empty or the linger
/// deadline passes.
pub(crate) async fn run_session<S>(
  conn: ZmtpConnection<S>,
  inbound: &Pipe,
  outbound: &Pipe,
  link: &mut EndpointLink,
) -> SessionEnd
where
  S: AsyncRead + AsyncWrite + Send + Unpin,
{
  let ZmtpConnection {
    mut reader, mut writer, ..
  } = conn;

  let inbound_pump = async {
    let mut frames: Vec<Msg> = Vec::new();
    loop {
      let msg = match reader.next().await {
        None => return SessionEnd::PeerClosed,
        Some(Err(e)) => return SessionEnd::Failed(e),
        Some(Ok(msg)) => msg,
      };
      if msg.is_command() {
        match ZmtpCommand::parse(&msg) {
          Ok(ZmtpCommand::Error(reason)) => return SessionEnd::Failed(ZmqError::ProtocolViolation(reason)),
          Ok(other) => tracing::trace!(command = ?other, "Ignoring ZMTP command"),
          Err(e) => return SessionEnd::Failed(e),
        }
        continue;
      }
      let more = msg.is_more();
      frames.push(msg);
      if more {
        continue;
      }
      if !inbound.writable().await {
        return futures::future::pending().await;
      }
      for frame in frames.drain(..) {
        if inbound.write(frame).is_err() {
          return futures::future::pending().await;
        }
      }
    }
  };

  let outbound_pump = async {
    loop {
      if !outbound.readable().await {
        return match writer.flush().await {
          Ok(()) => SessionEnd::Drained,
          Err(e) => SessionEnd::Failed(e),
        };
      }
      // Whole messages only; a failed write loses the entire message.
      let mut frames = Vec::new();
      while let Some(msg) = outbound.read() {
        let more = msg.is_more();
        frames.push(msg);
        if more {
          continue;
        }
        for frame in frames.drain(..) {
          if let Err(e) = writer.feed(frame).await {
            return SessionEnd::Failed(e);
          }
        }
      }
      if let Err(e) = writer.flush().await {
        return SessionEnd::Failed(e);
      }
    }
  };

  tokio::select! {
    end = inbound_pump => end,
    end = outbound_pump => end,
    _ = link.linger_expired() => SessionEnd::LingerExpired,
  }
}
