use crate::error::ZmqError;
use crate::message::{Msg, RecvFlags, SendFlags};
use crate::socket::core::SocketCore;
use crate::transport::EndpointState;

use std::fmt;
use std::sync::Arc;

/// Represents the type of a ZeroMQ socket, defining its messaging pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketType {
  /// Exclusive connection to exactly one peer.
  Pair,
  /// Publish messages to subscribers (Pub-Sub pattern).
  Pub,
  /// Subscribe to messages from publishers (Pub-Sub pattern).
  Sub,
  /// Send requests and receive replies (Req-Rep pattern).
  Req,
  /// Receive requests and send replies (Req-Rep pattern).
  Rep,
  /// Asynchronous request-reply, load-balancing outgoing (Dealer-Router pattern).
  Dealer,
  /// Asynchronous request-reply, routing incoming (Dealer-Router pattern).
  Router,
  /// Collect messages from a pool of distributors (Push-Pull pattern).
  Pull,
  /// Distribute messages to a pool of workers (Push-Pull pattern).
  Push,
  /// Publisher that also receives subscription events.
  XPub,
  /// Subscriber that sends its subscriptions as messages.
  XSub,
}

impl SocketType {
  /// The name announced in the ZMTP `Socket-Type` property.
  pub fn as_str(&self) -> &'static str {
    match self {
      SocketType::Pair => "PAIR",
      SocketType::Pub => "PUB",
      SocketType::Sub => "SUB",
      SocketType::Req => "REQ",
      SocketType::Rep => "REP",
      SocketType::Dealer => "DEALER",
      SocketType::Router => "ROUTER",
      SocketType::Pull => "PULL",
      SocketType::Push => "PUSH",
      SocketType::XPub => "XPUB",
      SocketType::XSub => "XSUB",
    }
  }

  pub fn from_name(name: &str) -> Option<Self> {
    let socket_type = match name {
      "PAIR" => SocketType::Pair,
      "PUB" => SocketType::Pub,
      "SUB" => SocketType::Sub,
      "REQ" => SocketType::Req,
      "REP" => SocketType::Rep,
      "DEALER" => SocketType::Dealer,
      "ROUTER" => SocketType::Router,
      "PULL" => SocketType::Pull,
      "PUSH" => SocketType::Push,
      "XPUB" => SocketType::XPub,
      "XSUB" => SocketType::XSub,
      _ => return None,
    };
    Some(socket_type)
  }

  /// The libzmq numeric id, reported by the `TYPE` option.
  pub fn as_i32(&self) -> i32 {
    match self {
      SocketType::Pair => 0,
      SocketType::Pub => 1,
      SocketType::Sub => 2,
      SocketType::Req => 3,
      SocketType::Rep => 4,
      SocketType::Dealer => 5,
      SocketType::Router => 6,
      SocketType::Pull => 7,
      SocketType::Push => 8,
      SocketType::XPub => 9,
      SocketType::XSub => 10,
    }
  }

  /// Whether a socket of this type may talk to a peer of type `peer`.
  pub fn is_compatible(&self, peer: SocketType) -> bool {
    use SocketType::*;
    match self {
      Pair => peer == Pair,
      Pub | XPub => matches!(peer, Sub | XSub),
      Sub | XSub => matches!(peer, Pub | XPub),
      Req => matches!(peer, Rep | Router),
      Rep => matches!(peer, Req | Dealer),
      Dealer => matches!(peer, Rep | Dealer | Router),
      Router => matches!(peer, Req | Dealer | Router),
      Pull => peer == Push,
      Push => peer == Pull,
    }
  }

  pub fn can_send(&self) -> bool {
    !matches!(self, SocketType::Sub | SocketType::Pull)
  }

  pub fn can_recv(&self) -> bool {
    !matches!(self, SocketType::Pub | SocketType::Push)
  }
}

impl fmt::Display for SocketType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Converts an option value into the raw bytes `set_option` expects.
///
/// Integers are native-endian `i32`, booleans `0`/`1`, strings and byte
/// slices are passed through.
pub trait ToBytes {
  fn to_bytes(&self) -> Vec<u8>;
}

impl ToBytes for i32 {
  fn to_bytes(&self) -> Vec<u8> {
    self.to_ne_bytes().to_vec()
  }
}

impl ToBytes for i64 {
  fn to_bytes(&self) -> Vec<u8> {
    self.to_ne_bytes().to_vec()
  }
}

impl ToBytes for bool {
  fn to_bytes(&self) -> Vec<u8> {
    (*self as i32).to_ne_bytes().to_vec()
  }
}

impl ToBytes for str {
  fn to_bytes(&self) -> Vec<u8> {
    self.as_bytes().to_vec()
  }
}

impl ToBytes for String {
  fn to_bytes(&self) -> Vec<u8> {
    self.as_bytes().to_vec()
  }
}

impl ToBytes for [u8] {
  fn to_bytes(&self) -> Vec<u8> {
    self.to_vec()
  }
}

impl<const N: usize> ToBytes for [u8; N] {
  fn to_bytes(&self) -> Vec<u8> {
    self.to_vec()
  }
}

impl ToBytes for Vec<u8> {
  fn to_bytes(&self) -> Vec<u8> {
    self.clone()
  }
}

impl<T: ToBytes + ?Sized> ToBytes for &T {
  fn to_bytes(&self) -> Vec<u8> {
    (**self).to_bytes()
  }
}

/// The public handle for interacting with a socket.
///
/// A socket has a single owner: the handle is not `Clone`. Dropping it
/// closes the socket, which starts the linger phase on every endpoint.
/// All methods take `&self`, so one task may receive while another sends.
pub struct Socket {
  pub(crate) core: Arc<SocketCore>,
}

impl Socket {
  pub(crate) fn new(core: Arc<SocketCore>) -> Self {
    Self { core }
  }

  pub fn socket_type(&self) -> SocketType {
    self.core.socket_type
  }

  // --- Endpoints ---

  /// Binds the socket to listen on a local endpoint.
  ///
  /// For `tcp://host:*` the port is chosen by the system; read it back with
  /// the `LAST_ENDPOINT` option.
  pub async fn bind(&self, endpoint: &str) -> Result<(), ZmqError> {
    SocketCore::bind(&self.core, endpoint)
  }

  /// Connects the socket to a remote endpoint.
  ///
  /// Returns once the endpoint exists; the connection itself is made in the
  /// background and messages queue until it is up.
  pub async fn connect(&self, endpoint: &str) -> Result<(), ZmqError> {
    SocketCore::connect(&self.core, endpoint)
  }

  /// Stops listening on a specific endpoint.
  pub async fn unbind(&self, endpoint: &str) -> Result<(), ZmqError> {
    self.core.unbind(endpoint)
  }

  /// Disconnects from a specific endpoint.
  pub async fn disconnect(&self, endpoint: &str) -> Result<(), ZmqError> {
    self.core.disconnect(endpoint)
  }

  /// State of the endpoint bound or connected as `endpoint`.
  pub fn endpoint_state(&self, endpoint: &str) -> Option<EndpointState> {
    self.core.endpoint_state(endpoint)
  }

  // --- Messages ---

  /// Sends one frame, waiting up to `SNDTIMEO` for room.
  pub async fn send(&self, msg: Msg) -> Result<(), ZmqError> {
    self.core.send(msg, SendFlags::empty()).await
  }

  pub async fn send_with_flags(&self, msg: Msg, flags: SendFlags) -> Result<(), ZmqError> {
    self.core.send(msg, flags).await
  }

  /// Sends without waiting; `WouldBlock` if no peer can take the frame.
  pub fn try_send(&self, msg: Msg) -> Result<(), ZmqError> {
    self.core.try_send(msg)
  }

  /// Sends a copy of `data` as one frame and returns its length.
  /// `SNDMORE` in `flags` marks more frames to follow.
  pub async fn send_bytes(&self, data: &[u8], flags: SendFlags) -> Result<usize, ZmqError> {
    self.core.send(Msg::from(data), flags).await?;
    Ok(data.len())
  }

  /// Sends all frames as one message, setting MORE on all but the last.
  pub async fn send_multipart<I>(&self, frames: I) -> Result<(), ZmqError>
  where
    I: IntoIterator<Item = Msg>,
  {
    let mut frames = frames.into_iter().peekable();
    if frames.peek().is_none() {
      return Err(ZmqError::InvalidMessage("empty multipart message".into()));
    }
    while let Some(mut frame) = frames.next() {
      frame.set_more(frames.peek().is_some());
      self.core.send(frame, SendFlags::empty()).await?;
    }
    Ok(())
  }

  /// Receives one frame, waiting up to `RCVTIMEO`.
  pub async fn recv(&self) -> Result<Msg, ZmqError> {
    self.core.recv(RecvFlags::empty()).await
  }

  pub async fn recv_with_flags(&self, flags: RecvFlags) -> Result<Msg, ZmqError> {
    self.core.recv(flags).await
  }

  /// Receives without waiting; `WouldBlock` if nothing is queued.
  pub fn try_recv(&self) -> Result<Msg, ZmqError> {
    self.core.try_recv()
  }

  /// Receives the next frame into `buf`.
  ///
  /// At most `buf.len()` bytes are copied; the return value is the full
  /// frame size, so a result larger than `buf.len()` means the frame was
  /// truncated. `RCVMORE` tells whether more frames follow.
  pub async fn recv_into(&self, buf: &mut [u8], flags: RecvFlags) -> Result<usize, ZmqError> {
    let frame = self.core.recv(flags).await?;
    let data = frame.data();
    let n = data.len().min(buf.len());
    buf[..n].copy_from_slice(&data[..n]);
    Ok(data.len())
  }

  /// Receives every frame of the next message.
  pub async fn recv_multipart(&self) -> Result<Vec<Msg>, ZmqError> {
    let mut frames = Vec::new();
    loop {
      let frame = self.core.recv(RecvFlags::empty()).await?;
      let more = frame.is_more();
      frames.push(frame);
      if !more {
        return Ok(frames);
      }
    }
  }

  // --- Options ---

  /// Sets a socket option from a typed value.
  pub async fn set_option<T: ToBytes>(&self, option: i32, value: T) -> Result<(), ZmqError> {
    self.core.set_option(option, &value.to_bytes())
  }

  /// Sets a socket option from its raw byte encoding.
  pub async fn set_option_raw(&self, option: i32, value: &[u8]) -> Result<(), ZmqError> {
    self.core.set_option(option, value)
  }

  /// Gets a socket option value in its raw byte encoding.
  pub async fn get_option(&self, option: i32) -> Result<Vec<u8>, ZmqError> {
    self.core.get_option(option)
  }

  /// Closes the socket. Queued outbound messages drain per `LINGER`.
  pub fn close(self) {
    drop(self);
  }
}

impl Drop for Socket {
  fn drop(&mut self) {
    SocketCore::close(&self.core);
  }
}

impl fmt::Debug for Socket {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Socket")
      .field("handle", &self.core.handle)
      .field("type", &self.core.socket_type)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn names_round_trip() {
    for t in [
      SocketType::Pair,
      SocketType::Pub,
      SocketType::Sub,
      SocketType::Req,
      SocketType::Rep,
      SocketType::Dealer,
      SocketType::Router,
      SocketType::Pull,
      SocketType::Push,
      SocketType::XPub,
      SocketType::XSub,
    ] {
      assert_eq!(SocketType::from_name(t.as_str()), Some(t));
    }
    assert_eq!(SocketType::from_name("STREAM"), None);
  }

  #[test]
  fn compatibility_is_symmetric() {
    assert!(SocketType::Req.is_compatible(SocketType::Router));
    assert!(SocketType::Router.is_compatible(SocketType::Req));
    assert!(SocketType::XPub.is_compatible(SocketType::Sub));
    assert!(!SocketType::Push.is_compatible(SocketType::Push));
    assert!(!SocketType::Req.is_compatible(SocketType::Req));
  }

  #[test]
  fn option_values_encode_native_endian() {
    assert_eq!(5i32.to_bytes(), 5i32.to_ne_bytes().to_vec());
    assert_eq!(true.to_bytes(), 1i32.to_ne_bytes().to_vec());
    assert_eq!("topic".to_bytes(), b"topic".to_vec());
  }
}
