use crate::error::ZmqError;
use crate::message::Msg;
use crate::socket::core::Peer;
use crate::socket::xpub_socket::XPubSocket;
use crate::socket::{ISocket, SendError};

/// Fans messages out to subscribers. Subscriptions are consumed
/// internally; peers at their HWM miss the message.
#[derive(Debug)]
pub(crate) struct PubSocket {
  inner: XPubSocket,
}

impl PubSocket {
  pub fn new() -> Self {
    Self {
      inner: XPubSocket::new(true),
    }
  }
}

impl ISocket for PubSocket {
  fn peer_attached(&mut self, peer: &Peer) {
    self.inner.peer_attached(peer);
  }

  fn peer_detached(&mut self, peer_id: usize) {
    self.inner.peer_detached(peer_id);
  }

  fn send(&mut self, msg: Msg) -> Result<(), SendError> {
    self.inner.send(msg)
  }

  fn recv(&mut self) -> Result<Option<Msg>, ZmqError> {
    self.inner.recv()
  }

  fn has_in(&mut self) -> bool {
    false
  }

  fn has_out(&mut self) -> bool {
    self.inner.has_out()
  }

  fn set_pattern_option(&mut self, option: i32, value: &[u8]) -> Result<(), ZmqError> {
    self.inner.set_pattern_option(option, value)
  }

  fn get_pattern_option(&self, option: i32) -> Result<Vec<u8>, ZmqError> {
    self.inner.get_pattern_option(option)
  }
}
