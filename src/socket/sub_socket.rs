use crate::error::ZmqError;
use crate::message::Msg;
use crate::socket::core::Peer;
use crate::socket::options::{SUBSCRIBE, UNSUBSCRIBE};
use crate::socket::xsub_socket::XSubSocket;
use crate::socket::{ISocket, SendError};

/// Subscriber: subscriptions come from the `SUBSCRIBE`/`UNSUBSCRIBE`
/// options and incoming messages are filtered by them locally.
#[derive(Debug, Default)]
pub(crate) struct SubSocket {
  inner: XSubSocket,
  /// First frame of the next matching message, read ahead by `has_in`.
  prefetched: Option<Msg>,
  /// The next inbound frame continues a message being delivered.
  more_in: bool,
}

impl SubSocket {
  pub fn new() -> Self {
    Self::default()
  }

  fn fetch(&mut self) -> Option<Msg> {
    if let Some(msg) = self.prefetched.take() {
      return Some(msg);
    }
    loop {
      let msg = self.inner.recv_frame()?;
      if self.more_in || self.inner.subscriptions().matches(msg.data()) {
        self.more_in = msg.is_more();
        return Some(msg);
      }
      // Skip the rest of a message nobody subscribed to.
      let mut more = msg.is_more();
      while more {
        match self.inner.recv_frame() {
          Some(frame) => more = frame.is_more(),
          None => break,
        }
      }
    }
  }
}

impl ISocket for SubSocket {
  fn peer_attached(&mut self, peer: &Peer) {
    self.inner.peer_attached(peer);
  }

  fn peer_ready(&mut self, peer: &Peer) {
    self.inner.peer_ready(peer);
  }

  fn peer_disconnected(&mut self, peer_id: usize) {
    self.inner.peer_disconnected(peer_id);
  }

  fn peer_detached(&mut self, peer_id: usize) {
    self.inner.peer_detached(peer_id);
  }

  fn send(&mut self, _msg: Msg) -> Result<(), SendError> {
    Err(ZmqError::InvalidSocketType("SUB sockets cannot send").into())
  }

  fn recv(&mut self) -> Result<Option<Msg>, ZmqError> {
    Ok(self.fetch())
  }

  fn has_in(&mut self) -> bool {
    if self.more_in || self.prefetched.is_some() {
      return true;
    }
    if !self.inner.has_queued() {
      return false;
    }
    self.prefetched = self.fetch();
    self.prefetched.is_some()
  }

  fn has_out(&mut self) -> bool {
    false
  }

  fn set_pattern_option(&mut self, option: i32, value: &[u8]) -> Result<(), ZmqError> {
    let kind = match option {
      SUBSCRIBE => 1u8,
      UNSUBSCRIBE => 0u8,
      _ => return Err(ZmqError::InvalidOption(option)),
    };
    let mut frame = Vec::with_capacity(value.len() + 1);
    frame.push(kind);
    frame.extend_from_slice(value);
    self.inner.apply_subscription(&frame);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::runtime::{Pipe, Signal};
  use std::sync::Arc;

  #[test]
  fn filters_by_prefix_and_keeps_multipart_whole() {
    let mut sub = SubSocket::new();
    let peer = Peer {
      id: 1,
      endpoint_id: 0,
      inbound: Arc::new(Pipe::new(0, Signal::new(), Signal::new())),
      outbound: Arc::new(Pipe::new(0, Signal::new(), Signal::new())),
      routing_id: None,
      ready: true,
      remote: None,
    };
    sub.peer_attached(&peer);
    sub.set_pattern_option(SUBSCRIBE, b"A").unwrap();

    let mut skipped = Msg::from("B-head");
    skipped.set_more(true);
    peer.inbound.write(skipped).unwrap();
    peer.inbound.write(Msg::from("A-looking tail")).unwrap();
    let mut head = Msg::from("A-head");
    head.set_more(true);
    peer.inbound.write(head).unwrap();
    peer.inbound.write(Msg::from("tail")).unwrap();

    assert!(sub.has_in());
    let first = sub.recv().unwrap().unwrap();
    assert_eq!((first.data(), first.is_more()), (&b"A-head"[..], true));
    let second = sub.recv().unwrap().unwrap();
    assert_eq!((second.data(), second.is_more()), (&b"tail"[..], false));
    assert!(sub.recv().unwrap().is_none());
  }
}
