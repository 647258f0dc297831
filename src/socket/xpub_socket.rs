use crate::error::ZmqError;
use crate::message::Msg;
use crate::socket::core::Peer;
use crate::socket::options::{parse_bool_option, XPUB_NODROP, XPUB_VERBOSE};
use crate::socket::patterns::{Distributor, FairQueue};
use crate::socket::{ISocket, SendError};

use std::collections::VecDeque;

/// Publisher side of pub/sub.
///
/// Subscription frames (`0x01`/`0x00` + topic) arriving from subscribers are
/// applied whenever the socket is used. XPUB hands them to the application
/// as messages: every union change, and with `XPUB_VERBOSE` every
/// subscribe. Other inbound messages are passed through unchanged. In
/// publisher-only mode (PUB) nothing is ever receivable.
#[derive(Debug)]
pub(crate) struct XPubSocket {
  dist: Distributor,
  fq: FairQueue,
  events: VecDeque<Msg>,
  /// Inside a multipart message that is not a subscription.
  passthrough_more: bool,
  verbose: bool,
  nodrop: bool,
  publisher_only: bool,
}

impl XPubSocket {
  pub fn new(publisher_only: bool) -> Self {
    Self {
      dist: Distributor::new(),
      fq: FairQueue::new(),
      events: VecDeque::new(),
      passthrough_more: false,
      verbose: false,
      nodrop: false,
      publisher_only,
    }
  }

  fn event(kind: u8, topic: &[u8]) -> Msg {
    let mut data = Vec::with_capacity(topic.len() + 1);
    data.push(kind);
    data.extend_from_slice(topic);
    Msg::from_vec(data)
  }

  /// Drains everything subscribers sent so far.
  fn process_inbound(&mut self) {
    while let Some((peer_id, msg)) = self.fq.recv() {
      let is_subscription =
        !self.passthrough_more && !msg.is_more() && matches!(msg.data().first().copied(), Some(0) | Some(1));
      if !is_subscription {
        self.passthrough_more = msg.is_more();
        if !self.publisher_only {
          self.events.push_back(msg);
        }
        continue;
      }
      let Some(change) = self.dist.apply_subscription(peer_id, msg.data()) else {
        continue;
      };
      let report = change.union_changed || (self.verbose && change.subscribe);
      if report && !self.publisher_only {
        self.events.push_back(msg);
      }
    }
  }
}

impl ISocket for XPubSocket {
  fn peer_attached(&mut self, peer: &Peer) {
    self.dist.attach(peer.id, peer.outbound.clone());
    self.fq.attach(peer.id, peer.inbound.clone());
  }

  fn peer_detached(&mut self, peer_id: usize) {
    self.process_inbound();
    self.fq.detach(peer_id);
    for topic in self.dist.detach(peer_id) {
      if !self.publisher_only {
        self.events.push_back(Self::event(0, &topic));
      }
    }
  }

  fn send(&mut self, msg: Msg) -> Result<(), SendError> {
    self.process_inbound();
    self.dist.send(msg, self.nodrop).map_err(SendError::Again)
  }

  fn recv(&mut self) -> Result<Option<Msg>, ZmqError> {
    if self.publisher_only {
      return Err(ZmqError::InvalidSocketType("PUB sockets cannot receive"));
    }
    self.process_inbound();
    Ok(self.events.pop_front())
  }

  fn has_in(&mut self) -> bool {
    if self.publisher_only {
      return false;
    }
    self.process_inbound();
    !self.events.is_empty()
  }

  fn has_out(&mut self) -> bool {
    self.process_inbound();
    !self.nodrop || self.dist.all_writable()
  }

  fn set_pattern_option(&mut self, option: i32, value: &[u8]) -> Result<(), ZmqError> {
    match option {
      XPUB_VERBOSE => self.verbose = parse_bool_option(value, option)?,
      XPUB_NODROP => self.nodrop = parse_bool_option(value, option)?,
      _ => return Err(ZmqError::InvalidOption(option)),
    }
    Ok(())
  }

  fn get_pattern_option(&self, option: i32) -> Result<Vec<u8>, ZmqError> {
    let value = match option {
      XPUB_VERBOSE => self.verbose,
      XPUB_NODROP => self.nodrop,
      _ => return Err(ZmqError::InvalidOption(option)),
    };
    Ok((value as i32).to_ne_bytes().to_vec())
  }
}
