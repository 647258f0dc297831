use crate::error::ZmqError;
use crate::message::Msg;
use crate::runtime::Pipe;
use crate::socket::core::Peer;
use crate::socket::patterns::{FairQueue, SubscriptionTrie};
use crate::socket::{ISocket, SendError};

use std::sync::Arc;

#[derive(Debug)]
struct Upstream {
  id: usize,
  pipe: Arc<Pipe>,
  ready: bool,
}

/// Subscriber side of pub/sub with subscriptions sent as messages.
///
/// Subscription frames sent by the application are tracked (so they can be
/// replayed to publishers that connect later) and forwarded to every
/// connected publisher. Receiving is an unfiltered fair queue.
#[derive(Debug, Default)]
pub(crate) struct XSubSocket {
  fq: FairQueue,
  upstream: Vec<Upstream>,
  subscriptions: SubscriptionTrie,
  /// Peers receiving the multipart message being sent.
  sending_to: Vec<usize>,
  more_out: bool,
}

impl XSubSocket {
  pub fn new() -> Self {
    Self::default()
  }

  pub(crate) fn subscriptions(&self) -> &SubscriptionTrie {
    &self.subscriptions
  }

  /// Applies a `0x01`/`0x00` + topic frame. Unsubscribing is forwarded only
  /// when the last reference to the topic goes away.
  pub(crate) fn apply_subscription(&mut self, frame: &[u8]) {
    let Some((&kind, topic)) = frame.split_first() else {
      return;
    };
    let forward = match kind {
      1 => {
        self.subscriptions.add(topic);
        true
      }
      _ => self.subscriptions.remove(topic),
    };
    if !forward {
      return;
    }
    for up in self.upstream.iter().filter(|u| u.ready) {
      // Subscriptions bypass the HWM.
      let _ = up.pipe.write(Msg::from(frame));
    }
  }

  pub(crate) fn recv_frame(&mut self) -> Option<Msg> {
    self.fq.recv().map(|(_, msg)| msg)
  }

  pub(crate) fn has_queued(&mut self) -> bool {
    self.fq.has_in()
  }
}

impl ISocket for XSubSocket {
  fn peer_attached(&mut self, peer: &Peer) {
    self.fq.attach(peer.id, peer.inbound.clone());
    self.upstream.push(Upstream {
      id: peer.id,
      pipe: peer.outbound.clone(),
      ready: false,
    });
  }

  fn peer_ready(&mut self, peer: &Peer) {
    let Some(up) = self.upstream.iter_mut().find(|u| u.id == peer.id) else {
      return;
    };
    up.ready = true;
    let topics = self.subscriptions.topics();
    tracing::trace!(peer_id = peer.id, count = topics.len(), "Sending subscriptions to publisher");
    for topic in topics {
      let mut frame = Vec::with_capacity(topic.len() + 1);
      frame.push(1);
      frame.extend_from_slice(&topic);
      let _ = up.pipe.write(Msg::from_vec(frame));
    }
  }

  fn peer_disconnected(&mut self, peer_id: usize) {
    if let Some(up) = self.upstream.iter_mut().find(|u| u.id == peer_id) {
      up.ready = false;
    }
  }

  fn peer_detached(&mut self, peer_id: usize) {
    self.upstream.retain(|u| u.id != peer_id);
    self.sending_to.retain(|id| *id != peer_id);
  }

  fn send(&mut self, msg: Msg) -> Result<(), SendError> {
    let first = !self.more_out;
    if first && !msg.is_more() && matches!(msg.data().first().copied(), Some(0) | Some(1)) {
      self.apply_subscription(msg.data());
      return Ok(());
    }
    if first {
      self.sending_to = self
        .upstream
        .iter()
        .filter(|u| u.ready && u.pipe.check_write())
        .map(|u| u.id)
        .collect();
    }
    self.more_out = msg.is_more();
    let mut msg = msg;
    let targets: Vec<&Arc<Pipe>> = self
      .upstream
      .iter()
      .filter(|u| self.sending_to.contains(&u.id))
      .map(|u| &u.pipe)
      .collect();
    if let Some((last, rest)) = targets.split_last() {
      for pipe in rest {
        let _ = pipe.write(msg.share());
      }
      let _ = last.write(msg);
    }
    if !self.more_out {
      self.sending_to.clear();
    }
    Ok(())
  }

  fn recv(&mut self) -> Result<Option<Msg>, ZmqError> {
    Ok(self.recv_frame())
  }

  fn has_in(&mut self) -> bool {
    self.fq.has_in()
  }

  fn has_out(&mut self) -> bool {
    true
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::runtime::Signal;

  fn peer(id: usize) -> Peer {
    Peer {
      id,
      endpoint_id: 0,
      inbound: Arc::new(Pipe::new(0, Signal::new(), Signal::new())),
      outbound: Arc::new(Pipe::new(0, Signal::new(), Signal::new())),
      routing_id: None,
      ready: false,
      remote: None,
    }
  }

  #[test]
  fn subscriptions_are_replayed_when_a_publisher_becomes_ready() {
    let mut xsub = XSubSocket::new();
    let p = peer(1);
    xsub.peer_attached(&p);
    xsub.send(Msg::from(&b"\x01weather"[..])).unwrap();
    assert_eq!(p.outbound.len(), 0);

    xsub.peer_ready(&p);
    assert_eq!(p.outbound.read().unwrap().data(), b"\x01weather");
  }

  #[test]
  fn unsubscribe_is_forwarded_on_last_reference() {
    let mut xsub = XSubSocket::new();
    let p = peer(1);
    xsub.peer_attached(&p);
    xsub.peer_ready(&p);
    xsub.send(Msg::from(&b"\x01a"[..])).unwrap();
    xsub.send(Msg::from(&b"\x01a"[..])).unwrap();
    xsub.send(Msg::from(&b"\x00a"[..])).unwrap();
    assert_eq!(p.outbound.len(), 2);
    xsub.send(Msg::from(&b"\x00a"[..])).unwrap();
    assert_eq!(p.outbound.len(), 3);
  }
}
