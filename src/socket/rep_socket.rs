use crate::error::ZmqError;
use crate::message::Msg;
use crate::runtime::Pipe;
use crate::socket::core::Peer;
use crate::socket::patterns::FairQueue;
use crate::socket::{ISocket, SendError};

use std::collections::HashMap;
use std::sync::Arc;

/// Strict request/reply server.
///
/// Requests are fair-queued. The routing envelope (every frame up to and
/// including the empty delimiter) is stripped on receive and put back in
/// front of the reply, which goes to the peer the request came from.
#[derive(Debug, Default)]
pub(crate) struct RepSocket {
  fq: FairQueue,
  outbound: HashMap<usize, Arc<Pipe>>,
  envelope: Vec<Msg>,
  reply_to: Option<usize>,
  /// Body frames of the current request are being delivered.
  receiving: bool,
  /// The request was delivered completely; a reply is owed.
  replying: bool,
  /// Pipe receiving the reply being sent (`None` while discarding it).
  reply_pipe: Option<Arc<Pipe>>,
  more_out: bool,
}

impl RepSocket {
  pub fn new() -> Self {
    Self::default()
  }

  /// Reads the next envelope. Messages without a delimiter are dropped.
  fn read_envelope(&mut self) -> bool {
    loop {
      let Some((peer_id, frame)) = self.fq.recv() else {
        return false;
      };
      let more = frame.is_more();
      let is_delimiter = frame.is_empty();
      self.envelope.push(frame);
      if is_delimiter && more {
        self.reply_to = Some(peer_id);
        return true;
      }
      if !more {
        tracing::debug!(peer_id, "REP dropping request without envelope delimiter");
        self.envelope.clear();
      }
    }
  }
}

impl ISocket for RepSocket {
  fn peer_attached(&mut self, peer: &Peer) {
    self.fq.attach(peer.id, peer.inbound.clone());
    self.outbound.insert(peer.id, peer.outbound.clone());
  }

  fn peer_detached(&mut self, peer_id: usize) {
    self.outbound.remove(&peer_id);
  }

  fn send(&mut self, msg: Msg) -> Result<(), SendError> {
    if !self.replying {
      return Err(ZmqError::ProtocolViolation("REP socket must receive a request before replying".into()).into());
    }
    if !self.more_out {
      self.reply_pipe = self.reply_to.and_then(|id| self.outbound.get(&id)).cloned();
      let writable = self.reply_pipe.as_ref().is_some_and(|p| p.check_write());
      if !writable {
        tracing::debug!(peer_id = ?self.reply_to, "REP peer gone or full, dropping reply");
        self.reply_pipe = None;
      }
      for frame in self.envelope.drain(..) {
        if let Some(pipe) = &self.reply_pipe {
          let _ = pipe.write(frame);
        }
      }
    }
    self.more_out = msg.is_more();
    if let Some(pipe) = &self.reply_pipe {
      if pipe.write(msg).is_err() {
        self.reply_pipe = None;
      }
    }
    if !self.more_out {
      self.replying = false;
      self.reply_to = None;
      self.reply_pipe = None;
    }
    Ok(())
  }

  fn recv(&mut self) -> Result<Option<Msg>, ZmqError> {
    if self.replying {
      return Err(ZmqError::ProtocolViolation("REP socket must reply before receiving again".into()));
    }
    if !self.receiving {
      if !self.read_envelope() {
        return Ok(None);
      }
      self.receiving = true;
    }
    let Some((_, frame)) = self.fq.recv() else {
      return Ok(None);
    };
    if !frame.is_more() {
      self.receiving = false;
      self.replying = true;
    }
    Ok(Some(frame))
  }

  fn has_in(&mut self) -> bool {
    !self.replying && (self.receiving || self.fq.has_in())
  }

  fn has_out(&mut self) -> bool {
    self.replying
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::runtime::Signal;

  fn frame(data: &str, more: bool) -> Msg {
    let mut msg = Msg::from(data);
    msg.set_more(more);
    msg
  }

  #[test]
  fn envelope_is_stripped_and_restored() {
    let mut rep = RepSocket::new();
    let peer = Peer {
      id: 7,
      endpoint_id: 0,
      inbound: Arc::new(Pipe::new(0, Signal::new(), Signal::new())),
      outbound: Arc::new(Pipe::new(0, Signal::new(), Signal::new())),
      routing_id: None,
      ready: true,
      remote: None,
    };
    rep.peer_attached(&peer);
    assert!(matches!(rep.send(Msg::from("early")), Err(SendError::Failed(ZmqError::ProtocolViolation(_)))));

    peer.inbound.write(frame("hop", true)).unwrap();
    peer.inbound.write(frame("", true)).unwrap();
    peer.inbound.write(frame("ping", false)).unwrap();

    let body = rep.recv().unwrap().unwrap();
    assert_eq!((body.data(), body.is_more()), (&b"ping"[..], false));
    assert!(matches!(rep.recv(), Err(ZmqError::ProtocolViolation(_))));

    rep.send(Msg::from("pong")).unwrap();
    let out: Vec<Vec<u8>> = std::iter::from_fn(|| peer.outbound.read()).map(|m| m.data().to_vec()).collect();
    assert_eq!(out, vec![b"hop".to_vec(), Vec::new(), b"pong".to_vec()]);
  }
}
