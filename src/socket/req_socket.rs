use crate::error::ZmqError;
use crate::message::Msg;
use crate::runtime::Pipe;
use crate::socket::core::Peer;
use crate::socket::patterns::LoadBalancer;
use crate::socket::{ISocket, SendError};

use std::collections::HashMap;
use std::sync::Arc;

/// Strict request/reply client.
///
/// Each request goes to the next peer in round-robin order, prefixed by an
/// empty delimiter frame. Only a reply from that same peer is accepted and
/// the socket alternates between sending and receiving.
#[derive(Debug, Default)]
pub(crate) struct ReqSocket {
  lb: LoadBalancer,
  inbound: HashMap<usize, Arc<Pipe>>,
  /// A request was sent completely; the reply is outstanding.
  expecting_reply: bool,
  /// A multipart request is being sent.
  sending: bool,
  /// Peer the current request went to.
  reply_from: Option<usize>,
  /// The delimiter of the reply was consumed; body frames follow.
  receiving: bool,
  /// `reply_from` went away; its inbound pipe is kept until the reply is read.
  reply_detached: bool,
}

impl ReqSocket {
  pub fn new() -> Self {
    Self::default()
  }

  fn reply_pipe(&self) -> Option<&Arc<Pipe>> {
    self.reply_from.and_then(|id| self.inbound.get(&id))
  }
}

impl ISocket for ReqSocket {
  fn peer_attached(&mut self, peer: &Peer) {
    self.lb.attach(peer.id, peer.outbound.clone());
    self.inbound.insert(peer.id, peer.inbound.clone());
  }

  fn peer_detached(&mut self, peer_id: usize) {
    self.lb.detach(peer_id);
    if self.reply_from == Some(peer_id) {
      self.reply_detached = true;
    } else {
      self.inbound.remove(&peer_id);
    }
  }

  fn send(&mut self, msg: Msg) -> Result<(), SendError> {
    if !self.sending {
      if self.expecting_reply {
        return Err(ZmqError::ProtocolViolation("REQ socket cannot send again before receiving the reply".into()).into());
      }
      let mut delimiter = Msg::new();
      delimiter.set_more(true);
      match self.lb.send(delimiter) {
        Ok(peer_id) => self.reply_from = Some(peer_id),
        Err(_) => return Err(SendError::Again(msg)),
      }
    }
    let more = msg.is_more();
    // The load balancer is pinned to the delimiter's peer until the last frame.
    let _ = self.lb.send(msg);
    self.sending = more;
    if !more {
      self.expecting_reply = true;
      self.receiving = false;
      tracing::trace!(peer_id = ?self.reply_from, "REQ request sent");
    }
    Ok(())
  }

  fn recv(&mut self) -> Result<Option<Msg>, ZmqError> {
    if !self.expecting_reply {
      return Err(ZmqError::ProtocolViolation("REQ socket must send a request before receiving".into()));
    }
    let Some(pipe) = self.reply_pipe().cloned() else {
      return Ok(None);
    };
    while !self.receiving {
      let Some(delimiter) = pipe.read() else {
        return Ok(None);
      };
      if delimiter.is_empty() && delimiter.is_more() {
        self.receiving = true;
        break;
      }
      tracing::debug!(peer_id = ?self.reply_from, "REQ dropping malformed reply");
      let mut more = delimiter.is_more();
      while more {
        match pipe.read() {
          Some(frame) => more = frame.is_more(),
          None => break,
        }
      }
    }
    let Some(frame) = pipe.read() else {
      return Ok(None);
    };
    if !frame.is_more() {
      self.expecting_reply = false;
      self.receiving = false;
      if let Some(id) = self.reply_from.take() {
        if std::mem::take(&mut self.reply_detached) {
          self.inbound.remove(&id);
        }
      }
    }
    Ok(Some(frame))
  }

  fn has_in(&mut self) -> bool {
    self.expecting_reply && self.reply_pipe().is_some_and(|p| self.receiving || p.check_read())
  }

  fn has_out(&mut self) -> bool {
    !self.expecting_reply && self.lb.has_out()
  }
}
