use crate::error::ZmqError;
use crate::message::{Blob, Msg};
use crate::runtime::Pipe;
use crate::socket::core::Peer;
use crate::socket::options::{parse_bool_option, ROUTER_MANDATORY};
use crate::socket::patterns::{FairQueue, RouterMap};
use crate::socket::{ISocket, SendError};

use std::sync::Arc;

/// Routes by identity.
///
/// Every received message is prefixed with a frame carrying the sender's
/// routing id. Outgoing messages start with the routing id of the target;
/// messages for unknown or full peers are dropped unless
/// `ROUTER_MANDATORY` is set.
#[derive(Debug, Default)]
pub(crate) struct RouterSocket {
  map: RouterMap,
  fq: FairQueue,
  mandatory: bool,
  /// First real frame, held back while its identity frame is delivered.
  prefetched: Option<Msg>,
  more_in: bool,
  /// Target of the message being sent (`None` while discarding it).
  target: Option<Arc<Pipe>>,
  more_out: bool,
}

impl RouterSocket {
  pub fn new() -> Self {
    Self {
      fq: FairQueue::tracking_pruned(),
      ..Self::default()
    }
  }

  /// Forgets identities of peers whose last message has been read.
  fn reap(&mut self) {
    for peer_id in self.fq.take_pruned() {
      self.map.remove(peer_id);
    }
  }
}

impl ISocket for RouterSocket {
  fn peer_attached(&mut self, peer: &Peer) {
    self.fq.attach(peer.id, peer.inbound.clone());
  }

  fn peer_ready(&mut self, peer: &Peer) {
    let identity = self.map.register(peer.id, peer.outbound.clone(), peer.routing_id.clone());
    tracing::debug!(peer_id = peer.id, identity = ?identity, "ROUTER peer routable");
  }

  fn peer_detached(&mut self, peer_id: usize) {
    self.map.unroute(peer_id);
    self.reap();
  }

  fn send(&mut self, msg: Msg) -> Result<(), SendError> {
    if self.more_out {
      let more = msg.is_more();
      if let Some(pipe) = &self.target {
        if pipe.write(msg).is_err() {
          self.target = None;
        }
      }
      self.more_out = more;
      if !more {
        self.target = None;
      }
      return Ok(());
    }

    if !msg.is_more() {
      return Err(
        ZmqError::InvalidMessage("ROUTER send expects a routing id frame followed by the message".into()).into(),
      );
    }
    match self.map.lookup(msg.data()) {
      Some((_, pipe)) if pipe.check_write() => self.target = Some(pipe.clone()),
      Some((peer_id, _)) => {
        if self.mandatory {
          return Err(SendError::Again(msg));
        }
        tracing::trace!(peer_id = *peer_id, "ROUTER peer at HWM, dropping message");
        self.target = None;
      }
      None => {
        if self.mandatory {
          return Err(
            ZmqError::HostUnreachable(format!("no peer with routing id {:?}", Blob::from(msg.data()))).into(),
          );
        }
        tracing::debug!(identity = ?Blob::from(msg.data()), "ROUTER unknown routing id, dropping message");
        self.target = None;
      }
    }
    self.more_out = true;
    Ok(())
  }

  fn recv(&mut self) -> Result<Option<Msg>, ZmqError> {
    if let Some(frame) = self.prefetched.take() {
      self.more_in = frame.is_more();
      return Ok(Some(frame));
    }
    if self.more_in {
      let frame = self.fq.recv().map(|(_, frame)| frame);
      self.more_in = frame.as_ref().is_some_and(|f| f.is_more());
      return Ok(frame);
    }
    let Some((peer_id, frame)) = self.fq.recv() else {
      self.reap();
      return Ok(None);
    };
    let identity = self.map.identity_of(peer_id).cloned().unwrap_or_default();
    self.prefetched = Some(frame);
    self.reap();
    let mut id_frame = Msg::from_bytes(identity.to_bytes());
    id_frame.set_more(true);
    Ok(Some(id_frame))
  }

  fn has_in(&mut self) -> bool {
    self.prefetched.is_some() || self.more_in || self.fq.has_in()
  }

  fn has_out(&mut self) -> bool {
    true
  }

  fn set_pattern_option(&mut self, option: i32, value: &[u8]) -> Result<(), ZmqError> {
    match option {
      ROUTER_MANDATORY => {
        self.mandatory = parse_bool_option(value, option)?;
        Ok(())
      }
      _ => Err(ZmqError::InvalidOption(option)),
    }
  }

  fn get_pattern_option(&self, option: i32) -> Result<Vec<u8>, ZmqError> {
    match option {
      ROUTER_MANDATORY => Ok((self.mandatory as i32).to_ne_bytes().to_vec()),
      _ => Err(ZmqError::InvalidOption(option)),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::runtime::Signal;

  fn peer(id: usize, identity: &str) -> Peer {
    Peer {
      id,
      endpoint_id: 0,
      inbound: Arc::new(Pipe::new(0, Signal::new(), Signal::new())),
      outbound: Arc::new(Pipe::new(0, Signal::new(), Signal::new())),
      routing_id: Some(Blob::from(identity)),
      ready: true,
      remote: None,
    }
  }

  fn id_frame(identity: &str) -> Msg {
    let mut msg = Msg::from(identity);
    msg.set_more(true);
    msg
  }

  #[test]
  fn receive_prefixes_identity() {
    let mut router = RouterSocket::new();
    let p = peer(1, "worker-a");
    router.peer_attached(&p);
    router.peer_ready(&p);
    p.inbound.write(Msg::from("job")).unwrap();

    let id = router.recv().unwrap().unwrap();
    assert_eq!((id.data(), id.is_more()), (&b"worker-a"[..], true));
    let body = router.recv().unwrap().unwrap();
    assert_eq!((body.data(), body.is_more()), (&b"job"[..], false));
  }

  #[test]
  fn routes_by_identity_and_drops_unknown() {
    let mut router = RouterSocket::new();
    let p = peer(1, "worker-a");
    router.peer_attached(&p);
    router.peer_ready(&p);

    router.send(id_frame("worker-a")).unwrap();
    router.send(Msg::from("for a")).unwrap();
    router.send(id_frame("nobody")).unwrap();
    router.send(Msg::from("lost")).unwrap();
    assert_eq!(p.outbound.len(), 1);
    assert_eq!(p.outbound.read().unwrap().data(), b"for a");
  }

  #[test]
  fn mandatory_reports_unknown_peer() {
    let mut router = RouterSocket::new();
    router.set_pattern_option(ROUTER_MANDATORY, &1i32.to_ne_bytes()).unwrap();
    assert!(matches!(
      router.send(id_frame("nobody")),
      Err(SendError::Failed(ZmqError::HostUnreachable(_)))
    ));
    assert!(matches!(
      router.send(Msg::from("no envelope")),
      Err(SendError::Failed(ZmqError::InvalidMessage(_)))
    ));
  }

  #[test]
  fn departed_peer_identity_lives_until_its_messages_are_read() {
    let mut router = RouterSocket::new();
    let p = peer(1, "worker-a");
    router.peer_attached(&p);
    router.peer_ready(&p);
    p.inbound.write(Msg::from("parting words")).unwrap();
    p.inbound.close();
    p.outbound.close();
    router.peer_detached(p.id);
    assert!(router.map.lookup(b"worker-a").is_none());
    assert!(router.map.identity_of(1).is_some());

    assert_eq!(router.recv().unwrap().unwrap().data(), b"worker-a");
    assert_eq!(router.recv().unwrap().unwrap().data(), b"parting words");
    assert!(!router.has_in());
    router.reap();
    assert!(router.map.identity_of(1).is_none());
  }
}
