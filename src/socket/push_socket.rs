use crate::error::ZmqError;
use crate::message::Msg;
use crate::socket::core::Peer;
use crate::socket::patterns::LoadBalancer;
use crate::socket::{ISocket, SendError};

/// Round-robins messages over peers that have room.
#[derive(Debug, Default)]
pub(crate) struct PushSocket {
  lb: LoadBalancer,
}

impl PushSocket {
  pub fn new() -> Self {
    Self::default()
  }
}

impl ISocket for PushSocket {
  fn peer_attached(&mut self, peer: &Peer) {
    self.lb.attach(peer.id, peer.outbound.clone());
  }

  fn peer_detached(&mut self, peer_id: usize) {
    self.lb.detach(peer_id);
  }

  fn send(&mut self, msg: Msg) -> Result<(), SendError> {
    self.lb.send(msg).map(|_| ()).map_err(SendError::Again)
  }

  fn recv(&mut self) -> Result<Option<Msg>, ZmqError> {
    Err(ZmqError::InvalidSocketType("PUSH sockets cannot receive"))
  }

  fn has_in(&mut self) -> bool {
    false
  }

  fn has_out(&mut self) -> bool {
    self.lb.has_out()
  }
}
