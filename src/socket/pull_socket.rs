use crate::error::ZmqError;
use crate::message::Msg;
use crate::socket::core::Peer;
use crate::socket::patterns::FairQueue;
use crate::socket::{ISocket, SendError};

/// Fair-queues messages from all peers.
#[derive(Debug, Default)]
pub(crate) struct PullSocket {
  fq: FairQueue,
}

impl PullSocket {
  pub fn new() -> Self {
    Self::default()
  }
}

impl ISocket for PullSocket {
  fn peer_attached(&mut self, peer: &Peer) {
    self.fq.attach(peer.id, peer.inbound.clone());
  }

  // Closed inbound pipes are pruned by the fair queue once drained.
  fn peer_detached(&mut self, _peer_id: usize) {}

  fn send(&mut self, _msg: Msg) -> Result<(), SendError> {
    Err(ZmqError::InvalidSocketType("PULL sockets cannot send").into())
  }

  fn recv(&mut self) -> Result<Option<Msg>, ZmqError> {
    Ok(self.fq.recv().map(|(_, msg)| msg))
  }

  fn has_in(&mut self) -> bool {
    self.fq.has_in()
  }

  fn has_out(&mut self) -> bool {
    false
  }
}
