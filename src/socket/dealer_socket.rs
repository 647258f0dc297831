use crate::error::ZmqError;
use crate::message::Msg;
use crate::socket::core::Peer;
use crate::socket::patterns::{FairQueue, LoadBalancer};
use crate::socket::{ISocket, SendError};

/// Asynchronous request/reply: round-robin out, fair-queue in, no envelope
/// handling.
#[derive(Debug, Default)]
pub(crate) struct DealerSocket {
  lb: LoadBalancer,
  fq: FairQueue,
}

impl DealerSocket {
  pub fn new() -> Self {
    Self::default()
  }
}

impl ISocket for DealerSocket {
  fn peer_attached(&mut self, peer: &Peer) {
    self.lb.attach(peer.id, peer.outbound.clone());
    self.fq.attach(peer.id, peer.inbound.clone());
  }

  fn peer_detached(&mut self, peer_id: usize) {
    self.lb.detach(peer_id);
  }

  fn send(&mut self, msg: Msg) -> Result<(), SendError> {
    self.lb.send(msg).map(|_| ()).map_err(SendError::Again)
  }

  fn recv(&mut self) -> Result<Option<Msg>, ZmqError> {
    Ok(self.fq.recv().map(|(_, msg)| msg))
  }

  fn has_in(&mut self) -> bool {
    self.fq.has_in()
  }

  fn has_out(&mut self) -> bool {
    self.lb.has_out()
  }
}
