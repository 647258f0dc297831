use crate::error::ZmqError;
use crate::message::Msg;
use crate::runtime::Pipe;
use crate::socket::core::Peer;
use crate::socket::{ISocket, SendError};

use std::sync::Arc;

/// Exclusive link to one peer. Further peers are ignored while the first
/// one is attached.
#[derive(Debug, Default)]
pub(crate) struct PairSocket {
  peer: Option<(usize, Arc<Pipe>, Arc<Pipe>)>,
  /// A multipart message is being sent.
  more_out: bool,
}

impl PairSocket {
  pub fn new() -> Self {
    Self::default()
  }
}

impl ISocket for PairSocket {
  fn peer_attached(&mut self, peer: &Peer) {
    let taken = self.peer.as_ref().is_some_and(|(_, inbound, outbound)| {
      !(outbound.is_closed() && inbound.is_drained())
    });
    if taken {
      tracing::debug!(peer_id = peer.id, "PAIR socket already has a peer, ignoring new one");
      return;
    }
    self.peer = Some((peer.id, peer.inbound.clone(), peer.outbound.clone()));
    self.more_out = false;
  }

  fn peer_detached(&mut self, _peer_id: usize) {
    // Keep the inbound pipe until it has been read empty.
  }

  fn send(&mut self, msg: Msg) -> Result<(), SendError> {
    let Some((_, _, outbound)) = &self.peer else {
      return Err(SendError::Again(msg));
    };
    if !self.more_out && !outbound.check_write() {
      return Err(SendError::Again(msg));
    }
    let more = msg.is_more();
    match outbound.write(msg) {
      Ok(()) => {
        self.more_out = more;
        Ok(())
      }
      Err(msg) if self.more_out => {
        // Peer vanished mid-message; the tail is dropped with it.
        drop(msg);
        self.more_out = more;
        Ok(())
      }
      Err(msg) => Err(SendError::Again(msg)),
    }
  }

  fn recv(&mut self) -> Result<Option<Msg>, ZmqError> {
    Ok(self.peer.as_ref().and_then(|(_, inbound, _)| inbound.read()))
  }

  fn has_in(&mut self) -> bool {
    self.peer.as_ref().is_some_and(|(_, inbound, _)| inbound.check_read())
  }

  fn has_out(&mut self) -> bool {
    self.peer.as_ref().is_some_and(|(_, _, outbound)| outbound.check_write())
  }
}
