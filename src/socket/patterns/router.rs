use crate::message::Blob;
use crate::runtime::Pipe;

use std::collections::HashMap;
use std::sync::Arc;

/// Maps routing identities to peer pipes for ROUTER sockets.
#[derive(Debug)]
pub(crate) struct RouterMap {
  by_identity: HashMap<Blob, (usize, Arc<Pipe>)>,
  by_peer: HashMap<usize, Blob>,
  next_generated: u32,
}

impl Default for RouterMap {
  fn default() -> Self {
    Self::new()
  }
}

impl RouterMap {
  pub fn new() -> Self {
    Self {
      by_identity: HashMap::new(),
      by_peer: HashMap::new(),
      next_generated: rand::random(),
    }
  }

  /// Generated identities are five bytes: a zero byte then a counter.
  /// The zero prefix cannot collide with user-set identities.
  fn generate(&mut self) -> Blob {
    loop {
      self.next_generated = self.next_generated.wrapping_add(1);
      let mut id = vec![0u8];
      id.extend_from_slice(&self.next_generated.to_be_bytes());
      let blob = Blob::from(id);
      if !self.by_identity.contains_key(&blob) {
        return blob;
      }
    }
  }

  /// Registers a peer. A requested identity already held by a live peer
  /// is replaced by a generated one.
  pub fn register(&mut self, peer_id: usize, pipe: Arc<Pipe>, requested: Option<Blob>) -> Blob {
    self.remove(peer_id);
    let identity = match requested.filter(|id| !id.is_empty()) {
      Some(id) => match self.by_identity.get(&id) {
        Some((old_peer, old_pipe)) if !old_pipe.is_closed() => {
          tracing::warn!(
            peer_id,
            existing_peer = *old_peer,
            identity = ?id,
            "Duplicate routing id from peer, assigning a generated one"
          );
          self.generate()
        }
        Some((old_peer, _)) => {
          let old_peer = *old_peer;
          self.by_peer.remove(&old_peer);
          id
        }
        None => id,
      },
      None => self.generate(),
    };
    self.by_identity.insert(identity.clone(), (peer_id, pipe));
    self.by_peer.insert(peer_id, identity.clone());
    identity
  }

  pub fn remove(&mut self, peer_id: usize) {
    if let Some(identity) = self.by_peer.remove(&peer_id) {
      if self.by_identity.get(&identity).is_some_and(|(pid, _)| *pid == peer_id) {
        self.by_identity.remove(&identity);
      }
    }
  }

  /// Stops routing to `peer_id` while keeping its identity for messages
  /// that are still queued from it.
  pub fn unroute(&mut self, peer_id: usize) {
    if let Some(identity) = self.by_peer.get(&peer_id) {
      if self.by_identity.get(identity).is_some_and(|(pid, _)| *pid == peer_id) {
        self.by_identity.remove(identity);
      }
    }
  }

  pub fn identity_of(&self, peer_id: usize) -> Option<&Blob> {
    self.by_peer.get(&peer_id)
  }

  pub fn lookup(&self, identity: &[u8]) -> Option<&(usize, Arc<Pipe>)> {
    self.by_identity.get(identity)
  }
}
