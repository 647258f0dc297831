use crate::message::Msg;
use crate::runtime::Pipe;
use crate::socket::patterns::trie::SubscriptionTrie;

use std::sync::Arc;

#[derive(Debug)]
struct DistPeer {
  id: usize,
  pipe: Arc<Pipe>,
  subscriptions: SubscriptionTrie,
}

/// What a subscription control frame changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SubscriptionChange {
  pub subscribe: bool,
  pub topic: Vec<u8>,
  /// The peer's own set changed (first subscribe / matching unsubscribe).
  pub peer_changed: bool,
  /// The union over all peers changed (first subscriber / last one gone).
  pub union_changed: bool,
}

/// Fans messages out to every peer whose subscriptions prefix-match the
/// first frame. Per-peer subscription sets have set semantics; the union
/// over all peers counts subscribing peers.
#[derive(Debug, Default)]
pub(crate) struct Distributor {
  peers: Vec<DistPeer>,
  union: SubscriptionTrie,
  /// Peer ids receiving the multipart message currently being sent.
  matching: Vec<usize>,
  more: bool,
}

impl Distributor {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn attach(&mut self, id: usize, pipe: Arc<Pipe>) {
    if !self.peers.iter().any(|p| p.id == id) {
      tracing::trace!(pipe_id = id, "Distributor added pipe");
      self.peers.push(DistPeer {
        id,
        pipe,
        subscriptions: SubscriptionTrie::new(),
      });
    }
  }

  /// Removes a peer. Returns the topics that no remaining peer subscribes
  /// to any more.
  pub fn detach(&mut self, id: usize) -> Vec<Vec<u8>> {
    let Some(pos) = self.peers.iter().position(|p| p.id == id) else {
      return Vec::new();
    };
    let peer = self.peers.swap_remove(pos);
    self.matching.retain(|m| *m != id);
    peer
      .subscriptions
      .topics()
      .into_iter()
      .filter(|topic| self.union.remove(topic))
      .collect()
  }

  /// Applies a `0x01`/`0x00` prefixed control frame from peer `id`.
  /// Returns `None` if the frame is not a subscription message.
  pub fn apply_subscription(&mut self, id: usize, frame: &[u8]) -> Option<SubscriptionChange> {
    let (&kind, topic) = frame.split_first()?;
    let subscribe = match kind {
      1 => true,
      0 => false,
      _ => return None,
    };
    let peer = self.peers.iter_mut().find(|p| p.id == id)?;
    let (peer_changed, union_changed) = if subscribe {
      if peer.subscriptions.contains(topic) {
        (false, false)
      } else {
        peer.subscriptions.add(topic);
        (true, self.union.add(topic))
      }
    } else if peer.subscriptions.contains(topic) {
      peer.subscriptions.remove(topic);
      (true, self.union.remove(topic))
    } else {
      (false, false)
    };
    tracing::trace!(
      pipe_id = id,
      subscribe,
      topic = %String::from_utf8_lossy(topic),
      peer_changed,
      "Distributor applied subscription"
    );
    Some(SubscriptionChange {
      subscribe,
      topic: topic.to_vec(),
      peer_changed,
      union_changed,
    })
  }

  /// True if every peer matching the next message could take it. Only
  /// meaningful before the first frame of a message.
  pub fn all_writable(&mut self) -> bool {
    self.prune();
    self.peers.iter().all(|p| p.pipe.check_write())
  }

  /// Sends one frame.
  ///
  /// With `nodrop` a message for which some matching peer is at its HWM is
  /// refused (returned) before anything is queued; otherwise such peers
  /// are skipped.
  pub fn send(&mut self, mut msg: Msg, nodrop: bool) -> Result<(), Msg> {
    if !self.more {
      self.prune();
      let data = msg.data();
      let mut blocked = false;
      self.matching.clear();
      for peer in &self.peers {
        if !peer.subscriptions.matches(data) {
          continue;
        }
        if peer.pipe.check_write() {
          self.matching.push(peer.id);
        } else if nodrop {
          blocked = true;
        } else {
          tracing::trace!(pipe_id = peer.id, "Distributor dropped message for peer at HWM");
        }
      }
      if blocked {
        self.matching.clear();
        return Err(msg);
      }
    }

    let more = msg.is_more();
    let targets: Vec<&Arc<Pipe>> = self
      .matching
      .iter()
      .filter_map(|id| self.peers.iter().find(|p| p.id == *id).map(|p| &p.pipe))
      .collect();
    if let Some((last, rest)) = targets.split_last() {
      for pipe in rest {
        let _ = pipe.write(msg.share());
      }
      let _ = last.write(msg);
    }

    self.more = more;
    if !more {
      self.matching.clear();
    }
    Ok(())
  }

  fn prune(&mut self) {
    let union = &mut self.union;
    self.peers.retain(|p| {
      if !p.pipe.is_closed() {
        return true;
      }
      for topic in p.subscriptions.topics() {
        union.remove(&topic);
      }
      false
    });
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::runtime::Signal;

  fn pipe(hwm: usize) -> Arc<Pipe> {
    Arc::new(Pipe::new(hwm, Signal::new(), Signal::new()))
  }

  #[test]
  fn delivers_only_to_matching_peers() {
    let mut dist = Distributor::new();
    let (a, b) = (pipe(0), pipe(0));
    dist.attach(1, a.clone());
    dist.attach(2, b.clone());
    dist.apply_subscription(1, b"\x01news");
    dist.apply_subscription(2, b"\x01");

    dist.send(Msg::from("news: hi"), false).unwrap();
    dist.send(Msg::from("sports"), false).unwrap();
    assert_eq!(a.len(), 1);
    assert_eq!(b.len(), 2);
  }

  #[test]
  fn full_peer_is_dropped_unless_nodrop() {
    let mut dist = Distributor::new();
    let (a, b) = (pipe(1), pipe(0));
    dist.attach(1, a.clone());
    dist.attach(2, b.clone());
    dist.apply_subscription(1, b"\x01");
    dist.apply_subscription(2, b"\x01");

    dist.send(Msg::from("1"), false).unwrap();
    dist.send(Msg::from("2"), false).unwrap();
    assert_eq!(a.len(), 1);
    assert_eq!(b.len(), 2);

    assert!(dist.send(Msg::from("3"), true).is_err());
    assert_eq!(b.len(), 2);
  }

  #[test]
  fn union_tracks_first_and_last_subscriber() {
    let mut dist = Distributor::new();
    dist.attach(1, pipe(0));
    dist.attach(2, pipe(0));
    assert!(dist.apply_subscription(1, b"\x01t").unwrap().union_changed);
    let second = dist.apply_subscription(2, b"\x01t").unwrap();
    assert!(second.peer_changed && !second.union_changed);
    let dup = dist.apply_subscription(2, b"\x01t").unwrap();
    assert!(!dup.peer_changed);
    assert!(!dist.apply_subscription(1, b"\x00t").unwrap().union_changed);
    assert_eq!(dist.detach(2), vec![b"t".to_vec()]);
    assert!(dist.apply_subscription(1, b"\x02t").is_none());
  }
}
