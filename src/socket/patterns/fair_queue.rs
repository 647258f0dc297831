use crate::message::Msg;
use crate::runtime::Pipe;

use std::collections::VecDeque;
use std::sync::Arc;

/// Receives from inbound pipes in round-robin order, one whole message at a
/// time.
///
/// A pipe stays queued after it is closed until its remaining messages have
/// been read. Owners built with `tracking_pruned` learn the ids of pipes
/// dropped that way from `take_pruned`.
#[derive(Debug, Default)]
pub(crate) struct FairQueue {
  pipes: VecDeque<(usize, Arc<Pipe>)>,
  current: Option<(usize, Arc<Pipe>)>,
  track_pruned: bool,
  pruned: Vec<usize>,
}

impl FairQueue {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn tracking_pruned() -> Self {
    Self {
      track_pruned: true,
      ..Self::default()
    }
  }

  pub fn attach(&mut self, id: usize, pipe: Arc<Pipe>) {
    if !self.pipes.iter().any(|(pid, _)| *pid == id) {
      self.pipes.push_back((id, pipe));
    }
  }

  /// Removes a pipe immediately, discarding anything still queued in it.
  pub fn detach(&mut self, id: usize) {
    self.pipes.retain(|(pid, _)| *pid != id);
    if self.current.as_ref().is_some_and(|(pid, _)| *pid == id) {
      self.current = None;
    }
  }

  pub fn has_in(&mut self) -> bool {
    if self.current.is_some() {
      return true;
    }
    self.prune();
    self.pipes.iter().any(|(_, pipe)| pipe.check_read())
  }

  /// Reads the next frame, returning the id of the pipe it came from.
  pub fn recv(&mut self) -> Option<(usize, Msg)> {
    if let Some((id, pipe)) = self.current.take() {
      if let Some(msg) = pipe.read() {
        if msg.is_more() {
          self.current = Some((id, pipe));
        }
        return Some((id, msg));
      }
    }

    for _ in 0..self.pipes.len() {
      let (id, pipe) = self.pipes.pop_front()?;
      match pipe.read() {
        Some(msg) => {
          self.pipes.push_back((id, pipe.clone()));
          if msg.is_more() {
            self.current = Some((id, pipe));
          }
          return Some((id, msg));
        }
        None if pipe.is_drained() => {
          tracing::trace!(pipe_id = id, "FairQueue pruned drained pipe");
          if self.track_pruned {
            self.pruned.push(id);
          }
        }
        None => self.pipes.push_back((id, pipe)),
      }
    }
    None
  }

  /// Ids of pipes dropped since the last call.
  pub fn take_pruned(&mut self) -> Vec<usize> {
    self.prune();
    std::mem::take(&mut self.pruned)
  }

  fn prune(&mut self) {
    let (pruned, track) = (&mut self.pruned, self.track_pruned);
    self.pipes.retain(|(id, pipe)| {
      let keep = !pipe.is_drained();
      if !keep && track {
        pruned.push(*id);
      }
      keep
    });
  }
}
