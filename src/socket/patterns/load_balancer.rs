use crate::message::Msg;
use crate::runtime::Pipe;

use std::collections::VecDeque;
use std::sync::Arc;

/// Distributes messages to writable pipes in round-robin order.
///
/// A multipart message sticks to the pipe its first frame went to. If that
/// pipe goes away mid-message the remaining frames are discarded.
#[derive(Debug, Default)]
pub(crate) struct LoadBalancer {
  pipes: VecDeque<(usize, Arc<Pipe>)>,
  current: Option<(usize, Arc<Pipe>)>,
  /// True while the frames of a multipart message are being sent.
  more: bool,
  /// Id the in-progress message is going to (kept when its pipe vanishes).
  current_id: usize,
}

impl LoadBalancer {
  pub fn attach(&mut self, id: usize, pipe: Arc<Pipe>) {
    if !self.pipes.iter().any(|(pid, _)| *pid == id) {
      self.pipes.push_back((id, pipe));
      tracing::trace!(pipe_id = id, "LoadBalancer added pipe");
    }
  }

  pub fn detach(&mut self, id: usize) {
    self.pipes.retain(|(pid, _)| *pid != id);
    if self.current.as_ref().is_some_and(|(pid, _)| *pid == id) {
      self.current = None;
    }
  }

  /// True if the next frame would be accepted.
  pub fn has_out(&mut self) -> bool {
    if self.more {
      return true;
    }
    self.pipes.retain(|(_, pipe)| !pipe.is_closed());
    self.pipes.iter().any(|(_, pipe)| pipe.check_write())
  }

  /// Sends one frame. Returns the id of the pipe it was queued to, or gives
  /// the frame back if no pipe can take a new message.
  pub fn send(&mut self, msg: Msg) -> Result<usize, Msg> {
    if self.more {
      let more = msg.is_more();
      if let Some((_, pipe)) = &self.current {
        if pipe.write(msg).is_err() {
          self.current = None;
        }
      }
      if !more {
        self.current = None;
        self.more = false;
      }
      return Ok(self.current_id);
    }

    for _ in 0..self.pipes.len() {
      let Some((id, pipe)) = self.pipes.pop_front() else {
        break;
      };
      if pipe.is_closed() {
        tracing::trace!(pipe_id = id, "LoadBalancer pruned closed pipe");
        continue;
      }
      if !pipe.check_write() {
        self.pipes.push_back((id, pipe));
        continue;
      }
      let more = msg.is_more();
      self.pipes.push_back((id, pipe.clone()));
      if let Err(msg) = pipe.write(msg) {
        // Closed between the check and the write.
        self.pipes.retain(|(pid, _)| *pid != id);
        return Err(msg);
      }
      self.current_id = id;
      if more {
        self.current = Some((id, pipe));
        self.more = true;
      }
      return Ok(id);
    }
    Err(msg)
  }
}
