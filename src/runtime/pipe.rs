use crate::message::Msg;
use crate::runtime::signal::Signal;

use parking_lot::Mutex;
use std::collections::VecDeque;

struct PipeState {
  frames: VecDeque<Msg>,
  /// Number of complete messages (final frame written) in `frames`.
  msgs: usize,
  /// 0 means unlimited.
  hwm: usize,
  closed: bool,
  /// Raised when a complete message becomes readable or the pipe closes.
  reader: Signal,
  /// Raised when the pipe drops below its HWM or closes.
  writer: Signal,
}

/// A unidirectional, bounded queue of message frames between a socket and
/// one peer (or between two inproc sockets).
///
/// The high-water mark counts complete messages. A message becomes visible
/// to the reader only once its final frame is queued, so readers never
/// observe a partial message. `write` always accepts frames of a message
/// whose first frame passed `check_write`.
///
/// Each end is woken through a `Signal`. An inproc pipe created before its
/// reading socket exists gets the final signal installed later.
pub(crate) struct Pipe {
  state: Mutex<PipeState>,
}

impl Pipe {
  pub fn new(hwm: usize, reader: Signal, writer: Signal) -> Self {
    Self {
      state: Mutex::new(PipeState {
        frames: VecDeque::new(),
        msgs: 0,
        hwm,
        closed: false,
        reader,
        writer,
      }),
    }
  }

  /// True if a new message may be started without exceeding the HWM.
  pub fn check_write(&self) -> bool {
    let state = self.state.lock();
    !state.closed && (state.hwm == 0 || state.msgs < state.hwm)
  }

  /// Queues one frame. Returns the frame back if the pipe is closed.
  pub fn write(&self, msg: Msg) -> Result<(), Msg> {
    let completes = !msg.is_more();
    let reader = {
      let mut state = self.state.lock();
      if state.closed {
        return Err(msg);
      }
      state.frames.push_back(msg);
      if !completes {
        return Ok(());
      }
      state.msgs += 1;
      if state.msgs != 1 {
        return Ok(());
      }
      state.reader.clone()
    };
    reader.raise();
    Ok(())
  }

  /// True if a complete message (or the remainder of one) is queued.
  pub fn check_read(&self) -> bool {
    self.state.lock().msgs > 0
  }

  /// Pops the next frame of a complete message.
  pub fn read(&self) -> Option<Msg> {
    let (msg, wake_writer) = {
      let mut state = self.state.lock();
      if state.msgs == 0 {
        return None;
      }
      let msg = state.frames.pop_front()?;
      if msg.is_more() {
        return Some(msg);
      }
      let before = state.msgs;
      state.msgs -= 1;
      let wake = state.hwm != 0 && before >= state.hwm && state.msgs < state.hwm;
      (msg, wake.then(|| state.writer.clone()))
    };
    if let Some(writer) = wake_writer {
      writer.raise();
    }
    Some(msg)
  }

  pub fn is_closed(&self) -> bool {
    self.state.lock().closed
  }

  /// Closed and holding no complete message.
  pub fn is_drained(&self) -> bool {
    let state = self.state.lock();
    state.closed && state.msgs == 0
  }

  /// Number of complete messages currently queued.
  #[cfg(test)]
  pub fn len(&self) -> usize {
    self.state.lock().msgs
  }

  pub fn set_hwm(&self, hwm: usize) {
    let writer = {
      let mut state = self.state.lock();
      state.hwm = hwm;
      state.writer.clone()
    };
    writer.raise();
  }

  /// Installs the signal of the reading side and wakes it.
  pub fn set_reader_signal(&self, signal: Signal) {
    self.state.lock().reader = signal.clone();
    signal.raise();
  }

  /// Installs the signal of the writing side and wakes it.
  pub fn set_writer_signal(&self, signal: Signal) {
    self.state.lock().writer = signal.clone();
    signal.raise();
  }

  /// Closes the pipe. Queued complete messages stay readable; the frames of
  /// an unfinished trailing message are discarded.
  pub fn close(&self) {
    let (reader, writer) = {
      let mut state = self.state.lock();
      if state.closed {
        return;
      }
      state.closed = true;
      while state.frames.back().is_some_and(|m| m.is_more()) {
        state.frames.pop_back();
      }
      (state.reader.clone(), state.writer.clone())
    };
    reader.raise();
    writer.raise();
  }

  /// Drops everything queued.
  pub fn discard(&self) -> usize {
    let mut state = self.state.lock();
    let dropped = state.msgs;
    state.frames.clear();
    state.msgs = 0;
    dropped
  }

  /// Suspends until a message may be written. Returns false if the pipe
  /// closed first.
  pub async fn writable(&self) -> bool {
    loop {
      let mut waiter = self.state.lock().writer.waiter();
      if self.is_closed() {
        return false;
      }
      if self.check_write() {
        return true;
      }
      waiter.wait().await;
    }
  }

  /// Suspends until a complete message is readable. Returns false if the
  /// pipe is closed and drained.
  pub async fn readable(&self) -> bool {
    loop {
      let mut waiter = self.state.lock().reader.waiter();
      if self.check_read() {
        return true;
      }
      if self.is_closed() {
        return false;
      }
      waiter.wait().await;
    }
  }
}

impl std::fmt::Debug for Pipe {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let state = self.state.lock();
    f.debug_struct("Pipe")
      .field("msgs", &state.msgs)
      .field("frames", &state.frames.len())
      .field("hwm", &state.hwm)
      .field("closed", &state.closed)
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;
  use std::time::Duration;

  fn frame(data: &str, more: bool) -> Msg {
    let mut msg = Msg::from(data);
    msg.set_more(more);
    msg
  }

  fn pipe(hwm: usize) -> Pipe {
    Pipe::new(hwm, Signal::new(), Signal::new())
  }

  #[test]
  fn partial_message_is_invisible_until_complete() {
    let p = pipe(0);
    p.write(frame("a", true)).unwrap();
    assert!(!p.check_read());
    assert!(p.read().is_none());
    p.write(frame("b", false)).unwrap();
    assert!(p.check_read());
    assert_eq!(p.read().unwrap().data(), b"a");
    assert_eq!(p.read().unwrap().data(), b"b");
    assert!(p.read().is_none());
  }

  #[test]
  fn hwm_counts_whole_messages() {
    let p = pipe(2);
    for _ in 0..2 {
      assert!(p.check_write());
      p.write(frame("x", true)).unwrap();
      p.write(frame("y", false)).unwrap();
    }
    assert!(!p.check_write());
    p.read().unwrap();
    assert!(!p.check_write());
    p.read().unwrap();
    assert!(p.check_write());
  }

  #[test]
  fn close_keeps_complete_messages_and_drops_partial_tail() {
    let p = pipe(0);
    p.write(frame("done", false)).unwrap();
    p.write(frame("half", true)).unwrap();
    p.close();
    assert!(p.write(frame("late", false)).is_err());
    assert!(!p.is_drained());
    assert_eq!(p.read().unwrap().data(), b"done");
    assert!(p.read().is_none());
    assert!(p.is_drained());
  }

  #[tokio::test]
  async fn writable_wakes_when_reader_frees_space() {
    let p = Arc::new(pipe(1));
    p.write(frame("1", false)).unwrap();
    let waiter = {
      let p = p.clone();
      tokio::spawn(async move { p.writable().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!waiter.is_finished());
    p.read().unwrap();
    let ok = tokio::time::timeout(Duration::from_millis(200), waiter).await.unwrap().unwrap();
    assert!(ok);
  }

  #[tokio::test]
  async fn readable_returns_false_once_closed_and_drained() {
    let p = pipe(0);
    p.close();
    assert!(!p.readable().await);
  }
}
