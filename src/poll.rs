//! Readiness multiplexing across sockets.

use crate::error::ZmqError;
use crate::socket::Socket;

use bitflags::bitflags;
use futures::future::{select_all, FutureExt};
use std::time::Duration;
use tokio::time::Instant;

bitflags! {
  /// Readiness conditions a [`PollItem`] asks about and reports.
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
  pub struct PollEvents: u8 {
    /// At least one message can be received without blocking.
    const POLLIN = 1;
    /// At least one message can be sent without blocking.
    const POLLOUT = 2;
  }
}

/// One socket watched by [`poll`].
#[derive(Debug)]
pub struct PollItem<'a> {
  socket: &'a Socket,
  events: PollEvents,
  revents: PollEvents,
}

impl<'a> PollItem<'a> {
  pub fn new(socket: &'a Socket, events: PollEvents) -> Self {
    Self {
      socket,
      events,
      revents: PollEvents::empty(),
    }
  }

  pub fn socket(&self) -> &'a Socket {
    self.socket
  }

  pub fn events(&self) -> PollEvents {
    self.events
  }

  /// Conditions found ready by the last `poll`.
  pub fn revents(&self) -> PollEvents {
    self.revents
  }

  pub fn is_readable(&self) -> bool {
    self.revents.contains(PollEvents::POLLIN)
  }

  pub fn is_writable(&self) -> bool {
    self.revents.contains(PollEvents::POLLOUT)
  }
}

/// Fills in `revents` and returns the number of ready items.
fn check(items: &mut [PollItem<'_>]) -> Result<usize, ZmqError> {
  let mut ready = 0;
  for item in items.iter_mut() {
    let (readable, writable) = item.socket.core.readiness()?;
    let mut revents = PollEvents::empty();
    revents.set(PollEvents::POLLIN, readable);
    revents.set(PollEvents::POLLOUT, writable);
    item.revents = revents & item.events;
    if !item.revents.is_empty() {
      ready += 1;
    }
  }
  Ok(ready)
}

/// Waits until at least one item is ready or `timeout` elapses.
///
/// `None` waits indefinitely and `Some(Duration::ZERO)` checks once. Returns
/// the number of items with a non-empty `revents`; zero means the timeout
/// expired. Messages are never consumed.
pub async fn poll(items: &mut [PollItem<'_>], timeout: Option<Duration>) -> Result<usize, ZmqError> {
  let deadline = timeout.map(|t| Instant::now() + t);
  if items.is_empty() {
    return match deadline {
      Some(deadline) => {
        tokio::time::sleep_until(deadline).await;
        Ok(0)
      }
      None => Err(ZmqError::InvalidArgument("poll without items or timeout would never return".into())),
    };
  }

  let mut waiters: Vec<_> = items.iter().map(|item| item.socket.core.waiter()).collect();
  loop {
    for waiter in waiters.iter_mut() {
      waiter.arm();
    }
    let ready = check(items)?;
    if ready > 0 || timeout == Some(Duration::ZERO) {
      return Ok(ready);
    }
    let any = select_all(waiters.iter_mut().map(|w| w.wait().boxed()));
    match deadline {
      Some(deadline) => {
        if tokio::time::timeout_at(deadline, any).await.is_err() {
          // One last look so a wake-up racing the deadline is not lost.
          return check(items);
        }
      }
      None => {
        any.await;
      }
    }
  }
}
