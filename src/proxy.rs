//! Built-in bidirectional relay between two sockets.

use crate::error::ZmqError;
use crate::message::Msg;
use crate::poll::{poll, PollEvents, PollItem};
use crate::socket::Socket;

/// Relays messages between `frontend` and `backend` until a terminal error.
///
/// Whole messages are forwarded in both directions. Each forwarded message is
/// first offered to `capture` without blocking; a full or absent capture
/// peer never slows the relay. Capture takes a message whole or not at all. Returns the error that stopped it, typically
/// `ContextTerminated`.
pub async fn proxy(frontend: &Socket, backend: &Socket, capture: Option<&Socket>) -> Result<(), ZmqError> {
  tracing::debug!(
    frontend = %frontend.socket_type(),
    backend = %backend.socket_type(),
    capture = capture.is_some(),
    "Proxy started"
  );
  loop {
    let mut items = [
      PollItem::new(frontend, PollEvents::POLLIN),
      PollItem::new(backend, PollEvents::POLLIN),
    ];
    poll(&mut items, None).await?;
    let (front_ready, back_ready) = (items[0].is_readable(), items[1].is_readable());
    if front_ready {
      forward(frontend, backend, capture).await?;
    }
    if back_ready {
      forward(backend, frontend, capture).await?;
    }
  }
}

/// Moves one whole message from `from` to `to`.
async fn forward(from: &Socket, to: &Socket, capture: Option<&Socket>) -> Result<(), ZmqError> {
  let mut frame = match from.try_recv() {
    Ok(frame) => frame,
    Err(ZmqError::WouldBlock) => return Ok(()),
    Err(e) => return Err(e),
  };
  // Capture is decided at the first frame and holds for the whole message.
  let mut capturing = capture.is_some();
  loop {
    let more = frame.is_more();
    if capturing {
      if let Some(capture) = capture {
        capturing = offer(capture, frame.share())?;
      }
    }
    relay(to, frame).await?;
    if !more {
      return Ok(());
    }
    frame = from.recv().await?;
  }
}

async fn relay(to: &Socket, frame: Msg) -> Result<(), ZmqError> {
  match to.send(frame).await {
    Ok(()) => Ok(()),
    Err(e) if e.is_terminal() => Err(e),
    Err(e) => {
      tracing::debug!(error = %e, socket_type = %to.socket_type(), "Proxy dropped frame");
      Ok(())
    }
  }
}

/// Hands a frame to capture. `Ok(false)` means capture refused it and must
/// not see the rest of the message.
fn offer(capture: &Socket, frame: Msg) -> Result<bool, ZmqError> {
  match capture.try_send(frame) {
    Ok(()) => Ok(true),
    Err(e) if e.is_terminal() => Err(e),
    Err(_) => Ok(false),
  }
}
