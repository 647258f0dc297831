//! I/O tasks driving stream endpoints: the reconnecting connecter, the
//! accept loop and the per-connection ZMTP session.

pub(crate) mod zmtp;

use crate::runtime::{Pipe, Signal};
use crate::socket::core::SocketCore;
use crate::transport::endpoint::{EndpointLink, EndpointState};
use crate::transport::reconnect::Backoff;
use crate::transport::{StreamConnector, StreamListener};
use zmtp::{handshake, run_session, SessionEnd, HANDSHAKE_TIMEOUT};

use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

/// The pipes of a connect endpoint's single peer. They outlive individual
/// connections so messages queue while reconnecting.
pub(crate) struct PeerPipes {
  pub id: usize,
  pub inbound: Arc<Pipe>,
  pub outbound: Arc<Pipe>,
}

/// Spawns the task behind a connect endpoint.
pub(crate) fn spawn_connecter<C: StreamConnector>(
  core: Arc<SocketCore>,
  link: EndpointLink,
  peer: PeerPipes,
  connector: C,
  backoff: Backoff,
) {
  let ctx = core.ctx.clone();
  ctx.spawn(run_connecter(core, link, peer, connector, backoff));
}

async fn run_connecter<C: StreamConnector>(
  core: Arc<SocketCore>,
  mut link: EndpointLink,
  peer: PeerPipes,
  connector: C,
  mut backoff: Backoff,
) {
  let handle = core.handle;
  tracing::debug!(handle, uri = %link.uri, peer_id = peer.id, "Connecter task started");

  loop {
    if link.is_closing() && (peer.outbound.is_drained() || link.deadline_passed()) {
      break;
    }
    link.set_state(EndpointState::Connecting);

    let attempt = tokio::select! {
      res = connector.connect() => res,
      _ = stop_requested(&mut link, &peer.outbound) => break,
    };

    match attempt {
      Ok(stream) => {
        let config = core.handshake_config();
        let shaken = tokio::select! {
          res = tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake(stream, &config)) => res,
          _ = stop_requested(&mut link, &peer.outbound) => break,
        };
        match shaken {
          Ok(Ok(conn)) => {
            backoff.reset();
            tracing::debug!(handle, uri = %link.uri, peer_id = peer.id, peer_type = conn.peer_type.as_str(), "Connected");
            core.peer_ready(peer.id, conn.peer_identity.clone(), None);
            link.set_state(EndpointState::Connected);
            let end = run_session(conn, &peer.inbound, &peer.outbound, &mut link).await;
            core.peer_disconnected(peer.id);
            match end {
              SessionEnd::Drained | SessionEnd::LingerExpired => break,
              SessionEnd::PeerClosed => tracing::debug!(handle, uri = %link.uri, "Peer closed connection"),
              SessionEnd::Failed(e) => tracing::debug!(handle, uri = %link.uri, error = %e, "Session failed"),
            }
          }
          Ok(Err(e)) => tracing::warn!(handle, uri = %link.uri, error = %e, "Handshake failed"),
          Err(_) => tracing::warn!(handle, uri = %link.uri, "Handshake timed out"),
        }
      }
      Err(e) => tracing::trace!(handle, uri = %link.uri, error = %e, "Connect attempt failed"),
    }

    let Some(delay) = backoff.next_delay() else {
      tracing::debug!(handle, uri = %link.uri, "Reconnection disabled, giving up");
      break;
    };
    tokio::select! {
      _ = tokio::time::sleep(delay) => {}
      _ = stop_requested(&mut link, &peer.outbound) => break,
    }
  }

  peer.outbound.close();
  peer.inbound.close();
  core.detach_peer(peer.id);
  link.set_state(EndpointState::Closed);
  tracing::debug!(handle, uri = %link.uri, "Connecter task finished");
}

/// Completes when a disconnected endpoint should give up: it is closing and
/// either nothing is left to send or the linger deadline passed.
async fn stop_requested(link: &mut EndpointLink, outbound: &Pipe) {
  link.closing().await;
  if outbound.is_drained() {
    return;
  }
  link.linger_expired().await;
}

/// Spawns the accept loop behind a bind endpoint. `make_listener` runs on
/// the context runtime, where registering the socket with the reactor is
/// possible.
pub(crate) fn spawn_listener<L, F>(core: Arc<SocketCore>, link: EndpointLink, make_listener: F)
where
  L: StreamListener,
  F: FnOnce() -> io::Result<L> + Send + 'static,
{
  let ctx = core.ctx.clone();
  ctx.spawn(async move {
    match make_listener() {
      Ok(listener) => run_listener(core, link, listener).await,
      Err(e) => {
        tracing::error!(handle = core.handle, uri = %link.uri, error = %e, "Failed to register listener");
        link.set_state(EndpointState::Closed);
      }
    }
  });
}

async fn run_listener<L: StreamListener>(core: Arc<SocketCore>, mut link: EndpointLink, mut listener: L) {
  let handle = core.handle;
  tracing::debug!(handle, uri = %link.uri, "Listener task started");
  loop {
    let accepted = tokio::select! {
      res = listener.accept() => res,
      _ = link.closing() => break,
    };
    match accepted {
      Ok((stream, peer_addr)) => {
        tracing::debug!(handle, uri = %link.uri, peer = %peer_addr, "Accepted connection");
        let ctx = core.ctx.clone();
        ctx.spawn(run_accepted(core.clone(), link.clone(), stream));
      }
      Err(e) => {
        tracing::warn!(handle, uri = %link.uri, error = %e, "Accept failed");
        if matches!(e.kind(), io::ErrorKind::InvalidInput | io::ErrorKind::BrokenPipe) {
          break;
        }
      }
    }
  }
  drop(listener);
  link.set_state(EndpointState::Closed);
  tracing::debug!(handle, uri = %link.uri, "Listener task finished");
}

async fn run_accepted<S>(core: Arc<SocketCore>, mut link: EndpointLink, stream: S)
where
  S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
  let handle = core.handle;
  let config = core.handshake_config();
  let shaken = tokio::select! {
    res = tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake(stream, &config)) => res,
    _ = link.closing() => return,
  };
  let conn = match shaken {
    Ok(Ok(conn)) => conn,
    Ok(Err(e)) => {
      tracing::warn!(handle, uri = %link.uri, error = %e, "Handshake with accepted peer failed");
      return;
    }
    Err(_) => {
      tracing::warn!(handle, uri = %link.uri, "Handshake with accepted peer timed out");
      return;
    }
  };

  let engine_signal = Signal::new();
  let peer = match core.attach_accepted(link.id, conn.peer_identity.clone(), engine_signal) {
    Ok(peer) => peer,
    Err(e) => {
      tracing::debug!(handle, uri = %link.uri, error = %e, "Socket no longer accepts peers");
      return;
    }
  };
  tracing::debug!(handle, uri = %link.uri, peer_id = peer.id, peer_type = conn.peer_type.as_str(), "Peer attached");

  let end = run_session(conn, &peer.inbound, &peer.outbound, &mut link).await;
  match &end {
    SessionEnd::Failed(e) => tracing::debug!(handle, peer_id = peer.id, error = %e, "Session failed"),
    other => tracing::trace!(handle, peer_id = peer.id, end = ?other, "Session ended"),
  }
  peer.outbound.close();
  peer.inbound.close();
  core.detach_peer(peer.id);
}
