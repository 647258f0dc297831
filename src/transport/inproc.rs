//! In-process transport: sockets of one context exchange messages over a
//! shared pair of pipes, without any I/O task.

use crate::error::ZmqError;
use crate::message::Blob;
use crate::runtime::{Pipe, Signal};
use crate::socket::core::{RemoteLink, SocketCore};
use crate::socket::SocketType;
use crate::transport::endpoint::{set_cell, EndpointState, StateCell};

use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// What the far side of a link needs to know about a socket.
#[derive(Debug, Clone)]
pub(crate) struct InprocProfile {
  pub socket_type: SocketType,
  pub routing_id: Option<Blob>,
  pub sndhwm: usize,
}

/// A connect waiting for its name to be bound.
struct PendingConnect {
  core: Weak<SocketCore>,
  peer_id: usize,
  state: StateCell,
  /// Binder -> connector.
  inbound: Arc<Pipe>,
  /// Connector -> binder.
  outbound: Arc<Pipe>,
  profile: InprocProfile,
}

struct Binding {
  core: Weak<SocketCore>,
  endpoint_id: usize,
}

#[derive(Default)]
struct InprocName {
  bound: Option<Binding>,
  pending: Vec<PendingConnect>,
}

/// Names bound in one context.
///
/// Lock order: the registry lock may be held while taking a socket lock,
/// never the other way round.
#[derive(Default)]
pub(crate) struct InprocRegistry {
  names: HashMap<String, InprocName>,
}

impl InprocRegistry {
  fn binder(&self, name: &str) -> Option<(Arc<SocketCore>, usize)> {
    let binding = self.names.get(name)?.bound.as_ref()?;
    let core = binding.core.upgrade()?;
    (!core.is_closed()).then_some((core, binding.endpoint_id))
  }

  /// Forgets the binding of `name` if `endpoint_id` still owns it.
  pub fn unbind(&mut self, name: &str, endpoint_id: usize) {
    if let Some(entry) = self.names.get_mut(name) {
      if entry.bound.as_ref().is_some_and(|b| b.endpoint_id == endpoint_id) {
        entry.bound = None;
        tracing::debug!(name, "inproc name unbound");
      }
      if entry.bound.is_none() && entry.pending.is_empty() {
        self.names.remove(name);
      }
    }
  }

  /// Drops a pending connect of peer `peer_id`.
  pub fn cancel(&mut self, name: &str, peer_id: usize) {
    if let Some(entry) = self.names.get_mut(name) {
      entry.pending.retain(|p| p.peer_id != peer_id);
      if entry.bound.is_none() && entry.pending.is_empty() {
        self.names.remove(name);
      }
    }
  }
}

/// Capacities of a link as (connector -> binder, binder -> connector). Each
/// direction holds as many messages as its sender's SNDHWM.
fn link_hwms(connector: &InprocProfile, binder: &InprocProfile) -> (usize, usize) {
  (connector.sndhwm, binder.sndhwm)
}

pub(crate) fn bind(core: &Arc<SocketCore>, name: &str, uri: &str) -> Result<(), ZmqError> {
  let mut registry = core.ctx.inproc.lock();
  if registry.binder(name).is_some() {
    return Err(ZmqError::AddrInUse(uri.to_string()));
  }
  let endpoint_id = core.open_inproc_bind(uri)?;
  let entry = registry.names.entry(name.to_string()).or_default();
  entry.bound = Some(Binding {
    core: Arc::downgrade(core),
    endpoint_id,
  });
  let pending = std::mem::take(&mut entry.pending);
  if !pending.is_empty() {
    tracing::debug!(handle = core.handle, name, count = pending.len(), "Completing queued inproc connects");
  }
  for connect in pending {
    complete_link(core, endpoint_id, connect);
  }
  Ok(())
}

pub(crate) fn connect(core: &Arc<SocketCore>, name: &str, uri: &str) -> Result<(), ZmqError> {
  let mut registry = core.ctx.inproc.lock();
  let binder = registry.binder(name);
  if let Some((binder, _)) = &binder {
    if !core.socket_type.is_compatible(binder.socket_type) {
      return Err(ZmqError::InvalidSocketType("incompatible inproc peer socket type"));
    }
  }

  let profile = core.inproc_profile()?;
  let (_, pipes, state) = core.open_inproc_connect(uri, Signal::new())?;
  let connect = PendingConnect {
    core: Arc::downgrade(core),
    peer_id: pipes.id,
    state,
    inbound: pipes.inbound,
    outbound: pipes.outbound,
    profile,
  };
  match binder {
    Some((binder, endpoint_id)) => complete_link(&binder, endpoint_id, connect),
    None => {
      tracing::debug!(handle = core.handle, name, "inproc name not bound yet, connect queued");
      registry.names.entry(name.to_string()).or_default().pending.push(connect);
    }
  }
  Ok(())
}

/// Joins a connector's pipes to the binding socket. Runs under the registry
/// lock.
fn complete_link(binder: &Arc<SocketCore>, endpoint_id: usize, connect: PendingConnect) {
  let Some(connector) = connect.core.upgrade() else {
    return;
  };
  if !binder.socket_type.is_compatible(connect.profile.socket_type) {
    tracing::warn!(
      handle = binder.handle,
      peer_type = %connect.profile.socket_type,
      "Rejecting inproc connect from incompatible socket type"
    );
    connector.detach_peer(connect.peer_id);
    set_cell(&connect.state, EndpointState::Closed);
    return;
  }
  let binder_profile = match binder.inproc_profile() {
    Ok(profile) => profile,
    Err(_) => return,
  };

  let (to_binder, to_connector) = link_hwms(&connect.profile, &binder_profile);
  connect.outbound.set_hwm(to_binder);
  connect.inbound.set_hwm(to_connector);

  let binder_peer = match binder.attach_inproc_binder(
    endpoint_id,
    connect.outbound.clone(),
    connect.inbound.clone(),
    connect.profile.routing_id.clone(),
    RemoteLink {
      core: connect.core.clone(),
      peer_id: connect.peer_id,
    },
  ) {
    Ok(peer_id) => peer_id,
    Err(e) => {
      tracing::debug!(handle = binder.handle, error = %e, "Binder refused inproc peer");
      return;
    }
  };

  let linked = connector.peer_ready(
    connect.peer_id,
    binder_profile.routing_id,
    Some(RemoteLink {
      core: Arc::downgrade(binder),
      peer_id: binder_peer,
    }),
  );
  if linked {
    set_cell(&connect.state, EndpointState::Connected);
    tracing::debug!(
      binder = binder.handle,
      connector = connector.handle,
      peer_id = binder_peer,
      "inproc link established"
    );
  } else {
    binder.detach_peer(binder_peer);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn link_capacity_follows_each_senders_hwm() {
    let profile = |socket_type, sndhwm| InprocProfile {
      socket_type,
      routing_id: None,
      sndhwm,
    };
    let push = profile(SocketType::Push, 3);
    let pull = profile(SocketType::Pull, 1000);
    assert_eq!(link_hwms(&push, &pull), (3, 1000));
    assert_eq!(link_hwms(&pull, &push), (1000, 3));
  }
}
