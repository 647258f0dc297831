use crate::context::ContextInner;
use crate::engine::{self, zmtp::HandshakeConfig, PeerPipes};
use crate::error::ZmqError;
use crate::message::{Blob, Msg, RecvFlags, SendFlags};
use crate::runtime::{Pipe, Signal, SignalWaiter};
use crate::socket::options::{self, SocketOptions};
use crate::socket::{create_pattern, ISocket, SendError, SocketType};
use crate::transport::endpoint::{Direction, EndpointHandle, EndpointLink, EndpointState, StateCell};
use crate::transport::inproc::{self, InprocProfile};
#[cfg(all(unix, feature = "ipc"))]
use crate::transport::ipc::{self, IpcAcceptor, IpcConnector};
use crate::transport::reconnect::Backoff;
use crate::transport::tcp::{self, TcpAcceptor, TcpConfig, TcpConnector};
use crate::transport::{parse_endpoint, Endpoint, StreamConnector};

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;

/// The socket on the other end of an inproc pipe pair.
#[derive(Debug, Clone)]
pub(crate) struct RemoteLink {
  pub core: Weak<SocketCore>,
  pub peer_id: usize,
}

/// One connected (or connecting) peer of a socket.
#[derive(Debug)]
pub(crate) struct Peer {
  pub id: usize,
  pub endpoint_id: usize,
  /// Peer -> socket.
  pub inbound: Arc<Pipe>,
  /// Socket -> peer.
  pub outbound: Arc<Pipe>,
  /// Identity the peer announced.
  pub routing_id: Option<Blob>,
  pub ready: bool,
  pub(crate) remote: Option<RemoteLink>,
}

pub(crate) struct CoreState {
  pattern: Box<dyn ISocket>,
  pub(crate) options: SocketOptions,
  endpoints: Vec<EndpointHandle>,
  peers: HashMap<usize, Peer>,
  rcvmore: bool,
  last_endpoint: String,
  closed: bool,
}

/// Work left over from releasing endpoints that must run without the
/// socket lock held.
#[derive(Default)]
struct Released {
  remotes: Vec<RemoteLink>,
  inproc_unbind: Vec<(String, usize)>,
  inproc_cancel: Vec<(String, usize)>,
}

impl Released {
  fn run(self, ctx: &ContextInner) {
    for remote in self.remotes {
      if let Some(core) = remote.core.upgrade() {
        core.detach_peer(remote.peer_id);
      }
    }
    if self.inproc_unbind.is_empty() && self.inproc_cancel.is_empty() {
      return;
    }
    let mut registry = ctx.inproc.lock();
    for (name, endpoint_id) in self.inproc_unbind {
      registry.unbind(&name, endpoint_id);
    }
    for (name, peer_id) in self.inproc_cancel {
      registry.cancel(&name, peer_id);
    }
  }
}

impl CoreState {
  fn attach(&mut self, peer: Peer) {
    self.pattern.peer_attached(&peer);
    if peer.ready {
      self.pattern.peer_ready(&peer);
    }
    self.peers.insert(peer.id, peer);
  }

  fn is_active(endpoint: &EndpointHandle) -> bool {
    matches!(endpoint.state(), EndpointState::Connecting | EndpointState::Connected)
  }

  /// Closes the endpoint at `index` and detaches its peers.
  fn release_endpoint(&mut self, index: usize, released: &mut Released) {
    let linger = self.options.linger;
    let (endpoint_id, direction, inproc_name) = {
      let endpoint = &self.endpoints[index];
      let name = match parse_endpoint(&endpoint.requested) {
        Ok(Endpoint::Inproc(name)) => Some(name),
        _ => None,
      };
      (endpoint.id, endpoint.direction, name)
    };

    let peer_ids: Vec<usize> = self
      .peers
      .values()
      .filter(|p| p.endpoint_id == endpoint_id)
      .map(|p| p.id)
      .collect();
    for peer_id in peer_ids {
      let Some(peer) = self.peers.remove(&peer_id) else {
        continue;
      };
      peer.outbound.close();
      peer.inbound.close();
      if linger == Some(Duration::ZERO) && inproc_name.is_none() {
        let dropped = peer.outbound.discard();
        if dropped > 0 {
          tracing::debug!(peer_id, dropped, "Discarded queued messages (linger 0)");
        }
      }
      self.pattern.peer_detached(peer_id);
      match (peer.remote, &inproc_name) {
        (Some(remote), _) => released.remotes.push(remote),
        (None, Some(name)) if direction == Direction::Connect => released.inproc_cancel.push((name.clone(), peer_id)),
        _ => {}
      }
    }

    let endpoint = &self.endpoints[index];
    match inproc_name {
      Some(name) => {
        endpoint.mark_closed();
        if direction == Direction::Bind {
          released.inproc_unbind.push((name, endpoint_id));
        }
      }
      None => endpoint.close(linger),
    }
  }
}

/// State shared between a socket handle and its I/O tasks.
///
/// Every mutation happens under `state`. Pipes raise `signal` when the
/// socket may make progress; blocking operations arm a waiter, check, and
/// wait on it.
pub(crate) struct SocketCore {
  pub handle: usize,
  pub socket_type: SocketType,
  pub ctx: Arc<ContextInner>,
  signal: Signal,
  terminated: AtomicBool,
  state: Mutex<CoreState>,
}

impl SocketCore {
  pub(crate) fn new(ctx: Arc<ContextInner>, handle: usize, socket_type: SocketType) -> Arc<Self> {
    Arc::new(Self {
      handle,
      socket_type,
      ctx,
      signal: Signal::new(),
      terminated: AtomicBool::new(false),
      state: Mutex::new(CoreState {
        pattern: create_pattern(socket_type),
        options: SocketOptions::default(),
        endpoints: Vec::new(),
        peers: HashMap::new(),
        rcvmore: false,
        last_endpoint: String::new(),
        closed: false,
      }),
    })
  }

  fn check_alive(&self, state: &CoreState) -> Result<(), ZmqError> {
    if self.terminated.load(Ordering::Acquire) {
      Err(ZmqError::ContextTerminated)
    } else if state.closed {
      Err(ZmqError::InvalidState("socket is closed"))
    } else {
      Ok(())
    }
  }

  pub(crate) fn waiter(&self) -> SignalWaiter {
    self.signal.waiter()
  }

  async fn wait(waiter: &mut SignalWaiter, deadline: Option<Instant>) -> Result<(), ZmqError> {
    match deadline {
      Some(deadline) => tokio::time::timeout_at(deadline, waiter.wait())
        .await
        .map_err(|_| ZmqError::Timeout),
      None => {
        waiter.wait().await;
        Ok(())
      }
    }
  }

  // --- Data path ---

  fn send_once(&self, msg: Msg) -> Result<Option<Msg>, ZmqError> {
    let mut state = self.state.lock();
    self.check_alive(&state)?;
    match state.pattern.send(msg) {
      Ok(()) => Ok(None),
      Err(SendError::Again(msg)) => Ok(Some(msg)),
      Err(SendError::Failed(e)) => Err(e),
    }
  }

  pub async fn send(&self, mut msg: Msg, flags: SendFlags) -> Result<(), ZmqError> {
    if flags.contains(SendFlags::SNDMORE) {
      msg.set_more(true);
    }
    let timeout = self.state.lock().options.sndtimeo;
    let nonblocking = flags.contains(SendFlags::DONTWAIT) || timeout == Some(Duration::ZERO);
    let deadline = timeout.map(|t| Instant::now() + t);
    let mut waiter = self.signal.waiter();
    loop {
      waiter.arm();
      msg = match self.send_once(msg)? {
        None => return Ok(()),
        Some(msg) => msg,
      };
      if nonblocking {
        return Err(ZmqError::WouldBlock);
      }
      Self::wait(&mut waiter, deadline).await?;
    }
  }

  pub fn try_send(&self, msg: Msg) -> Result<(), ZmqError> {
    match self.send_once(msg)? {
      None => Ok(()),
      Some(_) => Err(ZmqError::WouldBlock),
    }
  }

  fn recv_once(&self) -> Result<Option<Msg>, ZmqError> {
    let mut state = self.state.lock();
    self.check_alive(&state)?;
    let msg = state.pattern.recv()?;
    if let Some(msg) = &msg {
      state.rcvmore = msg.is_more();
    }
    Ok(msg)
  }

  pub async fn recv(&self, flags: RecvFlags) -> Result<Msg, ZmqError> {
    let timeout = self.state.lock().options.rcvtimeo;
    let nonblocking = flags.contains(RecvFlags::DONTWAIT) || timeout == Some(Duration::ZERO);
    let deadline = timeout.map(|t| Instant::now() + t);
    let mut waiter = self.signal.waiter();
    loop {
      waiter.arm();
      if let Some(msg) = self.recv_once()? {
        return Ok(msg);
      }
      if nonblocking {
        return Err(ZmqError::WouldBlock);
      }
      Self::wait(&mut waiter, deadline).await?;
    }
  }

  pub fn try_recv(&self) -> Result<Msg, ZmqError> {
    self.recv_once()?.ok_or(ZmqError::WouldBlock)
  }

  /// Current (readable, writable) state.
  pub fn readiness(&self) -> Result<(bool, bool), ZmqError> {
    let mut state = self.state.lock();
    self.check_alive(&state)?;
    Ok((state.pattern.has_in(), state.pattern.has_out()))
  }

  // --- Options ---

  pub fn set_option(&self, option: i32, value: &[u8]) -> Result<(), ZmqError> {
    let mut state = self.state.lock();
    self.check_alive(&state)?;
    if matches!(
      option,
      options::RCVMORE | options::EVENTS | options::TYPE | options::LAST_ENDPOINT
    ) {
      return Err(ZmqError::InvalidOption(option));
    }
    if !state.options.apply(option, value)? {
      state.pattern.set_pattern_option(option, value)?;
    }
    tracing::debug!(handle = self.handle, option, "Socket option set");
    drop(state);
    // Subscriptions may have changed what is readable.
    self.signal.raise();
    Ok(())
  }

  pub fn get_option(&self, option: i32) -> Result<Vec<u8>, ZmqError> {
    let mut state = self.state.lock();
    self.check_alive(&state)?;
    match option {
      options::RCVMORE => Ok((state.rcvmore as i32).to_ne_bytes().to_vec()),
      options::EVENTS => {
        let mut events = 0i32;
        if state.pattern.has_in() {
          events |= 1;
        }
        if state.pattern.has_out() {
          events |= 2;
        }
        Ok(events.to_ne_bytes().to_vec())
      }
      options::TYPE => Ok(self.socket_type.as_i32().to_ne_bytes().to_vec()),
      options::LAST_ENDPOINT => Ok(state.last_endpoint.clone().into_bytes()),
      _ => match state.options.get(option) {
        Some(value) => Ok(value),
        None => state.pattern.get_pattern_option(option),
      },
    }
  }

  pub(crate) fn handshake_config(&self) -> HandshakeConfig {
    let state = self.state.lock();
    HandshakeConfig {
      socket_type: self.socket_type,
      routing_id: state.options.routing_id.clone(),
      maxmsgsize: state.options.maxmsgsize,
    }
  }

  // --- Endpoints ---

  fn add_endpoint(
    &self,
    uri: String,
    requested: &str,
    direction: Direction,
    initial: EndpointState,
  ) -> Result<(usize, EndpointLink, StateCell), ZmqError> {
    let id = self.ctx.next_id();
    let mut state = self.state.lock();
    self.check_alive(&state)?;
    state.endpoints.retain(|e| e.state() != EndpointState::Closed);
    let (handle, link) = EndpointHandle::new(id, uri.clone(), requested.to_string(), direction, initial);
    let cell = handle.state_cell();
    state.endpoints.push(handle);
    state.last_endpoint = uri;
    Ok((id, link, cell))
  }

  fn new_pipes(&self, options: &SocketOptions, engine_signal: Signal) -> (Arc<Pipe>, Arc<Pipe>) {
    let inbound = Arc::new(Pipe::new(options.rcvhwm, self.signal.clone(), engine_signal.clone()));
    let outbound = Arc::new(Pipe::new(options.sndhwm, engine_signal, self.signal.clone()));
    (inbound, outbound)
  }

  pub fn bind(this: &Arc<Self>, uri: &str) -> Result<(), ZmqError> {
    let endpoint = parse_endpoint(uri)?;
    this.check_alive(&this.state.lock())?;
    match endpoint {
      Endpoint::Tcp { host, port } => {
        let (listener, resolved) = tcp::bind_std(&host, port, uri)?;
        let config = TcpConfig::from(&this.state.lock().options);
        let (_, link, _) = this.add_endpoint(resolved, uri, Direction::Bind, EndpointState::Connected)?;
        engine::spawn_listener(this.clone(), link, move || TcpAcceptor::from_std(listener, config));
      }
      #[cfg(all(unix, feature = "ipc"))]
      Endpoint::Ipc(path) => {
        let listener = ipc::bind_std(&path, uri)?;
        let link = match this.add_endpoint(uri.to_string(), uri, Direction::Bind, EndpointState::Connected) {
          Ok((_, link, _)) => link,
          Err(e) => {
            ipc::cleanup(&path);
            return Err(e);
          }
        };
        engine::spawn_listener(this.clone(), link, move || IpcAcceptor::from_std(listener, path));
      }
      Endpoint::Inproc(name) => inproc::bind(this, &name, uri)?,
    }
    tracing::debug!(handle = this.handle, uri, "Socket bound");
    Ok(())
  }

  pub fn connect(this: &Arc<Self>, uri: &str) -> Result<(), ZmqError> {
    match parse_endpoint(uri)? {
      Endpoint::Tcp { host, port } => {
        let port = port.ok_or_else(|| ZmqError::InvalidEndpoint(uri.to_string()))?;
        Self::connect_stream(this, uri, |options| TcpConnector {
          host,
          port,
          config: TcpConfig::from(options),
        })?;
      }
      #[cfg(all(unix, feature = "ipc"))]
      Endpoint::Ipc(path) => Self::connect_stream(this, uri, |_| IpcConnector { path })?,
      Endpoint::Inproc(name) => inproc::connect(this, &name, uri)?,
    }
    tracing::debug!(handle = this.handle, uri, "Socket connecting");
    Ok(())
  }

  fn connect_stream<C, F>(this: &Arc<Self>, uri: &str, make_connector: F) -> Result<(), ZmqError>
  where
    C: StreamConnector,
    F: FnOnce(&SocketOptions) -> C,
  {
    let peer_id = this.ctx.next_id();
    let (endpoint_id, link, _) = this.add_endpoint(uri.to_string(), uri, Direction::Connect, EndpointState::Connecting)?;
    let engine_signal = Signal::new();
    let (pipes, connector, backoff) = {
      let mut state = this.state.lock();
      this.check_alive(&state)?;
      let connector = make_connector(&state.options);
      let backoff = Backoff::new(state.options.reconnect_ivl, state.options.reconnect_ivl_max);
      let (inbound, outbound) = this.new_pipes(&state.options, engine_signal);
      state.attach(Peer {
        id: peer_id,
        endpoint_id,
        inbound: inbound.clone(),
        outbound: outbound.clone(),
        routing_id: None,
        ready: false,
        remote: None,
      });
      (
        PeerPipes {
          id: peer_id,
          inbound,
          outbound,
        },
        connector,
        backoff,
      )
    };
    this.signal.raise();
    engine::spawn_connecter(this.clone(), link, pipes, connector, backoff);
    Ok(())
  }

  fn release_matching(&self, uri: &str, direction: Direction) -> Result<(), ZmqError> {
    let released = {
      let mut state = self.state.lock();
      self.check_alive(&state)?;
      let indices: Vec<usize> = state
        .endpoints
        .iter()
        .enumerate()
        .filter(|(_, e)| e.direction == direction && CoreState::is_active(e) && e.matches(uri))
        .map(|(i, _)| i)
        .collect();
      if indices.is_empty() {
        return Err(ZmqError::InvalidEndpoint(uri.to_string()));
      }
      let mut released = Released::default();
      for index in indices {
        state.release_endpoint(index, &mut released);
      }
      released
    };
    released.run(&self.ctx);
    self.signal.raise();
    tracing::debug!(handle = self.handle, uri, ?direction, "Endpoint released");
    Ok(())
  }

  pub fn unbind(&self, uri: &str) -> Result<(), ZmqError> {
    self.release_matching(uri, Direction::Bind)
  }

  pub fn disconnect(&self, uri: &str) -> Result<(), ZmqError> {
    self.release_matching(uri, Direction::Connect)
  }

  pub fn endpoint_state(&self, uri: &str) -> Option<EndpointState> {
    let state = self.state.lock();
    state.endpoints.iter().rev().find(|e| e.matches(uri)).map(|e| e.state())
  }

  // --- Peer lifecycle (driven by I/O tasks and inproc links) ---

  /// Attaches a freshly handshaken peer of a bind endpoint.
  pub(crate) fn attach_accepted(
    &self,
    endpoint_id: usize,
    routing_id: Option<Blob>,
    engine_signal: Signal,
  ) -> Result<PeerPipes, ZmqError> {
    let peer_id = self.ctx.next_id();
    let pipes = {
      let mut state = self.state.lock();
      self.check_alive(&state)?;
      if !state.endpoints.iter().any(|e| e.id == endpoint_id && CoreState::is_active(e)) {
        return Err(ZmqError::InvalidState("endpoint is closing"));
      }
      let (inbound, outbound) = self.new_pipes(&state.options, engine_signal);
      state.attach(Peer {
        id: peer_id,
        endpoint_id,
        inbound: inbound.clone(),
        outbound: outbound.clone(),
        routing_id,
        ready: true,
        remote: None,
      });
      PeerPipes {
        id: peer_id,
        inbound,
        outbound,
      }
    };
    self.signal.raise();
    Ok(pipes)
  }

  /// Marks a connect peer as connected. Returns false if the peer is gone.
  pub(crate) fn peer_ready(&self, peer_id: usize, routing_id: Option<Blob>, remote: Option<RemoteLink>) -> bool {
    {
      let mut guard = self.state.lock();
      let state = &mut *guard;
      let Some(peer) = state.peers.get_mut(&peer_id) else {
        return false;
      };
      peer.ready = true;
      peer.routing_id = routing_id;
      if remote.is_some() {
        peer.remote = remote;
      }
      state.pattern.peer_ready(peer);
    }
    self.signal.raise();
    true
  }

  pub(crate) fn peer_disconnected(&self, peer_id: usize) {
    {
      let mut state = self.state.lock();
      match state.peers.get_mut(&peer_id) {
        Some(peer) => peer.ready = false,
        None => return,
      }
      state.pattern.peer_disconnected(peer_id);
    }
    self.signal.raise();
  }

  /// Removes a peer for good. Its inproc counterpart is detached as well.
  pub(crate) fn detach_peer(&self, peer_id: usize) {
    let remote = {
      let mut state = self.state.lock();
      let Some(peer) = state.peers.remove(&peer_id) else {
        return;
      };
      peer.inbound.close();
      peer.outbound.close();
      state.pattern.peer_detached(peer_id);
      peer.remote
    };
    tracing::debug!(handle = self.handle, peer_id, "Peer detached");
    self.signal.raise();
    if let Some(remote) = remote {
      if let Some(core) = remote.core.upgrade() {
        core.detach_peer(remote.peer_id);
      }
    }
  }

  // --- inproc ---

  pub(crate) fn inproc_profile(&self) -> Result<InprocProfile, ZmqError> {
    let state = self.state.lock();
    self.check_alive(&state)?;
    Ok(InprocProfile {
      socket_type: self.socket_type,
      routing_id: state.options.routing_id.clone(),
      sndhwm: state.options.sndhwm,
    })
  }

  pub(crate) fn open_inproc_bind(&self, uri: &str) -> Result<usize, ZmqError> {
    let (id, _link, _) = self.add_endpoint(uri.to_string(), uri, Direction::Bind, EndpointState::Connected)?;
    Ok(id)
  }

  /// Creates an inproc connect endpoint and its not yet linked peer. The
  /// far ends of the pipes signal `far_signal` until the link completes.
  pub(crate) fn open_inproc_connect(&self, uri: &str, far_signal: Signal) -> Result<(usize, PeerPipes, StateCell), ZmqError> {
    let peer_id = self.ctx.next_id();
    let (endpoint_id, _link, cell) = self.add_endpoint(uri.to_string(), uri, Direction::Connect, EndpointState::Connecting)?;
    let pipes = {
      let mut state = self.state.lock();
      self.check_alive(&state)?;
      let (inbound, outbound) = self.new_pipes(&state.options, far_signal);
      state.attach(Peer {
        id: peer_id,
        endpoint_id,
        inbound: inbound.clone(),
        outbound: outbound.clone(),
        routing_id: None,
        ready: false,
        remote: None,
      });
      PeerPipes {
        id: peer_id,
        inbound,
        outbound,
      }
    };
    self.signal.raise();
    Ok((endpoint_id, pipes, cell))
  }

  /// Attaches the binding side of an inproc pipe pair. `inbound` and
  /// `outbound` are the connector's pipes seen from this side.
  pub(crate) fn attach_inproc_binder(
    &self,
    endpoint_id: usize,
    inbound: Arc<Pipe>,
    outbound: Arc<Pipe>,
    routing_id: Option<Blob>,
    remote: RemoteLink,
  ) -> Result<usize, ZmqError> {
    let peer_id = self.ctx.next_id();
    {
      let mut state = self.state.lock();
      self.check_alive(&state)?;
      if !state.endpoints.iter().any(|e| e.id == endpoint_id && CoreState::is_active(e)) {
        return Err(ZmqError::InvalidState("endpoint is closing"));
      }
      inbound.set_reader_signal(self.signal.clone());
      outbound.set_writer_signal(self.signal.clone());
      state.attach(Peer {
        id: peer_id,
        endpoint_id,
        inbound,
        outbound,
        routing_id,
        ready: true,
        remote: Some(remote),
      });
    }
    self.signal.raise();
    Ok(peer_id)
  }

  // --- Shutdown ---

  /// Closes every endpoint; queued messages drain per `LINGER`.
  pub fn close(&self) {
    self.shutdown();
  }

  /// Fails current and future operations with `ContextTerminated`, then
  /// closes.
  pub(crate) fn terminate(&self) {
    self.terminated.store(true, Ordering::Release);
    self.shutdown();
  }

  pub(crate) fn is_closed(&self) -> bool {
    self.state.lock().closed
  }

  fn shutdown(&self) {
    let released = {
      let mut state = self.state.lock();
      if state.closed {
        None
      } else {
        state.closed = true;
        let mut released = Released::default();
        for index in 0..state.endpoints.len() {
          if CoreState::is_active(&state.endpoints[index]) {
            state.release_endpoint(index, &mut released);
          }
        }
        Some(released)
      }
    };
    self.signal.raise();
    if let Some(released) = released {
      released.run(&self.ctx);
      self.ctx.unregister_socket(self.handle);
      tracing::debug!(handle = self.handle, socket_type = %self.socket_type, "Socket closed");
    }
  }
}

impl std::fmt::Debug for SocketCore {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SocketCore")
      .field("handle", &self.handle)
      .field("socket_type", &self.socket_type)
      .finish_non_exhaustive()
  }
}
