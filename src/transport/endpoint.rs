use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Observable state of a bound or connected endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointState {
  /// Connect endpoint without a live connection; messages are queued.
  Connecting,
  /// Connected, or (for a bind endpoint) listening.
  Connected,
  /// Closed by the socket; queued messages are being drained.
  Closing,
  Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
  Bind,
  Connect,
}

/// Instruction from the socket to the endpoint's I/O tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EndpointControl {
  Running,
  /// Drain queued messages until `deadline` (`None` = no bound).
  Closing { deadline: Option<Instant> },
}

/// The socket's side of an endpoint.
#[derive(Debug)]
pub(crate) struct EndpointHandle {
  pub id: usize,
  /// Resolved address (what `LAST_ENDPOINT` reports).
  pub uri: String,
  /// Address as passed to `bind`/`connect`.
  pub requested: String,
  pub direction: Direction,
  state: Arc<Mutex<EndpointState>>,
  control: Arc<watch::Sender<EndpointControl>>,
}

/// The I/O task's side of an endpoint. It keeps the control channel open
/// so the socket may forget the handle while the task still lingers.
#[derive(Debug, Clone)]
pub(crate) struct EndpointLink {
  pub id: usize,
  pub uri: String,
  state: Arc<Mutex<EndpointState>>,
  control: watch::Receiver<EndpointControl>,
  _sender: Arc<watch::Sender<EndpointControl>>,
}

impl EndpointHandle {
  pub fn new(id: usize, uri: String, requested: String, direction: Direction, initial: EndpointState) -> (Self, EndpointLink) {
    let state = Arc::new(Mutex::new(initial));
    let (control, control_rx) = watch::channel(EndpointControl::Running);
    let control = Arc::new(control);
    let link = EndpointLink {
      id,
      uri: uri.clone(),
      state: state.clone(),
      control: control_rx,
      _sender: control.clone(),
    };
    (
      Self {
        id,
        uri,
        requested,
        direction,
        state,
        control,
      },
      link,
    )
  }

  pub fn state(&self) -> EndpointState {
    *self.state.lock()
  }

  pub fn matches(&self, uri: &str) -> bool {
    self.uri == uri || self.requested == uri
  }

  /// Starts the linger phase. `linger` of `None` drains without bound.
  pub fn close(&self, linger: Option<Duration>) {
    {
      let mut state = self.state.lock();
      if *state == EndpointState::Closed {
        return;
      }
      *state = EndpointState::Closing;
    }
    let deadline = linger.map(|l| Instant::now() + l);
    self.control.send_replace(EndpointControl::Closing { deadline });
  }

  /// Marks an endpoint without I/O tasks (inproc) as closed.
  pub fn mark_closed(&self) {
    *self.state.lock() = EndpointState::Closed;
  }

  pub fn state_cell(&self) -> Arc<Mutex<EndpointState>> {
    self.state.clone()
  }
}

impl EndpointLink {
  /// Updates the state unless the endpoint is already closing.
  pub fn set_state(&self, next: EndpointState) {
    let mut state = self.state.lock();
    let closing = matches!(*state, EndpointState::Closing | EndpointState::Closed);
    if !closing || next == EndpointState::Closed {
      *state = next;
    }
  }

  pub fn is_closing(&self) -> bool {
    matches!(*self.control.borrow(), EndpointControl::Closing { .. })
  }

  pub fn deadline_passed(&self) -> bool {
    match *self.control.borrow() {
      EndpointControl::Closing { deadline: Some(d) } => Instant::now() >= d,
      _ => false,
    }
  }

  /// Completes once the endpoint starts closing.
  pub async fn closing(&mut self) {
    loop {
      if self.is_closing() {
        return;
      }
      if self.control.changed().await.is_err() {
        return;
      }
    }
  }

  /// Completes once the endpoint is closing and its linger deadline passed.
  /// Pends forever under an unbounded linger.
  pub async fn linger_expired(&mut self) {
    self.closing().await;
    let control = *self.control.borrow();
    match control {
      EndpointControl::Closing { deadline: Some(d) } => tokio::time::sleep_until(d).await,
      EndpointControl::Closing { deadline: None } => futures::future::pending::<()>().await,
      EndpointControl::Running => {}
    }
  }
}

/// Shared state cell for endpoints driven outside of an I/O task (inproc).
pub(crate) type StateCell = Arc<Mutex<EndpointState>>;

pub(crate) fn set_cell(cell: &StateCell, next: EndpointState) {
  let mut state = cell.lock();
  if !matches!(*state, EndpointState::Closing | EndpointState::Closed) {
    *state = next;
  }
}
