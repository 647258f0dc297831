//! Sockets: the public handle, the shared core and one routing policy per
//! socket type.

pub(crate) mod core;
pub mod options;
pub(crate) mod patterns;
pub mod types;

mod dealer_socket;
mod pair_socket;
mod pub_socket;
mod pull_socket;
mod push_socket;
mod rep_socket;
mod req_socket;
mod router_socket;
mod sub_socket;
mod xpub_socket;
mod xsub_socket;

pub use types::{Socket, SocketType, ToBytes};

use crate::error::ZmqError;
use crate::message::Msg;
use self::core::Peer;

/// Outcome of a refused `ISocket::send`.
#[derive(Debug)]
pub(crate) enum SendError {
  /// No peer can take the frame right now; the frame is handed back.
  Again(Msg),
  Failed(ZmqError),
}

impl From<ZmqError> for SendError {
  fn from(e: ZmqError) -> Self {
    SendError::Failed(e)
  }
}

/// Routing policy of one socket type.
///
/// Implementations are plain state machines driven by `SocketCore` under
/// the socket lock; they never block. `send` and `recv` work frame by frame
/// and report "not now" (`SendError::Again`, `Ok(None)`) so the core can
/// wait on the socket signal.
pub(crate) trait ISocket: Send {
  /// A peer and its pipes now exist. Connect peers attach before their
  /// connection is up.
  fn peer_attached(&mut self, peer: &Peer);

  /// The peer completed its handshake (or inproc link).
  fn peer_ready(&mut self, _peer: &Peer) {}

  /// A connect peer lost its connection; its pipes stay.
  fn peer_disconnected(&mut self, _peer_id: usize) {}

  /// The peer is gone for good. Its pipes are already closed.
  fn peer_detached(&mut self, peer_id: usize);

  fn send(&mut self, msg: Msg) -> Result<(), SendError>;

  fn recv(&mut self) -> Result<Option<Msg>, ZmqError>;

  /// A `recv` would return a frame now.
  fn has_in(&mut self) -> bool;

  /// A `send` of a new message would be accepted now.
  fn has_out(&mut self) -> bool;

  fn set_pattern_option(&mut self, option: i32, _value: &[u8]) -> Result<(), ZmqError> {
    Err(ZmqError::InvalidOption(option))
  }

  fn get_pattern_option(&self, option: i32) -> Result<Vec<u8>, ZmqError> {
    Err(ZmqError::InvalidOption(option))
  }
}

/// Creates the routing policy for `socket_type`.
pub(crate) fn create_pattern(socket_type: SocketType) -> Box<dyn ISocket> {
  match socket_type {
    SocketType::Pair => Box::new(pair_socket::PairSocket::new()),
    SocketType::Pub => Box::new(pub_socket::PubSocket::new()),
    SocketType::Sub => Box::new(sub_socket::SubSocket::new()),
    SocketType::Req => Box::new(req_socket::ReqSocket::new()),
    SocketType::Rep => Box::new(rep_socket::RepSocket::new()),
    SocketType::Dealer => Box::new(dealer_socket::DealerSocket::new()),
    SocketType::Router => Box::new(router_socket::RouterSocket::new()),
    SocketType::Pull => Box::new(pull_socket::PullSocket::new()),
    SocketType::Push => Box::new(push_socket::PushSocket::new()),
    SocketType::XPub => Box::new(xpub_socket::XPubSocket::new(false)),
    SocketType::XSub => Box::new(xsub_socket::XSubSocket::new()),
  }
}
