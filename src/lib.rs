//! zmq-engine - a messaging engine speaking ZMTP 3.x over TCP, IPC and
//! in-process transports, built on Tokio.
//!
//! A [`Context`] owns the I/O runtime and creates [`Socket`]s of any of the
//! classic patterns (PAIR, PUB/SUB, XPUB/XSUB, REQ/REP, DEALER/ROUTER,
//! PUSH/PULL). Sockets bind and connect to endpoints, exchange multi-frame
//! messages and can be multiplexed with [`poll`] or relayed with [`proxy`].

pub mod context;
pub(crate) mod engine;
pub mod error;
pub mod message;
pub mod poll;
pub mod protocol;
pub mod proxy;
pub(crate) mod runtime;
pub mod socket;
pub mod transport;

pub use context::{context, Context};
pub use error::{ZmqError, ZmqResult};
pub use message::{Blob, Msg, MsgFlags, RecvFlags, SendFlags};
pub use poll::{poll, PollEvents, PollItem};
pub use proxy::proxy;
pub use socket::options;
pub use socket::{Socket, SocketType, ToBytes};
pub use transport::EndpointState;

// --- Top-Level Functions ---

const VERSION_MAJOR: i32 = 0;
const VERSION_MINOR: i32 = 1;
const VERSION_PATCH: i32 = 0;

/// Returns the library version as a tuple (major, minor, patch).
pub fn version() -> (i32, i32, i32) {
  (VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH)
}

pub fn version_major() -> i32 {
  VERSION_MAJOR
}

pub fn version_minor() -> i32 {
  VERSION_MINOR
}

pub fn version_patch() -> i32 {
  VERSION_PATCH
}
