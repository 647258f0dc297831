//! Message-related types (`Msg`, flags, `Blob`).

mod blob;
mod flags;
mod msg;

pub use blob::Blob;
pub use flags::{MsgFlags, RecvFlags, SendFlags};
pub use msg::Msg;
