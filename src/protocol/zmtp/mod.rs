//! ZMTP 3.0 framing, greeting and the commands spoken by the NULL mechanism.

pub mod codec;
pub mod command;
pub mod greeting;

pub use codec::ZmtpCodec;
pub use command::*;
pub use greeting::{ZmtpGreeting, GREETING_LENGTH, MECHANISM_LENGTH};
