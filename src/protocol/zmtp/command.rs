use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ZmqError;
use crate::message::{Msg, MsgFlags};

// --- ZMTP Frame Flags ---
pub const ZMTP_FLAG_MORE: u8 = 0b0000_0001;
pub const ZMTP_FLAG_LONG: u8 = 0b0000_0010;
pub const ZMTP_FLAG_COMMAND: u8 = 0b0000_0100;

// --- ZMTP Command Names ---
pub const ZMTP_CMD_READY_NAME: &[u8] = b"READY";
pub const ZMTP_CMD_ERROR_NAME: &[u8] = b"ERROR";

// --- READY metadata properties ---
pub const PROPERTY_SOCKET_TYPE: &str = "Socket-Type";
pub const PROPERTY_IDENTITY: &str = "Identity";

/// Mechanism field of the greeting for the NULL security mechanism.
pub const NULL_MECHANISM: &[u8; 20] = b"NULL\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0";

/// Commands exchanged during and after the NULL handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZmtpCommand {
  /// READY with its metadata properties, in wire order.
  Ready(Vec<(String, Bytes)>),
  /// ERROR with a reason string.
  Error(String),
  /// Any other command; the name is kept for logging.
  Unknown(Bytes),
}

impl ZmtpCommand {
  /// Parses the body of a frame marked with `MsgFlags::COMMAND`.
  pub fn parse(msg: &Msg) -> Result<Self, ZmqError> {
    if !msg.is_command() {
      return Err(ZmqError::ProtocolViolation("expected a command frame".into()));
    }
    let mut body = msg.data();
    let name = read_short_string(&mut body)?;
    if name == ZMTP_CMD_READY_NAME {
      let mut properties = Vec::new();
      while body.has_remaining() {
        let key = read_short_string(&mut body)?;
        if body.remaining() < 4 {
          return Err(ZmqError::ProtocolViolation("truncated READY property".into()));
        }
        let len = body.get_u32() as usize;
        if body.remaining() < len {
          return Err(ZmqError::ProtocolViolation("truncated READY property value".into()));
        }
        let value = Bytes::copy_from_slice(&body[..len]);
        body.advance(len);
        properties.push((String::from_utf8_lossy(key).into_owned(), value));
      }
      Ok(ZmtpCommand::Ready(properties))
    } else if name == ZMTP_CMD_ERROR_NAME {
      let reason = read_short_string(&mut body).unwrap_or_default();
      Ok(ZmtpCommand::Error(String::from_utf8_lossy(reason).into_owned()))
    } else {
      Ok(ZmtpCommand::Unknown(Bytes::copy_from_slice(name)))
    }
  }

  /// Builds a READY command frame carrying the given properties.
  pub fn create_ready(properties: &[(&str, &[u8])]) -> Msg {
    let mut body = BytesMut::with_capacity(64);
    put_short_string(&mut body, ZMTP_CMD_READY_NAME);
    for (key, value) in properties {
      put_short_string(&mut body, key.as_bytes());
      body.put_u32(value.len() as u32);
      body.put_slice(value);
    }
    let mut msg = Msg::from_bytes(body.freeze());
    msg.set_flags(MsgFlags::COMMAND);
    msg
  }

  pub fn create_error(reason: &str) -> Msg {
    let mut body = BytesMut::with_capacity(6 + reason.len());
    put_short_string(&mut body, ZMTP_CMD_ERROR_NAME);
    let reason = &reason.as_bytes()[..reason.len().min(255)];
    put_short_string(&mut body, reason);
    let mut msg = Msg::from_bytes(body.freeze());
    msg.set_flags(MsgFlags::COMMAND);
    msg
  }

  /// Looks up a READY property by case-insensitive name.
  pub fn property(&self, name: &str) -> Option<&Bytes> {
    match self {
      ZmtpCommand::Ready(props) => props
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v),
      _ => None,
    }
  }
}

fn put_short_string(dst: &mut BytesMut, s: &[u8]) {
  dst.put_u8(s.len() as u8);
  dst.put_slice(s);
}

fn read_short_string<'a>(src: &mut &'a [u8]) -> Result<&'a [u8], ZmqError> {
  if src.is_empty() {
    return Err(ZmqError::ProtocolViolation("truncated command".into()));
  }
  let len = src[0] as usize;
  if src.len() < 1 + len {
    return Err(ZmqError::ProtocolViolation("truncated command".into()));
  }
  let s = &src[1..1 + len];
  *src = &src[1 + len..];
  Ok(s)
}
