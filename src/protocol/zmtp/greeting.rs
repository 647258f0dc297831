use crate::error::ZmqError;
use bytes::{BufMut, BytesMut};

pub const GREETING_LENGTH: usize = 64;
pub const MECHANISM_LENGTH: usize = 20;

pub const GREETING_VERSION_MAJOR: u8 = 0x03;
pub const GREETING_VERSION_MINOR: u8 = 0x00;

const SIGNATURE_END_OFFSET: usize = 9;
const VERSION_MAJOR_OFFSET: usize = 10;
const VERSION_MINOR_OFFSET: usize = 11;
const MECHANISM_OFFSET: usize = 12;
const AS_SERVER_OFFSET: usize = MECHANISM_OFFSET + MECHANISM_LENGTH;

/// The 64-byte ZMTP greeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZmtpGreeting {
  pub version: (u8, u8),
  pub mechanism: [u8; MECHANISM_LENGTH],
  pub as_server: bool,
}

impl ZmtpGreeting {
  /// Appends a greeting advertising version 3.0 and `mechanism`.
  pub fn encode(mechanism: &[u8; MECHANISM_LENGTH], as_server: bool, buffer: &mut BytesMut) {
    buffer.reserve(GREETING_LENGTH);
    let start = buffer.len();
    // Signature: 0xFF, 8 padding bytes, 0x7F.
    buffer.put_u8(0xFF);
    buffer.put_bytes(0, 8);
    buffer.put_u8(0x7F);
    buffer.put_u8(GREETING_VERSION_MAJOR);
    buffer.put_u8(GREETING_VERSION_MINOR);
    buffer.put_slice(mechanism);
    buffer.put_u8(as_server as u8);
    buffer.put_bytes(0, GREETING_LENGTH - (buffer.len() - start));
    debug_assert_eq!(buffer.len() - start, GREETING_LENGTH);
  }

  /// Parses a greeting, consuming 64 bytes. Returns `Ok(None)` if fewer are
  /// buffered.
  pub fn decode(buffer: &mut BytesMut) -> Result<Option<Self>, ZmqError> {
    if buffer.len() < GREETING_LENGTH {
      return Ok(None);
    }
    let data = buffer.split_to(GREETING_LENGTH);

    if data[0] != 0xFF || data[SIGNATURE_END_OFFSET] & 0x01 != 0x01 {
      return Err(ZmqError::ProtocolViolation("invalid greeting signature".into()));
    }

    let major = data[VERSION_MAJOR_OFFSET];
    let minor = data[VERSION_MINOR_OFFSET];
    if major < GREETING_VERSION_MAJOR {
      return Err(ZmqError::ProtocolViolation(format!(
        "unsupported ZMTP version {}.{}",
        major, minor
      )));
    }

    let mut mechanism = [0u8; MECHANISM_LENGTH];
    mechanism.copy_from_slice(&data[MECHANISM_OFFSET..MECHANISM_OFFSET + MECHANISM_LENGTH]);

    let as_server = match data[AS_SERVER_OFFSET] {
      0x00 => false,
      0x01 => true,
      other => {
        return Err(ZmqError::ProtocolViolation(format!(
          "invalid as-server flag {:#04x}",
          other
        )))
      }
    };

    let greeting = Self {
      version: (major, minor),
      mechanism,
      as_server,
    };
    tracing::trace!(version = ?greeting.version, mechanism = greeting.mechanism_name(), "Parsed ZMTP greeting");
    Ok(Some(greeting))
  }

  /// Mechanism name with the null padding trimmed.
  pub fn mechanism_name(&self) -> &str {
    let end = self
      .mechanism
      .iter()
      .position(|&b| b == 0)
      .unwrap_or(MECHANISM_LENGTH);
    std::str::from_utf8(&self.mechanism[..end]).unwrap_or("<invalid_utf8>")
  }
}
