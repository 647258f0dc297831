use std::time::Duration;

use crate::error::ZmqError;
use crate::message::Blob;

// Option identifiers, numbered as in libzmq.
pub const ROUTING_ID: i32 = 5;
pub const SUBSCRIBE: i32 = 6;
pub const UNSUBSCRIBE: i32 = 7;
pub const RCVMORE: i32 = 13;
pub const EVENTS: i32 = 15;
pub const TYPE: i32 = 16;
pub const LINGER: i32 = 17;
pub const RECONNECT_IVL: i32 = 18;
pub const RECONNECT_IVL_MAX: i32 = 21;
pub const MAXMSGSIZE: i32 = 22;
pub const SNDHWM: i32 = 23;
pub const RCVHWM: i32 = 24;
pub const RCVTIMEO: i32 = 27;
pub const SNDTIMEO: i32 = 28;
pub const LAST_ENDPOINT: i32 = 32;
pub const ROUTER_MANDATORY: i32 = 33;
pub const TCP_KEEPALIVE: i32 = 34;
pub const TCP_KEEPALIVE_IDLE: i32 = 36;
pub const XPUB_VERBOSE: i32 = 40;
pub const XPUB_NODROP: i32 = 69;

pub const DEFAULT_HWM: usize = 1000;
pub const DEFAULT_RECONNECT_IVL: Duration = Duration::from_millis(100);
pub const DEFAULT_RECONNECT_IVL_MAX: Duration = Duration::from_secs(2);

/// Parsed and validated socket options shared by every pattern.
///
/// Pattern-only options (subscriptions, `ROUTER_MANDATORY`, `XPUB_*`) live in
/// the pattern state instead.
#[derive(Debug, Clone)]
pub(crate) struct SocketOptions {
  /// 0 means unlimited.
  pub sndhwm: usize,
  pub rcvhwm: usize,
  /// None = -1 (infinite), Some(ZERO) = 0 (immediate).
  pub sndtimeo: Option<Duration>,
  pub rcvtimeo: Option<Duration>,
  /// None = -1 (drain without bound).
  pub linger: Option<Duration>,
  /// None disables reconnection.
  pub reconnect_ivl: Option<Duration>,
  /// ZERO keeps the interval constant.
  pub reconnect_ivl_max: Duration,
  pub maxmsgsize: Option<usize>,
  pub routing_id: Option<Blob>,
  /// -1 leave the OS default, 0 off, 1 on.
  pub tcp_keepalive: i32,
  pub tcp_keepalive_idle: Option<Duration>,
}

impl Default for SocketOptions {
  fn default() -> Self {
    Self {
      sndhwm: DEFAULT_HWM,
      rcvhwm: DEFAULT_HWM,
      sndtimeo: None,
      rcvtimeo: None,
      linger: Some(Duration::ZERO),
      reconnect_ivl: Some(DEFAULT_RECONNECT_IVL),
      reconnect_ivl_max: DEFAULT_RECONNECT_IVL_MAX,
      maxmsgsize: None,
      routing_id: None,
      tcp_keepalive: -1,
      tcp_keepalive_idle: None,
    }
  }
}

impl SocketOptions {
  /// Applies a generic option. Returns `Ok(false)` if `option` is not one
  /// of the generic options (the pattern may still know it).
  pub fn apply(&mut self, option: i32, value: &[u8]) -> Result<bool, ZmqError> {
    match option {
      SNDHWM => self.sndhwm = parse_hwm_option(value, option)?,
      RCVHWM => self.rcvhwm = parse_hwm_option(value, option)?,
      SNDTIMEO | RCVTIMEO => {
        let timeout = parse_timeout_option(value, option)?;
        if option == SNDTIMEO {
          self.sndtimeo = timeout;
        } else {
          self.rcvtimeo = timeout;
        }
      }
      LINGER => self.linger = parse_timeout_option(value, option)?,
      RECONNECT_IVL => {
        let ms = parse_i32_option(value, option)?;
        self.reconnect_ivl = match ms {
          -1 => None,
          0.. => Some(Duration::from_millis(ms as u64)),
          _ => return Err(ZmqError::InvalidOptionValue(option)),
        };
      }
      RECONNECT_IVL_MAX => {
        let ms = parse_i32_option(value, option)?;
        if ms < 0 {
          return Err(ZmqError::InvalidOptionValue(option));
        }
        self.reconnect_ivl_max = Duration::from_millis(ms as u64);
      }
      MAXMSGSIZE => {
        let size = parse_i64_option(value, option)?;
        self.maxmsgsize = match size {
          -1 => None,
          0.. => Some(usize::try_from(size).map_err(|_| ZmqError::InvalidOptionValue(option))?),
          _ => return Err(ZmqError::InvalidOptionValue(option)),
        };
      }
      ROUTING_ID => self.routing_id = Some(parse_blob_option(value)?),
      TCP_KEEPALIVE => {
        let mode = parse_i32_option(value, option)?;
        if !(-1..=1).contains(&mode) {
          return Err(ZmqError::InvalidOptionValue(option));
        }
        self.tcp_keepalive = mode;
      }
      TCP_KEEPALIVE_IDLE => {
        let secs = parse_i32_option(value, option)?;
        self.tcp_keepalive_idle = match secs {
          -1 => None,
          1.. => Some(Duration::from_secs(secs as u64)),
          _ => return Err(ZmqError::InvalidOptionValue(option)),
        };
      }
      _ => return Ok(false),
    }
    Ok(true)
  }

  /// Reads a generic option. Returns `None` for ids handled elsewhere.
  pub fn get(&self, option: i32) -> Option<Vec<u8>> {
    let value = match option {
      SNDHWM => encode_usize(self.sndhwm),
      RCVHWM => encode_usize(self.rcvhwm),
      SNDTIMEO => encode_duration_ms(self.sndtimeo),
      RCVTIMEO => encode_duration_ms(self.rcvtimeo),
      LINGER => encode_duration_ms(self.linger),
      RECONNECT_IVL => encode_duration_ms(self.reconnect_ivl),
      RECONNECT_IVL_MAX => encode_duration_ms(Some(self.reconnect_ivl_max)),
      MAXMSGSIZE => self.maxmsgsize.map_or(-1i64, |s| s as i64).to_ne_bytes().to_vec(),
      ROUTING_ID => self.routing_id.as_ref().map_or_else(Vec::new, |id| id.to_vec()),
      TCP_KEEPALIVE => self.tcp_keepalive.to_ne_bytes().to_vec(),
      TCP_KEEPALIVE_IDLE => self
        .tcp_keepalive_idle
        .map_or(-1i32, |d| d.as_secs().min(i32::MAX as u64) as i32)
        .to_ne_bytes()
        .to_vec(),
      _ => return None,
    };
    Some(value)
  }
}

// --- Helper functions for parsing option values ---

/// Parses a native-endian i32 option value.
pub(crate) fn parse_i32_option(value: &[u8], option: i32) -> Result<i32, ZmqError> {
  let arr: [u8; 4] = value.try_into().map_err(|_| ZmqError::InvalidOptionValue(option))?;
  Ok(i32::from_ne_bytes(arr))
}

/// Accepts either an i64 (libzmq's `MAXMSGSIZE` width) or an i32.
pub(crate) fn parse_i64_option(value: &[u8], option: i32) -> Result<i64, ZmqError> {
  match value.len() {
    8 => {
      let arr: [u8; 8] = value.try_into().map_err(|_| ZmqError::InvalidOptionValue(option))?;
      Ok(i64::from_ne_bytes(arr))
    }
    _ => parse_i32_option(value, option).map(i64::from),
  }
}

pub(crate) fn parse_bool_option(value: &[u8], option: i32) -> Result<bool, ZmqError> {
  match parse_i32_option(value, option)? {
    0 => Ok(false),
    1 => Ok(true),
    _ => Err(ZmqError::InvalidOptionValue(option)),
  }
}

fn parse_hwm_option(value: &[u8], option: i32) -> Result<usize, ZmqError> {
  let val = parse_i32_option(value, option)?;
  usize::try_from(val).map_err(|_| ZmqError::InvalidOptionValue(option))
}

/// Parses a millisecond timeout: -1 is infinite, 0 immediate, >0 bounded.
pub(crate) fn parse_timeout_option(value: &[u8], option: i32) -> Result<Option<Duration>, ZmqError> {
  match parse_i32_option(value, option)? {
    -1 => Ok(None),
    ms @ 0.. => Ok(Some(Duration::from_millis(ms as u64))),
    _ => Err(ZmqError::InvalidOptionValue(option)),
  }
}

/// Routing identities are 1..=255 bytes and must not start with a zero
/// byte, which is reserved for generated ids.
pub(crate) fn parse_blob_option(value: &[u8]) -> Result<Blob, ZmqError> {
  if value.is_empty() || value.len() > 255 || value[0] == 0 {
    Err(ZmqError::InvalidOptionValue(ROUTING_ID))
  } else {
    Ok(Blob::from(value))
  }
}

pub(crate) fn encode_usize(v: usize) -> Vec<u8> {
  (v.min(i32::MAX as usize) as i32).to_ne_bytes().to_vec()
}

pub(crate) fn encode_duration_ms(d: Option<Duration>) -> Vec<u8> {
  d.map_or(-1i32, |d| d.as_millis().min(i32::MAX as u128) as i32)
    .to_ne_bytes()
    .to_vec()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_match_libzmq() {
    let opts = SocketOptions::default();
    assert_eq!(opts.sndhwm, 1000);
    assert_eq!(opts.rcvhwm, 1000);
    assert_eq!(opts.sndtimeo, None);
    assert_eq!(opts.get(LINGER), Some(0i32.to_ne_bytes().to_vec()));
    assert_eq!(opts.get(RCVTIMEO), Some((-1i32).to_ne_bytes().to_vec()));
  }

  #[test]
  fn timeouts_parse_infinite_and_zero() {
    let mut opts = SocketOptions::default();
    assert!(opts.apply(SNDTIMEO, &0i32.to_ne_bytes()).unwrap());
    assert_eq!(opts.sndtimeo, Some(Duration::ZERO));
    opts.apply(LINGER, &(-1i32).to_ne_bytes()).unwrap();
    assert_eq!(opts.linger, None);
    assert!(matches!(
      opts.apply(LINGER, &(-2i32).to_ne_bytes()),
      Err(ZmqError::InvalidOptionValue(LINGER))
    ));
  }

  #[test]
  fn unknown_option_is_left_to_caller() {
    let mut opts = SocketOptions::default();
    assert!(!opts.apply(SUBSCRIBE, b"topic").unwrap());
    assert!(opts.get(SUBSCRIBE).is_none());
  }

  #[test]
  fn routing_id_rejects_reserved_prefix() {
    let mut opts = SocketOptions::default();
    assert!(opts.apply(ROUTING_ID, b"\0abc").is_err());
    opts.apply(ROUTING_ID, b"worker-1").unwrap();
    assert_eq!(opts.get(ROUTING_ID), Some(b"worker-1".to_vec()));
  }

  #[test]
  fn maxmsgsize_accepts_i64_and_i32() {
    let mut opts = SocketOptions::default();
    opts.apply(MAXMSGSIZE, &1024i64.to_ne_bytes()).unwrap();
    assert_eq!(opts.maxmsgsize, Some(1024));
    opts.apply(MAXMSGSIZE, &(-1i32).to_ne_bytes()).unwrap();
    assert_eq!(opts.maxmsgsize, None);
  }
}
