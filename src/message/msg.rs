use crate::error::{ZmqError, ZmqResult};
use crate::message::flags::MsgFlags;
use bytes::{Bytes, BytesMut};
use std::fmt;

/// Storage behind a `Msg`. A frozen buffer may be shared by several
/// messages (PUB fan-out); a unique buffer can be written in place.
enum Payload {
  Shared(Bytes),
  Unique(BytesMut),
}

impl Default for Payload {
  fn default() -> Self {
    Payload::Shared(Bytes::new())
  }
}

impl Payload {
  fn as_slice(&self) -> &[u8] {
    match self {
      Payload::Shared(b) => b,
      Payload::Unique(b) => b,
    }
  }

  fn freeze(self) -> Bytes {
    match self {
      Payload::Shared(b) => b,
      Payload::Unique(b) => b.freeze(),
    }
  }
}

/// A single message frame.
///
/// `Msg` is moved, never implicitly copied. Use [`Msg::copy`] for an
/// independent duplicate.
#[derive(Default)]
pub struct Msg {
  payload: Payload,
  flags: MsgFlags,
}

/// Owner handed to `Bytes::from_owner` for adopted memory. The release
/// function fires from `Drop`, i.e. when the last `Bytes` clone goes away.
struct Adopted<T, F>
where
  T: AsRef<[u8]>,
  F: FnOnce(T),
{
  data: Option<T>,
  free_fn: Option<F>,
}

impl<T, F> AsRef<[u8]> for Adopted<T, F>
where
  T: AsRef<[u8]>,
  F: FnOnce(T),
{
  fn as_ref(&self) -> &[u8] {
    self.data.as_ref().map_or(&[], |d| d.as_ref())
  }
}

impl<T, F> Drop for Adopted<T, F>
where
  T: AsRef<[u8]>,
  F: FnOnce(T),
{
  fn drop(&mut self) {
    if let (Some(data), Some(free_fn)) = (self.data.take(), self.free_fn.take()) {
      free_fn(data);
    }
  }
}

impl Msg {
  /// Creates an empty message with no data.
  pub fn new() -> Self {
    Self::default()
  }

  /// Creates a zero-filled message of `size` bytes.
  ///
  /// Fails with `ResourceExhausted` if the allocation cannot be satisfied.
  pub fn allocate(size: usize) -> ZmqResult<Self> {
    let mut buf: Vec<u8> = Vec::new();
    buf.try_reserve_exact(size).map_err(|e| {
      ZmqError::ResourceExhausted(format!("cannot allocate {} byte message: {}", size, e))
    })?;
    buf.resize(size, 0);
    Ok(Self {
      payload: Payload::Shared(Bytes::from(buf)),
      flags: MsgFlags::empty(),
    })
  }

  /// Adopts caller-owned memory without copying it.
  ///
  /// `free_fn` is invoked with `data` exactly once, after the last message
  /// sharing this buffer has been dropped.
  pub fn wrap<T, F>(data: T, free_fn: F) -> Self
  where
    T: AsRef<[u8]> + Send + 'static,
    F: FnOnce(T) + Send + 'static,
  {
    let owner = Adopted {
      data: Some(data),
      free_fn: Some(free_fn),
    };
    Self {
      payload: Payload::Shared(Bytes::from_owner(owner)),
      flags: MsgFlags::empty(),
    }
  }

  /// Creates a message from a `Vec<u8>`, taking ownership.
  pub fn from_vec(data: Vec<u8>) -> Self {
    Self {
      payload: Payload::Shared(Bytes::from(data)),
      flags: MsgFlags::empty(),
    }
  }

  /// Creates a message from `bytes::Bytes`.
  pub fn from_bytes(data: Bytes) -> Self {
    Self {
      payload: Payload::Shared(data),
      flags: MsgFlags::empty(),
    }
  }

  /// Creates a message from a static byte slice (zero-copy).
  pub fn from_static(data: &'static [u8]) -> Self {
    Self::from_bytes(Bytes::from_static(data))
  }

  /// Returns the message payload.
  pub fn data(&self) -> &[u8] {
    self.payload.as_slice()
  }

  /// Returns a mutable view of the payload. A buffer shared with other
  /// messages is made unique first.
  pub fn data_mut(&mut self) -> &mut [u8] {
    if let Payload::Shared(_) = self.payload {
      let unique = match std::mem::take(&mut self.payload) {
        Payload::Shared(bytes) => match bytes.try_into_mut() {
          Ok(owned) => owned,
          Err(shared) => BytesMut::from(&shared[..]),
        },
        Payload::Unique(owned) => owned,
      };
      self.payload = Payload::Unique(unique);
    }
    match &mut self.payload {
      Payload::Unique(b) => &mut b[..],
      Payload::Shared(_) => &mut [],
    }
  }

  /// Returns the size of the message payload in bytes.
  pub fn size(&self) -> usize {
    self.data().len()
  }

  pub fn is_empty(&self) -> bool {
    self.size() == 0
  }

  /// Returns the flags associated with the message.
  pub fn flags(&self) -> MsgFlags {
    self.flags
  }

  /// Sets the flags for the message (e.g., `MsgFlags::MORE`).
  pub fn set_flags(&mut self, flags: MsgFlags) {
    self.flags = flags;
  }

  /// Checks if the `MORE` flag is set.
  pub fn is_more(&self) -> bool {
    self.flags.contains(MsgFlags::MORE)
  }

  pub fn set_more(&mut self, more: bool) {
    self.flags.set(MsgFlags::MORE, more);
  }

  /// Checks if the `COMMAND` flag is set.
  pub fn is_command(&self) -> bool {
    self.flags.contains(MsgFlags::COMMAND)
  }

  /// Deep copy: the duplicate owns a fresh buffer and the same flags.
  pub fn copy(&self) -> Msg {
    Msg {
      payload: Payload::Shared(Bytes::copy_from_slice(self.data())),
      flags: self.flags,
    }
  }

  /// Shallow copy sharing the underlying buffer. Used for fan-out.
  pub(crate) fn share(&mut self) -> Msg {
    let bytes = std::mem::take(&mut self.payload).freeze();
    self.payload = Payload::Shared(bytes.clone());
    Msg {
      payload: Payload::Shared(bytes),
      flags: self.flags,
    }
  }

  /// Resets the message to empty, releasing its buffer.
  pub fn rebuild(&mut self) {
    self.payload = Payload::default();
    self.flags = MsgFlags::empty();
  }

  /// Replaces the content with a zero-filled buffer of `size` bytes.
  pub fn rebuild_with_size(&mut self, size: usize) -> ZmqResult<()> {
    *self = Msg::allocate(size)?;
    Ok(())
  }

  /// Takes the content of `other`, leaving it empty.
  pub fn move_from(&mut self, other: &mut Msg) {
    *self = std::mem::take(other);
  }

  /// Returns the payload as a string, replacing invalid UTF-8.
  pub fn to_string_lossy(&self) -> String {
    String::from_utf8_lossy(self.data()).into_owned()
  }

  /// Consumes the message, returning its payload.
  pub fn into_bytes(self) -> Bytes {
    self.payload.freeze()
  }

  /// Returns a reference-counted view of the payload, freezing it if needed.
  pub fn data_bytes(&mut self) -> Bytes {
    let bytes = std::mem::take(&mut self.payload).freeze();
    self.payload = Payload::Shared(bytes.clone());
    bytes
  }
}

impl From<Vec<u8>> for Msg {
  fn from(data: Vec<u8>) -> Self {
    Msg::from_vec(data)
  }
}

impl From<&[u8]> for Msg {
  fn from(data: &[u8]) -> Self {
    Msg::from_bytes(Bytes::copy_from_slice(data))
  }
}

impl From<&str> for Msg {
  fn from(data: &str) -> Self {
    Msg::from(data.as_bytes())
  }
}

impl From<String> for Msg {
  fn from(data: String) -> Self {
    Msg::from_vec(data.into_bytes())
  }
}

impl From<Bytes> for Msg {
  fn from(data: Bytes) -> Self {
    Msg::from_bytes(data)
  }
}

impl fmt::Debug for Msg {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Msg")
      .field("size", &self.size())
      .field("flags", &self.flags)
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;

  #[test]
  fn allocate_is_zero_filled() {
    let msg = Msg::allocate(32).unwrap();
    assert_eq!(msg.size(), 32);
    assert!(msg.data().iter().all(|b| *b == 0));
    assert!(!msg.is_more());
  }

  #[test]
  fn allocate_reports_exhaustion() {
    let err = Msg::allocate(usize::MAX).unwrap_err();
    assert!(matches!(err, ZmqError::ResourceExhausted(_)));
  }

  #[test]
  fn wrap_releases_once_after_last_share() {
    let freed = Arc::new(AtomicUsize::new(0));
    let counter = freed.clone();
    let mut msg = Msg::wrap(vec![1u8, 2, 3], move |buf: Vec<u8>| {
      assert_eq!(buf, vec![1, 2, 3]);
      counter.fetch_add(1, Ordering::SeqCst);
    });
    let shared = msg.share();
    drop(msg);
    assert_eq!(freed.load(Ordering::SeqCst), 0);
    assert_eq!(shared.data(), &[1, 2, 3]);
    drop(shared);
    assert_eq!(freed.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn data_mut_on_shared_buffer_does_not_affect_other_holder() {
    let mut a = Msg::from("hello");
    let b = a.share();
    a.data_mut()[0] = b'j';
    assert_eq!(a.data(), b"jello");
    assert_eq!(b.data(), b"hello");
  }

  #[test]
  fn copy_is_deep_and_keeps_flags() {
    let mut a = Msg::from_vec(vec![9; 4]);
    a.set_more(true);
    let mut b = a.copy();
    b.data_mut()[0] = 0;
    assert_eq!(a.data(), &[9, 9, 9, 9]);
    assert!(b.is_more());
  }

  #[test]
  fn move_from_leaves_source_empty() {
    let mut src = Msg::from("payload");
    src.set_more(true);
    let mut dst = Msg::new();
    dst.move_from(&mut src);
    assert_eq!(dst.to_string_lossy(), "payload");
    assert!(dst.is_more());
    assert!(src.is_empty());
    assert!(!src.is_more());
  }

  #[test]
  fn rebuild_resets_content() {
    let mut msg = Msg::from("abc");
    msg.rebuild_with_size(5).unwrap();
    assert_eq!(msg.data(), &[0u8; 5]);
    msg.rebuild();
    assert!(msg.is_empty());
  }
}
