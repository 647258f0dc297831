use bytes::Bytes;
use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;

/// An immutable, cheaply cloneable byte sequence (routing identities, topics).
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Blob {
  inner: Bytes,
}

impl Blob {
  /// Creates an empty blob.
  pub fn new() -> Self {
    Self { inner: Bytes::new() }
  }

  /// Creates a blob from `bytes::Bytes`.
  pub fn from_bytes(bytes: Bytes) -> Self {
    Self { inner: bytes }
  }

  /// Creates a blob from a static byte slice.
  pub fn from_static(data: &'static [u8]) -> Self {
    Self {
      inner: Bytes::from_static(data),
    }
  }

  /// Returns the size of the blob.
  pub fn size(&self) -> usize {
    self.inner.len()
  }

  /// Returns true if the blob is empty.
  pub fn is_empty(&self) -> bool {
    self.inner.is_empty()
  }

  /// Returns the underlying reference-counted buffer.
  pub fn to_bytes(&self) -> Bytes {
    self.inner.clone()
  }
}

impl Deref for Blob {
  type Target = [u8];
  fn deref(&self) -> &Self::Target {
    &self.inner
  }
}

impl AsRef<[u8]> for Blob {
  fn as_ref(&self) -> &[u8] {
    &self.inner
  }
}

// Hash and Eq come from the inner bytes, which hash like the plain slice.
impl Borrow<[u8]> for Blob {
  fn borrow(&self) -> &[u8] {
    &self.inner
  }
}

impl From<Vec<u8>> for Blob {
  fn from(vec: Vec<u8>) -> Self {
    Self {
      inner: Bytes::from(vec),
    }
  }
}

impl From<&[u8]> for Blob {
  fn from(data: &[u8]) -> Self {
    Self {
      inner: Bytes::copy_from_slice(data),
    }
  }
}

impl From<&str> for Blob {
  fn from(data: &str) -> Self {
    Self::from(data.as_bytes())
  }
}

impl From<Bytes> for Blob {
  fn from(inner: Bytes) -> Self {
    Self { inner }
  }
}

impl fmt::Debug for Blob {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.inner.len() <= 16 {
      write!(f, "Blob({:02x?})", &self.inner[..])
    } else {
      f.debug_struct("Blob").field("len", &self.inner.len()).finish()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn short_blobs_print_their_bytes() {
    assert_eq!(format!("{:?}", Blob::from(&[0u8, 1][..])), "Blob([00, 01])");
    assert_eq!(format!("{:?}", Blob::from(vec![7u8; 32])), "Blob { len: 32 }");
  }

  #[test]
  fn equal_content_is_equal_identity() {
    assert_eq!(Blob::from("peer"), Blob::from_bytes(Bytes::from_static(b"peer")));
    assert!(Blob::new().is_empty());
  }

  #[test]
  fn maps_keyed_by_blob_accept_slice_lookups() {
    let mut owners = std::collections::HashMap::new();
    owners.insert(Blob::from("worker-7"), 7usize);
    assert_eq!(owners.get(&b"worker-7"[..]), Some(&7));
    assert_eq!(owners.get(&b"worker-8"[..]), None);
  }
}
