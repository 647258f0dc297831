use crate::error::ZmqError;
use crate::transport::{StreamConnector, StreamListener};

use futures::future::BoxFuture;
use futures::FutureExt;
use std::io;
use std::path::{Path, PathBuf};
use tokio::net::{UnixListener, UnixStream};

/// Binds a unix domain socket at `path`, replacing a stale socket file.
pub(crate) fn bind_std(path: &Path, uri: &str) -> Result<std::os::unix::net::UnixListener, ZmqError> {
  if path.exists() {
    tracing::debug!(path = %path.display(), "Removing stale IPC socket file");
    let _ = std::fs::remove_file(path);
  }
  let listener = std::os::unix::net::UnixListener::bind(path).map_err(|e| ZmqError::from_io_endpoint(e, uri))?;
  listener.set_nonblocking(true)?;
  Ok(listener)
}

/// Removes the socket file of an unbound endpoint.
pub(crate) fn cleanup(path: &Path) {
  if let Err(e) = std::fs::remove_file(path) {
    if e.kind() != io::ErrorKind::NotFound {
      tracing::debug!(path = %path.display(), error = %e, "Failed to remove IPC socket file");
    }
  }
}

pub(crate) struct IpcConnector {
  pub path: PathBuf,
}

impl StreamConnector for IpcConnector {
  type Stream = UnixStream;

  fn connect(&self) -> BoxFuture<'_, io::Result<UnixStream>> {
    UnixStream::connect(&self.path).boxed()
  }
}

pub(crate) struct IpcAcceptor {
  listener: UnixListener,
  path: PathBuf,
}

impl IpcAcceptor {
  /// Must run inside the context's runtime.
  pub fn from_std(listener: std::os::unix::net::UnixListener, path: PathBuf) -> io::Result<Self> {
    Ok(Self {
      listener: UnixListener::from_std(listener)?,
      path,
    })
  }
}

impl Drop for IpcAcceptor {
  fn drop(&mut self) {
    cleanup(&self.path);
  }
}

impl StreamListener for IpcAcceptor {
  type Stream = UnixStream;

  fn accept(&mut self) -> BoxFuture<'_, io::Result<(UnixStream, String)>> {
    async move {
      let (stream, _addr) = self.listener.accept().await?;
      Ok((stream, format!("ipc://{}", self.path.display())))
    }
    .boxed()
  }
}
