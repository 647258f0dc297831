use crate::error::ZmqError;
use crate::runtime::WaitGroup;
use crate::socket::core::SocketCore;
use crate::socket::{Socket, SocketType};
use crate::transport::inproc::InprocRegistry;

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::{Handle, Runtime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
  Running,
  Terminating,
  Terminated,
}

/// Holds the internal state shared by the context handle and its sockets.
pub(crate) struct ContextInner {
  io_threads: usize,
  /// Taken out exactly once, when the context is reaped.
  runtime: Mutex<Option<Runtime>>,
  handle: Handle,
  next_id: AtomicUsize,
  /// Live sockets. The context never keeps a socket alive.
  sockets: Mutex<HashMap<usize, Weak<SocketCore>>>,
  pub(crate) inproc: Mutex<InprocRegistry>,
  /// Every I/O task spawned on `runtime`.
  tasks: WaitGroup,
  lifecycle: Mutex<Lifecycle>,
}

impl ContextInner {
  fn new(io_threads: usize) -> Result<Self, ZmqError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
      .worker_threads(io_threads)
      .thread_name("zmq-io")
      .enable_all()
      .build()?;
    let handle = runtime.handle().clone();
    Ok(Self {
      io_threads,
      runtime: Mutex::new(Some(runtime)),
      handle,
      next_id: AtomicUsize::new(1),
      sockets: Mutex::new(HashMap::new()),
      inproc: Mutex::new(InprocRegistry::default()),
      tasks: WaitGroup::new(),
      lifecycle: Mutex::new(Lifecycle::Running),
    })
  }

  /// Generates the next unique id for sockets, endpoints and peers.
  pub(crate) fn next_id(&self) -> usize {
    self.next_id.fetch_add(1, Ordering::Relaxed)
  }

  /// Runs an I/O task on the worker pool. `terminate` waits for it.
  pub(crate) fn spawn<F>(&self, task: F)
  where
    F: Future<Output = ()> + Send + 'static,
  {
    let guard = self.tasks.add();
    self.handle.spawn(async move {
      let _guard = guard;
      task.await;
    });
  }

  pub(crate) fn unregister_socket(&self, handle: usize) {
    if self.sockets.lock().remove(&handle).is_some() {
      tracing::debug!(socket_handle = handle, "Socket unregistered");
    }
  }

  /// Marks the context terminating and terminates every live socket.
  /// Returns false if termination already started.
  fn begin_shutdown(&self) -> bool {
    {
      let mut lifecycle = self.lifecycle.lock();
      if *lifecycle != Lifecycle::Running {
        return false;
      }
      *lifecycle = Lifecycle::Terminating;
    }
    let sockets: Vec<Arc<SocketCore>> = self.sockets.lock().values().filter_map(Weak::upgrade).collect();
    tracing::info!(sockets = sockets.len(), "Context shutdown initiated");
    for socket in sockets {
      socket.terminate();
    }
    true
  }
}

impl fmt::Debug for ContextInner {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ContextInner")
      .field("io_threads", &self.io_threads)
      .field("lifecycle", &*self.lifecycle.lock())
      .field("sockets", &self.sockets.lock().len())
      .field("tasks", &self.tasks.count())
      .finish()
  }
}

/// Owns the I/O worker pool and every socket created from it.
///
/// A context is not `Clone`; share it by reference. Dropping it without
/// calling [`Context::terminate`] runs the same shutdown in the background.
pub struct Context {
  inner: Arc<ContextInner>,
}

impl Context {
  /// Creates a context with one I/O thread.
  pub fn new() -> Result<Self, ZmqError> {
    Self::with_io_threads(1)
  }

  pub fn with_io_threads(io_threads: usize) -> Result<Self, ZmqError> {
    if io_threads == 0 {
      return Err(ZmqError::InvalidArgument("io_threads must be at least 1".into()));
    }
    let inner = ContextInner::new(io_threads)?;
    tracing::debug!(io_threads, "Context created");
    Ok(Self { inner: Arc::new(inner) })
  }

  pub fn io_threads(&self) -> usize {
    self.inner.io_threads
  }

  /// Creates a socket of the specified type associated with this context.
  pub fn socket(&self, socket_type: SocketType) -> Result<Socket, ZmqError> {
    let lifecycle = self.inner.lifecycle.lock();
    if *lifecycle != Lifecycle::Running {
      return Err(ZmqError::ContextTerminated);
    }
    let handle = self.inner.next_id();
    let core = SocketCore::new(self.inner.clone(), handle, socket_type);
    self.inner.sockets.lock().insert(handle, Arc::downgrade(&core));
    drop(lifecycle);
    tracing::debug!(socket_type = %socket_type, handle, "Socket created");
    Ok(Socket::new(core))
  }

  /// Terminates the context.
  ///
  /// Every socket still open fails its pending and future operations with
  /// `ContextTerminated`; all endpoints drain per their `LINGER`. Returns
  /// once every I/O task has finished.
  pub async fn terminate(&self) -> Result<(), ZmqError> {
    self.inner.begin_shutdown();
    self.inner.tasks.wait().await;
    let runtime = {
      let mut lifecycle = self.inner.lifecycle.lock();
      *lifecycle = Lifecycle::Terminated;
      self.inner.runtime.lock().take()
    };
    if let Some(runtime) = runtime {
      runtime.shutdown_background();
      tracing::info!("Context terminated");
    }
    Ok(())
  }

  pub fn is_terminated(&self) -> bool {
    *self.inner.lifecycle.lock() == Lifecycle::Terminated
  }
}

impl Drop for Context {
  fn drop(&mut self) {
    self.inner.begin_shutdown();
    let Some(runtime) = self.inner.runtime.lock().take() else {
      return;
    };
    let tasks = self.inner.tasks.clone();
    tracing::debug!(pending_tasks = tasks.count(), "Context dropped without terminate, reaping in background");
    // The runtime cannot be dropped from within an async context, so the
    // wait and the drop happen on a plain thread.
    let reaper = std::thread::Builder::new().name("zmq-ctx-reaper".into());
    let slot = Arc::new(Mutex::new(Some(runtime)));
    let reaper_slot = slot.clone();
    let spawned = reaper.spawn(move || {
      if let Some(runtime) = reaper_slot.lock().take() {
        runtime.block_on(tasks.wait());
        drop(runtime);
      }
    });
    if let Err(e) = spawned {
      tracing::warn!(error = %e, "Failed to spawn context reaper thread");
      if let Some(runtime) = slot.lock().take() {
        runtime.shutdown_background();
      }
    }
  }
}

impl fmt::Debug for Context {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Context").field("inner", &self.inner).finish()
  }
}

/// Creates a new library context.
pub fn context() -> Result<Context, ZmqError> {
  Context::new()
}
