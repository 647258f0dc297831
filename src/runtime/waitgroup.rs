use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// An asynchronous WaitGroup, similar to Go's `sync.WaitGroup`.
///
/// The context registers every I/O task it spawns and `terminate` waits for
/// the count to return to zero.
#[derive(Debug, Clone, Default)]
pub(crate) struct WaitGroup {
  inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
  count: AtomicUsize,
  notify_on_zero: Notify,
}

/// Decrements the owning `WaitGroup` when dropped.
#[derive(Debug)]
pub(crate) struct WaitGuard {
  group: WaitGroup,
}

impl Drop for WaitGuard {
  fn drop(&mut self) {
    self.group.done();
  }
}

impl WaitGroup {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers one task; the returned guard marks it done on drop.
  pub fn add(&self) -> WaitGuard {
    let old = self.inner.count.fetch_add(1, Ordering::AcqRel);
    if old == 0 {
      tracing::trace!("WaitGroup count increased from zero");
    }
    WaitGuard { group: self.clone() }
  }

  fn done(&self) {
    let old = self.inner.count.fetch_sub(1, Ordering::AcqRel);
    debug_assert!(old > 0, "WaitGroup::done() called when count was already zero");
    if old == 1 {
      tracing::trace!("WaitGroup count reached zero, notifying waiters");
      self.inner.notify_on_zero.notify_waiters();
    }
  }

  /// Waits asynchronously until the counter becomes zero.
  pub async fn wait(&self) {
    loop {
      let notified = self.inner.notify_on_zero.notified();
      tokio::pin!(notified);
      // Register interest before checking so a concurrent `done` is not missed.
      notified.as_mut().enable();
      if self.inner.count.load(Ordering::Acquire) == 0 {
        return;
      }
      notified.await;
    }
  }

  pub fn count(&self) -> usize {
    self.inner.count.load(Ordering::Acquire)
  }
}
