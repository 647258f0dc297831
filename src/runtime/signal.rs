use std::sync::Arc;
use tokio::sync::watch;

/// A level-less wake-up broadcaster.
///
/// Every `raise` bumps a counter; a `SignalWaiter` that has observed an older
/// value completes its `wait`. Waiters follow the pattern arm → check
/// condition → wait, so a raise that lands between the check and the wait is
/// never lost.
#[derive(Clone)]
pub(crate) struct Signal {
  tx: Arc<watch::Sender<u64>>,
}

impl Signal {
  pub fn new() -> Self {
    let (tx, _rx) = watch::channel(0u64);
    Self { tx: Arc::new(tx) }
  }

  pub fn raise(&self) {
    self.tx.send_modify(|v| *v = v.wrapping_add(1));
  }

  /// Returns a waiter that is already armed at the current value.
  pub fn waiter(&self) -> SignalWaiter {
    SignalWaiter { rx: self.tx.subscribe() }
  }
}

impl std::fmt::Debug for Signal {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Signal").field("seq", &*self.tx.borrow()).finish()
  }
}

pub(crate) struct SignalWaiter {
  rx: watch::Receiver<u64>,
}

impl SignalWaiter {
  /// Marks everything raised so far as seen.
  pub fn arm(&mut self) {
    self.rx.borrow_and_update();
  }

  /// Completes once the signal has been raised since the last `arm`.
  pub async fn wait(&mut self) {
    // The sender lives as long as any Signal clone; if it is gone there is
    // nothing left to wait for.
    let _ = self.rx.changed().await;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  #[tokio::test]
  async fn raise_between_arm_and_wait_is_not_lost() {
    let signal = Signal::new();
    let mut waiter = signal.waiter();
    waiter.arm();
    signal.raise();
    tokio::time::timeout(Duration::from_millis(100), waiter.wait())
      .await
      .expect("raise after arm must wake the waiter");
  }

  #[tokio::test]
  async fn wait_blocks_without_raise() {
    let signal = Signal::new();
    let mut waiter = signal.waiter();
    signal.raise();
    waiter.arm();
    assert!(tokio::time::timeout(Duration::from_millis(20), waiter.wait()).await.is_err());
  }
}
