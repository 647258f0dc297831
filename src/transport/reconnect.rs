use std::time::Duration;

/// Shortest wait between attempts; a zero interval would spin.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Exponential backoff between connection attempts.
///
/// The first retry waits `base`; every further retry doubles the wait up to
/// `max`. A `max` of zero (or below `base`) keeps the interval constant.
/// Without a base interval reconnection is disabled. A zero base is raised
/// to one millisecond.
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
  base: Option<Duration>,
  max: Duration,
  current: Duration,
}

impl Backoff {
  pub fn new(base: Option<Duration>, max: Duration) -> Self {
    let base = base.map(|b| b.max(MIN_INTERVAL));
    Self {
      base,
      max,
      current: base.unwrap_or_default(),
    }
  }

  /// Delay before the next attempt, or `None` if reconnection is disabled.
  pub fn next_delay(&mut self) -> Option<Duration> {
    let base = self.base?;
    let delay = self.current;
    if self.max > base {
      self.current = (self.current * 2).min(self.max);
    } else {
      self.current = base;
    }
    Some(delay)
  }

  /// Back to the base interval after a successful connection.
  pub fn reset(&mut self) {
    self.current = self.base.unwrap_or_default();
  }
}
