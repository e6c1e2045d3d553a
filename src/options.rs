use crate::logger::{Logger, TracingLogger};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Capacity used when none (or zero) is configured.
pub const DEFAULT_CAPACITY: usize = 100;
/// Upper bound applied to any configured capacity.
pub const MAX_CAPACITY: usize = 10_000;
/// Submit timeout used when none (or zero) is configured.
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_millis(500);

/// Construction options for a [`WorkerPool`](crate::WorkerPool).
///
/// Every field is optional; unset values fall back to the defaults above when
/// the pool is built.
#[derive(Clone, Default)]
pub struct PoolOptions {
  capacity: Option<usize>,
  submit_timeout: Option<Duration>,
  logger: Option<Arc<dyn Logger>>,
}

impl fmt::Debug for PoolOptions {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PoolOptions")
      .field("capacity", &self.capacity)
      .field("submit_timeout", &self.submit_timeout)
      .field("custom_logger", &self.logger.is_some())
      .finish()
  }
}

impl PoolOptions {
  pub fn new() -> Self {
    Self::default()
  }

  /// Maximum number of concurrently running tasks. Zero means "use the
  /// default"; values above [`MAX_CAPACITY`] are clamped.
  pub fn with_capacity(mut self, capacity: usize) -> Self {
    self.capacity = Some(capacity);
    self
  }

  /// Longest time `submit` waits for a free slot before giving up.
  pub fn with_submit_timeout(mut self, timeout: Duration) -> Self {
    self.submit_timeout = Some(timeout);
    self
  }

  pub fn with_logger<L: Logger + 'static>(self, logger: L) -> Self {
    self.with_shared_logger(Arc::new(logger))
  }

  pub fn with_shared_logger(mut self, logger: Arc<dyn Logger>) -> Self {
    self.logger = Some(logger);
    self
  }

  pub(crate) fn resolve(self, pool_name: &Arc<String>) -> ResolvedOptions {
    let capacity = match self.capacity {
      None | Some(0) => DEFAULT_CAPACITY,
      Some(c) => c.min(MAX_CAPACITY),
    };
    let submit_timeout = match self.submit_timeout {
      Some(t) if !t.is_zero() => t,
      _ => DEFAULT_SUBMIT_TIMEOUT,
    };
    let logger = self
      .logger
      .unwrap_or_else(|| Arc::new(TracingLogger::for_pool(pool_name.clone())));

    ResolvedOptions {
      capacity,
      submit_timeout,
      logger,
    }
  }
}

/// Options after defaults and clamping have been applied.
pub(crate) struct ResolvedOptions {
  pub(crate) capacity: usize,
  pub(crate) submit_timeout: Duration,
  pub(crate) logger: Arc<dyn Logger>,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn resolve(options: PoolOptions) -> ResolvedOptions {
    options.resolve(&Arc::new("options_test".to_string()))
  }

  #[test]
  fn unset_options_use_defaults() {
    let resolved = resolve(PoolOptions::new());
    assert_eq!(resolved.capacity, DEFAULT_CAPACITY);
    assert_eq!(resolved.submit_timeout, DEFAULT_SUBMIT_TIMEOUT);
  }

  #[test]
  fn zero_values_fall_back_to_defaults() {
    let resolved = resolve(
      PoolOptions::new()
        .with_capacity(0)
        .with_submit_timeout(Duration::ZERO),
    );
    assert_eq!(resolved.capacity, DEFAULT_CAPACITY);
    assert_eq!(resolved.submit_timeout, DEFAULT_SUBMIT_TIMEOUT);
  }

  #[test]
  fn capacity_is_clamped_to_max() {
    let resolved = resolve(PoolOptions::new().with_capacity(MAX_CAPACITY + 1));
    assert_eq!(resolved.capacity, MAX_CAPACITY);

    let resolved = resolve(PoolOptions::new().with_capacity(MAX_CAPACITY));
    assert_eq!(resolved.capacity, MAX_CAPACITY);
  }

  #[test]
  fn explicit_values_are_kept() {
    let resolved = resolve(
      PoolOptions::new()
        .with_capacity(3)
        .with_submit_timeout(Duration::from_secs(2)),
    );
    assert_eq!(resolved.capacity, 3);
    assert_eq!(resolved.submit_timeout, Duration::from_secs(2));
  }

  #[test]
  fn debug_does_not_require_logger_debug() {
    let options = PoolOptions::new().with_logger(TracingLogger::new("debug_test"));
    let rendered = format!("{:?}", options);
    assert!(rendered.contains("custom_logger: true"));
  }
}
