use std::fmt;
use std::sync::Arc;

use tracing::info;

/// A sink for the pool's diagnostic lines.
///
/// Implementations receive pre-formatted arguments, the same way `log`-style
/// `printf` functions do. The pool reports three things through it: a recovered
/// task panic, a submit timeout, and the completion of `release`.
pub trait Logger: Send + Sync {
  fn printf(&self, args: fmt::Arguments<'_>);
}

/// Default [`Logger`] that forwards diagnostic lines to `tracing`, tagged with
/// the owning pool's name.
#[derive(Debug, Clone)]
pub struct TracingLogger {
  pool_name: Arc<String>,
}

impl TracingLogger {
  pub fn new(pool_name: &str) -> Self {
    Self {
      pool_name: Arc::new(pool_name.to_string()),
    }
  }

  pub(crate) fn for_pool(pool_name: Arc<String>) -> Self {
    Self { pool_name }
  }
}

impl Logger for TracingLogger {
  fn printf(&self, args: fmt::Arguments<'_>) {
    info!(pool_name = %*self.pool_name, "{}", args);
  }
}

impl<L: Logger + ?Sized> Logger for Arc<L> {
  fn printf(&self, args: fmt::Arguments<'_>) {
    (**self).printf(args);
  }
}
