use thiserror::Error;

/// Errors returned by [`WorkerPool`](crate::WorkerPool) admission.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
  /// The pool stayed saturated for longer than its submit timeout.
  #[error("exceeded maximum capacity and submit timeout")]
  SubmitTimeout,

  /// The pool is shutting down or already shut down.
  #[error("worker pool has been released")]
  Released,
}

impl PoolError {
  /// Whether re-submitting to the same pool can succeed later.
  ///
  /// `SubmitTimeout` is transient: capacity frees up as running tasks finish.
  /// `Released` is permanent for the pool instance that returned it.
  pub fn is_retryable(&self) -> bool {
    matches!(self, PoolError::SubmitTimeout)
  }
}
