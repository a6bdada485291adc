//! Timeouts and bounded exponential backoff around store and graph calls.
//!
//! Every call gets a per-operation timeout. Only keyed, idempotent writes and
//! reads go through [`RetryPolicy::idempotent`]; plain creates use
//! [`RetryPolicy::once`].

use std::{fmt, future::Future, time::Duration};

use ontograph_core::store::Transient;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
  /// Total attempts, including the first.
  pub max_attempts:  u32,
  pub base_delay_ms: u64,
  pub max_delay_ms:  u64,
  pub op_timeout_ms: u64,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self { max_attempts: 4, base_delay_ms: 50, max_delay_ms: 2_000, op_timeout_ms: 10_000 }
  }
}

/// Why a guarded call gave up.
#[derive(Debug)]
pub enum Failure<E> {
  Timeout { operation: &'static str, after: Duration },
  Inner(E),
}

impl<E: fmt::Display> fmt::Display for Failure<E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Failure::Timeout { operation, after } => write!(f, "{operation} timed out after {after:?}"),
      Failure::Inner(e) => e.fmt(f),
    }
  }
}

impl<E> Failure<E>
where
  E: std::error::Error + Send + Sync + 'static,
{
  pub fn into_store(self) -> Error {
    match self {
      Failure::Timeout { operation, after } => Error::Timeout { operation, after },
      Failure::Inner(e) => Error::store(e),
    }
  }

  pub fn into_graph(self) -> Error {
    match self {
      Failure::Timeout { operation, after } => Error::Timeout { operation, after },
      Failure::Inner(e) => Error::graph(e),
    }
  }

  pub fn into_external(self, service: &'static str) -> Error {
    match self {
      Failure::Timeout { operation, after } => Error::Timeout { operation, after },
      Failure::Inner(e) => Error::external(service, e),
    }
  }
}

impl RetryPolicy {
  pub fn op_timeout(&self) -> Duration { Duration::from_millis(self.op_timeout_ms) }

  /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`,
  /// capped at `max_delay`.
  pub fn backoff(&self, attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    Duration::from_millis(self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms))
  }

  /// Run `call` under the timeout, without retrying.
  pub async fn once<T, E, Fut>(&self, operation: &'static str, call: Fut) -> Result<T, Failure<E>>
  where
    Fut: Future<Output = Result<T, E>>,
  {
    match tokio::time::timeout(self.op_timeout(), call).await {
      Ok(result) => result.map_err(Failure::Inner),
      Err(_) => Err(Failure::Timeout { operation, after: self.op_timeout() }),
    }
  }

  /// Run `call`, repeating it after timeouts and transient errors until it
  /// succeeds or `max_attempts` is spent.
  pub async fn idempotent<T, E, F, Fut>(
    &self,
    operation: &'static str,
    mut call: F,
  ) -> Result<T, Failure<E>>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + fmt::Display,
  {
    let attempts = self.max_attempts.max(1);
    let mut attempt = 1;
    loop {
      let failure = match self.once(operation, call()).await {
        Ok(value) => return Ok(value),
        Err(Failure::Inner(e)) if !e.is_transient() => return Err(Failure::Inner(e)),
        Err(failure) => failure,
      };
      if attempt >= attempts {
        return Err(failure);
      }
      let delay = self.backoff(attempt);
      warn!(operation, attempt, ?delay, error = %failure, "transient failure, retrying");
      tokio::time::sleep(delay).await;
      attempt += 1;
    }
  }
}
