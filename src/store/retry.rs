use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{RecordStore, StoreError};
use crate::schema::Record;

/// Bounds on retrying transient storage failures.
///
/// Backoff starts at `initial_backoff` and doubles up to `max_backoff`.
/// Retrying stops once `max_attempts` writes have been made (`0` disables the
/// count limit) or once the next attempt would start after `max_elapsed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_elapsed: Option<Duration>,
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, where `attempt` counts from 1.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }

    /// Whether another attempt may follow `attempts` failed ones, given the
    /// time already spent and the delay that would precede it.
    pub fn allows_retry(&self, attempts: u32, elapsed: Duration, delay: Duration) -> bool {
        if self.max_attempts != 0 && attempts >= self.max_attempts {
            return false;
        }
        match self.max_elapsed {
            Some(limit) => elapsed.saturating_add(delay) <= limit,
            None => true,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(5),
            max_elapsed: None,
        }
    }
}

/// Successful application of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    /// Write attempts made, including the successful one.
    pub attempts: u32,
}

/// Applies records to a [`RecordStore`], retrying transient failures.
///
/// Each attempt is a complete transaction, so a record that eventually
/// succeeds has been committed exactly once.
pub struct StorageAdapter<S> {
    store: S,
    policy: RetryPolicy,
}

impl<S: RecordStore> StorageAdapter<S> {
    pub fn new(store: S, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub async fn apply(&mut self, record: &Record) -> Result<Applied, StoreError> {
        let started = Instant::now();
        let mut attempts = 0;

        loop {
            attempts += 1;
            let err = match self.store.write(record).await {
                Ok(()) => return Ok(Applied { attempts }),
                Err(err) if err.is_transient() => err,
                Err(err) => return Err(err),
            };

            let delay = self.policy.backoff(attempts);
            if !self.policy.allows_retry(attempts, started.elapsed(), delay) {
                return Err(StoreError::RetriesExhausted {
                    attempts,
                    last: Box::new(err),
                });
            }

            warn!(
                kind = %record.kind(),
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient storage failure, retrying"
            );
            tokio::time::sleep(delay).await;
            debug!(kind = %record.kind(), attempt = attempts + 1, "Retrying write");
        }
    }

    pub async fn close(&mut self) -> Result<(), StoreError> {
        self.store.close().await
    }
}
