use std::future::Future;
use std::time::Duration;

use brdata_config::MaterializationConfig;
use tracing::debug;

use crate::error::{PipelineError, Result};

/// Outcome of one polling attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T> {
    Ready(T),
    Pending,
}

/// Fixed attempt count, fixed interval between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }

    pub fn from_config(config: &MaterializationConfig) -> Self {
        Self::new(config.retry_attempts, config.retry_interval())
    }

    /// Poll until `op` reports ready. Errors from `op` end the wait at once.
    /// No sleep follows the last attempt.
    pub async fn wait_for<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Attempt<T>>>,
    {
        for attempt in 1..=self.attempts {
            match op(attempt).await? {
                Attempt::Ready(value) => return Ok(value),
                Attempt::Pending => {
                    debug!(attempt, attempts = self.attempts, "Still pending");
                    if attempt < self.attempts {
                        tokio::time::sleep(self.interval).await;
                    }
                }
            }
        }
        Err(PipelineError::MaterializationTimeout {
            attempts: self.attempts,
        })
    }
}
