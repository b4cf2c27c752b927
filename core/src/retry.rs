//! Bounded retry with linear backoff
//!
//! Every fallible call across an external boundary (IDE automation, process
//! table, window manager) goes through a [`RetryPolicy`]. A policy never
//! turns retry exhaustion into a panic: result-based execution returns the
//! last value for the caller to inspect, error-based execution returns the
//! last error as a normal failure value.

use crate::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// A bounded retry policy with linear backoff (`base_delay * attempt`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy with the given attempt count and backoff base
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Policy for transient automation exceptions (COM-style flakiness
    /// during IDE mode transitions)
    pub const fn transient_automation() -> Self {
        Self::new(5, Duration::from_millis(150))
    }

    /// Policy for re-enumerating debuggable processes until the target
    /// shows up
    pub const fn attach_enumeration() -> Self {
        Self::new(5, Duration::from_millis(250))
    }

    /// Policy for polling "process has not exited yet"
    pub const fn process_exit() -> Self {
        Self::new(10, Duration::from_millis(50))
    }

    /// Policy for polling "main window handle not yet available"
    pub const fn main_window() -> Self {
        Self::new(5, Duration::from_millis(150))
    }

    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff before the next attempt, linear in the 1-based attempt index
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    /// Execute `op` until `accept` approves the value or attempts run out,
    /// returning the last value either way.
    pub async fn run_until<T, F, Fut, A>(&self, mut op: F, accept: A) -> T
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = T>,
        A: Fn(&T) -> bool,
    {
        let mut attempt = 1;
        loop {
            let value = op().await;
            if accept(&value) || attempt >= self.max_attempts {
                return value;
            }
            debug!(attempt, max = self.max_attempts, "Retrying after rejected result");
            sleep(self.backoff(attempt)).await;
            attempt += 1;
        }
    }

    /// Execute `op`, retrying transient errors, returning the first success
    /// or the last error.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    debug!(attempt, max = self.max_attempts, error = %e, "Retrying transient error");
                    sleep(self.backoff(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
