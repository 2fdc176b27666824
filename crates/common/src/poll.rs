//! Poll a remote object until it reaches a target state
//!
//! Fixed interval, no backoff. The last sleep is cut short so the final check
//! lands on the deadline. A state outside both the pending and target sets
//! ends the wait immediately.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::error::{Error, Result};

/// Interval between status checks
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Waits for a remote status field to move from a pending state to a target state.
#[derive(Debug, Clone)]
pub struct StateWaiter<'a> {
    operation: String,
    pending: &'a [&'a str],
    target: &'a [&'a str],
    timeout: Duration,
    interval: Duration,
}

impl<'a> StateWaiter<'a> {
    pub fn new(
        operation: impl Into<String>,
        pending: &'a [&'a str],
        target: &'a [&'a str],
        timeout: Duration,
    ) -> Self {
        Self {
            operation: operation.into(),
            pending,
            target,
            timeout,
            interval: POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Call `refresh` until it reports a target state.
    ///
    /// `refresh` returns the refreshed object together with its current
    /// state; the object from the first target-state refresh is returned.
    pub async fn wait<T, F, Fut>(&self, mut refresh: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(T, String)>>,
    {
        let start = Instant::now();

        loop {
            let (value, state) = refresh().await?;
            debug!("{}: state is {:?}", self.operation, state);

            if self.target.contains(&state.as_str()) {
                return Ok(value);
            }

            if !self.pending.contains(&state.as_str()) {
                return Err(Error::UnexpectedState {
                    operation: self.operation.clone(),
                    state,
                });
            }

            let elapsed = start.elapsed();
            if elapsed >= self.timeout {
                return Err(Error::Timeout {
                    operation: self.operation.clone(),
                    elapsed,
                });
            }

            sleep(self.interval.min(self.timeout - elapsed)).await;
        }
    }
}
