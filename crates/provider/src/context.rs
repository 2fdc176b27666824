//! Per-provider context handed to every resource and data source call

use std::time::Duration;

use corellium_common::{ClientConfig, CorelliumClient, POLL_INTERVAL};
use tokio::sync::Mutex;

/// Built once by `ConfigureProvider`.
pub struct ProviderContext {
    pub client: CorelliumClient,
    /// Serializes project creation so concurrent applies cannot race the
    /// duplicate-name check.
    pub project_create_lock: Mutex<()>,
    /// Delay between status checks while waiting on an instance
    pub poll_interval: Duration,
}

impl ProviderContext {
    pub fn new(config: &ClientConfig) -> corellium_common::Result<Self> {
        Ok(Self::with_client(CorelliumClient::new(config)?))
    }

    pub fn with_client(client: CorelliumClient) -> Self {
        Self {
            client,
            project_create_lock: Mutex::new(()),
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}
