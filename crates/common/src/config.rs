//! Client configuration
//!
//! Resolves the API host and bearer token from explicit values, falling
//! back to the environment.

use std::time::Duration;

use crate::error::{Error, Result};

pub const TOKEN_ENV: &str = "CORELLIUM_API_TOKEN";
pub const LEGACY_TOKEN_ENV: &str = "CORELLIUM_TOKEN";
pub const HOST_ENV: &str = "CORELLIUM_API_HOST";
pub const TIMEOUT_ENV: &str = "CORELLIUM_API_TIMEOUT";

pub const DEFAULT_HOST: &str = "app.corellium.com";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection settings for [`crate::client::CorelliumClient`]
#[derive(Clone)]
pub struct ClientConfig {
    /// Host name, optionally prefixed with `http://` or `https://`
    pub host: String,
    pub token: String,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("host", &self.host)
            .field("token", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            token: token.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Build a config purely from the environment.
    pub fn from_env() -> Result<Self> {
        Self::resolve(None, None)
    }

    /// Build a config from explicit values, using the environment for
    /// anything left unset. Empty strings count as unset.
    pub fn resolve(token: Option<String>, host: Option<String>) -> Result<Self> {
        let token = non_empty(token)
            .or_else(|| env_var(TOKEN_ENV))
            .or_else(|| env_var(LEGACY_TOKEN_ENV))
            .ok_or_else(|| {
                Error::InvalidConfig(format!(
                    "no API token configured; set the provider `token` attribute or {TOKEN_ENV}"
                ))
            })?;

        let host = non_empty(host)
            .or_else(|| env_var(HOST_ENV))
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        let request_timeout = match env_var(TIMEOUT_ENV) {
            Some(raw) => raw
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| Error::InvalidConfig(format!("{TIMEOUT_ENV} must be whole seconds, got {raw:?}")))?,
            None => DEFAULT_REQUEST_TIMEOUT,
        };

        Ok(Self {
            host,
            token,
            request_timeout,
        })
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Base URL every API path is appended to, e.g. `https://app.corellium.com/api`
    pub fn base_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            format!("{host}/api")
        } else {
            format!("https://{host}/api")
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn env_var(name: &str) -> Option<String> {
    non_empty(std::env::var(name).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_defaults_to_https() {
        let config = ClientConfig::new("app.corellium.com", "t");
        assert_eq!(config.base_url(), "https://app.corellium.com/api");
    }

    #[test]
    fn test_base_url_keeps_explicit_scheme() {
        let config = ClientConfig::new("http://127.0.0.1:8080/", "t");
        assert_eq!(config.base_url(), "http://127.0.0.1:8080/api");
    }

    #[test]
    fn test_explicit_values_win() {
        let config =
            ClientConfig::resolve(Some("explicit".into()), Some("lab.example.com".into())).unwrap();
        assert_eq!(config.token, "explicit");
        assert_eq!(config.host, "lab.example.com");
    }

    #[test]
    fn test_builder_overrides() {
        let config = ClientConfig::new(DEFAULT_HOST, "t")
            .with_host("http://localhost:3000")
            .with_request_timeout(Duration::from_secs(5));
        assert_eq!(config.base_url(), "http://localhost:3000/api");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = ClientConfig::new("h", "super-secret");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret"));
    }
}
