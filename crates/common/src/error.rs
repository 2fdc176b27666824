//! Error types for the Corellium API client

use std::time::Duration;

use thiserror::Error;

/// Result type alias using the Corellium client Error
pub type Result<T> = std::result::Result<T, Error>;

/// Corellium client error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Resource not found: {kind} with id {id}")]
    NotFound { kind: String, id: String },

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Malformed response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("A {kind} with the {field} {name} already exists")]
    AlreadyExists {
        kind: String,
        field: String,
        name: String,
    },

    #[error("Timed out after {elapsed:?} waiting for {operation}")]
    Timeout { operation: String, elapsed: Duration },

    #[error("Unexpected state {state:?} while waiting for {operation}")]
    UnexpectedState { operation: String, state: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub fn already_exists(
        kind: impl Into<String>,
        field: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Error::AlreadyExists {
            kind: kind.into(),
            field: field.into(),
            name: name.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, Error::Forbidden { .. })
    }

    /// Body text the API returned, if this error carries one.
    pub fn body(&self) -> Option<&str> {
        match self {
            Error::Forbidden { message }
            | Error::Unauthorized { message }
            | Error::Api { message, .. } => Some(message),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_exists_message() {
        let err = Error::already_exists("project", "name", "lab");
        assert_eq!(err.to_string(), "A project with the name lab already exists");
    }

    #[test]
    fn test_timeout_message() {
        let err = Error::Timeout {
            operation: "instance abc to become ready".to_string(),
            elapsed: Duration::from_secs(300),
        };
        assert_eq!(
            err.to_string(),
            "Timed out after 300s waiting for instance abc to become ready"
        );
    }

    #[test]
    fn test_classification() {
        assert!(Error::not_found("instance", "i-1").is_not_found());
        assert!(Error::Forbidden { message: "no".into() }.is_forbidden());
        assert!(!Error::InvalidConfig("x".into()).is_forbidden());
    }

    #[test]
    fn test_body() {
        let err = Error::Api {
            status: 500,
            message: "boom".to_string(),
        };
        assert_eq!(err.body(), Some("boom"));
        assert_eq!(Error::not_found("team", "t").body(), None);
    }
}
