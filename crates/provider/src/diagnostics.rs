//! Diagnostics reported back to Terraform

use corellium_common::Error as ApiError;
use thiserror::Error;

use crate::state::Value;
use crate::tfplugin6::{attribute_path, diagnostic, AttributePath, Diagnostic};

/// Failure of a resource or data source operation, shown to the user as an
/// error diagnostic.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{summary}: {detail}")]
pub struct ResourceError {
    pub summary: String,
    pub detail: String,
    /// State to record when the remote object exists despite the failure
    pub partial_state: Option<Value>,
}

impl ResourceError {
    pub fn new(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            detail: detail.into(),
            partial_state: None,
        }
    }

    /// Keep `state` in Terraform so the object created before the failure
    /// is tracked and can be destroyed.
    pub fn with_partial_state(mut self, state: Value) -> Self {
        self.partial_state = Some(state);
        self
    }

    /// Wrap an API error. `action` completes "trying to ..." and
    /// "You don't have permission to ...".
    pub fn from_api(summary: &str, action: &str, err: &ApiError) -> Self {
        let detail = match err {
            ApiError::Forbidden { .. } => format!("You don't have permission to {action}."),
            ApiError::AlreadyExists { .. } | ApiError::Timeout { .. } => err.to_string(),
            other => {
                let body = other.body().map(str::to_string).unwrap_or_else(|| other.to_string());
                format!("An unexpected error was encountered trying to {action}:\n\n{body}")
            }
        };
        Self::new(summary, detail)
    }
}

pub trait ApiResultExt<T> {
    /// Map an API failure to a [`ResourceError`] with the given summary.
    fn or_summary(self, summary: &str, action: &str) -> Result<T, ResourceError>;
}

impl<T> ApiResultExt<T> for Result<T, ApiError> {
    fn or_summary(self, summary: &str, action: &str) -> Result<T, ResourceError> {
        self.map_err(|e| ResourceError::from_api(summary, action, &e))
    }
}

/// Warnings and errors collected during one RPC
#[derive(Debug, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, severity: diagnostic::Severity, summary: &str, detail: &str, attribute: Option<&str>) {
        self.items.push(Diagnostic {
            severity: severity as i32,
            summary: summary.to_string(),
            detail: detail.to_string(),
            attribute: attribute.map(top_level_path),
        });
    }

    pub fn error(&mut self, summary: &str, detail: &str) {
        self.push(diagnostic::Severity::Error, summary, detail, None);
    }

    pub fn attribute_error(&mut self, attribute: &str, summary: &str, detail: &str) {
        self.push(diagnostic::Severity::Error, summary, detail, Some(attribute));
    }

    pub fn warning(&mut self, summary: &str, detail: &str) {
        self.push(diagnostic::Severity::Warning, summary, detail, None);
    }

    pub fn push_error(&mut self, err: &ResourceError) {
        self.error(&err.summary, &err.detail);
    }

    pub fn has_error(&self) -> bool {
        self.items
            .iter()
            .any(|d| d.severity == diagnostic::Severity::Error as i32)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_proto(self) -> Vec<Diagnostic> {
        self.items
    }
}

/// Path to a top-level attribute
pub fn top_level_path(name: &str) -> AttributePath {
    AttributePath {
        steps: vec![attribute_path::Step {
            selector: Some(attribute_path::step::Selector::AttributeName(name.to_string())),
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forbidden_gets_permission_message() {
        let err: Result<(), ApiError> = Err(ApiError::Forbidden {
            message: "nope".to_string(),
        });
        let err = err.or_summary("Error creating project", "create a project").unwrap_err();
        assert_eq!(err.summary, "Error creating project");
        assert_eq!(err.detail, "You don't have permission to create a project.");
    }

    #[test]
    fn test_api_error_detail_carries_body() {
        let err = ResourceError::from_api(
            "Error reading instance",
            "read the instance",
            &ApiError::Api {
                status: 500,
                message: "{\"error\":\"boom\"}".to_string(),
            },
        );
        assert_eq!(
            err.detail,
            "An unexpected error was encountered trying to read the instance:\n\n{\"error\":\"boom\"}"
        );
    }

    #[test]
    fn test_already_exists_is_reported_verbatim() {
        let err = ResourceError::from_api(
            "Error creating project",
            "create the project",
            &ApiError::already_exists("project", "name", "lab"),
        );
        assert_eq!(err.detail, "A project with the name lab already exists");
    }

    #[test]
    fn test_diagnostics_severity() {
        let mut diags = Diagnostics::new();
        diags.warning("Instance is being created", "");
        assert!(!diags.has_error());
        diags.attribute_error("token", "Missing Corellium API Token", "set it");
        assert!(diags.has_error());

        let proto = diags.into_proto();
        assert_eq!(proto.len(), 2);
        let path = proto[1].attribute.as_ref().unwrap();
        assert_eq!(
            path.steps[0].selector,
            Some(attribute_path::step::Selector::AttributeName("token".to_string()))
        );
    }
}
