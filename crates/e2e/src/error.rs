//! Error types for fixture provisioning

use thiserror::Error;

use crate::diagnostics::DiagnosticBundle;
use crate::model::ResourceKind;

#[derive(Error, Debug)]
pub enum E2eError {
    /// The application rejected the label because a sibling already uses it.
    #[error("Name conflict: '{label}' already exists")]
    ValidationConflict { label: String },

    #[error("Gave up on '{requested}' after {attempts} conflicting attempts (last '{last_label}')")]

    ConflictRetriesExhausted {
        requested: String,
        attempts: u32,
        last_label: String,
    },

    #[error("Timeout waiting for {what} after {after_ms} ms")]
    Timeout {
        what: String,
        after_ms: u64,
        diagnostics: Option<Box<DiagnosticBundle>>,
    },

    #[error("Creating {kind} '{label}' failed while {phase}: {reason}")]
    CreationFailed {
        kind: ResourceKind,
        label: String,
        phase: String,
        reason: String,
        diagnostics: Option<Box<DiagnosticBundle>>,
    },

    /// Backend error surfaced through the UI
    #[error("Network failure: {message}")]
    NetworkFailure {
        message: String,
        diagnostics: Option<Box<DiagnosticBundle>>,
    },

    #[error("Assertion failed: {message}")]
    AssertionFailed {
        message: String,
        diagnostics: Option<Box<DiagnosticBundle>>,
    },

    #[error("A {0} needs a parent folder and synthetic parents are disabled")]
    ContainmentRequired(ResourceKind),

    #[error("Parent '{0}' is not present in the tree")]
    UnknownParent(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Playwright not found. Install with: npx playwright install")]
    PlaywrightNotFound,

    #[error("Fixture plan parse error: {0}")]
    PlanParse(String),

    #[error("Server failed to start: {0}")]
    ServerStartup(String),

    #[error("Server health check failed after {0} attempts")]
    ServerHealthCheck(usize),

    #[error("Admin API error: {0}")]
    Admin(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl E2eError {
    /// Only name conflicts are resolved locally; everything else is fatal for the call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, E2eError::ValidationConflict { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, E2eError::Timeout { .. })
    }

    /// Diagnostic bundle captured when the failure happened, if any.
    pub fn diagnostics(&self) -> Option<&DiagnosticBundle> {
        match self {
            E2eError::Timeout { diagnostics, .. }
            | E2eError::CreationFailed { diagnostics, .. }
            | E2eError::NetworkFailure { diagnostics, .. }
            | E2eError::AssertionFailed { diagnostics, .. } => diagnostics.as_deref(),
            _ => None,
        }
    }

    /// Attach a diagnostic bundle to errors that carry one. Other variants pass through.
    pub fn with_diagnostics(self, bundle: DiagnosticBundle) -> Self {
        match self {
            E2eError::Timeout { what, after_ms, .. } => E2eError::Timeout {
                what,
                after_ms,
                diagnostics: Some(Box::new(bundle)),
            },
            E2eError::CreationFailed {
                kind,
                label,
                phase,
                reason,
                ..
            } => E2eError::CreationFailed {
                kind,
                label,
                phase,
                reason,
                diagnostics: Some(Box::new(bundle)),
            },

            E2eError::NetworkFailure { message, .. } => E2eError::NetworkFailure {
                message,
                diagnostics: Some(Box::new(bundle)),
            },
            E2eError::AssertionFailed { message, .. } => E2eError::AssertionFailed {
                message,
                diagnostics: Some(Box::new(bundle)),
            },
            other => other,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        E2eError::NetworkFailure {
            message: message.into(),
            diagnostics: None,
        }
    }

    pub fn assertion(message: impl Into<String>) -> Self {
        E2eError::AssertionFailed {
            message: message.into(),
            diagnostics: None,
        }
    }

    pub(crate) fn timeout(what: impl Into<String>, after: std::time::Duration) -> Self {
        E2eError::Timeout {
            what: what.into(),
            after_ms: after.as_millis() as u64,
            diagnostics: None,
        }
    }
}

pub type E2eResult<T> = Result<T, E2eError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_only_conflicts_are_retryable() {
        assert!(E2eError::ValidationConflict { label: "Plan".into() }.is_retryable());
        assert!(!E2eError::timeout("dialog", Duration::from_secs(1)).is_retryable());
        assert!(!E2eError::network("500").is_retryable());
        assert!(!E2eError::assertion("x").is_retryable());
    }

    #[test]
    fn test_timeout_message_includes_duration() {
        let err = E2eError::timeout("readiness of 'Plan 1'", Duration::from_millis(5000));
        assert_eq!(err.to_string(), "Timeout waiting for readiness of 'Plan 1' after 5000 ms");
        assert!(err.diagnostics().is_none());
    }

    #[test]
    fn test_backend_failures_carry_diagnostics() {
        let bundle = DiagnosticBundle {
            captured_at: chrono::Utc::now(),
            reason: "toast".into(),
            tree_dump: Some("Projects 1".into()),
            screenshot_path: None,
            screenshot_sha256: None,
        };
        let err = E2eError::network("Could not save item").with_diagnostics(bundle.clone());
        assert_eq!(err.to_string(), "Network failure: Could not save item");
        assert_eq!(err.diagnostics(), Some(&bundle));

        let err = E2eError::assertion("label mismatch").with_diagnostics(bundle);
        assert!(err.diagnostics().is_some());
    }
}
