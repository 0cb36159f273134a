//! Error types for gatehouse.

use std::path::PathBuf;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Question graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),

    #[error("Interview error: {0}")]
    Interview(#[from] InterviewError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors loading, saving or checking a question graph document.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Failed to read or write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid question graph document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Question id {0} is declared more than once")]
    DuplicateQuestionId(String),

    #[error("Question graph version {version} has no questions")]
    Empty { version: u32 },
}

/// A failed call across the platform capability interface.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityError {
    #[error("{operation} denied: {reason}")]
    PermissionDenied { operation: String, reason: String },

    #[error("{operation} failed: {what} not found")]
    NotFound { operation: String, what: String },

    #[error("{operation} failed: {reason}")]
    Failed { operation: String, reason: String },
}

impl CapabilityError {
    /// Name of the capability call that failed.
    pub fn operation(&self) -> &str {
        match self {
            Self::PermissionDenied { operation, .. }
            | Self::NotFound { operation, .. }
            | Self::Failed { operation, .. } => operation,
        }
    }
}

/// Errors surfaced by the interview state machine.
///
/// Validation failures and messages from participants without a session are
/// not errors; they come back as `SubmitOutcome` variants.
#[derive(Debug, thiserror::Error)]
pub enum InterviewError {
    #[error("No question graph configured for tenant {tenant}")]
    ConfigurationMissing { tenant: String },

    #[error("Question {question_id} has a conditional next step with no matching condition and no default")]
    UnreachableNextStep { question_id: String },

    #[error("Question {question_id} routes to unknown question {target_id}")]
    UnknownQuestion {
        question_id: String,
        target_id: String,
    },

    #[error("Could not open a private channel: {0}")]
    ChannelUnavailable(#[source] CapabilityError),
}

/// Result type alias for gatehouse.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_error_exposes_operation() {
        let err = CapabilityError::NotFound {
            operation: "grant_role".into(),
            what: "role 42".into(),
        };
        assert_eq!(err.operation(), "grant_role");
        assert_eq!(err.to_string(), "grant_role failed: role 42 not found");
    }

    #[test]
    fn interview_error_converts_into_top_level() {
        let err: Error = InterviewError::ConfigurationMissing {
            tenant: "guild-1".into(),
        }
        .into();
        assert!(matches!(err, Error::Interview(_)));
        assert!(err.to_string().contains("guild-1"));
    }
}
