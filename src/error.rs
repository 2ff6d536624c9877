//! Error types for the genome-gateway crate.
//!
//! Every failure a tool call can hit is a [`GatewayError`]. Callers that need
//! a machine-readable classification use [`GatewayError::kind`], which folds
//! the variants into the five reported [`ErrorKind`]s.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::genome::validate::FieldViolation;

/// Reported error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Arguments were malformed; the engine was never contacted.
    ValidationError,
    /// The requested operation is not in the catalogue.
    UnknownOperation,
    /// The engine process could not be started, crashed, or hung.
    TransportError,
    /// The engine exited cleanly but did not emit a valid envelope.
    ProtocolError,
    /// The engine understood the request and reported a domain failure.
    EngineError,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ValidationError => "validation_error",
            Self::UnknownOperation => "unknown_operation",
            Self::TransportError => "transport_error",
            Self::ProtocolError => "protocol_error",
            Self::EngineError => "engine_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gateway error types.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// One or more argument fields violated their constraints.
    #[error("invalid arguments for '{operation}': {}", join_violations(.violations))]
    Validation {
        operation: String,
        violations: Vec<FieldViolation>,
    },

    /// No operation with this name is registered.
    #[error("unknown operation: '{name}'")]
    UnknownOperation { name: String },

    /// The engine process could not be started at all.
    #[error("failed to launch engine '{program}': {reason}")]
    Launch { program: String, reason: String },

    /// The engine process exited with a non-zero status.
    #[error("engine exited with {} for '{operation}': {stderr}", describe_code(.code))]
    Exit {
        operation: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The engine did not exit within the configured timeout and was killed.
    #[error("engine timed out after {}s for '{operation}'", seconds(.after))]
    Timeout { operation: String, after: Duration },

    /// Reading the engine's output streams failed.
    #[error("engine I/O failed for '{operation}': {reason}")]
    Io { operation: String, reason: String },

    /// The batch worker pool could not be created.
    #[error("failed to start batch workers: {0}")]
    WorkerPool(String),

    /// The engine's standard output was not a valid envelope.
    #[error("malformed engine response for '{operation}': {reason}")]
    Protocol { operation: String, reason: String },

    /// The envelope reported `success: false`.
    #[error("engine reported failure for '{operation}': {message}")]
    Engine { operation: String, message: String },
}

impl GatewayError {
    /// Single-field validation failure.
    pub fn invalid(operation: &str, field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            operation: operation.to_owned(),
            violations: vec![FieldViolation::new(field, reason)],
        }
    }

    /// Classification of this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::ValidationError,
            Self::UnknownOperation { .. } => ErrorKind::UnknownOperation,
            Self::Launch { .. }
            | Self::Exit { .. }
            | Self::Timeout { .. }
            | Self::Io { .. }
            | Self::WorkerPool(_) => ErrorKind::TransportError,
            Self::Protocol { .. } => ErrorKind::ProtocolError,
            Self::Engine { .. } => ErrorKind::EngineError,
        }
    }

    /// Structured form reported to MCP clients.
    pub fn to_json(&self) -> serde_json::Value {
        let mut value = serde_json::json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        if let Self::Validation { violations, .. } = self {
            value["violations"] = serde_json::json!(violations);
        }
        value
    }
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn describe_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_owned(), |c| format!("status {c}"))
}

fn seconds(duration: &Duration) -> f64 {
    duration.as_secs_f64()
}

/// Convenience result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Startup configuration failures. These are fatal, never per-call.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The engine credential is absent or blank.
    #[error("missing engine credential: set {var}")]
    MissingCredential { var: &'static str },

    /// Neither `--engine` nor the engine variable names a program.
    #[error("no engine configured: pass --engine or set {var}")]
    MissingEngine { var: &'static str },

    /// The engine program could not be resolved.
    #[error("engine program '{program}' not found: {reason}")]
    EngineNotFound { program: String, reason: String },

    /// A flag or variable had an unusable value.
    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let launch = GatewayError::Launch {
            program: "engine".to_owned(),
            reason: "No such file or directory".to_owned(),
        };
        let exit = GatewayError::Exit {
            operation: "predict_interval".to_owned(),
            code: Some(1),
            stderr: "boom".to_owned(),
        };
        assert_eq!(launch.kind(), ErrorKind::TransportError);
        assert_eq!(exit.kind(), ErrorKind::TransportError);
        assert_eq!(
            GatewayError::UnknownOperation { name: "x".to_owned() }.kind(),
            ErrorKind::UnknownOperation
        );
        assert_eq!(
            GatewayError::invalid("op", "sequence", "empty").kind(),
            ErrorKind::ValidationError
        );
    }

    #[test]
    fn test_messages_keep_diagnostics_verbatim() {
        let err = GatewayError::Engine {
            operation: "score_variant".to_owned(),
            message: "upstream rejected request: quota exceeded".to_owned(),
        };
        assert!(err.to_string().contains("upstream rejected request: quota exceeded"));

        let exit = GatewayError::Exit {
            operation: "get_metadata".to_owned(),
            code: None,
            stderr: "Traceback (most recent call last)".to_owned(),
        };
        let text = exit.to_string();
        assert!(text.contains("signal"));
        assert!(text.contains("Traceback"));
    }

    #[test]
    fn test_validation_json_lists_violations() {
        let err = GatewayError::Validation {
            operation: "predict_interval".to_owned(),
            violations: vec![
                FieldViolation::new("chromosome", "must not be empty"),
                FieldViolation::new("end", "must be greater than start"),
            ],
        };
        let json = err.to_json();
        assert_eq!(json["kind"], "validation_error");
        assert_eq!(json["violations"].as_array().map(Vec::len), Some(2));
        assert!(json["message"].as_str().is_some_and(|m| m.contains("end: must be greater")));
    }
}
