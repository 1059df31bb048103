//! Request-level error types for traffic routing
//!
//! Store failures never surface here: the project directory and traffic log
//! degrade them to "no match". What remains is the caller's fault
//! (validation), nothing to report (not found) or terminal for the request
//! (oracle failures).

use serde::Serialize;
use thiserror::Error;

/// Main error type for routing a single message
#[derive(Debug, Error)]
pub enum TrafficError {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Classifier unavailable: {message}")]
    OracleUnavailable { message: String },

    #[error("Classifier returned invalid output: {message}")]
    MalformedOracleOutput {
        message: String,
        raw_response: String,
    },

    #[error("Not found: {message}")]
    NotFound {
        message: String,
        client_code: Option<String>,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// JSON error body returned to HTTP callers
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    #[serde(rename = "clientCode", skip_serializing_if = "Option::is_none")]
    pub client_code: Option<String>,
}

impl TrafficError {
    /// Map to an HTTP status code and response body
    pub fn to_error_body(&self) -> (u16, ErrorBody) {
        match self {
            TrafficError::Validation { message } => (
                400,
                ErrorBody {
                    error: message.clone(),
                    details: None,
                    raw_response: None,
                    client_code: None,
                },
            ),
            TrafficError::OracleUnavailable { message } => (
                500,
                ErrorBody {
                    error: "Classifier unavailable".to_string(),
                    details: Some(sanitize_error_message(message)),
                    raw_response: None,
                    client_code: None,
                },
            ),
            TrafficError::MalformedOracleOutput {
                message,
                raw_response,
            } => (
                500,
                ErrorBody {
                    error: "Classifier returned invalid JSON".to_string(),
                    details: Some(sanitize_error_message(message)),
                    raw_response: Some(sanitize_error_message(raw_response)),
                    client_code: None,
                },
            ),
            TrafficError::NotFound {
                message,
                client_code,
            } => (
                404,
                ErrorBody {
                    error: message.clone(),
                    details: None,
                    raw_response: None,
                    client_code: client_code.clone(),
                },
            ),
            TrafficError::Config(e) => (
                500,
                ErrorBody {
                    error: "Internal server error".to_string(),
                    details: Some(sanitize_error_message(&e.to_string())),
                    raw_response: None,
                    client_code: None,
                },
            ),
            TrafficError::Internal { message } => (
                500,
                ErrorBody {
                    error: "Internal server error".to_string(),
                    details: Some(sanitize_error_message(message)),
                    raw_response: None,
                    client_code: None,
                },
            ),
        }
    }

    /// Create validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create oracle-unavailable error
    pub fn oracle_unavailable<S: Into<String>>(message: S) -> Self {
        Self::OracleUnavailable {
            message: message.into(),
        }
    }

    /// Create malformed-oracle-output error carrying the raw text
    pub fn malformed_oracle_output<S: Into<String>, R: Into<String>>(
        message: S,
        raw_response: R,
    ) -> Self {
        Self::MalformedOracleOutput {
            message: message.into(),
            raw_response: raw_response.into(),
        }
    }

    /// Create not-found error for a client's records
    pub fn not_found<S: Into<String>>(message: S, client_code: Option<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            client_code,
        }
    }

    /// Create internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

static SECRET_PATTERN: once_cell::sync::Lazy<regex::Regex> = once_cell::sync::Lazy::new(|| {
    regex::Regex::new(r"(?i)(password|token|key|secret|bearer)[=:\s]\s*\S+")
        .expect("secret pattern is valid")
});

/// Redact secrets and cap the length of diagnostics sent to callers
fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = SECRET_PATTERN
        .replace_all(message, "${1}=***")
        .to_string();

    // Truncate on a char boundary so multi-byte text never panics
    const MAX_LEN: usize = 500;
    let truncate_suffix = "...[truncated]";
    if sanitized.len() > MAX_LEN {
        let mut cut = MAX_LEN - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}

/// Result type for routing operations
pub type TrafficResult<T> = Result<T, TrafficError>;
