//! Error types for management API and deploy operations.
//!
//! Errors are categorized so callers can tell a broker that refused a
//! request apart from one that could not be reached, and both apart from
//! bad local input.

use std::fmt;

/// Result type alias for rabbitkit operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of rabbitkit errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The broker could not be reached (transient, retryable).
    Network,
    /// The broker rejected a request.
    Rejected,
    /// Options or URLs that make no sense together.
    Usage,
    /// Definitions problems surfaced while deploying.
    Definitions,
    /// The broker answered with something unexpected.
    Format,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Broker unreachable",
            Self::Rejected => "Broker rejected a request",
            Self::Usage => "Invalid options",
            Self::Definitions => "Definitions are invalid",
            Self::Format => "Unexpected broker response",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network => "Check the broker URL and that the management plugin is enabled",
            Self::Rejected => "Check credentials and the request details, the broker may be partially updated",
            Self::Usage => "Check the command line and configuration",
            Self::Definitions => "Run validate on the desired definitions",
            Self::Format => "Check that the URL points at a RabbitMQ management API",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// HTTP methods used against the management API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
}

impl Method {
    /// Whether requests with this method change broker state.
    pub fn is_mutating(self) -> bool {
        self != Self::Get
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors that can occur while talking to the broker or deploying.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The broker answered with a status of 300 or above.
    #[error("{method} {url} failed with HTTP {status}: {response}")]
    Request {
        /// HTTP status code.
        status: u16,
        /// Request method.
        method: Method,
        /// Full request URL.
        url: String,
        /// Request body, if one was sent.
        body: Option<serde_json::Value>,
        /// Response body, parsed when it is JSON.
        response: serde_json::Value,
    },

    /// The request never got an answer.
    #[error("request failed: {message}")]
    Transport {
        /// Error message.
        message: String,
    },

    /// Deploy options that exclude each other.
    #[error("Option conflict: {0}")]
    OptionConflict(String),

    /// Deploy options out of range.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// A broker URL that cannot be used.
    #[error("invalid broker URL: {0}")]
    InvalidUrl(String),

    /// An operation the management API has no endpoint for.
    #[error("cannot {operation} {kind} in place")]
    Unsupported {
        /// Operation requested.
        operation: String,
        /// Resource kind.
        kind: String,
    },

    /// A response that is not what the management API returns.
    #[error("invalid API response: {0}")]
    InvalidResponse(String),

    /// Desired or current definitions could not be processed.
    #[error(transparent)]
    Definitions(#[from] definitions::Error),
}

impl Error {
    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// HTTP status of a rejected request.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Request { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Transport { .. } => ErrorCategory::Network,
            Error::Request { .. } => ErrorCategory::Rejected,
            Error::OptionConflict(_)
            | Error::InvalidOptions(_)
            | Error::InvalidUrl(_)
            | Error::Unsupported { .. } => ErrorCategory::Usage,
            Error::InvalidResponse(_) => ErrorCategory::Format,
            Error::Definitions(_) => ErrorCategory::Definitions,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        Self::transport(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_category_retryable() {
        assert!(ErrorCategory::Network.is_retryable());
        assert!(!ErrorCategory::Rejected.is_retryable());
        assert!(!ErrorCategory::Usage.is_retryable());
        assert!(!ErrorCategory::Definitions.is_retryable());
        assert!(!ErrorCategory::Format.is_retryable());
    }

    #[test]
    fn test_error_category_advice() {
        assert!(!ErrorCategory::Network.advice().is_empty());
        assert!(!ErrorCategory::Rejected.advice().is_empty());
        assert!(format!("{}", ErrorCategory::Network).contains("unreachable"));
    }

    #[test]
    fn test_request_error_display() {
        let err = Error::Request {
            status: 404,
            method: Method::Delete,
            url: "http://localhost:15672/api/queues/%2F/q".to_string(),
            body: None,
            response: json!({"error": "Object Not Found", "reason": "Not Found"}),
        };
        let display = err.to_string();
        assert!(display.starts_with("DELETE http://localhost:15672/api/queues/%2F/q"));
        assert!(display.contains("404"));
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.category(), ErrorCategory::Rejected);
    }

    #[test]
    fn test_option_conflict_display() {
        let err = Error::OptionConflict("--no-deletions and --recreate-changed both enabled.".into());
        assert_eq!(
            err.to_string(),
            "Option conflict: --no-deletions and --recreate-changed both enabled."
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_transport_is_retryable() {
        assert!(Error::transport("connection refused").is_retryable());
    }

    #[test]
    fn test_definitions_error_is_transparent() {
        let err: Error = definitions::Error::NoSources.into();
        assert_eq!(err.to_string(), definitions::Error::NoSources.to_string());
        assert_eq!(err.category(), ErrorCategory::Definitions);
    }

    #[test]
    fn test_method() {
        assert!(!Method::Get.is_mutating());
        assert!(Method::Post.is_mutating());
        assert_eq!(Method::Delete.to_string(), "DELETE");
    }
}
