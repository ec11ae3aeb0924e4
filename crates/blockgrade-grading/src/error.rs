//! Error types for grading and submission.
//!
//! Two layers live here. [`FailureCategory`] is the user-facing taxonomy every
//! submission attempt resolves into; it never escapes as an error from
//! [`crate::SubmissionController::submit`]. [`GradingError`] covers the
//! operations that do fail loudly: loading configuration, building the HTTP
//! client, and the auxiliary endpoints (history, detail, mark-final, run).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A specialized `Result` type for grading operations.
pub type Result<T> = std::result::Result<T, GradingError>;

/// Why a submission attempt did not produce a grading result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// Nothing to submit. Detected locally, before any network call.
    Validation,
    /// No response reached the client: connection failure, timeout or cancellation.
    Network,
    /// The service answered 401.
    Unauthorized,
    /// The service answered 429.
    RateLimited,
    /// Any other failing status, or a success body that could not be understood.
    ServerError,
}

impl FailureCategory {
    /// Maps a failing HTTP status to its category.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Unauthorized,
            429 => Self::RateLimited,
            _ => Self::ServerError,
        }
    }

    /// Notification title for this category.
    #[must_use]
    pub const fn title(&self) -> &'static str {
        match self {
            Self::Validation => "Empty Code",
            Self::Network => "Cannot Connect",
            Self::Unauthorized => "Authentication Required",
            Self::RateLimited => "Too Many Submissions",
            Self::ServerError => "Submission Failed",
        }
    }

    /// Message shown when nothing more specific is known.
    #[must_use]
    pub const fn default_message(&self) -> &'static str {
        match self {
            Self::Validation => "Please write some code before submitting.",
            Self::Network => "Cannot connect to server. Please check your connection.",
            Self::Unauthorized => "Please login to submit your code.",
            Self::RateLimited => "You've reached the submission limit. Please try again later.",
            Self::ServerError => "Unable to submit code. Please try again.",
        }
    }

    /// Returns `true` if repeating the same request later may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::RateLimited | Self::ServerError)
    }

    /// Returns a suggestion message for this category.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::Validation => "Add some code or blocks before submitting",
            Self::Network => "Check that the grading service is reachable at the configured baseUrl",
            Self::Unauthorized => "Set BLOCKGRADE_TOKEN or tokenFile to a valid session token",
            Self::RateLimited => "Wait a while before submitting again",
            Self::ServerError => "Retry later; the grading service may be experiencing issues",
        }
    }
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Network => write!(f, "network"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::ServerError => write!(f, "server_error"),
        }
    }
}

/// Errors raised by grading operations outside the submission workflow.
#[derive(Debug, thiserror::Error)]
pub enum GradingError {
    /// Invalid JSON syntax in the configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your blockgrade.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    /// A request to the grading or execution service failed.
    #[error("Request failed ({category}): {message}\n\nSuggestion: {suggestion}", suggestion = .category.suggestion())]
    Request {
        /// How the request failed.
        category: FailureCategory,
        /// Message from the service or a fixed description.
        message: String,
    },

    /// The execution service cannot run the request.
    #[error("Cannot execute code: {message}\n\nSuggestion: Use one of: {supported}")]
    Execution {
        /// What went wrong.
        message: String,
        /// Comma separated list of supported languages.
        supported: String,
    },

    /// The HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// General I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GradingError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `Request` error.
    #[must_use]
    pub fn request(category: FailureCategory, message: impl Into<String>) -> Self {
        Self::Request {
            category,
            message: message.into(),
        }
    }

    /// Creates a `Request` error for a request that got no response.
    #[must_use]
    pub fn network() -> Self {
        Self::request(
            FailureCategory::Network,
            FailureCategory::Network.default_message(),
        )
    }

    /// Creates a new `Execution` error.
    #[must_use]
    pub fn execution(message: impl Into<String>, supported: &[&str]) -> Self {
        Self::Execution {
            message: message.into(),
            supported: supported.join(", "),
        }
    }

    /// The failure category, if this error came from a request.
    #[must_use]
    pub const fn category(&self) -> Option<FailureCategory> {
        match self {
            Self::Request { category, .. } => Some(*category),
            _ => None,
        }
    }

    /// Returns `true` if this error is transient and may be retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Request { category, .. } => category.is_retryable(),
            _ => false,
        }
    }
}
