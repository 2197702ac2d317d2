//! Error types for the acceptance-test harness
//!
//! Every failure a test can hit maps onto one variant here. Callers that
//! expect a particular HTTP status (404 during destroy checks) branch on
//! [`Error::is_api_error_with_code`]; everything else fails the test.

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// A non-2xx response from a Google API
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("googleapi: Error {code}: {message}")]
pub struct ApiError {
    /// HTTP status code
    pub code: u16,
    /// Message from the Google error envelope, or the status reason
    pub message: String,
    /// URL of the failed request
    pub url: String,
}

/// Main error type for harness operations
#[derive(Debug, Error)]
pub enum Error {
    /// A `{{placeholder}}` in a template had no value
    #[error("unresolved reference {{{{{placeholder}}}}} in template {template:?}")]
    UnresolvedReference {
        /// The template being expanded
        template: String,
        /// Name of the placeholder that could not be resolved
        placeholder: String,
    },

    /// Replay found no unconsumed interaction for a request
    #[error(
        "cassette miss in {cassette}: no unconsumed interaction matches\n  {request}\n  ({consumed}/{recorded} interactions consumed){}",
        .nearest.as_ref().map(|n| format!("\n  closest recorded: {n}")).unwrap_or_default()
    )]
    CassetteMiss {
        /// Cassette name
        cassette: String,
        /// Normalized signature of the unmatched request
        request: String,
        /// Closest recorded signature with the same method and path, if any
        nearest: Option<String>,
        /// Interactions consumed so far
        consumed: usize,
        /// Interactions in the cassette
        recorded: usize,
    },

    /// Remote API returned a non-2xx status
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A lifecycle postcondition was not met
    #[error("{resource}: expected {expected}, got {actual}")]
    LifecycleAssertion {
        /// Resource address or type the assertion concerns
        resource: String,
        /// Expected state
        expected: String,
        /// Observed state
        actual: String,
    },

    /// A successful response did not have the expected JSON shape
    #[error("unexpected response shape at {context}: expected {expected}, found {found}")]
    Shape {
        /// Where in the response the mismatch occurred
        context: String,
        /// Expected JSON type
        expected: &'static str,
        /// Actual JSON type
        found: &'static str,
    },

    /// The request never produced a response
    #[error("transport error for {url}: {message}")]
    Transport {
        /// Request URL
        url: String,
        /// Underlying failure
        message: String,
    },

    /// The request exceeded its bounded wait
    #[error("request to {url} timed out")]
    Timeout {
        /// Request URL
        url: String,
    },

    /// Response body was not valid JSON
    #[error("failed to decode response from {url}: {source}")]
    Decode {
        /// Request URL
        url: String,
        /// Parser error
        #[source]
        source: serde_json::Error,
    },

    /// Cassette could not be loaded or stored
    #[error("cassette error [{path}]: {message}")]
    Cassette {
        /// Cassette file path
        path: String,
        /// Description of what failed
        message: String,
    },

    /// Filesystem error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The provider collaborator failed to apply, import or destroy
    #[error("provider error during {operation}: {cause:#}")]
    Provider {
        /// Operation that failed (apply, import, destroy)
        operation: &'static str,
        /// Provider-side error
        cause: anyhow::Error,
    },

    /// Harness configuration is invalid
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// True if this is an API error with the given HTTP status
    pub fn is_api_error_with_code(&self, code: u16) -> bool {
        matches!(self, Error::Api(e) if e.code == code)
    }

    /// True if the failure is worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Api(e) => matches!(e.code, 429 | 500 | 502 | 503 | 504),
            Error::Transport { .. } | Error::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Build a shape error for a JSON value of the wrong type
    pub(crate) fn shape(
        context: impl Into<String>,
        expected: &'static str,
        found: &serde_json::Value,
    ) -> Self {
        Error::Shape {
            context: context.into(),
            expected,
            found: crate::gcp::json::type_name(found),
        }
    }

    pub(crate) fn provider(operation: &'static str, cause: anyhow::Error) -> Self {
        Error::Provider { operation, cause }
    }
}
