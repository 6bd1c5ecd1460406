//! Error types for the report pipeline.
//!
//! Only a handful of conditions abort a run: insufficient data, configuration
//! problems (including a missing API credential) and cancellation. Row-level,
//! chart-level, model and per-file write failures are carried as values in
//! their component results and surfaced as warnings instead.
//!
//! Errors are serializable as `{code, message}` so a caller can forward them
//! to a UI or a JSON log without losing the stable code.

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for the report pipeline.
#[derive(Error, Debug)]
pub enum ReportError {
    /// Run was cancelled through the cancellation token.
    #[error("Pipeline cancelled")]
    Cancelled,

    /// Dataset is empty, below the minimum row count, or lost too many rows
    /// during validation.
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Required API credential is not set in the environment.
    #[error("Missing credential: environment variable '{0}' is not set or empty")]
    MissingCredential(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input file could not be interpreted as a table.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A rendered text would exceed its character budget.
    #[error("{what} needs {needed} characters but the budget is {budget}")]
    BudgetExceeded {
        what: String,
        needed: usize,
        budget: usize,
    },

    /// Internal error (e.g., worker thread panicked).
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client construction error (only with "ai" feature).
    #[cfg(feature = "ai")]
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ReportError>,
    },
}

impl ReportError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ReportError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Stable error code for programmatic handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Cancelled => "CANCELLED",
            Self::InsufficientData(_) => "INSUFFICIENT_DATA",
            Self::MissingCredential(_) => "MISSING_CREDENTIAL",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::BudgetExceeded { .. } => "BUDGET_EXCEEDED",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            #[cfg(feature = "ai")]
            Self::HttpClient(_) => "HTTP_CLIENT_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Check if this error represents a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::WithContext { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Check if this error is a configuration problem surfaced before any
    /// pipeline work (missing credential, invalid settings).
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::MissingCredential(_) | Self::InvalidConfig(_) => true,
            Self::WithContext { source, .. } => source.is_configuration(),
            _ => false,
        }
    }

    /// Check if this error must abort the run rather than degrade it.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::InsufficientData(_) | Self::Cancelled => true,
            Self::WithContext { source, .. } => source.is_fatal(),
            other => other.is_configuration(),
        }
    }

    /// Process exit status for this error.
    ///
    /// `2` for insufficient data, `130` for cancellation, `1` otherwise.
    pub fn exit_code(&self) -> i32 {
        match self.error_code() {
            "INSUFFICIENT_DATA" => 2,
            "CANCELLED" => 130,
            _ => 1,
        }
    }
}

/// Errors are serialized as a struct with `code` and `message` fields.
impl Serialize for ReportError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("ReportError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for report operations.
pub type Result<T> = std::result::Result<T, ReportError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| ReportError::Polars(e).with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| ReportError::Io(e).with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(ReportError::Cancelled.error_code(), "CANCELLED");
        assert_eq!(
            ReportError::InsufficientData("empty".to_string()).error_code(),
            "INSUFFICIENT_DATA"
        );
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ReportError::InsufficientData("x".into()).exit_code(), 2);
        assert_eq!(ReportError::MissingCredential("KEY".into()).exit_code(), 1);
        assert_eq!(ReportError::Cancelled.exit_code(), 130);
    }

    #[test]
    fn test_is_configuration() {
        assert!(ReportError::MissingCredential("KEY".into()).is_configuration());
        assert!(ReportError::InvalidConfig("bad".into()).is_configuration());
        assert!(!ReportError::InsufficientData("x".into()).is_configuration());
    }

    #[test]
    fn test_error_serialization() {
        let error = ReportError::MissingCredential("GOOGLE_API_KEY".to_string());
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("MISSING_CREDENTIAL"));
        assert!(json.contains("GOOGLE_API_KEY"));
    }

    #[test]
    fn test_with_context_preserves_code() {
        let error = ReportError::InsufficientData("no rows".to_string()).with_context("During transform");
        assert!(error.to_string().contains("During transform"));
        assert_eq!(error.error_code(), "INSUFFICIENT_DATA");
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_is_fatal() {
        assert!(ReportError::InsufficientData("x".into()).is_fatal());
        assert!(ReportError::MissingCredential("KEY".into()).is_fatal());
        assert!(ReportError::Cancelled.with_context("retry").is_fatal());
        assert!(!ReportError::Internal("chart".into()).is_fatal());
    }

    #[test]
    fn test_cancelled_through_context() {
        let error = ReportError::Cancelled.with_context("While waiting to retry");
        assert!(error.is_cancelled());
    }
}
