//! Error types for the compile-and-integrate stage.
//!
//! Every failure surfaces unchanged to the host pipeline: the stage never
//! retries, and never substitutes fallback content. A call either produces
//! the full `{css, map, dependencies}` triple or fails entirely.

use std::fmt;

use thiserror::Error;

use crate::source_map::SourceMapError;

/// Convenience alias used throughout the crate.
pub type Result<T, E = StageError> = std::result::Result<T, E>;

/// The compiler backend rejected the input.
///
/// Carries the backend's message verbatim, plus location info when the
/// backend provided any. Never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    /// The backend's error message, unmodified.
    pub message: String,
    /// File the backend attributed the error to, if any.
    pub file: Option<String>,
    /// 1-based line, if the backend reported one.
    pub line: Option<u32>,
    /// 1-based column, if the backend reported one.
    pub column: Option<u32>,
}

impl BackendError {
    /// A backend error carrying only a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            file: None,
            line: None,
            column: None,
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        match (&self.file, self.line) {
            (Some(file), Some(line)) => {
                write!(f, " ({file}:{line}")?;
                if let Some(column) = self.column {
                    write!(f, ":{column}")?;
                }
                write!(f, ")")
            }
            (Some(file), None) => write!(f, " ({file})"),
            (None, Some(line)) => write!(f, " (line {line})"),
            (None, None) => Ok(()),
        }
    }
}

impl std::error::Error for BackendError {}

/// Merged options were self-contradictory.
///
/// Detected before the backend is invoked where feasible.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid compile options: {message}")]
pub struct ConfigurationError {
    pub message: String,
}

impl ConfigurationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A function-bridge callable could not resolve a logical asset path.
///
/// Propagates unmodified through the compile call; no fallback URL is
/// substituted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to resolve asset path `{path}`: {message}")]
pub struct ResolutionError {
    /// The logical path that failed to resolve (query/fragment stripped).
    pub path: String,
    pub message: String,
}

impl ResolutionError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// All errors a stage call can surface.
#[derive(Debug, Error)]
pub enum StageError {
    /// The compiler backend rejected the input.
    #[error("compilation failed: {0}")]
    Backend(#[from] BackendError),

    /// Merged options were self-contradictory.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// An asset path could not be resolved by the host environment.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// The backend's source map was malformed or could not be combined.
    #[error("source map error: {0}")]
    SourceMap(#[from] SourceMapError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_error_display_includes_location() {
        let err = BackendError {
            message: "expected \"}\"".into(),
            file: Some("app.scss".into()),
            line: Some(3),
            column: Some(7),
        };
        assert_eq!(err.to_string(), "expected \"}\" (app.scss:3:7)");

        let err = BackendError::message("undefined variable");
        assert_eq!(err.to_string(), "undefined variable");

        let err = BackendError {
            line: Some(12),
            ..BackendError::message("unterminated string")
        };
        assert_eq!(err.to_string(), "unterminated string (line 12)");
    }

    #[test]
    fn stage_error_wraps_taxonomy() {
        let err: StageError = ConfigurationError::new("syntax re-bound").into();
        assert!(matches!(err, StageError::Configuration(_)));

        let err: StageError = ResolutionError::new("logo.png", "not found").into();
        assert_eq!(
            err.to_string(),
            "failed to resolve asset path `logo.png`: not found"
        );
    }
}
