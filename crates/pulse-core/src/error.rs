//! Error types for ledger operations.
//!
//! Strict-mode outcomes are *not* errors: they are computed in full and
//! reported as reason codes. The variants here cover input problems (the
//! caller supplied something unusable) and runtime failures (the filesystem
//! or serializer failed underneath us).
//!
//! Display strings never repeat the underlying cause; it is reachable through
//! [`std::error::Error::source`] and printed once by chain-aware formatting.

use std::error::Error as _;
use std::fmt::Write as _;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading, writing or evaluating ledgers.
#[derive(Debug, Error)]
pub enum PulseError {
    /// A required input file does not exist.
    #[error("input not found: {}", path.display())]
    MissingInput {
        /// The path that was expected to exist.
        path: PathBuf,
    },

    /// A digest or report file is not valid JSON.
    #[error("invalid JSON in {}", path.display())]
    InvalidJson {
        /// The offending file.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// A digest or report has the wrong root shape.
    #[error("invalid input shape in {}: {reason}", path.display())]
    InvalidShape {
        /// The offending file.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// A window size of zero (or less) was requested.
    #[error("invalid window size: {0} (must be >= 1)")]
    InvalidWindow(i64),

    /// A compaction policy or threshold is unusable.
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    /// A filesystem operation failed.
    #[error("{op} {}", path.display())]
    Io {
        /// Short description of the operation (`read`, `append`, ...).
        op: &'static str,
        /// The path being operated on.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Serializing a record or report failed.
    #[error("serialization failed")]
    Serialize(#[from] serde_json::Error),
}

impl PulseError {
    /// Creates an I/O error bound to a path.
    #[must_use]
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Stable short code used in `runtime_error:<kind>:<message>` reasons
    /// and in `{"error": <code>}` objects.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MissingInput { .. } => "missing_input",
            Self::InvalidJson { .. } => "invalid_json",
            Self::InvalidShape { .. } => "invalid_shape",
            Self::InvalidWindow(_) => "invalid_window_size",
            Self::InvalidPolicy(_) => "invalid_policy",
            Self::Config(_) => "invalid_config",
            Self::Io { .. } => "io",
            Self::Serialize(_) => "serialize",
        }
    }

    /// Whether this error was caused by caller input rather than by the
    /// environment. Input errors map to exit code 2, everything else to 3.
    #[must_use]
    pub const fn is_input_error(&self) -> bool {
        !matches!(self, Self::Io { .. } | Self::Serialize(_))
    }

    /// The `runtime_error:<kind>:<message>` reason code for this error.
    /// The message includes each cause, outermost first.
    #[must_use]
    pub fn runtime_reason(&self) -> String {
        let mut reason = format!("runtime_error:{}:{self}", self.kind());
        let mut cause = self.source();
        while let Some(err) = cause {
            let _ = write!(reason, ": {err}");
            cause = err.source();
        }
        reason
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn missing_input_is_input_error() {
        let err = PulseError::MissingInput {
            path: PathBuf::from("/nope/raw.jsonl"),
        };
        assert!(err.is_input_error());
        assert_eq!(err.kind(), "missing_input");
        assert!(err.to_string().contains("/nope/raw.jsonl"));
    }

    #[test]
    fn io_error_is_runtime_error() {
        let err = PulseError::io(
            "append",
            "/tmp/ledger.jsonl",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(!err.is_input_error());
        assert_eq!(
            err.runtime_reason(),
            "runtime_error:io:append /tmp/ledger.jsonl: denied"
        );
    }

    #[test]
    fn io_cause_is_printed_once() {
        let err = PulseError::io("read", "/tmp/t2", std::io::Error::other("Is a directory"));
        assert_eq!(err.to_string(), "read /tmp/t2");
        assert_eq!(err.source().unwrap().to_string(), "Is a directory");
        assert_eq!(
            err.runtime_reason(),
            "runtime_error:io:read /tmp/t2: Is a directory"
        );
    }

    #[test]
    fn invalid_window_message() {
        let err = PulseError::InvalidWindow(0);
        assert_eq!(err.to_string(), "invalid window size: 0 (must be >= 1)");
        assert!(err.is_input_error());
    }
}
