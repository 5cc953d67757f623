//! Centralized error handling for the custody pipeline.
//!
//! Every core operation returns a [`PipelineError`] kind the caller can match on,
//! so the console (or any other front end) can tell a denied action apart from a
//! tampered archive without string matching.
//!
//! ```
//! use eo_custody::error::PipelineError;
//!
//! fn describe(err: &PipelineError) -> &'static str {
//!     match err {
//!         PipelineError::AuthorizationDenied { .. } => "denied",
//!         PipelineError::IntegrityViolation(_) => "security alert",
//!         PipelineError::AuthenticationFailure(_) => "tampered ciphertext",
//!         _ => "other",
//!     }
//! }
//! ```
//!
//! The `ResultExt` trait adds `.context()` to any `Result` whose error converts
//! into [`PipelineError`]. Context only wraps the untyped kinds (`Io`, `Other`);
//! security-relevant kinds keep their variant so callers can still match on them.

use std::fmt;

/// Main error type for custody operations.
#[derive(Debug)]
pub enum PipelineError {
    /// Malformed or missing metadata fields. Local and recoverable.
    Validation(String),

    /// Payload failed the quality-control gate (NaN or non-finite samples).
    QualityRejected(String),

    /// Fingerprint mismatch in the chain of custody, or unrecoverable archive loss.
    IntegrityViolation(String),

    /// The acting identity is not allowed to perform the action.
    AuthorizationDenied { identity: String, action: String },

    /// Ciphertext failed authentication (tampered, truncated or wrong key).
    AuthenticationFailure(String),

    /// An expected payload, record or reference is absent.
    ResourceMissing(String),

    /// The product is not in a state the requested transition starts from.
    InvalidTransition(String),

    /// A long-running operation was cancelled at a chunk boundary.
    Cancelled,

    /// Configuration or key-file errors.
    Config(String),

    /// I/O errors from a storage backend.
    Io(std::io::Error),

    /// Generic error with context.
    Other(String),
}

impl PipelineError {
    /// Short, stable name of the error kind for CLI rendering and audit records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ValidationError",
            Self::QualityRejected(_) => "QualityRejected",
            Self::IntegrityViolation(_) => "IntegrityViolation",
            Self::AuthorizationDenied { .. } => "AuthorizationDenied",
            Self::AuthenticationFailure(_) => "AuthenticationFailure",
            Self::ResourceMissing(_) => "ResourceMissing",
            Self::InvalidTransition(_) => "InvalidTransition",
            Self::Cancelled => "Cancelled",
            Self::Config(_) => "ConfigError",
            Self::Io(_) => "IoError",
            Self::Other(_) => "Error",
        }
    }

    /// Whether the failure must be treated as a security event.
    pub fn is_security_relevant(&self) -> bool {
        matches!(
            self,
            Self::IntegrityViolation(_)
                | Self::AuthorizationDenied { .. }
                | Self::AuthenticationFailure(_)
        )
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "Validation error: {msg}"),
            Self::QualityRejected(msg) => write!(f, "Quality control rejected payload: {msg}"),
            Self::IntegrityViolation(msg) => write!(f, "Integrity violation: {msg}"),
            Self::AuthorizationDenied { identity, action } => {
                write!(f, "Authorization denied: '{identity}' may not {action}")
            }
            Self::AuthenticationFailure(msg) => write!(f, "Ciphertext authentication failed: {msg}"),
            Self::ResourceMissing(msg) => write!(f, "Resource missing: {msg}"),
            Self::InvalidTransition(msg) => write!(f, "Invalid transition: {msg}"),
            Self::Cancelled => write!(f, "Operation cancelled"),
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(format!("JSON error: {err}"))
    }
}

impl From<PipelineError> for String {
    fn from(err: PipelineError) -> Self {
        err.to_string()
    }
}

/// Result type alias for custody operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Extension trait to add context to results.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, msg: impl Into<String>) -> Result<T>;

    /// Add context using a closure (lazy evaluation).
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

fn wrap(err: PipelineError, msg: String) -> PipelineError {
    match err {
        PipelineError::Io(e) => PipelineError::Io(std::io::Error::new(e.kind(), format!("{msg}: {e}"))),
        PipelineError::Other(inner) => PipelineError::Other(format!("{msg}: {inner}")),
        PipelineError::Config(inner) => PipelineError::Config(format!("{msg}: {inner}")),
        typed => typed,
    }
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<PipelineError>,
{
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| wrap(e.into(), msg.into()))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| wrap(e.into(), f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::Validation("missing field 'sensor_id'".to_owned());
        assert_eq!(err.to_string(), "Validation error: missing field 'sensor_id'");
    }

    #[test]
    fn test_denied_display_names_identity_and_action() {
        let err = PipelineError::AuthorizationDenied {
            identity: "eve_hacker".to_owned(),
            action: "archive".to_owned(),
        };
        let s: String = err.into();
        assert_eq!(s, "Authorization denied: 'eve_hacker' may not archive");
    }

    #[test]
    fn test_result_context_keeps_io_kind() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "payload.bin",
        ));

        let err = result.context("Failed to read payload").unwrap_err();
        match err {
            PipelineError::Io(e) => {
                assert_eq!(e.kind(), std::io::ErrorKind::NotFound);
                assert!(e.to_string().contains("Failed to read payload"));
            }
            other => panic!("unexpected error kind: {other:?}"),
        }
    }

    #[test]
    fn test_context_does_not_mask_security_kinds() {
        let result: Result<()> = Err(PipelineError::IntegrityViolation("hash mismatch".to_owned()));
        let err = result.context("During processing").unwrap_err();
        assert!(matches!(err, PipelineError::IntegrityViolation(_)));
        assert!(err.is_security_relevant());
        assert_eq!(err.kind(), "IntegrityViolation");
    }
}
