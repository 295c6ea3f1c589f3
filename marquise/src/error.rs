//! Error types for the Marquise transport.
//!
//! Every fallible operation in this crate returns [`MarquiseError`]. Errors are
//! surfaced synchronously to the caller of the failing operation and are never
//! retried here; retry policy belongs to the batching backend.

use thiserror::Error;

use crate::backend::SendKind;

/// Errors that can occur when reporting data points through Marquise.
#[derive(Debug, Error)]
pub enum MarquiseError {
    /// The backend could not create a consumer.
    ///
    /// The backend only reports the cause through the host's system log.
    #[error("libmarquise failed; check syslog (no, seriously)")]
    BackendInit,

    /// The backend could not open a connection for the calling thread.
    #[error("marquise_connect() failed... consult syslog (no, seriously)")]
    Connect,

    /// The caller supplied an argument shape or value type that cannot be reported.
    #[error("{message}")]
    InvalidCall { message: String },

    /// A value is outside the range the wire format can carry.
    #[error("{message}")]
    ArgumentRange { message: String },

    /// The transport has already been closed.
    #[error("Connection has been closed")]
    Closed,

    /// A backend send call returned failure.
    #[error("marquise_send_{kind} failed: {source}")]
    BackendSend {
        kind: SendKind,
        code: i32,
        #[source]
        source: std::io::Error,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl MarquiseError {
    /// Creates an [`MarquiseError::InvalidCall`] naming the arguments that were passed.
    pub fn invalid_call(passed: impl AsRef<str>) -> Self {
        MarquiseError::InvalidCall {
            message: format!(
                "Invalid call to Marquise::report (you passed '{}')",
                passed.as_ref()
            ),
        }
    }

    /// Creates an [`MarquiseError::ArgumentRange`] for an integer that does not fit in the wire format.
    pub fn integer_out_of_range() -> Self {
        MarquiseError::ArgumentRange {
            message: "Integer out of range for Marquise::report".to_string(),
        }
    }

    /// Creates a [`MarquiseError::BackendSend`] from the backend's OS-style error code.
    pub fn backend_send(kind: SendKind, code: i32) -> Self {
        MarquiseError::BackendSend {
            kind,
            code,
            source: std::io::Error::from_raw_os_error(code),
        }
    }

    /// Returns true if this error is always the result of a caller bug.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            MarquiseError::InvalidCall { .. }
                | MarquiseError::ArgumentRange { .. }
                | MarquiseError::Closed
                | MarquiseError::Configuration { .. }
        )
    }

    /// Returns the backend's OS-style error code, if this is a send failure.
    pub fn os_error_code(&self) -> Option<i32> {
        match self {
            MarquiseError::BackendSend { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Result type for Marquise operations.
pub type Result<T> = std::result::Result<T, MarquiseError>;

#[cfg(test)]
mod tests {
    use super::*;

    const ENOEXEC: i32 = 8;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            MarquiseError::BackendInit.to_string(),
            "libmarquise failed; check syslog (no, seriously)"
        );
        assert_eq!(
            MarquiseError::Connect.to_string(),
            "marquise_connect() failed... consult syslog (no, seriously)"
        );
        assert_eq!(
            MarquiseError::Closed.to_string(),
            "Connection has been closed"
        );
        assert_eq!(
            MarquiseError::integer_out_of_range().to_string(),
            "Integer out of range for Marquise::report"
        );
    }

    #[test]
    fn test_invalid_call_names_arguments() {
        let err = MarquiseError::invalid_call("[1, 2, 3]");
        assert!(err.to_string().contains("Invalid call to Marquise::report"));
        assert!(err.to_string().contains("[1, 2, 3]"));
    }

    #[test]
    fn test_backend_send_wraps_os_error() {
        let err = MarquiseError::backend_send(SendKind::Int, ENOEXEC);
        assert_eq!(err.os_error_code(), Some(ENOEXEC));
        assert!(err.to_string().starts_with("marquise_send_int failed"));

        let source = std::error::Error::source(&err).unwrap();
        let io = source.downcast_ref::<std::io::Error>().unwrap();
        assert_eq!(io.raw_os_error(), Some(ENOEXEC));
    }

    #[test]
    fn test_is_caller_error() {
        assert!(MarquiseError::Closed.is_caller_error());
        assert!(MarquiseError::invalid_call("x").is_caller_error());
        assert!(MarquiseError::integer_out_of_range().is_caller_error());
        assert!(!MarquiseError::BackendInit.is_caller_error());
        assert!(!MarquiseError::Connect.is_caller_error());
        assert!(!MarquiseError::backend_send(SendKind::Text, 5).is_caller_error());
        assert_eq!(MarquiseError::Closed.os_error_code(), None);
    }
}
