//! Remote Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A remote error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for remote operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
/// A response with a non-success status is **not** an error at this layer;
/// callers decide what a 404 means to them.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The HTTP client could not be constructed.
    #[display("HTTP client configuration error")]
    Configuration,
    /// Connection refused, reset, DNS failure, TLS failure...
    #[display("transport error")]
    Transport,
    /// No response within the configured time limit.
    #[display("request timed out")]
    Timeout,
    /// The response body could not be read to completion.
    #[display("failed to read response body")]
    Body,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport | Self::Timeout | Self::Body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_retryable() {
        assert!(ErrorKind::Transport.is_retryable());
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(!ErrorKind::Configuration.is_retryable());
    }
}
