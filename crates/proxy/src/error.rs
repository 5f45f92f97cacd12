//! Proxy Error Types

use derive_more::{Display, Error};

/// A proxy error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for proxy operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The network failed and nothing usable was cached.
    #[display("upstream unavailable for {_0}")]
    Upstream(#[error(not(source))] String),
    /// A client message couldn't be parsed or carried invalid data.
    #[display("invalid client message: {_0}")]
    InvalidMessage(#[error(not(source))] String),
    /// A request URL the proxy has no way to serve (no host, opaque scheme...).
    #[display("unsupported request URL: {_0}")]
    UnsupportedUrl(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Upstream(_))
    }
}
