//! Discovery Error Types

use derive_more::{Display, Error};

/// A discovery error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for discovery operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// Probe failures never show up here: a probe that couldn't reach the host
/// counts as an absent variant. These are the failures left over.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// No sprite URL can be built for this subject (caller contract violation).
    #[display("cannot build sprite URL for subject {_0}")]
    InvalidSubject(#[error(not(source))] String),
    /// The asset host couldn't be reached while fetching an image.
    #[display("failed to fetch {_0}")]
    Fetch(#[error(not(source))] String),
    /// The asset host answered an image fetch with a non-success status.
    #[display("unexpected status {status} for {url}")]
    UnexpectedStatus { status: u16, url: String },
    /// The image cache couldn't be read or written.
    #[display("image cache error")]
    Storage,
    /// A connection class name that isn't one of `slow-2g`, `2g`, `3g`, `4g`.
    #[display("unknown effective type: {_0}")]
    UnknownEffectiveType(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Fetch(_) | Self::Storage => true,
            Self::UnexpectedStatus { status, .. } => *status >= 500,
            Self::InvalidSubject(_) | Self::UnknownEffectiveType(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_retryable() {
        assert!(ErrorKind::Fetch("x".into()).is_retryable());
        assert!(ErrorKind::UnexpectedStatus { status: 503, url: "x".into() }.is_retryable());
        assert!(!ErrorKind::UnexpectedStatus { status: 404, url: "x".into() }.is_retryable());
        assert!(!ErrorKind::InvalidSubject("1".into()).is_retryable());
        assert!(!ErrorKind::UnknownEffectiveType("5g".into()).is_retryable());
    }
}
