//! Variant Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. Everything in this crate is pure, so every error here
//! is a caller-contract violation: fail fast, never retry.

use derive_more::{Display, Error};

/// A variant error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for variant operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A subject was built without a primary (head) id.
    #[display("subject has no primary id")]
    MissingId,
    /// A canonical key did not match `<digits>` or `<digits>.<digits>`.
    #[display("malformed subject id: {_0:?}")]
    MalformedId(#[error(not(source))] String),
    /// A suffix contained something other than lowercase ASCII letters.
    #[display("invalid variant suffix: {_0:?}")]
    InvalidSuffix(#[error(not(source))] String),
    /// A variant list had a gap (or started somewhere other than `""`).
    #[display("variant list is not contiguous at index {_0}")]
    NonContiguous(#[error(not(source))] usize),
    /// The asset host base URL could not be parsed or joined.
    #[display("invalid asset url: {_0}")]
    InvalidUrl(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
