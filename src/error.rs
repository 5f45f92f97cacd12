//! CLI Error Types

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Config couldn't be loaded or is invalid.
    #[display("configuration error")]
    Config,
    /// A command-line value was malformed.
    #[display("invalid argument: {_0}")]
    InvalidArgument(#[error(not(source))] String),
    /// The cache database or resource directory couldn't be opened.
    #[display("failed to open cache")]
    Cache,
    /// The HTTP client couldn't be built.
    #[display("failed to set up remote")]
    Remote,
    /// A discovery or warming run failed.
    #[display("discovery failed")]
    Discovery,
    /// The proxy couldn't produce a response.
    #[display("request failed")]
    Proxy,
    /// Writing to stdout failed.
    #[display("failed to write output")]
    Output,
}

impl ErrorKind {
    /// Process exit code: 2 for usage errors, 1 for everything else.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::InvalidArgument(_) | Self::Config => 2,
            _ => 1,
        }
    }
}
