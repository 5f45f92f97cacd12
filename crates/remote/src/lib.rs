//! Transport to the sprite asset host, and existence probing on top of it.
//!
//! - [`Remote`]: async trait for sending a request and getting a buffered
//!   response back. [`HttpRemote`] is the reqwest implementation; with the
//!   `mock` feature, [`MockRemote`] is an in-memory host for tests.
//! - [`Probe`]: bounded-time "does this URL exist" check, `HEAD` first with a
//!   ranged `GET` fallback.

pub mod backend;
pub mod error;
mod models;
mod probe;

#[cfg(any(test, feature = "mock"))]
pub use crate::backend::{MockRemote, RecordedRequest};
pub use crate::backend::{HttpRemote, HttpRemoteOptions, Remote};
pub use crate::models::{ByteRange, RemoteRequest, RemoteResponse};
pub use crate::probe::{DEFAULT_PROBE_TIMEOUT, Probe, ProbeOutcome};
pub use bytes::Bytes;
pub use reqwest::header;
pub use reqwest::{Method, StatusCode, Url};
use std::sync::Arc;

pub type RemoteHandle = Arc<dyn Remote + Send + Sync>;
