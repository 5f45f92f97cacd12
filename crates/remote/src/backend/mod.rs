//! Remote transport trait and implementations.
//!
//! This module defines the [`Remote`] trait, the single seam between the
//! discovery pipeline and the network. Everything that touches the asset host
//! (existence probes, image warming, proxy pass-through) goes through it, so
//! tests can swap in an in-memory host.

mod http;
#[cfg(any(test, feature = "mock"))]
mod mock;

pub use self::http::{HttpRemote, HttpRemoteOptions};
#[cfg(any(test, feature = "mock"))]
pub use self::mock::{MockRemote, RecordedRequest};
use crate::error::Result;
use crate::models::{ByteRange, RemoteRequest, RemoteResponse};
use async_trait::async_trait;
use reqwest::Url;

/// Unified interface for talking to the asset host.
///
/// Implementations return `Ok` for **any** HTTP response, including 4xx and
/// 5xx; only transport-level failures (no response at all) are errors. What a
/// status code *means* is the caller's business.
///
/// # Examples
///
/// ```no_run
/// use dexsprite_remote::{Remote, error::Result};
/// use reqwest::Url;
///
/// async fn is_there(remote: &dyn Remote, url: &Url) -> Result<bool> {
///     Ok(remote.head(url).await?.is_success())
/// }
/// ```
#[async_trait]
pub trait Remote: Send + Sync {
    /// Name of the remote, for logging.
    fn name(&self) -> &str;

    /// Send a request and buffer the whole response.
    async fn send(&self, request: RemoteRequest) -> Result<RemoteResponse>;

    /// `HEAD` the given URL.
    async fn head(&self, url: &Url) -> Result<RemoteResponse> {
        self.send(RemoteRequest::head(url.clone())).await
    }

    /// `GET` the given URL.
    async fn get(&self, url: &Url) -> Result<RemoteResponse> {
        self.send(RemoteRequest::get(url.clone())).await
    }

    /// `GET` only the given byte range. Hosts that ignore `Range` answer with
    /// a plain `200 OK` and the full body, which is still a valid response.
    async fn get_range(&self, url: &Url, range: ByteRange) -> Result<RemoteResponse> {
        self.send(RemoteRequest::get(url.clone()).with_range(range)).await
    }
}
