//! reqwest-backed remote.

use crate::Remote;
use crate::error::{ErrorKind, Result};
use crate::models::{RemoteRequest, RemoteResponse};
use async_trait::async_trait;
use exn::{Exn, ResultExt};
use reqwest::Client;
use std::time::Duration;

/// Connection options for [`HttpRemote`].
#[derive(Debug, Clone)]
pub struct HttpRemoteOptions {
    /// Whole-request timeout (connect + headers + body).
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
    /// Idle keep-alive connections kept per host.
    pub max_idle_per_host: usize,
}
impl Default for HttpRemoteOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(3),
            user_agent: format!("dexsprite/{}", env!("CARGO_PKG_VERSION")),
            max_idle_per_host: 16,
        }
    }
}

/// HTTP(S) remote using a pooled [`reqwest::Client`].
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    name: String,
    client: Client,
}
impl HttpRemote {
    pub fn new(name: impl Into<String>, options: &HttpRemoteOptions) -> Result<Self> {
        let client = Client::builder()
            .timeout(options.timeout)
            .connect_timeout(options.connect_timeout)
            .user_agent(&options.user_agent)
            .pool_max_idle_per_host(options.max_idle_per_host)
            .build()
            .or_raise(|| ErrorKind::Configuration)?;
        Ok(Self { name: name.into(), client })
    }

    fn classify(err: reqwest::Error) -> crate::error::Error {
        let kind = match err.is_timeout() {
            true => ErrorKind::Timeout,
            false => ErrorKind::Transport,
        };
        Exn::from(err).raise(kind)
    }
}

#[async_trait]
impl Remote for HttpRemote {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, request: RemoteRequest) -> Result<RemoteResponse> {
        tracing::trace!(method = %request.method, url = %request.url, "Sending request");
        let response = self
            .client
            .request(request.method, request.url)
            .headers(request.headers)
            .send()
            .await
            .map_err(Self::classify)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| match e.is_timeout() {
            true => Self::classify(e),
            false => Exn::from(e).raise(ErrorKind::Body),
        })?;
        Ok(RemoteResponse { status, headers, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_with_defaults() {
        let remote = HttpRemote::new("cdn", &HttpRemoteOptions::default()).unwrap();
        assert_eq!(remote.name(), "cdn");
    }

    #[test]
    fn test_default_user_agent_is_versioned() {
        let options = HttpRemoteOptions::default();
        assert!(options.user_agent.starts_with("dexsprite/"));
    }
}
