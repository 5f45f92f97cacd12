//! Existence probing against an unindexed asset host.
//!
//! The asset host has no listing API, so the only way to know whether a
//! sprite exists is to ask for it. A probe is a cheap `HEAD`, falling back to
//! a one-byte ranged `GET` for hosts that refuse `HEAD` or drop the connection
//! on it. The whole exchange (fallback included) is bounded by one timeout,
//! and a probe never retries on its own: retry policy belongs to the caller.

use crate::RemoteHandle;
use crate::models::{ByteRange, RemoteResponse};
use reqwest::{StatusCode, Url};
use std::time::Duration;
use tracing::{debug, trace};

/// Default time budget for a single probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// What a single probe learned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The host served (or agreed to serve) the resource.
    Present,
    /// The host definitively said no (a 4xx).
    Absent,
    /// Timeout, transport failure, or a server error. Indistinguishable
    /// from absence as far as [`Probe::exists`] is concerned.
    Failed,
}
impl ProbeOutcome {
    pub fn is_present(self) -> bool {
        matches!(self, Self::Present)
    }
}

enum HeadVerdict {
    Settled(ProbeOutcome),
    Fallback,
}

/// Single-URL existence check with a bounded timeout.
#[derive(Clone)]
pub struct Probe {
    remote: RemoteHandle,
    timeout: Duration,
}
impl Probe {
    pub fn new(remote: RemoteHandle) -> Self {
        Self { remote, timeout: DEFAULT_PROBE_TIMEOUT }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn remote(&self) -> &RemoteHandle {
        &self.remote
    }

    /// `true` only when the resource is known to exist. Not-found, timeouts
    /// and network errors are all `false`.
    pub async fn exists(&self, url: &Url) -> bool {
        self.check(url).await.is_present()
    }

    /// Probe `url`, keeping the distinction between a definitive "no" and a
    /// failure to find out.
    pub async fn check(&self, url: &Url) -> ProbeOutcome {
        let outcome = match tokio::time::timeout(self.timeout, self.check_unbounded(url)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                debug!(%url, timeout_ms = self.timeout.as_millis(), "Probe timed out");
                ProbeOutcome::Failed
            },
        };
        trace!(%url, ?outcome, "Probed");
        outcome
    }

    async fn check_unbounded(&self, url: &Url) -> ProbeOutcome {
        match self.remote.head(url).await {
            Ok(response) => match Self::judge_head(&response) {
                HeadVerdict::Settled(outcome) => return outcome,
                HeadVerdict::Fallback => debug!(%url, status = %response.status, "HEAD refused, falling back to ranged GET"),
            },
            Err(e) => debug!(%url, error = ?e, "HEAD failed, falling back to ranged GET"),
        }
        match self.remote.get_range(url, ByteRange::first_byte()).await {
            Ok(response) => Self::judge_range(&response),
            Err(e) => {
                debug!(%url, error = ?e, "Ranged GET failed");
                ProbeOutcome::Failed
            },
        }
    }

    fn judge_head(response: &RemoteResponse) -> HeadVerdict {
        let status = response.status;
        match status {
            s if s.is_success() => HeadVerdict::Settled(ProbeOutcome::Present),
            StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED => HeadVerdict::Fallback,
            s if s.is_client_error() => HeadVerdict::Settled(ProbeOutcome::Absent),
            _ => HeadVerdict::Settled(ProbeOutcome::Failed),
        }
    }

    fn judge_range(response: &RemoteResponse) -> ProbeOutcome {
        match response.status {
            s if s.is_success() => ProbeOutcome::Present,
            // Exists, just empty.
            StatusCode::RANGE_NOT_SATISFIABLE => ProbeOutcome::Present,
            s if s.is_client_error() => ProbeOutcome::Absent,
            _ => ProbeOutcome::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockRemote;
    use reqwest::Method;
    use std::sync::Arc;

    const URL: &str = "https://cdn.example/sprites/25.png";

    fn url() -> Url {
        Url::parse(URL).unwrap()
    }

    #[tokio::test]
    async fn test_present_with_single_head() {
        let remote = Arc::new(MockRemote::with_resources([(URL, b"PNG".to_vec())]));
        let probe = Probe::new(remote.clone());
        assert!(probe.exists(&url()).await);
        assert_eq!(remote.request_count().await, 1);
        assert_eq!(remote.count_method(Method::HEAD).await, 1);
    }

    #[tokio::test]
    async fn test_not_found_is_fast_false_without_fallback() {
        let remote = Arc::new(MockRemote::default());
        let probe = Probe::new(remote.clone());
        assert_eq!(probe.check(&url()).await, ProbeOutcome::Absent);
        assert_eq!(remote.request_count().await, 1);
    }

    #[tokio::test]
    async fn test_head_rejected_falls_back_to_range() {
        let remote = Arc::new(MockRemote::with_resources([(URL, b"PNG".to_vec())]).rejecting_head());
        let probe = Probe::new(remote.clone());
        assert!(probe.exists(&url()).await);
        let requests = remote.requests().await;
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].method, Method::GET);
        assert!(requests[1].ranged);
    }

    #[tokio::test]
    async fn test_head_rejected_and_missing() {
        let remote = Arc::new(MockRemote::default().rejecting_head());
        let probe = Probe::new(remote.clone());
        assert_eq!(probe.check(&url()).await, ProbeOutcome::Absent);
    }

    #[tokio::test]
    async fn test_transport_failure_falls_back_then_fails() {
        let remote = Arc::new(MockRemote::default());
        remote.fail_transport(URL).await;
        let probe = Probe::new(remote.clone());
        assert_eq!(probe.check(&url()).await, ProbeOutcome::Failed);
        assert!(!probe.exists(&url()).await);
        // HEAD + fallback GET, twice.
        assert_eq!(remote.request_count().await, 4);
    }

    #[tokio::test]
    async fn test_server_error_is_failed_without_fallback() {
        let remote = Arc::new(MockRemote::default());
        remote.respond_with(URL, StatusCode::BAD_GATEWAY).await;
        let probe = Probe::new(remote.clone());
        assert_eq!(probe.check(&url()).await, ProbeOutcome::Failed);
        assert_eq!(remote.request_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_false() {
        let remote = Arc::new(MockRemote::default());
        remote.hang(URL).await;
        let probe = Probe::new(remote.clone()).with_timeout(Duration::from_secs(3));
        let started = tokio::time::Instant::now();
        assert_eq!(probe.check(&url()).await, ProbeOutcome::Failed);
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
