//! In-memory asset host for testing.

use crate::Remote;
use crate::error::{ErrorKind, Result};
use crate::models::{RemoteRequest, RemoteResponse};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{self, HeaderValue};
use reqwest::{Method, StatusCode, Url};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

#[derive(Clone)]
enum Resource {
    Body(Bytes),
    Status(StatusCode),
    Transport,
    Hang,
}

/// One request as seen by the [`MockRemote`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: Url,
    pub ranged: bool,
    /// Tokio clock, so paused-time tests can assert on pacing.
    pub at: Instant,
}

/// In-memory asset host for testing.
///
/// Resources live in a `HashMap` behind a [`RwLock`]; anything not registered
/// answers `404 Not Found`. Every request is recorded so tests can count
/// probes and check their timing.
///
/// Only compiled for this crate's tests or with the `mock` feature.
pub struct MockRemote {
    name: String,
    resources: RwLock<HashMap<String, Resource>>,
    requests: Mutex<Vec<RecordedRequest>>,
    reject_head: AtomicBool,
}

impl MockRemote {
    /// Create a mock remote pre-populated with resources.
    ///
    /// Panics if any URL fails to parse. If test setup is wrong, then test
    /// should not pass.
    pub fn with_resources(resources: impl IntoIterator<Item = (impl AsRef<str>, impl Into<Bytes>)>) -> Self {
        let map = resources
            .into_iter()
            .map(|(url, body)| (Self::key(url.as_ref()), Resource::Body(body.into())))
            .collect();
        Self {
            name: "mock".to_string(),
            resources: RwLock::new(map),
            requests: Mutex::new(Vec::new()),
            reject_head: AtomicBool::new(false),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Answer every `HEAD` with `405 Method Not Allowed`.
    pub fn rejecting_head(self) -> Self {
        self.reject_head.store(true, Ordering::Relaxed);
        self
    }

    fn key(url: &str) -> String {
        match Url::parse(url) {
            Ok(url) => url.to_string(),
            Err(e) => panic!("MockRemote: invalid url {url}: {e}"),
        }
    }

    pub async fn insert(&self, url: &str, body: impl Into<Bytes>) {
        self.resources.write().await.insert(Self::key(url), Resource::Body(body.into()));
    }

    pub async fn remove(&self, url: &str) {
        self.resources.write().await.remove(&Self::key(url));
    }

    /// Always answer `url` with a bodyless `status`.
    pub async fn respond_with(&self, url: &str, status: StatusCode) {
        self.resources.write().await.insert(Self::key(url), Resource::Status(status));
    }

    /// Fail every request to `url` at the transport level.
    pub async fn fail_transport(&self, url: &str) {
        self.resources.write().await.insert(Self::key(url), Resource::Transport);
    }

    /// Never answer requests to `url`.
    pub async fn hang(&self, url: &str) {
        self.resources.write().await.insert(Self::key(url), Resource::Hang);
    }

    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn request_count(&self) -> usize {
        self.requests.lock().await.len()
    }

    pub async fn count_method(&self, method: Method) -> usize {
        self.requests.lock().await.iter().filter(|r| r.method == method).count()
    }

    pub async fn clear_requests(&self) {
        self.requests.lock().await.clear();
    }
}

impl Default for MockRemote {
    fn default() -> Self {
        let resources: [(&str, Vec<u8>); 0] = [];
        Self::with_resources(resources)
    }
}

#[async_trait]
impl Remote for MockRemote {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, request: RemoteRequest) -> Result<RemoteResponse> {
        let range = request.range();
        self.requests.lock().await.push(RecordedRequest {
            method: request.method.clone(),
            url: request.url.clone(),
            ranged: range.is_some(),
            at: Instant::now(),
        });
        if request.method == Method::HEAD && self.reject_head.load(Ordering::Relaxed) {
            return Ok(RemoteResponse::new(StatusCode::METHOD_NOT_ALLOWED, Bytes::new()));
        }
        let resource = self.resources.read().await.get(request.url.as_str()).cloned();
        let body = match resource {
            None => return Ok(RemoteResponse::new(StatusCode::NOT_FOUND, Bytes::new())),
            Some(Resource::Status(status)) => return Ok(RemoteResponse::new(status, Bytes::new())),
            Some(Resource::Transport) => exn::bail!(ErrorKind::Transport),
            Some(Resource::Hang) => std::future::pending::<Bytes>().await,
            Some(Resource::Body(body)) => body,
        };
        let length = HeaderValue::from(body.len());
        if request.method == Method::HEAD {
            return Ok(RemoteResponse::new(StatusCode::OK, Bytes::new()).with_header(header::CONTENT_LENGTH, length));
        }
        match range {
            Some(range) if range.start < body.len() as u64 => {
                let start = range.start as usize;
                let end = (range.end as usize).min(body.len() - 1);
                Ok(RemoteResponse::new(StatusCode::PARTIAL_CONTENT, body.slice(start..=end)))
            },
            Some(_) => Ok(RemoteResponse::new(StatusCode::RANGE_NOT_SATISFIABLE, Bytes::new())),
            None => Ok(RemoteResponse::new(StatusCode::OK, body).with_header(header::CONTENT_LENGTH, length)),
        }
    }
}
