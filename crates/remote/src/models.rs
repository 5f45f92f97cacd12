//! Request and response models shared by every [`Remote`](crate::Remote).

use bytes::Bytes;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode, Url};

/// Inclusive byte range for partial-content requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}
impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Just the first byte; the cheapest possible "does this exist" GET.
    pub fn first_byte() -> Self {
        Self::new(0, 0)
    }

    /// `Range` header value.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }

    pub fn content_length(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Parse a single `bytes=<start>-<end>` range. Open-ended and multi-part
    /// ranges aren't something we ever send, so they aren't understood.
    pub fn parse(value: &str) -> Option<Self> {
        let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
        let (start, end) = (start.trim().parse().ok()?, end.trim().parse().ok()?);
        (start <= end).then_some(Self { start, end })
    }
}

/// An outbound request.
#[derive(Debug, Clone)]
pub struct RemoteRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
}
impl RemoteRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self { method, url, headers: HeaderMap::new() }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn head(url: Url) -> Self {
        Self::new(Method::HEAD, url)
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn with_range(mut self, range: ByteRange) -> Self {
        // Only ever digits, `=` and `-`; always a valid header value.
        if let Ok(value) = HeaderValue::from_str(&range.header_value()) {
            self.headers.insert(header::RANGE, value);
        }
        self
    }

    pub fn range(&self) -> Option<ByteRange> {
        self.headers.get(header::RANGE).and_then(|v| v.to_str().ok()).and_then(ByteRange::parse)
    }
}

/// A fully-buffered response. Sprites are small; streaming isn't worth it.
#[derive(Debug, Clone)]
pub struct RemoteResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}
impl RemoteResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self { status, headers: HeaderMap::new(), body: body.into() }
    }

    pub fn with_header(mut self, name: header::HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}
