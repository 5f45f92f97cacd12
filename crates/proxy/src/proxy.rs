//! Cache policies per resource class, and prefetch feeding.

use crate::api::{VariantsApi, VariantsResponse};
use crate::classify::{ResourceClass, classify};
use crate::error::{ErrorKind, Result};
use crate::message::ClientMessage;
use async_trait::async_trait;
use dexsprite_discovery::PrefetchQueue;
use dexsprite_remote::header::{self, HeaderName, HeaderValue};
use dexsprite_remote::{Bytes, Remote, RemoteHandle, RemoteRequest, RemoteResponse, StatusCode, Url};
use dexsprite_storage::ResourceCache;
use exn::ResultExt;
use tokio_util::task::TaskTracker;
use tracing::{debug, trace, warn};

/// Response header telling whether a response came from cache.
pub const CACHE_HEADER: HeaderName = HeaderName::from_static("x-dexsprite-cache");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyOptions {
    /// Path of the discovery API.
    pub api_path: String,
    /// Page served when a navigation fails and the page itself isn't cached.
    pub shell_path: String,
}
impl Default for ProxyOptions {
    fn default() -> Self {
        Self { api_path: "/variants".to_string(), shell_path: "/".to_string() }
    }
}

/// Sits between the client and the network, serving each class of request
/// with its own cache policy.
///
/// Successful discovery API responses are inspected on a background task
/// after being handed back, and the subject they describe is fed to the
/// prefetch queue.
#[derive(Clone)]
pub struct InterceptionProxy {
    upstream: RemoteHandle,
    images: ResourceCache,
    pages: ResourceCache,
    options: ProxyOptions,
    api: Option<VariantsApi>,
    queue: Option<PrefetchQueue>,
    inspections: TaskTracker,
}

impl InterceptionProxy {
    pub fn new(upstream: RemoteHandle, images: ResourceCache, pages: ResourceCache, options: ProxyOptions) -> Self {
        Self { upstream, images, pages, options, api: None, queue: None, inspections: TaskTracker::new() }
    }

    /// Answer discovery API requests locally instead of forwarding them.
    pub fn with_api(mut self, api: VariantsApi) -> Self {
        self.api = Some(api);
        self
    }

    pub fn with_queue(mut self, queue: PrefetchQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn classify(&self, request: &RemoteRequest) -> ResourceClass {
        classify(request, &self.options.api_path)
    }

    pub async fn handle(&self, request: RemoteRequest) -> Result<RemoteResponse> {
        if request.url.cannot_be_a_base() || !matches!(request.url.scheme(), "http" | "https") {
            exn::bail!(ErrorKind::UnsupportedUrl(request.url.to_string()));
        }
        let class = self.classify(&request);
        trace!(url = %request.url, %class, "Intercepted request");
        match class {
            ResourceClass::Image => self.cache_first(request).await,
            ResourceClass::Navigation => {
                let shell = request.url.join(&self.options.shell_path).ok();
                self.network_first(request, shell).await
            },
            ResourceClass::Static => self.network_first(request, None).await,
            ResourceClass::VariantApi => self.variant_api(request).await,
            ResourceClass::Other => self.forward(request).await,
        }
    }

    /// Handle a client message. Returns whether it led to new queued work.
    pub fn handle_message(&self, message: &ClientMessage) -> Result<bool> {
        match message {
            ClientMessage::PrefetchSpriteVariants(data) => {
                let (subject, variants) = data.parse()?;
                let Some(queue) = &self.queue else {
                    debug!(key = %subject, "No prefetch queue, ignoring message");
                    return Ok(false);
                };
                Ok(queue.enqueue_warm(subject, variants))
            },
        }
    }

    /// Wait for every response inspection started so far.
    pub async fn settle(&self) {
        self.inspections.close();
        self.inspections.wait().await;
        self.inspections.reopen();
    }

    async fn forward(&self, request: RemoteRequest) -> Result<RemoteResponse> {
        let url = request.url.to_string();
        self.upstream.send(request).await.or_raise(|| ErrorKind::Upstream(url))
    }

    /// Cache first. A ranged request may be answered with the full cached
    /// body, but a network answer to one is never stored.
    async fn cache_first(&self, request: RemoteRequest) -> Result<RemoteResponse> {
        let url = request.url.clone();
        match self.images.get(&url).await {
            Ok(Some(body)) => return Ok(Self::cached(&url, body)),
            Ok(None) => {},
            Err(e) => debug!(%url, error = ?e, "Image cache read failed, going to network"),
        }
        let ranged = is_ranged(&request);
        let response = self.forward(request).await?;
        if is_storable(ranged, &response) {
            if let Err(e) = self.images.put(&url, &response.body).await {
                warn!(%url, error = ?e, "Failed to cache image");
            }
        }
        Ok(response)
    }

    /// Network first. Successful responses refresh the cache; a network
    /// failure falls back to the cached copy, then to `fallback`.
    async fn network_first(&self, request: RemoteRequest, fallback: Option<Url>) -> Result<RemoteResponse> {
        let url = request.url.clone();
        let ranged = is_ranged(&request);
        match self.upstream.send(request).await {
            Ok(response) => {
                if is_storable(ranged, &response) {
                    if let Err(e) = self.pages.put(&url, &response.body).await {
                        debug!(%url, error = ?e, "Failed to cache response");
                    }
                }
                Ok(response)
            },
            Err(e) => {
                debug!(%url, error = ?e, "Network failed, trying cache");
                for candidate in std::iter::once(&url).chain(fallback.as_ref()) {
                    if let Ok(Some(body)) = self.pages.get(candidate).await {
                        return Ok(Self::cached(candidate, body));
                    }
                }
                Err(e).or_raise(|| ErrorKind::Upstream(url.to_string()))
            },
        }
    }

    async fn variant_api(&self, request: RemoteRequest) -> Result<RemoteResponse> {
        let response = match &self.api {
            Some(api) => api.handle(&request.url).await,
            None => self.forward(request).await?,
        };
        if response.is_success() {
            self.inspect(response.body.clone());
        }
        Ok(response)
    }

    /// Feed the subject of an API response to the queue, off the response path.
    fn inspect(&self, body: Bytes) {
        let Some(queue) = self.queue.clone() else {
            return;
        };
        self.inspections.spawn(async move {
            let parsed: VariantsResponse = match serde_json::from_slice(&body) {
                Ok(parsed) => parsed,
                Err(e) => {
                    debug!(error = ?e, "Discovery API response isn't a variant list");
                    return;
                },
            };
            let Some(subject) = parsed.subject() else {
                debug!(key = %parsed.cache_key, "Discovery API response has a malformed cacheKey");
                return;
            };
            // Already discovered here: only the images may still be missing.
            if queue.enqueue([subject]).await == 0 && !parsed.variants.is_empty() {
                queue.enqueue_warm(subject, parsed.variants);
            }
        });
    }

    fn cached(url: &Url, body: Vec<u8>) -> RemoteResponse {
        trace!(%url, "Serving from cache");
        let mut response =
            RemoteResponse::new(StatusCode::OK, body).with_header(CACHE_HEADER, HeaderValue::from_static("hit"));
        if let Some(content_type) = content_type_for(url) {
            response = response.with_header(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
        response
    }
}

fn is_ranged(request: &RemoteRequest) -> bool {
    request.headers.contains_key(header::RANGE)
}

/// Only complete bodies go into a cache: a `206` (or any other `2xx` that
/// isn't `200`) would be served later as if it were the whole resource.
fn is_storable(ranged: bool, response: &RemoteResponse) -> bool {
    !ranged && response.status == StatusCode::OK
}

fn content_type_for(url: &Url) -> Option<&'static str> {
    let name = url.path_segments()?.next_back()?;
    let ext = match name.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        // Extensionless navigations are pages.
        None => return Some("text/html; charset=utf-8"),
    };
    Some(match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "html" | "htm" => "text/html; charset=utf-8",
        "js" | "mjs" => "text/javascript",
        "css" => "text/css",
        "json" => "application/json",
        _ => return None,
    })
}

/// The proxy is itself a transport, so anything written against [`Remote`]
/// can be pointed at it.
#[async_trait]
impl Remote for InterceptionProxy {
    fn name(&self) -> &str {
        "proxy"
    }

    async fn send(&self, request: RemoteRequest) -> dexsprite_remote::error::Result<RemoteResponse> {
        self.handle(request).await.or_raise(|| dexsprite_remote::error::ErrorKind::Transport)
    }
}
