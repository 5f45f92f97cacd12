//! Image cache warming for discovered variants.

use crate::error::{ErrorKind, Result};
use crate::network::MeasuredSignal;
use dexsprite_remote::{RemoteHandle, Url};
use dexsprite_storage::ResourceCache;
use dexsprite_variant::{Subject, UrlBuilder, VariantList};
use exn::ResultExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// What one warm pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarmReport {
    pub fetched: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Fetches sprite images into the image cache ahead of time.
#[derive(Clone)]
pub struct Warmer {
    remote: RemoteHandle,
    images: ResourceCache,
    urls: UrlBuilder,
    timeout: Duration,
    meter: Option<Arc<MeasuredSignal>>,
}

impl Warmer {
    pub fn new(remote: RemoteHandle, images: ResourceCache, urls: UrlBuilder) -> Self {
        Self { remote, images, urls, timeout: DEFAULT_FETCH_TIMEOUT, meter: None }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Report every successful fetch's throughput to `meter`.
    pub fn with_meter(mut self, meter: Arc<MeasuredSignal>) -> Self {
        self.meter = Some(meter);
        self
    }

    pub fn images(&self) -> &ResourceCache {
        &self.images
    }

    /// Fetch every variant of `subject` that isn't cached yet. A failure on one
    /// image is counted and logged, and the rest are still attempted.
    pub async fn warm(&self, subject: &Subject, variants: &VariantList) -> Result<WarmReport> {
        let mut report = WarmReport::default();
        for suffix in variants {
            let url = self.urls.build(subject, suffix).or_raise(|| ErrorKind::InvalidSubject(subject.key()))?;
            match self.warm_url(&url).await {
                Ok(true) => report.fetched += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    warn!(%url, error = ?e, "Failed to warm image");
                    report.failed += 1;
                },
            }
        }
        debug!(key = %subject, ?report, "Warmed images");
        Ok(report)
    }

    /// Fetch and cache one URL. Returns `false` if it was already cached.
    pub async fn warm_url(&self, url: &Url) -> Result<bool> {
        match self.images.contains(url).await {
            Ok(true) => {
                trace!(%url, "Already cached");
                return Ok(false);
            },
            Ok(false) => {},
            // Fetch anyway; the write below will tell whether storage is usable.
            Err(e) => debug!(%url, error = ?e, "Image cache lookup failed"),
        }
        let started = Instant::now();
        let response = match tokio::time::timeout(self.timeout, self.remote.get(url)).await {
            Ok(response) => response.or_raise(|| ErrorKind::Fetch(url.to_string()))?,
            Err(_) => exn::bail!(ErrorKind::Fetch(url.to_string())),
        };
        if !response.is_success() {
            exn::bail!(ErrorKind::UnexpectedStatus { status: response.status.as_u16(), url: url.to_string() });
        }
        if let Some(meter) = &self.meter {
            meter.record(response.body.len() as u64, started.elapsed());
        }
        self.images.put(url, &response.body).await.or_raise(|| ErrorKind::Storage)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{ConnectionSignal, EffectiveType};
    use dexsprite_remote::{MockRemote, StatusCode};
    use dexsprite_storage::backend::MockBackend;

    const BASE: &str = "https://cdn.example/sprites/";

    fn setup(remote: Arc<MockRemote>) -> (Warmer, ResourceCache) {
        let images = ResourceCache::new(Arc::new(MockBackend::default()), "images").unwrap();
        let warmer = Warmer::new(remote, images.clone(), UrlBuilder::new(BASE, "png").unwrap());
        (warmer, images)
    }

    #[tokio::test]
    async fn test_warm_fetches_then_skips() {
        let remote = Arc::new(MockRemote::with_resources([
            (format!("{BASE}25.png"), b"zero".to_vec()),
            (format!("{BASE}25a.png"), b"one".to_vec()),
        ]));
        let (warmer, images) = setup(remote.clone());
        let subject = Subject::single(25);
        let report = warmer.warm(&subject, &VariantList::with_len(2)).await.unwrap();
        assert_eq!(report, WarmReport { fetched: 2, skipped: 0, failed: 0 });
        let url = Url::parse(&format!("{BASE}25a.png")).unwrap();
        assert_eq!(images.get(&url).await.unwrap().unwrap(), b"one");

        let report = warmer.warm(&subject, &VariantList::with_len(2)).await.unwrap();
        assert_eq!(report, WarmReport { fetched: 0, skipped: 2, failed: 0 });
        assert_eq!(remote.request_count().await, 2);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let remote = Arc::new(MockRemote::with_resources([
            (format!("{BASE}1.png"), b"zero".to_vec()),
            (format!("{BASE}1b.png"), b"two".to_vec()),
        ]));
        remote.respond_with(&format!("{BASE}1a.png"), StatusCode::INTERNAL_SERVER_ERROR).await;
        let (warmer, images) = setup(remote);
        let report = warmer.warm(&Subject::single(1), &VariantList::with_len(3)).await.unwrap();
        assert_eq!(report, WarmReport { fetched: 2, skipped: 0, failed: 1 });
        assert_eq!(images.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_missing_image_is_an_error() {
        let (warmer, _) = setup(Arc::new(MockRemote::default()));
        let url = Url::parse(&format!("{BASE}404.png")).unwrap();
        let err = warmer.warm_url(&url).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnexpectedStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_storage_failure() {
        let remote = Arc::new(MockRemote::with_resources([(format!("{BASE}2.png"), b"x".to_vec())]));
        let backend = Arc::new(MockBackend::default());
        backend.fail_writes(true);
        let images = ResourceCache::new(backend, "images").unwrap();
        let warmer = Warmer::new(remote, images, UrlBuilder::new(BASE, "png").unwrap());
        let url = Url::parse(&format!("{BASE}2.png")).unwrap();
        let err = warmer.warm_url(&url).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Storage);
    }

    #[tokio::test]
    async fn test_fetches_feed_the_meter() {
        let remote = Arc::new(MockRemote::with_resources([(format!("{BASE}3.png"), vec![0u8; 1024])]));
        let meter = Arc::new(MeasuredSignal::default());
        let (warmer, _) = setup(remote);
        let warmer = warmer.with_meter(meter.clone());
        assert!(meter.sample().is_none());
        warmer.warm(&Subject::single(3), &VariantList::with_len(1)).await.unwrap();
        // An in-memory host is about as fast as it gets.
        assert_eq!(meter.sample().unwrap().effective_type, EffectiveType::FourG);
    }
}
