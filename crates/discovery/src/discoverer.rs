//! Sequential "probe until the first gap" discovery.

use crate::error::{ErrorKind, Result};
use dexsprite_cache::{CacheEntry, TieredCache};
use dexsprite_remote::{Probe, ProbeOutcome};
use dexsprite_variant::{Subject, UrlBuilder, VariantList};
use exn::ResultExt;
use tracing::{debug, instrument, trace};

pub const DEFAULT_MAX_DEPTH: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryOptions {
    /// Default probe depth for [`VariantDiscoverer::discover_default`].
    pub max_depth: usize,
    /// Re-probe once when the host failed to answer, rather than treating the
    /// failure as absence immediately.
    pub retry_transient: bool,
}
impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self { max_depth: DEFAULT_MAX_DEPTH, retry_transient: false }
    }
}

/// Finds which numbered variants of a subject exist on the asset host.
///
/// Index 0 is always probed first; if it's absent the subject has no artwork
/// and the (empty) result is cached. Otherwise indices `1, 2, ...` are probed
/// in order, stopping at the first absent one. Each probe decides whether the
/// next is sent, so probing is strictly sequential.
///
/// This is the only writer of the [`TieredCache`].
#[derive(Clone)]
pub struct VariantDiscoverer {
    cache: TieredCache,
    probe: Probe,
    urls: UrlBuilder,
    options: DiscoveryOptions,
}

impl VariantDiscoverer {
    pub fn new(cache: TieredCache, probe: Probe, urls: UrlBuilder, options: DiscoveryOptions) -> Self {
        Self { cache, probe, urls, options }
    }

    pub fn cache(&self) -> &TieredCache {
        &self.cache
    }

    pub fn urls(&self) -> &UrlBuilder {
        &self.urls
    }

    pub fn max_depth(&self) -> usize {
        self.options.max_depth
    }

    /// Variants of `subject`, probing at most `max_depth` indices on a cache miss.
    pub async fn discover(&self, subject: &Subject, max_depth: usize) -> Result<VariantList> {
        Ok(self.discover_entry(subject, max_depth).await?.variants)
    }

    /// [`discover`](Self::discover) with the configured depth.
    pub async fn discover_default(&self, subject: &Subject) -> Result<VariantList> {
        self.discover(subject, self.options.max_depth).await
    }

    /// Like [`discover`](Self::discover), keeping the discovery timestamp.
    #[instrument(level = "debug", skip(self), fields(key = %subject))]
    pub async fn discover_entry(&self, subject: &Subject, max_depth: usize) -> Result<CacheEntry> {
        let key = subject.key();
        if let Some(entry) = self.cache.get(&key).await {
            trace!(count = entry.variants.len(), "Cache hit");
            return Ok(entry);
        }
        let variants = self.scan(subject, max_depth).await?;
        debug!(count = variants.len(), "Discovered variants");
        Ok(self.cache.set(key, variants))
    }

    /// Low-latency partial discovery: a fresh cached list if there is one,
    /// otherwise the first `depth` indices probed without touching the cache.
    /// The rest is left to background prefetching.
    pub async fn preview(&self, subject: &Subject, depth: usize) -> Result<VariantList> {
        if let Some(entry) = self.cache.get(&subject.key()).await {
            return Ok(entry.variants);
        }
        self.scan(subject, depth).await
    }

    async fn scan(&self, subject: &Subject, max_depth: usize) -> Result<VariantList> {
        let mut variants = VariantList::new();
        while variants.len() < max_depth {
            let suffix = variants.next_suffix();
            if !self.is_present(subject, &suffix).await? {
                break;
            }
            variants.push_next();
        }
        Ok(variants)
    }

    async fn is_present(&self, subject: &Subject, suffix: &str) -> Result<bool> {
        let url = self.urls.build(subject, suffix).or_raise(|| ErrorKind::InvalidSubject(subject.key()))?;
        let outcome = match self.probe.check(&url).await {
            ProbeOutcome::Failed if self.options.retry_transient => {
                debug!(%url, "Probe failed, retrying once");
                self.probe.check(&url).await
            },
            outcome => outcome,
        };
        Ok(outcome.is_present())
    }
}
