//! The work a [`PrefetchQueue`](crate::PrefetchQueue) performs per item.

use crate::discoverer::VariantDiscoverer;
use crate::error::Result;
use crate::warmer::Warmer;
use async_trait::async_trait;
use dexsprite_variant::{Subject, VariantList};
use std::sync::Arc;

pub type WorkerHandle = Arc<dyn PrefetchWorker + Send + Sync>;

/// Per-item work for the prefetch queue.
#[async_trait]
pub trait PrefetchWorker: Send + Sync {
    /// `true` if `subject` already has a fresh discovery and needn't be queued.
    async fn is_fresh(&self, subject: &Subject) -> bool;

    /// Discover `subject`'s variants (and whatever follows from that).
    async fn prefetch(&self, subject: &Subject) -> Result<()>;

    /// Warm images for variants that are already known.
    async fn warm(&self, subject: &Subject, variants: &VariantList) -> Result<()>;

    /// Persist anything buffered. Called once when the queue shuts down.
    async fn flush(&self) {}
}

/// Discovery followed by optional image warming.
#[derive(Clone)]
pub struct Pipeline {
    discoverer: VariantDiscoverer,
    warmer: Option<Warmer>,
}

impl Pipeline {
    pub fn new(discoverer: VariantDiscoverer) -> Self {
        Self { discoverer, warmer: None }
    }

    pub fn with_warmer(mut self, warmer: Warmer) -> Self {
        self.warmer = Some(warmer);
        self
    }

    pub fn discoverer(&self) -> &VariantDiscoverer {
        &self.discoverer
    }
}

#[async_trait]
impl PrefetchWorker for Pipeline {
    async fn is_fresh(&self, subject: &Subject) -> bool {
        self.discoverer.cache().contains(&subject.key()).await
    }

    async fn prefetch(&self, subject: &Subject) -> Result<()> {
        let variants = self.discoverer.discover_default(subject).await?;
        self.warm(subject, &variants).await
    }

    async fn warm(&self, subject: &Subject, variants: &VariantList) -> Result<()> {
        if let Some(warmer) = &self.warmer {
            warmer.warm(subject, variants).await?;
        }
        Ok(())
    }

    async fn flush(&self) {
        self.discoverer.cache().flush().await;
    }
}
