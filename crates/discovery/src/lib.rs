//! Variant discovery and background prefetching.
//!
//! - [`VariantDiscoverer`]: probes the asset host for one subject's variants
//!   (`""`, `"a"`, `"b"`, ...) until the first gap, caching the result.
//! - [`NetworkAdvisor`]: derives prefetch batch size and pacing from a
//!   pluggable [`ConnectionSignal`].
//! - [`Warmer`]: pre-fetches discovered sprite images into the image cache.
//! - [`PrefetchQueue`]: de-duplicating background queue that drains in
//!   network-adaptive batches, independent of the foreground request path.

mod discoverer;
pub mod error;
pub mod network;
mod pipeline;
mod queue;
mod warmer;

pub use crate::discoverer::{DEFAULT_MAX_DEPTH, DiscoveryOptions, VariantDiscoverer};
pub use crate::network::{ConnectionSignal, EffectiveType, NetworkAdvisor, NetworkProfile};
pub use crate::pipeline::{Pipeline, PrefetchWorker, WorkerHandle};
pub use crate::queue::{PrefetchQueue, QueueItem, QueueStats};
pub use crate::warmer::{DEFAULT_FETCH_TIMEOUT, WarmReport, Warmer};
