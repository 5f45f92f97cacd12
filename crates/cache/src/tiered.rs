//! Two-tier cache: an in-memory map in front of the SQLite variant store.
//!
//! Reads check memory first, then the durable store (promoting fresh hits into
//! memory). Writes land in memory synchronously and are handed to a background
//! flusher task, which coalesces every write arriving within one flush window
//! into a single transaction. Durable-store failures are logged and swallowed:
//! the memory tier stays authoritative for the rest of the session.

use crate::error::Result;
use crate::models::CacheEntry;
use crate::repo::Repository;
use dashmap::DashMap;
use dexsprite_variant::VariantList;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration as StdDuration;
use time::{Duration, UtcDateTime};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

pub const DEFAULT_TTL: StdDuration = StdDuration::from_secs(24 * 60 * 60);
pub const DEFAULT_FLUSH_WINDOW: StdDuration = StdDuration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TieredCacheOptions {
    /// Entries older than this are logically absent.
    pub ttl: StdDuration,
    /// Durable writes arriving within this long of the first pending write are
    /// committed together.
    pub flush_window: StdDuration,
}
impl Default for TieredCacheOptions {
    fn default() -> Self {
        Self { ttl: DEFAULT_TTL, flush_window: DEFAULT_FLUSH_WINDOW }
    }
}

/// Counters for the durable tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Transactions committed by the flusher.
    pub batches: u64,
    /// Entries written across all committed batches.
    pub entries: u64,
    /// Batches that failed and were dropped.
    pub failures: u64,
}

#[derive(Default)]
struct Counters {
    batches: AtomicU64,
    entries: AtomicU64,
    failures: AtomicU64,
}

enum Command {
    Write(CacheEntry),
    Flush(oneshot::Sender<()>),
    Clear(oneshot::Sender<()>),
}

struct Inner {
    memory: DashMap<String, CacheEntry>,
    repo: Repository,
    ttl: Duration,
    commands: mpsc::UnboundedSender<Command>,
    counters: Arc<Counters>,
    flusher: std::sync::Mutex<Option<JoinHandle<()>>>,
}

/// Write-back cache of discovered variant lists.
///
/// Cheap to clone; clones share both tiers and the flusher task. Must be
/// created inside a Tokio runtime.
///
/// # Examples
///
/// ```
/// use dexsprite_cache::{Database, Repository, TieredCache, TieredCacheOptions};
/// use dexsprite_variant::VariantList;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let db = Database::connect_in_memory().await.unwrap();
/// let cache = TieredCache::new(Repository::from(&db), TieredCacheOptions::default());
/// cache.set("25", VariantList::with_len(3));
/// // Visible immediately, before the batched durable write.
/// assert_eq!(cache.get("25").await.unwrap().variants.len(), 3);
/// cache.flush().await;
/// # }
/// ```
#[derive(Clone)]
pub struct TieredCache {
    inner: Arc<Inner>,
}

impl TieredCache {
    pub fn new(repo: Repository, options: TieredCacheOptions) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());
        let flusher = Flusher {
            repo: repo.clone(),
            window: options.flush_window,
            counters: counters.clone(),
            pending: HashMap::new(),
        };
        let handle = tokio::spawn(flusher.run(receiver));
        Self {
            inner: Arc::new(Inner {
                memory: DashMap::new(),
                repo,
                ttl: Duration::try_from(options.ttl).unwrap_or(Duration::MAX),
                commands,
                counters,
                flusher: std::sync::Mutex::new(Some(handle)),
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    pub fn repository(&self) -> &Repository {
        &self.inner.repo
    }

    /// Fresh entry for `key`, from memory or the durable store.
    ///
    /// A durable-store failure is logged and reported as a miss.
    pub async fn get(&self, key: &str) -> Option<CacheEntry> {
        let now = UtcDateTime::now();
        if let Some(entry) = self.get_memory_at(key, now) {
            return Some(entry);
        }
        let stored = match self.inner.repo.get(key).await {
            Ok(stored) => stored?,
            Err(e) => {
                warn!(key, error = ?e, "Durable cache read failed");
                return None;
            },
        };
        if !stored.is_fresh(self.inner.ttl, now) {
            trace!(key, age = %stored.age(now), "Durable entry expired");
            if let Err(e) = self.inner.repo.delete_stale(key, stored.discovered_at).await {
                warn!(key, error = ?e, "Failed to delete expired entry");
            }
            return None;
        }
        trace!(key, "Promoting durable entry into memory");
        Some(self.promote(stored))
    }

    /// Whether a fresh entry exists in either tier.
    pub async fn contains(&self, key: &str) -> bool {
        self.get(key).await.is_some()
    }

    /// Fresh entry from the memory tier only. Never touches the durable store.
    pub fn get_memory(&self, key: &str) -> Option<CacheEntry> {
        self.get_memory_at(key, UtcDateTime::now())
    }

    fn get_memory_at(&self, key: &str, now: UtcDateTime) -> Option<CacheEntry> {
        {
            let entry = self.inner.memory.get(key)?;
            if entry.is_fresh(self.inner.ttl, now) {
                return Some(entry.clone());
            }
        }
        // Read guard dropped above; DashMap deadlocks on re-entry.
        self.inner.memory.remove_if(key, |_, entry| !entry.is_fresh(self.inner.ttl, now));
        None
    }

    /// Insert a durable hit unless memory already holds something newer.
    fn promote(&self, stored: CacheEntry) -> CacheEntry {
        let mut slot = self.inner.memory.entry(stored.key.clone()).or_insert_with(|| stored.clone());
        if slot.discovered_at < stored.discovered_at {
            *slot = stored;
        }
        slot.clone()
    }

    /// Record a discovery made now. Visible to `get` immediately; the durable
    /// write is batched.
    pub fn set(&self, key: impl Into<String>, variants: VariantList) -> CacheEntry {
        let entry = CacheEntry::now(key, variants);
        self.insert(entry.clone());
        entry
    }

    /// Store a fully formed entry (e.g. one replayed from another client, or
    /// backdated in tests). Last write wins in memory.
    pub fn insert(&self, entry: CacheEntry) {
        self.inner.memory.insert(entry.key.clone(), entry.clone());
        if self.inner.commands.send(Command::Write(entry)).is_err() {
            warn!("Cache flusher has stopped, durable write dropped");
        }
    }

    /// Commit every pending durable write now.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.inner.commands.send(Command::Flush(ack)).is_ok() {
            _ = done.await;
        }
    }

    /// Empty both tiers and drop any pending durable writes.
    pub async fn clear(&self) {
        self.inner.memory.clear();
        let (ack, done) = oneshot::channel();
        if self.inner.commands.send(Command::Clear(ack)).is_ok() {
            _ = done.await;
        } else if let Err(e) = self.inner.repo.clear().await {
            warn!(error = ?e, "Failed to clear durable cache");
        }
        // A read racing the durable clear may have promoted a row back.
        self.inner.memory.clear();
    }

    /// Drop expired entries from both tiers, committing pending writes first.
    /// Returns how many durable rows were removed.
    pub async fn prune(&self) -> Result<u64> {
        let now = UtcDateTime::now();
        let ttl = self.inner.ttl;
        self.inner.memory.retain(|_, entry| entry.is_fresh(ttl, now));
        self.flush().await;
        let Some(cutoff) = now.checked_sub(ttl) else {
            return Ok(0);
        };
        let removed = self.inner.repo.purge_older_than(cutoff).await?;
        debug!(removed, "Pruned expired cache entries");
        Ok(removed)
    }

    /// Number of entries in the memory tier, fresh or not.
    pub fn memory_len(&self) -> usize {
        self.inner.memory.len()
    }

    pub fn stats(&self) -> CacheStats {
        let counters = &self.inner.counters;
        CacheStats {
            batches: counters.batches.load(Ordering::Relaxed),
            entries: counters.entries.load(Ordering::Relaxed),
            failures: counters.failures.load(Ordering::Relaxed),
        }
    }

    /// Flush, then stop the flusher task. Later writes stay memory-only.
    pub async fn shutdown(&self) {
        self.flush().await;
        let handle = match self.inner.flusher.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.abort();
            _ = handle.await;
            info!("Cache flusher stopped");
        }
    }
}

struct Flusher {
    repo: Repository,
    window: StdDuration,
    counters: Arc<Counters>,
    /// Coalesced per key; only the newest entry for a key is written.
    pending: HashMap<String, CacheEntry>,
}

impl Flusher {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let mut deadline: Option<Instant> = None;
        loop {
            let command = match deadline {
                None => commands.recv().await,
                Some(at) => tokio::select! {
                    command = commands.recv() => command,
                    _ = tokio::time::sleep_until(at) => {
                        self.commit().await;
                        deadline = None;
                        continue;
                    },
                },
            };
            match command {
                Some(Command::Write(entry)) => {
                    if self.pending.is_empty() {
                        deadline = Some(Instant::now() + self.window);
                    }
                    self.stage(entry);
                },
                Some(Command::Flush(ack)) => {
                    self.commit().await;
                    deadline = None;
                    _ = ack.send(());
                },
                Some(Command::Clear(ack)) => {
                    let dropped = self.pending.len();
                    self.pending.clear();
                    deadline = None;
                    match self.repo.clear().await {
                        Ok(removed) => debug!(removed, dropped, "Durable cache cleared"),
                        Err(e) => warn!(error = ?e, "Failed to clear durable cache"),
                    }
                    _ = ack.send(());
                },
                None => {
                    // Every handle dropped.
                    self.commit().await;
                    break;
                },
            }
        }
    }

    fn stage(&mut self, entry: CacheEntry) {
        match self.pending.get(&entry.key) {
            Some(existing) if existing.discovered_at > entry.discovered_at => {},
            _ => {
                self.pending.insert(entry.key.clone(), entry);
            },
        }
    }

    async fn commit(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let batch: Vec<CacheEntry> = self.pending.drain().map(|(_, entry)| entry).collect();
        match self.repo.upsert_many(&batch).await {
            Ok(()) => {
                self.counters.batches.fetch_add(1, Ordering::Relaxed);
                self.counters.entries.fetch_add(batch.len() as u64, Ordering::Relaxed);
                debug!(entries = batch.len(), "Committed cache batch");
            },
            Err(e) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                warn!(entries = batch.len(), error = ?e, "Durable cache write failed, keeping memory tier only");
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    async fn cache(window: StdDuration) -> (Database, TieredCache) {
        let db = Database::connect_in_memory().await.unwrap();
        let options = TieredCacheOptions { flush_window: window, ..Default::default() };
        let cache = TieredCache::new(Repository::from(&db), options);
        (db, cache)
    }

    #[tokio::test]
    async fn test_set_then_get_before_durable_write() {
        let (_db, cache) = cache(StdDuration::from_secs(60)).await;
        cache.set("25", VariantList::with_len(3));
        assert_eq!(cache.get("25").await.unwrap().variants, VariantList::with_len(3));
        // Nothing has reached the durable tier yet.
        assert!(cache.repository().get("25").await.unwrap().is_none());
        cache.flush().await;
        assert!(cache.repository().get("25").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_writes_within_window_are_coalesced() {
        let (_db, cache) = cache(StdDuration::from_millis(50)).await;
        for i in 1..=20 {
            cache.set(i.to_string(), VariantList::with_len(i % 4));
        }
        // Same key twice in one window is written once.
        cache.set("1", VariantList::with_len(2));
        tokio::time::sleep(StdDuration::from_millis(300)).await;
        assert_eq!(cache.stats(), CacheStats { batches: 1, entries: 20, failures: 0 });
        assert_eq!(cache.repository().count().await.unwrap(), 20);
        assert_eq!(cache.repository().get("1").await.unwrap().unwrap().variants.len(), 2);
    }

    #[tokio::test]
    async fn test_flush_commits_immediately() {
        let (_db, cache) = cache(StdDuration::from_secs(60)).await;
        cache.set("1", VariantList::new());
        cache.set("2", VariantList::with_len(1));
        cache.flush().await;
        assert_eq!(cache.stats().batches, 1);
        assert_eq!(cache.repository().count().await.unwrap(), 2);
        // Nothing pending: a second flush is a no-op.
        cache.flush().await;
        assert_eq!(cache.stats().batches, 1);
    }

    #[tokio::test]
    async fn test_durable_hit_is_promoted() {
        let (_db, cache) = cache(StdDuration::from_secs(60)).await;
        cache.repository().upsert(&CacheEntry::now("1.2", VariantList::with_len(2))).await.unwrap();
        assert_eq!(cache.memory_len(), 0);
        assert!(cache.get_memory("1.2").is_none());
        assert_eq!(cache.get("1.2").await.unwrap().variants.len(), 2);
        assert_eq!(cache.get_memory("1.2").unwrap().variants.len(), 2);
    }

    #[tokio::test]
    async fn test_expired_entries_are_absent_and_deleted() {
        let (_db, cache) = cache(StdDuration::from_secs(60)).await;
        let old = UtcDateTime::now() - Duration::hours(25);
        cache.insert(CacheEntry::new("25", VariantList::with_len(3), old));
        cache.flush().await;
        assert!(cache.repository().get("25").await.unwrap().is_some());
        assert!(cache.get("25").await.is_none());
        assert_eq!(cache.memory_len(), 0);
        assert!(cache.repository().get("25").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_custom_ttl() {
        let db = Database::connect_in_memory().await.unwrap();
        let options = TieredCacheOptions { ttl: StdDuration::from_secs(60), ..Default::default() };
        let cache = TieredCache::new(Repository::from(&db), options);
        cache.insert(CacheEntry::new("25", VariantList::new(), UtcDateTime::now() - Duration::seconds(30)));
        assert!(cache.contains("25").await);
        cache.insert(CacheEntry::new("26", VariantList::new(), UtcDateTime::now() - Duration::seconds(90)));
        assert!(!cache.contains("26").await);
    }

    #[tokio::test]
    async fn test_clear_empties_both_tiers_and_cancels_pending() {
        let (_db, cache) = cache(StdDuration::from_secs(60)).await;
        cache.set("1", VariantList::new());
        cache.flush().await;
        cache.set("2", VariantList::new());
        cache.clear().await;
        cache.flush().await;
        assert_eq!(cache.memory_len(), 0);
        assert!(cache.get("1").await.is_none());
        assert_eq!(cache.repository().count().await.unwrap(), 0);
        assert_eq!(cache.stats().entries, 1);
    }

    #[tokio::test]
    async fn test_clear_discards_writes_awaiting_the_window() {
        let (_db, cache) = cache(StdDuration::from_millis(50)).await;
        cache.set("1", VariantList::with_len(1));
        cache.set("2", VariantList::with_len(2));
        cache.clear().await;
        // Let the original window elapse; nothing staged before the clear may land.
        tokio::time::sleep(StdDuration::from_millis(200)).await;
        assert_eq!(cache.repository().count().await.unwrap(), 0);
        assert_eq!(cache.stats().batches, 0);
        assert!(cache.get("1").await.is_none());
        // Writes after the clear are persisted as usual.
        cache.set("3", VariantList::new());
        cache.flush().await;
        assert_eq!(cache.repository().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_clear_after_shutdown_reaches_durable_tier() {
        let (_db, cache) = cache(StdDuration::from_secs(60)).await;
        cache.set("25", VariantList::with_len(1));
        cache.shutdown().await;
        cache.clear().await;
        assert_eq!(cache.repository().count().await.unwrap(), 0);
        assert_eq!(cache.memory_len(), 0);
    }

    #[tokio::test]
    async fn test_prune_drops_expired_entries_from_both_tiers() {
        let (_db, cache) = cache(StdDuration::from_secs(60)).await;
        let now = UtcDateTime::now();
        cache.insert(CacheEntry::new("1", VariantList::new(), now - Duration::hours(30)));
        cache.insert(CacheEntry::new("2", VariantList::new(), now - Duration::hours(25)));
        cache.insert(CacheEntry::new("3", VariantList::with_len(2), now - Duration::hours(1)));
        // Still pending; prune commits before purging.
        assert_eq!(cache.prune().await.unwrap(), 2);
        assert_eq!(cache.memory_len(), 1);
        assert_eq!(cache.repository().count().await.unwrap(), 1);
        assert_eq!(cache.get("3").await.unwrap().variants.len(), 2);
        assert_eq!(cache.prune().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_prune_reports_durable_failure() {
        let (db, cache) = cache(StdDuration::from_secs(60)).await;
        db.close().await;
        let err = cache.prune().await.unwrap_err();
        assert_eq!(*err, crate::error::ErrorKind::Database);
    }

    #[tokio::test]
    async fn test_durable_failure_is_swallowed() {
        let (db, cache) = cache(StdDuration::from_secs(60)).await;
        db.close().await;
        cache.set("25", VariantList::with_len(2));
        cache.flush().await;
        assert_eq!(cache.stats().failures, 1);
        // Memory tier stays authoritative.
        assert_eq!(cache.get("25").await.unwrap().variants.len(), 2);
        // A miss against a dead store is just a miss.
        assert!(cache.get("26").await.is_none());
    }

    #[tokio::test]
    async fn test_promotion_does_not_clobber_newer_memory_entry() {
        let (_db, cache) = cache(StdDuration::from_secs(60)).await;
        let older = CacheEntry::new("25", VariantList::with_len(1), UtcDateTime::now() - Duration::minutes(5));
        let newer = cache.set("25", VariantList::with_len(3));
        assert_eq!(cache.promote(older).variants, newer.variants);
    }

    #[tokio::test]
    async fn test_shutdown_flushes() {
        let (_db, cache) = cache(StdDuration::from_secs(60)).await;
        cache.set("25", VariantList::with_len(1));
        cache.shutdown().await;
        assert_eq!(cache.repository().count().await.unwrap(), 1);
        // Still usable as a memory cache.
        cache.set("26", VariantList::new());
        assert!(cache.get_memory("26").is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_readers_and_writers() {
        let (_db, cache) = cache(StdDuration::from_millis(10)).await;
        let tasks: Vec<_> = (0..8)
            .map(|t| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    for i in 0..50 {
                        let key = (i % 10).to_string();
                        cache.set(key.clone(), VariantList::with_len((t + i) % 5));
                        let _ = cache.get(&key).await;
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        cache.flush().await;
        assert_eq!(cache.repository().count().await.unwrap(), 10);
    }
}
