//! Background, de-duplicating prefetch queue.
//!
//! The queue is either idle or draining. Enqueueing while idle starts a drain
//! task, which repeatedly samples the network, takes a batch sized for the
//! current conditions, runs it concurrently, and sleeps before the next one.
//! When conditions become too poor the drain stops early and the remaining
//! items stay queued until the next enqueue, [`PrefetchQueue::resume`], or a
//! periodic wake.

use crate::network::NetworkAdvisor;
use crate::pipeline::WorkerHandle;
use dexsprite_variant::{Subject, VariantList};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueItem {
    /// Discover the subject's variants.
    Discover(Subject),
    /// Only warm images for variants that are already known.
    Warm { subject: Subject, variants: VariantList },
}
impl QueueItem {
    pub fn subject(&self) -> &Subject {
        match self {
            Self::Discover(subject) | Self::Warm { subject, .. } => subject,
        }
    }

    fn slot(&self) -> Slot {
        match self {
            Self::Discover(subject) => Slot::Discover(*subject),
            Self::Warm { subject, .. } => Slot::Warm(*subject),
        }
    }
}

/// Dedup key: a subject can be queued at most once per kind of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Slot {
    Discover(Subject),
    Warm(Subject),
}

#[derive(Default)]
struct State {
    items: VecDeque<QueueItem>,
    /// Queued or in flight.
    queued: HashSet<Slot>,
    draining: bool,
}
impl State {
    fn push(&mut self, item: QueueItem) -> bool {
        if !self.queued.insert(item.slot()) {
            return false;
        }
        self.items.push_back(item);
        true
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub batches: u64,
    pub processed: u64,
    pub failed: u64,
    /// Drains stopped early because of network conditions.
    pub halts: u64,
}

#[derive(Default)]
struct Counters {
    batches: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    halts: AtomicU64,
}

struct Inner {
    worker: WorkerHandle,
    advisor: NetworkAdvisor,
    state: Mutex<State>,
    /// `true` while not draining.
    idle: watch::Sender<bool>,
    stop: CancellationToken,
    counters: Counters,
}

/// Network-adaptive background prefetcher.
///
/// Cheap to clone; clones share one queue. Once [`shutdown`](Self::shutdown)
/// has been called the queue accepts nothing further.
#[derive(Clone)]
pub struct PrefetchQueue {
    inner: Arc<Inner>,
}

impl PrefetchQueue {
    pub fn new(worker: WorkerHandle, advisor: NetworkAdvisor) -> Self {
        let (idle, _) = watch::channel(true);
        Self {
            inner: Arc::new(Inner {
                worker,
                advisor,
                state: Mutex::new(State::default()),
                idle,
                stop: CancellationToken::new(),
                counters: Counters::default(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue subjects for discovery, skipping any already queued or with a
    /// fresh cache entry, and start draining. Returns how many were accepted.
    ///
    /// Also resumes a drain that stopped because of poor network conditions.
    pub async fn enqueue(&self, subjects: impl IntoIterator<Item = Subject>) -> usize {
        if self.inner.stop.is_cancelled() {
            debug!("Prefetch queue is shut down, ignoring enqueue");
            return 0;
        }
        let mut accepted = 0;
        for subject in subjects {
            let queued = self.state().queued.contains(&Slot::Discover(subject));
            if queued {
                continue;
            }
            if self.inner.worker.is_fresh(&subject).await {
                trace!(key = %subject, "Already cached, not queueing");
                continue;
            }
            let pushed = self.state().push(QueueItem::Discover(subject));
            if pushed {
                accepted += 1;
            }
        }
        if accepted > 0 {
            debug!(accepted, "Subjects queued for prefetch");
        }
        self.start();
        accepted
    }

    /// Queue an image warm for variants that are already known. Returns
    /// `false` if one is already queued for `subject`.
    pub fn enqueue_warm(&self, subject: Subject, variants: VariantList) -> bool {
        if self.inner.stop.is_cancelled() {
            return false;
        }
        let accepted = self.state().push(QueueItem::Warm { subject, variants });
        self.start();
        accepted
    }

    /// Start draining if there's anything to drain.
    pub fn resume(&self) {
        self.start();
    }

    /// Items waiting to be taken into a batch.
    pub fn len(&self) -> usize {
        self.state().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_draining(&self) -> bool {
        self.state().draining
    }

    pub fn stats(&self) -> QueueStats {
        let counters = &self.inner.counters;
        QueueStats {
            batches: counters.batches.load(Ordering::Relaxed),
            processed: counters.processed.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            halts: counters.halts.load(Ordering::Relaxed),
        }
    }

    /// Resolves once the queue is idle (immediately if it already is).
    pub async fn wait_idle(&self) {
        let mut idle = self.inner.idle.subscribe();
        _ = idle.wait_for(|idle| *idle).await;
    }

    /// Call [`resume`](Self::resume) every `period` until shutdown.
    pub fn spawn_periodic_wake(&self, period: Duration) -> JoinHandle<()> {
        let queue = self.clone();
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticks.tick() => queue.resume(),
                    _ = queue.inner.stop.cancelled() => break,
                }
            }
        })
    }

    /// Stop draining after the in-flight batch, then flush the worker.
    /// Queued items are discarded.
    pub async fn shutdown(&self) {
        self.inner.stop.cancel();
        self.wait_idle().await;
        self.inner.worker.flush().await;
        info!(remaining = self.len(), "Prefetch queue stopped");
    }

    fn start(&self) {
        {
            let mut state = self.state();
            if state.draining || state.items.is_empty() || self.inner.stop.is_cancelled() {
                return;
            }
            state.draining = true;
            self.inner.idle.send_replace(false);
        }
        let queue = self.clone();
        tokio::spawn(async move { queue.drain().await });
    }

    async fn drain(self) {
        debug!(queued = self.len(), "Prefetch drain started");
        loop {
            let profile = self.inner.advisor.sample();
            let batch: Vec<QueueItem> = {
                let mut state = self.state();
                if self.inner.stop.is_cancelled() || state.items.is_empty() {
                    self.finish(&mut state);
                    break;
                }
                if !NetworkAdvisor::should_continue(&profile) {
                    info!(
                        remaining = state.items.len(),
                        effective_type = %profile.effective_type,
                        save_data = profile.save_data,
                        "Network conditions too poor, pausing prefetch"
                    );
                    self.inner.counters.halts.fetch_add(1, Ordering::Relaxed);
                    self.finish(&mut state);
                    break;
                }
                let size = NetworkAdvisor::batch_size(&profile).min(state.items.len());
                state.items.drain(..size).collect()
            };
            trace!(size = batch.len(), effective_type = %profile.effective_type, "Running prefetch batch");
            self.run_batch(&batch).await;
            self.inner.counters.batches.fetch_add(1, Ordering::Relaxed);
            let more = {
                let mut state = self.state();
                for item in &batch {
                    state.queued.remove(&item.slot());
                }
                !state.items.is_empty()
            };
            if more {
                tokio::select! {
                    _ = tokio::time::sleep(NetworkAdvisor::inter_batch_delay(&profile)) => {},
                    _ = self.inner.stop.cancelled() => {},
                }
            }
        }
    }

    /// Back to idle. Must be called with the state locked, so an enqueue can't
    /// slip in between "nothing left" and "not draining".
    fn finish(&self, state: &mut State) {
        state.draining = false;
        self.inner.idle.send_replace(true);
        debug!(remaining = state.items.len(), "Prefetch drain stopped");
    }

    /// Run every item on its own task. A panicking item counts as failed and
    /// leaves the drain (and its siblings) running.
    async fn run_batch(&self, batch: &[QueueItem]) {
        let mut tasks = JoinSet::new();
        let mut subjects = HashMap::with_capacity(batch.len());
        for item in batch {
            let queue = self.clone();
            let item = item.clone();
            let subject = *item.subject();
            let handle = tasks.spawn(async move { queue.process(&item).await });
            subjects.insert(handle.id(), subject);
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                self.inner.counters.failed.fetch_add(1, Ordering::Relaxed);
                match subjects.get(&e.id()) {
                    Some(subject) => warn!(key = %subject, error = ?e, "Prefetch item panicked"),
                    None => warn!(error = ?e, "Prefetch item panicked"),
                }
            }
        }
    }

    async fn process(&self, item: &QueueItem) {
        let result = match item {
            QueueItem::Discover(subject) => self.inner.worker.prefetch(subject).await,
            QueueItem::Warm { subject, variants } => self.inner.worker.warm(subject, variants).await,
        };
        match result {
            Ok(()) => {
                self.inner.counters.processed.fetch_add(1, Ordering::Relaxed);
            },
            Err(e) => {
                self.inner.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(key = %item.subject(), error = ?e, "Prefetch item failed");
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, Result};
    use crate::network::{EffectiveType, NetworkProfile, SharedSignal};
    use crate::pipeline::PrefetchWorker;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct FakeWorker {
        calls: Mutex<Vec<(Instant, Subject)>>,
        warms: Mutex<Vec<Subject>>,
        fresh: Mutex<HashSet<Subject>>,
        failing: Mutex<HashSet<Subject>>,
        panicking: Mutex<HashSet<Subject>>,
        flushes: AtomicUsize,
    }
    impl FakeWorker {
        fn calls(&self) -> Vec<(Instant, Subject)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PrefetchWorker for FakeWorker {
        async fn is_fresh(&self, subject: &Subject) -> bool {
            self.fresh.lock().unwrap().contains(subject)
        }

        async fn prefetch(&self, subject: &Subject) -> Result<()> {
            self.calls.lock().unwrap().push((Instant::now(), *subject));
            if self.failing.lock().unwrap().contains(subject) {
                exn::bail!(ErrorKind::Fetch(subject.key()));
            }
            let panics = self.panicking.lock().unwrap().contains(subject);
            if panics {
                panic!("worker blew up on {subject}");
            }
            Ok(())
        }

        async fn warm(&self, subject: &Subject, _variants: &VariantList) -> Result<()> {
            self.warms.lock().unwrap().push(*subject);
            Ok(())
        }

        async fn flush(&self) {
            self.flushes.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn queue(effective_type: EffectiveType) -> (PrefetchQueue, Arc<FakeWorker>, SharedSignal) {
        let worker = Arc::new(FakeWorker::default());
        let signal = SharedSignal::new(NetworkProfile::new(effective_type));
        let queue = PrefetchQueue::new(worker.clone(), NetworkAdvisor::new(Arc::new(signal.clone())));
        (queue, worker, signal)
    }

    fn subjects(n: u32) -> impl Iterator<Item = Subject> {
        (1..=n).map(Subject::single)
    }

    #[tokio::test(start_paused = true)]
    async fn test_3g_drains_in_batches_of_eight() {
        let (queue, worker, _) = queue(EffectiveType::ThreeG);
        let start = Instant::now();
        assert_eq!(queue.enqueue(subjects(20)).await, 20);
        assert!(queue.is_draining());
        queue.wait_idle().await;

        let offsets: Vec<u128> = worker.calls().iter().map(|(at, _)| (*at - start).as_millis()).collect();
        assert_eq!(offsets.len(), 20);
        assert!(offsets[..8].iter().all(|&ms| ms == 0));
        assert!(offsets[8..16].iter().all(|&ms| ms == 800));
        assert!(offsets[16..].iter().all(|&ms| ms == 1_600));
        assert_eq!(queue.stats(), QueueStats { batches: 3, processed: 20, failed: 0, halts: 0 });
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_data_halts_mid_drain() {
        let (queue, worker, signal) = queue(EffectiveType::ThreeG);
        queue.enqueue(subjects(20)).await;
        tokio::time::sleep(Duration::from_millis(400)).await;
        signal.set_save_data(true);
        queue.wait_idle().await;

        assert_eq!(worker.calls().len(), 8);
        assert_eq!(queue.len(), 12);
        assert!(!queue.is_draining());
        assert_eq!(queue.stats().halts, 1);

        // Nothing is lost: better conditions and a resume finish the job.
        signal.set(NetworkProfile::new(EffectiveType::FourG));
        queue.resume();
        queue.wait_idle().await;
        assert_eq!(worker.calls().len(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_2g_never_starts() {
        let (queue, worker, _) = queue(EffectiveType::Slow2g);
        assert_eq!(queue.enqueue(subjects(5)).await, 5);
        queue.wait_idle().await;
        assert!(worker.calls().is_empty());
        assert_eq!(queue.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicates_are_discovered_once() {
        let (queue, worker, _) = queue(EffectiveType::FourG);
        let twice = [Subject::single(1), Subject::single(1), Subject::fusion(1, 2)];
        assert_eq!(queue.enqueue(twice).await, 2);
        // Still queued: not accepted again.
        assert_eq!(queue.enqueue([Subject::single(1)]).await, 0);
        queue.wait_idle().await;
        assert_eq!(worker.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_subjects_are_skipped() {
        let (queue, worker, _) = queue(EffectiveType::FourG);
        worker.fresh.lock().unwrap().insert(Subject::single(2));
        assert_eq!(queue.enqueue(subjects(3)).await, 2);
        queue.wait_idle().await;
        let seen: Vec<Subject> = worker.calls().into_iter().map(|(_, s)| s).collect();
        assert!(!seen.contains(&Subject::single(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_isolated() {
        let (queue, worker, _) = queue(EffectiveType::FourG);
        worker.failing.lock().unwrap().insert(Subject::single(3));
        queue.enqueue(subjects(5)).await;
        queue.wait_idle().await;
        assert_eq!(worker.calls().len(), 5);
        let stats = queue.stats();
        assert_eq!((stats.processed, stats.failed), (4, 1));
        // A failed subject isn't fresh, so it can be queued again.
        assert_eq!(queue.enqueue([Subject::single(3)]).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_item_does_not_wedge_the_queue() {
        let (queue, worker, _) = queue(EffectiveType::FourG);
        worker.panicking.lock().unwrap().insert(Subject::single(2));
        assert_eq!(queue.enqueue(subjects(4)).await, 4);
        queue.wait_idle().await;
        assert!(!queue.is_draining());
        let stats = queue.stats();
        assert_eq!((stats.processed, stats.failed), (3, 1));

        // The queue still drains new work.
        worker.panicking.lock().unwrap().clear();
        assert_eq!(queue.enqueue([Subject::single(2), Subject::single(9)]).await, 2);
        queue.wait_idle().await;
        assert_eq!(queue.stats().processed, 5);
        assert_eq!(worker.calls().len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_warm_items() {
        let (queue, worker, _) = queue(EffectiveType::FourG);
        let subject = Subject::single(25);
        assert!(queue.enqueue_warm(subject, VariantList::with_len(3)));
        assert!(!queue.enqueue_warm(subject, VariantList::with_len(3)));
        // Discovery and warming are tracked separately.
        assert_eq!(queue.enqueue([subject]).await, 1);
        queue.wait_idle().await;
        assert_eq!(*worker.warms.lock().unwrap(), vec![subject]);
        assert_eq!(worker.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_finishes_batch_and_flushes() {
        let (queue, worker, _) = queue(EffectiveType::ThreeG);
        queue.enqueue(subjects(20)).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        queue.shutdown().await;
        assert_eq!(worker.calls().len(), 8);
        assert_eq!(worker.flushes.load(Ordering::Relaxed), 1);
        assert!(!queue.is_draining());
        assert_eq!(queue.enqueue(subjects(1)).await, 0);
        assert!(!queue.enqueue_warm(Subject::single(1), VariantList::with_len(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_wake_resumes() {
        let (queue, worker, signal) = queue(EffectiveType::FourG);
        signal.set_save_data(true);
        queue.enqueue(subjects(20)).await;
        queue.wait_idle().await;
        assert!(worker.calls().is_empty());

        signal.set_save_data(false);
        let wake = queue.spawn_periodic_wake(Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(61)).await;
        queue.wait_idle().await;
        assert_eq!(worker.calls().len(), 20);
        queue.shutdown().await;
        wake.await.unwrap();
    }
}
