use super::{EffectiveType, NetworkProfile};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

pub type SignalHandle = Arc<dyn ConnectionSignal + Send + Sync>;

/// Source of live connection-quality information.
pub trait ConnectionSignal {
    /// `None` when the source has nothing to report (yet).
    fn sample(&self) -> Option<NetworkProfile>;
}

/// Host with no quality signal at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnknownSignal;
impl ConnectionSignal for UnknownSignal {
    fn sample(&self) -> Option<NetworkProfile> {
        None
    }
}

/// Fixed profile, e.g. from configuration.
#[derive(Debug, Clone, Copy)]
pub struct StaticSignal(pub NetworkProfile);
impl ConnectionSignal for StaticSignal {
    fn sample(&self) -> Option<NetworkProfile> {
        Some(self.0)
    }
}

/// Profile that can be changed at runtime from anywhere holding a clone.
#[derive(Debug, Clone, Default)]
pub struct SharedSignal {
    profile: Arc<RwLock<Option<NetworkProfile>>>,
}
impl SharedSignal {
    pub fn new(profile: NetworkProfile) -> Self {
        Self { profile: Arc::new(RwLock::new(Some(profile))) }
    }

    pub fn set(&self, profile: NetworkProfile) {
        *self.profile.write().unwrap_or_else(PoisonError::into_inner) = Some(profile);
    }

    /// Back to "no information".
    pub fn clear(&self) {
        *self.profile.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Flip the data saver flag, keeping the rest of the current profile.
    pub fn set_save_data(&self, save_data: bool) {
        let mut guard = self.profile.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(guard.unwrap_or_default().with_save_data(save_data));
    }
}
impl ConnectionSignal for SharedSignal {
    fn sample(&self) -> Option<NetworkProfile> {
        *self.profile.read().unwrap_or_else(PoisonError::into_inner)
    }
}

const DEFAULT_WINDOW: usize = 8;

/// Transfers smaller than this finish in about one round trip, so their
/// duration says nothing about bandwidth. They only count as latency samples.
pub const MIN_THROUGHPUT_BYTES: u64 = 32 * 1024;

#[derive(Debug, Clone, Copy)]
struct Transfer {
    bytes: u64,
    elapsed: Duration,
}

#[derive(Debug, Default)]
struct Samples {
    transfers: VecDeque<Transfer>,
    round_trips: VecDeque<Duration>,
}

/// Estimates quality from recent transfers.
///
/// Transfers of at least [`MIN_THROUGHPUT_BYTES`] go into a throughput window,
/// classified by aggregate rate: up to 50 kbps is `slow-2g`, up to 70 kbps
/// `2g`, up to 700 kbps `3g`, anything faster `4g`. Smaller transfers go into
/// a round-trip window; an average of 2s or more is `slow-2g` and 1.4s or
/// more `2g`, anything quicker says nothing against `4g`. The worse of the two
/// estimates wins.
#[derive(Debug)]
pub struct MeasuredSignal {
    window: usize,
    samples: Mutex<Samples>,
    save_data: AtomicBool,
}

impl Default for MeasuredSignal {
    fn default() -> Self {
        Self::with_window(DEFAULT_WINDOW)
    }
}

impl MeasuredSignal {
    pub fn with_window(window: usize) -> Self {
        Self { window: window.max(1), samples: Mutex::default(), save_data: AtomicBool::new(false) }
    }

    fn samples(&self) -> MutexGuard<'_, Samples> {
        self.samples.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record one completed transfer.
    pub fn record(&self, bytes: u64, elapsed: Duration) {
        let window = self.window;
        let mut samples = self.samples();
        if bytes >= MIN_THROUGHPUT_BYTES {
            push_bounded(&mut samples.transfers, Transfer { bytes, elapsed }, window);
        } else {
            push_bounded(&mut samples.round_trips, elapsed, window);
        }
    }

    pub fn set_save_data(&self, save_data: bool) {
        self.save_data.store(save_data, Ordering::Relaxed);
    }

    /// Aggregate throughput over the window, in kilobits per second. `None`
    /// until a transfer large enough to measure has completed.
    pub fn kbps(&self) -> Option<f64> {
        let samples = self.samples();
        if samples.transfers.is_empty() {
            return None;
        }
        let bytes: u64 = samples.transfers.iter().map(|t| t.bytes).sum();
        let secs: f64 = samples.transfers.iter().map(|t| t.elapsed.as_secs_f64()).sum();
        if secs <= 0.0 {
            return Some(f64::INFINITY);
        }
        Some(bytes as f64 * 8.0 / secs / 1_000.0)
    }

    /// Average duration of the recent small transfers.
    pub fn round_trip(&self) -> Option<Duration> {
        let samples = self.samples();
        let count = u32::try_from(samples.round_trips.len()).ok().filter(|&n| n > 0)?;
        Some(samples.round_trips.iter().sum::<Duration>() / count)
    }

    fn classify_kbps(kbps: f64) -> EffectiveType {
        match kbps {
            k if k <= 50.0 => EffectiveType::Slow2g,
            k if k <= 70.0 => EffectiveType::TwoG,
            k if k <= 700.0 => EffectiveType::ThreeG,
            _ => EffectiveType::FourG,
        }
    }

    fn classify_round_trip(rtt: Duration) -> EffectiveType {
        match rtt.as_millis() {
            ms if ms >= 2_000 => EffectiveType::Slow2g,
            ms if ms >= 1_400 => EffectiveType::TwoG,
            _ => EffectiveType::FourG,
        }
    }
}

fn push_bounded<T>(queue: &mut VecDeque<T>, item: T, window: usize) {
    if queue.len() == window {
        queue.pop_front();
    }
    queue.push_back(item);
}

impl ConnectionSignal for MeasuredSignal {
    fn sample(&self) -> Option<NetworkProfile> {
        let save_data = self.save_data.load(Ordering::Relaxed);
        let kbps = self.kbps();
        let by_throughput = kbps.map(Self::classify_kbps);
        let by_round_trip = self.round_trip().map(Self::classify_round_trip);
        let effective_type = match (by_throughput, by_round_trip) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) | (None, Some(a)) => a,
            // Nothing measured yet; the data saver flag still counts.
            (None, None) => return save_data.then(|| NetworkProfile::default().with_save_data(true)),
        };
        let downlink = match kbps {
            Some(kbps) if kbps.is_finite() => kbps / 1_000.0,
            _ => NetworkProfile::default().downlink_mbps,
        };
        Some(NetworkProfile::new(effective_type).with_downlink(downlink).with_save_data(save_data))
    }
}
