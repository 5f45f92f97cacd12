//! Configuration sections. Every field has a default, so an empty (or absent)
//! config file is valid.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Network quality labels accepted for the static profile override.
pub const EFFECTIVE_TYPES: [&str; 4] = ["slow-2g", "2g", "3g", "4g"];

/// Asset host and HTTP client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteConfig {
    /// Directory URL the sprite files live under.
    pub base_url: String,
    /// Sprite file extension, without the dot.
    pub extension: String,
    /// Budget for one existence probe (HEAD plus fallback).
    pub probe_timeout_ms: u64,
    /// Budget for any other request (image fetches, pass-through).
    pub request_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// Defaults to `dexsprite/<version>`.
    pub user_agent: Option<String>,
}
impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/sprites/".to_string(),
            extension: "png".to_string(),
            probe_timeout_ms: 3_000,
            request_timeout_ms: 10_000,
            connect_timeout_ms: 3_000,
            user_agent: None,
        }
    }
}

/// Durable and in-memory variant cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// SQLite database file. Defaults to `variants.sqlite` in the platform
    /// data directory.
    pub path: Option<PathBuf>,
    pub ttl_secs: u64,
    /// Coalescing window for batched durable writes.
    pub flush_window_ms: u64,
}
impl Default for CacheConfig {
    fn default() -> Self {
        Self { path: None, ttl_secs: 24 * 60 * 60, flush_window_ms: 100 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiscoveryConfig {
    /// Hard cap on probed indices per subject.
    pub max_depth: usize,
    /// Re-probe an index once when the host failed to answer (timeout, 5xx)
    /// instead of treating it as absent straight away.
    pub retry_transient: bool,
    /// How many indices the foreground preview probes before handing the rest
    /// to the prefetch queue.
    pub preview_depth: usize,
}
impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self { max_depth: 50, retry_transient: false, preview_depth: 2 }
    }
}

/// Fixed network profile, for hosts with no live connection-quality signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkOverride {
    /// One of [`EFFECTIVE_TYPES`].
    pub effective_type: String,
    pub downlink_mbps: f64,
    pub save_data: bool,
}
impl Default for NetworkOverride {
    fn default() -> Self {
        Self { effective_type: "4g".to_string(), downlink_mbps: 10.0, save_data: false }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PrefetchConfig {
    pub enabled: bool,
    /// Also fetch every discovered variant's image into the image cache.
    pub warm_images: bool,
    /// Resume a halted queue this often. `0` disables the periodic wake.
    pub wake_interval_secs: u64,
    /// When unset, the profile is measured from image fetch throughput.
    pub network: Option<NetworkOverride>,
}
impl Default for PrefetchConfig {
    fn default() -> Self {
        Self { enabled: true, warm_images: true, wake_interval_secs: 60, network: None }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    /// Root of the on-disk resource cache. Defaults to the platform cache
    /// directory.
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProxyConfig {
    /// Path of the discovery API (`GET <api_path>?id=<key>`).
    pub api_path: String,
    /// Page served from cache when a navigation request fails.
    pub shell_path: String,
}
impl Default for ProxyConfig {
    fn default() -> Self {
        Self { api_path: "/variants".to_string(), shell_path: "/".to_string() }
    }
}
