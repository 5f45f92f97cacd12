//! Cache of discovered sprite variants.
//!
//! The durable tier is a SQLite database with two independent stores:
//! - **variants**: `cache_key -> {variants, discovered_at}`, written only
//!   through the [`TieredCache`] flusher and read back on memory misses.
//! - **preferred**: `cache_key -> suffix`, the user's chosen default artwork,
//!   managed directly through [`PreferredRepository`].
//!
//! [`TieredCache`] puts an in-memory map in front of the variant store, with
//! TTL expiry and batched write-back.

mod db;
pub mod error;
mod models;
mod preferred;
mod repo;
mod tiered;

pub use crate::db::Database;
pub use crate::models::{CacheEntry, PreferredVariant};
pub use crate::preferred::PreferredRepository;
pub use crate::repo::Repository;
pub use crate::tiered::{CacheStats, DEFAULT_FLUSH_WINDOW, DEFAULT_TTL, TieredCache, TieredCacheOptions};
