//! Request interception for the sprite pipeline.
//!
//! [`InterceptionProxy`] classifies each request ([`ResourceClass`]) and
//! serves it with a matching cache policy: sprite images cache-first, page
//! navigations and static assets network-first with a cached fallback. The
//! discovery API ([`VariantsApi`]) is answered locally or forwarded, and its
//! successful responses feed the prefetch queue without delaying the caller.

mod api;
mod classify;
pub mod error;
mod message;
mod proxy;

pub use crate::api::{ApiError, VariantsApi, VariantsResponse, parse_id};
pub use crate::classify::{ResourceClass, classify};
pub use crate::message::{ClientMessage, PrefetchSpriteVariants};
pub use crate::proxy::{CACHE_HEADER, InterceptionProxy, ProxyOptions};
