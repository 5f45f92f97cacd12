//! Subjects, variant suffixes and sprite URLs.
//!
//! Everything in this crate is pure: no I/O, no clocks, no async. It defines
//! the vocabulary the rest of the workspace speaks:
//!
//! - [`Subject`]: a single entity id or a head/body fusion pair, identified
//!   by its canonical key (`"25"`, `"1.2"`).
//! - [`suffix`] / [`index`]: the bijective base-26 codec that maps variant
//!   indices onto filename suffixes (`0 → ""`, `1 → "a"`, `27 → "aa"`).
//! - [`VariantList`]: a contiguous, ordered list of discovered suffixes.
//! - [`UrlBuilder`]: composes the asset host URL for a subject + suffix.

mod builder;
pub mod error;
mod list;
mod subject;
mod suffix;

pub use crate::builder::{DEFAULT_EXTENSION, UrlBuilder};
pub use crate::list::VariantList;
pub use crate::subject::{EntityId, Subject};
pub use crate::suffix::{index, suffix, suffixes, validate as validate_suffix};
pub use ::url::Url;
