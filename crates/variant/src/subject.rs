//! Discovery subjects.
//!
//! A [`Subject`] is the thing we're discovering artwork variants for: either a
//! single entity (`25`) or an ordered head/body fusion pair (`1.2`). The
//! canonical key doubles as the cache key, the Discovery API `id` parameter,
//! and the stem of every sprite filename.

use crate::error::{Error, ErrorKind, Result};
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Numeric entity identifier.
pub type EntityId = u32;

/// Immutable value type identifying a single entity or a head/body composite.
///
/// Equality and hashing are by canonical key. A subject without a primary id
/// cannot be constructed; [`Subject::from_parts`] is where that contract is
/// enforced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Subject {
    head: EntityId,
    body: Option<EntityId>,
}

impl Subject {
    /// A single (non-fused) entity.
    pub fn single(id: EntityId) -> Self {
        Self { head: id, body: None }
    }

    /// A head/body fusion pair. Order matters: `1.2` and `2.1` are different subjects.
    pub fn fusion(head: EntityId, body: EntityId) -> Self {
        Self { head, body: Some(body) }
    }

    /// Build a subject from optional parts, failing fast when the primary id
    /// is missing (including a body given without a head).
    pub fn from_parts(head: Option<EntityId>, body: Option<EntityId>) -> Result<Self> {
        match (head, body) {
            (Some(head), body) => Ok(Self { head, body }),
            (None, _) => exn::bail!(ErrorKind::MissingId),
        }
    }

    pub fn head(&self) -> EntityId {
        self.head
    }

    pub fn body(&self) -> Option<EntityId> {
        self.body
    }

    pub fn is_fusion(&self) -> bool {
        self.body.is_some()
    }

    /// `"<head>"` or `"<head>.<body>"`.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.body {
            Some(body) => write!(f, "{}.{}", self.head, body),
            None => write!(f, "{}", self.head),
        }
    }
}

fn parse_id(part: &str, whole: &str) -> Result<EntityId> {
    // `u32::from_str` would happily accept a leading `+`.
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        exn::bail!(ErrorKind::MalformedId(whole.to_string()));
    }
    part.parse::<EntityId>().or_raise(|| ErrorKind::MalformedId(whole.to_string()))
}

impl FromStr for Subject {
    type Err = Error;

    /// Parse a canonical key: digits only on each side of an optional single `.`.
    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('.') {
            None => Ok(Self::single(parse_id(s, s)?)),
            Some((head, body)) => Ok(Self::fusion(parse_id(head, s)?, parse_id(body, s)?)),
        }
    }
}

impl TryFrom<String> for Subject {
    type Error = ErrorKind;
    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse::<Subject>().map_err(|e| (*e).clone())
    }
}

impl From<Subject> for String {
    fn from(subject: Subject) -> Self {
        subject.key()
    }
}
