use crate::error::{ErrorKind, Result};
use crate::suffix::suffix;
use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// Ordered, contiguous list of discovered variant suffixes.
///
/// If the suffix at index *i* is present, every suffix before it is present
/// too, and the list always starts at `""` (the default artwork). The only way
/// to grow a list is [`push_next`](Self::push_next), and lists rebuilt from
/// untrusted data go through [`from_suffixes`](Self::from_suffixes), so a
/// consumer never has to consider gaps.
///
/// An empty list means the subject has no artwork at all.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct VariantList(Vec<String>);

impl VariantList {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first `len` variants, i.e. `["", "a", "b", ...]`.
    pub fn with_len(len: usize) -> Self {
        Self((0..len).map(suffix).collect())
    }

    /// Rebuild a list from stored or received suffixes, rejecting gaps,
    /// reordering, duplicates, and malformed suffixes.
    pub fn from_suffixes<I, S>(suffixes: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list = Self::new();
        for (i, s) in suffixes.into_iter().enumerate() {
            let s = s.into();
            if s != suffix(i) {
                crate::suffix::validate(&s)?;
                exn::bail!(ErrorKind::NonContiguous(i));
            }
            list.0.push(s);
        }
        Ok(list)
    }

    /// Suffix that would be appended next.
    pub fn next_suffix(&self) -> String {
        suffix(self.0.len())
    }

    /// Append the next suffix in codec order and return it.
    pub fn push_next(&mut self) -> &str {
        let next = self.next_suffix();
        self.0.push(next);
        &self.0[self.0.len() - 1]
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}

impl Deref for VariantList {
    type Target = [String];
    fn deref(&self) -> &[String] {
        &self.0
    }
}

impl TryFrom<Vec<String>> for VariantList {
    type Error = ErrorKind;
    fn try_from(value: Vec<String>) -> std::result::Result<Self, Self::Error> {
        Self::from_suffixes(value).map_err(|e| (*e).clone())
    }
}

impl From<VariantList> for Vec<String> {
    fn from(list: VariantList) -> Self {
        list.0
    }
}

impl<'a> IntoIterator for &'a VariantList {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
