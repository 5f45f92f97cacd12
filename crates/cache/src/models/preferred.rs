use super::{from_millis, to_millis};
use crate::error::Error;
use time::UtcDateTime;

/// The user's chosen default artwork for a subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreferredVariant {
    pub key: String,
    pub suffix: String,
    pub updated_at: UtcDateTime,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PreferredRow {
    pub(crate) cache_key: String,
    pub(crate) suffix: String,
    pub(crate) updated_at: i64,
}
impl From<&PreferredVariant> for PreferredRow {
    fn from(preferred: &PreferredVariant) -> Self {
        Self {
            cache_key: preferred.key.clone(),
            suffix: preferred.suffix.clone(),
            updated_at: to_millis(preferred.updated_at),
        }
    }
}
impl TryFrom<PreferredRow> for PreferredVariant {
    type Error = Error;
    fn try_from(row: PreferredRow) -> Result<Self, Self::Error> {
        Ok(Self {
            key: row.cache_key,
            suffix: row.suffix,
            updated_at: from_millis(row.updated_at, "preference date")?,
        })
    }
}
