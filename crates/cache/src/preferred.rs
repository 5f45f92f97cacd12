//! Durable preferred-variant store.
//!
//! Independent of the variant store: a preference is set and cleared by the
//! user, never expires, and is not touched when discoveries are cleared.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{PreferredRow, PreferredVariant};
use exn::ResultExt;
use sqlx::SqlitePool;
use time::UtcDateTime;

#[derive(Debug, Clone)]
pub struct PreferredRepository {
    pool: SqlitePool,
}
impl From<&Database> for PreferredRepository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl PreferredRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: &str) -> Result<Option<PreferredVariant>> {
        let row: Option<PreferredRow> = sqlx::query_as(include_str!("../queries/get_preferred.sql"))
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(PreferredVariant::try_from).transpose()
    }

    /// Record `suffix` as the preferred variant for `key`.
    ///
    /// The suffix isn't checked against the discovered list (the preference
    /// may be set before discovery finishes), only for being well-formed.
    pub async fn set(&self, key: &str, suffix: &str) -> Result<PreferredVariant> {
        if dexsprite_variant::validate_suffix(suffix).is_err() {
            exn::bail!(ErrorKind::InvalidSuffix(suffix.to_string()));
        }
        let preferred = PreferredVariant {
            key: key.to_string(),
            suffix: suffix.to_string(),
            updated_at: UtcDateTime::now(),
        };
        let row = PreferredRow::from(&preferred);
        sqlx::query(include_str!("../queries/upsert_preferred.sql"))
            .bind(row.cache_key)
            .bind(row.suffix)
            .bind(row.updated_at)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tracing::debug!(key, suffix, "Preferred variant set");
        Ok(preferred)
    }

    /// Returns `true` if a preference was removed.
    pub async fn clear(&self, key: &str) -> Result<bool> {
        let result = sqlx::query(include_str!("../queries/delete_preferred.sql"))
            .bind(key)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn clear_all(&self) -> Result<u64> {
        let result = sqlx::query(include_str!("../queries/clear_preferred.sql"))
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected())
    }

    pub async fn list(&self) -> Result<Vec<PreferredVariant>> {
        let rows: Vec<PreferredRow> = sqlx::query_as(include_str!("../queries/list_preferred.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(PreferredVariant::try_from).collect()
    }
}
