//! Durable variant store.
//!
//! A flat `cache_key -> {variants, discovered_at}` namespace. Freshness is not
//! this layer's concern: rows are returned regardless of age, and the
//! [`TieredCache`](crate::TieredCache) decides what is expired.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{CacheEntry, VariantRow, to_millis};
use exn::ResultExt;
use sqlx::SqlitePool;
use time::UtcDateTime;

#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}
impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let row: Option<VariantRow> = sqlx::query_as(include_str!("../queries/get_variants.sql"))
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(CacheEntry::try_from).transpose()
    }

    pub async fn upsert(&self, entry: &CacheEntry) -> Result<()> {
        self.upsert_many(std::slice::from_ref(entry)).await
    }

    /// Write several entries in one transaction.
    ///
    /// An entry older than what's already stored for its key is ignored, so
    /// replaying a stale batch can never roll a discovery back.
    pub async fn upsert_many(&self, entries: &[CacheEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let rows = entries.iter().map(VariantRow::try_from).collect::<Result<Vec<_>>>()?;
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        for row in rows {
            sqlx::query(include_str!("../queries/upsert_variants.sql"))
                .bind(row.cache_key)
                .bind(row.variants)
                .bind(row.discovered_at)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Delete `key` only if its stored discovery is not newer than
    /// `discovered_at`: an expired row is removed, but a rediscovery that
    /// landed in the meantime survives.
    pub async fn delete_stale(&self, key: &str, discovered_at: UtcDateTime) -> Result<bool> {
        let result = sqlx::query(include_str!("../queries/delete_stale_variants.sql"))
            .bind(key)
            .bind(to_millis(discovered_at))
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every row discovered before `cutoff`. Returns how many.
    pub async fn purge_older_than(&self, cutoff: UtcDateTime) -> Result<u64> {
        let result = sqlx::query(include_str!("../queries/purge_variants.sql"))
            .bind(to_millis(cutoff))
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected())
    }

    pub async fn clear(&self) -> Result<u64> {
        let result = sqlx::query(include_str!("../queries/clear_variants.sql"))
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected())
    }

    pub async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(include_str!("../queries/count_variants.sql"))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        u64::try_from(count).or_raise(|| ErrorKind::InvalidData("row count"))
    }
}
