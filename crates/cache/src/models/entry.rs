use super::{from_millis, to_millis};
use crate::error::{Error, ErrorKind};
use dexsprite_variant::VariantList;
use exn::ResultExt;
use time::{Duration, UtcDateTime};

/// One subject's discovery result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Subject canonical key (`"25"`, `"1.2"`).
    pub key: String,
    pub variants: VariantList,
    pub discovered_at: UtcDateTime,
}
impl CacheEntry {
    pub fn new(key: impl Into<String>, variants: VariantList, discovered_at: UtcDateTime) -> Self {
        Self { key: key.into(), variants, discovered_at }
    }

    /// Entry discovered right now.
    pub fn now(key: impl Into<String>, variants: VariantList) -> Self {
        Self::new(key, variants, UtcDateTime::now())
    }

    /// An entry is fresh until `ttl` has *strictly* elapsed since discovery.
    pub fn is_fresh(&self, ttl: Duration, now: UtcDateTime) -> bool {
        now - self.discovered_at <= ttl
    }

    pub fn age(&self, now: UtcDateTime) -> Duration {
        now - self.discovered_at
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct VariantRow {
    pub(crate) cache_key: String,
    pub(crate) variants: String,
    pub(crate) discovered_at: i64,
}
impl TryFrom<&CacheEntry> for VariantRow {
    type Error = Error;
    fn try_from(entry: &CacheEntry) -> Result<Self, Self::Error> {
        Ok(Self {
            cache_key: entry.key.clone(),
            variants: serde_json::to_string(&entry.variants).or_raise(|| ErrorKind::InvalidData("variants"))?,
            discovered_at: to_millis(entry.discovered_at),
        })
    }
}
impl TryFrom<VariantRow> for CacheEntry {
    type Error = Error;
    fn try_from(row: VariantRow) -> Result<Self, Self::Error> {
        // Deserializing through VariantList re-checks contiguity, so a
        // hand-edited or corrupted row can't smuggle a gap in.
        let variants: VariantList =
            serde_json::from_str(&row.variants).or_raise(|| ErrorKind::InvalidData("variants"))?;
        Ok(Self {
            key: row.cache_key,
            variants,
            discovered_at: from_millis(row.discovered_at, "discovery date")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_row_to_model() {
        let discovered = UtcDateTime::now();
        let row = VariantRow {
            cache_key: "25".to_string(),
            variants: r#"["","a","b"]"#.to_string(),
            discovered_at: to_millis(discovered),
        };
        let entry = CacheEntry::try_from(row).unwrap();
        assert_eq!(entry.variants, VariantList::with_len(3));
        // Milliseconds survive, anything finer is truncated.
        assert!((discovered - entry.discovered_at) < Duration::milliseconds(1));
    }

    #[test]
    fn test_model_to_row() {
        let entry = CacheEntry::now("1.2", VariantList::with_len(2));
        let row = VariantRow::try_from(&entry).unwrap();
        assert_eq!(row.cache_key, "1.2");
        assert_eq!(row.variants, r#"["","a"]"#);
    }

    #[rstest]
    #[case(r#"["","b"]"#)]
    #[case(r#"["a"]"#)]
    #[case(r#"["","A"]"#)]
    #[case("not json")]
    fn test_corrupt_rows_rejected(#[case] variants: &str) {
        let row = VariantRow { cache_key: "25".into(), variants: variants.into(), discovered_at: 0 };
        let err = CacheEntry::try_from(row).unwrap_err();
        assert_eq!(*err, ErrorKind::InvalidData("variants"));
    }

    #[test]
    fn test_freshness_boundary() {
        let now = UtcDateTime::now();
        let ttl = Duration::hours(24);
        let entry = CacheEntry::new("25", VariantList::new(), now - ttl);
        assert!(entry.is_fresh(ttl, now));
        assert!(!entry.is_fresh(ttl, now + Duration::milliseconds(1)));
        assert_eq!(entry.age(now), ttl);
    }
}
