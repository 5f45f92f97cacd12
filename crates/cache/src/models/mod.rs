mod entry;
mod preferred;

pub use self::entry::CacheEntry;
pub(crate) use self::entry::VariantRow;
pub use self::preferred::PreferredVariant;
pub(crate) use self::preferred::PreferredRow;

use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use time::UtcDateTime;

/// Timestamps are stored as Unix milliseconds; second precision is too coarse
/// for "newest discovery wins" when two discoveries race.
pub(crate) fn to_millis(at: UtcDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

pub(crate) fn from_millis(millis: i64, field: &'static str) -> Result<UtcDateTime> {
    let nanos = i128::from(millis).checked_mul(1_000_000).ok_or_raise(|| ErrorKind::InvalidData(field))?;
    UtcDateTime::from_unix_timestamp_nanos(nanos).or_raise(|| ErrorKind::InvalidData(field))
}
