//! Variant suffix codec.
//!
//! Maps a zero-based variant index onto the short alphabetic suffix appended
//! to a sprite's canonical key, and back again. Index `0` is the default
//! artwork and has the empty suffix; every index after that is written in
//! bijective base-26 over `a..=z`:
//!
//! | index | suffix |
//! |-------|--------|
//! | 0     | `""`   |
//! | 1     | `"a"`  |
//! | 26    | `"z"`  |
//! | 27    | `"aa"` |
//! | 702   | `"zz"` |
//! | 703   | `"aaa"`|

use crate::error::{ErrorKind, Result};
use exn::OptionExt;

const RADIX: usize = 26;

/// Encode a variant index as its suffix.
///
/// Total and deterministic; there is no failure mode.
///
/// ```
/// use dexsprite_variant::suffix;
/// assert_eq!(suffix(0), "");
/// assert_eq!(suffix(1), "a");
/// assert_eq!(suffix(27), "aa");
/// ```
pub fn suffix(index: usize) -> String {
    let mut digits = Vec::new();
    let mut n = index;
    while n > 0 {
        n -= 1;
        // Always < 26, so the cast can never truncate.
        digits.push(b'a' + (n % RADIX) as u8);
        n /= RADIX;
    }
    digits.reverse();
    // Only ever ASCII lowercase letters.
    digits.into_iter().map(char::from).collect()
}

/// Decode a suffix back into its variant index.
///
/// Exact inverse of [`suffix`]. Rejects anything that isn't lowercase ASCII
/// letters, and suffixes so long their index would overflow `usize`.
///
/// ```
/// use dexsprite_variant::{index, suffix};
/// assert_eq!(index("").unwrap(), 0);
/// assert_eq!(index("z").unwrap(), 26);
/// assert_eq!(index(&suffix(12345)).unwrap(), 12345);
/// assert!(index("A").is_err());
/// ```
pub fn index(suffix: &str) -> Result<usize> {
    let invalid = || ErrorKind::InvalidSuffix(suffix.to_string());
    suffix.bytes().try_fold(0usize, |acc, byte| {
        if !byte.is_ascii_lowercase() {
            exn::bail!(invalid());
        }
        let digit = usize::from(byte - b'a') + 1;
        acc.checked_mul(RADIX).and_then(|acc| acc.checked_add(digit)).ok_or_raise(invalid)
    })
}

/// Check a suffix is well-formed without caring about its index.
pub fn validate(suffix: &str) -> Result<()> {
    index(suffix).map(|_| ())
}

/// Infinite iterator over every suffix in index order, starting at `""`.
///
/// ```
/// use dexsprite_variant::suffixes;
/// let first: Vec<_> = suffixes().take(3).collect();
/// assert_eq!(first, ["", "a", "b"]);
/// ```
pub fn suffixes() -> impl Iterator<Item = String> {
    (0..).map(suffix)
}
