//! Sprite URL construction.

use crate::Subject;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use url::Url;

/// Default image extension on the asset host.
pub const DEFAULT_EXTENSION: &str = "png";

/// Composes canonical sprite URLs: `<base><canonical key><suffix>.<ext>`.
///
/// Pure, no I/O. The base is validated once at construction and always ends
/// in `/` so that joining never drops its last path segment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UrlBuilder {
    base: Url,
    extension: String,
}

impl UrlBuilder {
    /// # Errors
    /// [`InvalidUrl`](ErrorKind::InvalidUrl) if `base` doesn't parse or can't
    /// have paths joined onto it (`mailto:` and friends).
    pub fn new(base: impl AsRef<str>, extension: impl Into<String>) -> Result<Self> {
        let base = base.as_ref();
        let mut parsed = Url::parse(base).or_raise(|| ErrorKind::InvalidUrl(base.to_string()))?;
        if parsed.cannot_be_a_base() {
            exn::bail!(ErrorKind::InvalidUrl(base.to_string()));
        }
        if !parsed.path().ends_with('/') {
            let path = format!("{}/", parsed.path());
            parsed.set_path(&path);
        }
        let extension = extension.into().trim_start_matches('.').to_string();
        Ok(Self { base: parsed, extension })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// The filename a variant lives under, relative to the base.
    pub fn file_name(&self, subject: &Subject, suffix: &str) -> String {
        format!("{}{}.{}", subject.key(), suffix, self.extension)
    }

    /// Full URL for one variant of `subject`.
    pub fn build(&self, subject: &Subject, suffix: &str) -> Result<Url> {
        crate::suffix::validate(suffix)?;
        let name = self.file_name(subject, suffix);
        self.base.join(&name).or_raise(|| ErrorKind::InvalidUrl(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Subject::single(25), "", "https://cdn.example/sprites/25.png")]
    #[case(Subject::single(25), "a", "https://cdn.example/sprites/25a.png")]
    #[case(Subject::fusion(1, 2), "", "https://cdn.example/sprites/1.2.png")]
    #[case(Subject::fusion(1, 2), "aa", "https://cdn.example/sprites/1.2aa.png")]
    fn test_build(#[case] subject: Subject, #[case] suffix: &str, #[case] expected: &str) {
        let builder = UrlBuilder::new("https://cdn.example/sprites/", DEFAULT_EXTENSION).unwrap();
        assert_eq!(builder.build(&subject, suffix).unwrap().as_str(), expected);
    }

    #[test]
    fn test_base_without_trailing_slash_keeps_last_segment() {
        let builder = UrlBuilder::new("https://cdn.example/sprites", ".png").unwrap();
        assert_eq!(builder.base().as_str(), "https://cdn.example/sprites/");
        assert_eq!(builder.extension(), "png");
        assert_eq!(builder.build(&Subject::single(7), "b").unwrap().as_str(), "https://cdn.example/sprites/7b.png");
    }

    #[test]
    fn test_rejects_bad_base() {
        assert!(UrlBuilder::new("not a url", "png").is_err());
        assert!(UrlBuilder::new("mailto:someone@example.com", "png").is_err());
    }

    #[test]
    fn test_rejects_bad_suffix() {
        let builder = UrlBuilder::new("https://cdn.example/", "png").unwrap();
        let err = builder.build(&Subject::single(1), "../x").unwrap_err();
        assert_eq!(*err, ErrorKind::InvalidSuffix("../x".to_string()));
    }
}
