//! Path validation, and the mapping from resource URLs to storage paths.

use crate::error::{ErrorKind, Result};
use std::path::{Component, Path, PathBuf};
use url::Url;

/// File name used for URLs whose path ends in a slash (`https://host/` or
/// `https://host/app/`), so a directory and its index never collide.
pub const INDEX_FILE: &str = "_index";

/// Validates a storage path, ensuring it doesn't escape the storage root (no
/// `..` traversal).
///
/// > **Note:** This does **not** normalize backslashes, non-UTF8 bytes, or
/// >           platform-specific weirdness. Null bytes are explicitly rejected.
///
/// # Returns
/// Returns the normalized path if valid, or [`InvalidPath`](crate::error::ErrorKind::InvalidPath)
/// if invalid.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use dexsprite_storage::validate_path;
/// assert!(validate_path("images/cdn.example/25.png").is_ok());
/// assert!(validate_path("a/../25a.png").is_ok()); // (never leaves the root)
/// assert!(validate_path("../etc/passwd").is_err());
/// assert!(validate_path("a/../../b").is_err());
/// assert!(validate_path("a\0b").is_err());
/// assert_eq!(
///     validate_path("wrong/../images/./cdn.example//25.png/").unwrap(),
///     Path::new("images/cdn.example/25.png")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let mut components = Vec::new();
    for component in path.as_ref().components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but
                // truncate in C-based syscalls.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
        false => Ok(components.into_iter().collect()),
    }
}

/// Separator between the last path segment and the query in a file name.
/// URL serialization always percent-encodes `{` in paths, so no segment can
/// contain it.
const QUERY_SEPARATOR: char = '{';

/// Map a resource URL to a relative storage path:
/// `<host>[_<port>]/<path>[{<query>]`.
///
/// Scheme and fragment are ignored; `http` and `https` copies of the same
/// resource share a path. A non-empty query is folded into the file name, so
/// `render?id=1` and `render?id=2` are stored apart. Segments stay
/// percent-encoded and the query is escaped, so neither can introduce extra
/// components.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use dexsprite_storage::path_for_url;
/// use url::Url;
///
/// let url = Url::parse("https://cdn.example/sprites/25a.png?v=2").unwrap();
/// assert_eq!(path_for_url(&url).unwrap(), Path::new("cdn.example/sprites/25a.png{v=2"));
/// let root = Url::parse("http://localhost:8080/").unwrap();
/// assert_eq!(path_for_url(&root).unwrap(), Path::new("localhost_8080/_index"));
/// ```
pub fn from_url(url: &Url) -> Result<PathBuf> {
    let unmappable = || ErrorKind::UnmappableUrl(url.to_string());
    let Some(host) = url.host_str() else {
        exn::bail!(unmappable());
    };
    let mut path = match url.port() {
        Some(port) => PathBuf::from(format!("{host}_{port}")),
        None => PathBuf::from(host),
    };
    let Some(segments) = url.path_segments() else {
        exn::bail!(unmappable());
    };
    let mut last = None;
    for segment in segments {
        if let Some(dir) = last.replace(segment)
            && !dir.is_empty()
        {
            path.push(dir);
        }
    }
    let mut name = match last {
        Some(segment) if !segment.is_empty() => segment.to_string(),
        _ => INDEX_FILE.to_string(),
    };
    if let Some(query) = url.query().filter(|query| !query.is_empty()) {
        name.push(QUERY_SEPARATOR);
        name.push_str(&query.replace('%', "%25").replace('/', "%2F").replace('\\', "%5C"));
    }
    path.push(name);
    validate(&path).map_err(|e| e.raise(unmappable()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_valid_paths() {
        assert_eq!(validate(Path::new("images/cdn.example/25.png")).unwrap(), Path::new("images/cdn.example/25.png"));
        assert_eq!(validate(Path::new("simple.png")).unwrap(), Path::new("simple.png"));
    }

    #[test]
    fn test_path_normalization() {
        assert_eq!(validate(Path::new("a//b//c")).unwrap(), Path::new("a/b/c"));
        assert_eq!(validate(Path::new("a/./b/./c")).unwrap(), Path::new("a/b/c"));
        assert_eq!(validate(Path::new("a/b/..")).unwrap(), Path::new("a"));
        assert_eq!(validate(Path::new("images///")).unwrap(), Path::new("images"));
    }

    #[rstest]
    #[case("../etc/passwd")]
    #[case("a/../../b")]
    #[case("..")]
    #[case("a\0b")]
    #[case("")]
    #[case(".")]
    #[case("//")]
    fn test_invalid_paths(#[case] path: &str) {
        assert!(validate(Path::new(path)).is_err());
    }

    #[rstest]
    #[case("https://cdn.example/sprites/25.png", "cdn.example/sprites/25.png")]
    #[case("https://cdn.example/sprites/1.2ab.png", "cdn.example/sprites/1.2ab.png")]
    #[case("http://cdn.example/sprites/25.png", "cdn.example/sprites/25.png")]
    #[case("https://cdn.example/sprites/25.png#frag", "cdn.example/sprites/25.png")]
    #[case("https://CDN.Example/a", "cdn.example/a")]
    #[case("http://127.0.0.1:9000/x.png", "127.0.0.1_9000/x.png")]
    #[case("https://app.example", "app.example/_index")]
    #[case("https://app.example/tracker/", "app.example/tracker/_index")]
    #[case("https://cdn.example/a/../b.png", "cdn.example/b.png")]
    #[case("https://cdn.example/a%2F..%2F..%2Fb.png", "cdn.example/a%2F..%2F..%2Fb.png")]
    #[case("https://cdn.example/render?id=1", "cdn.example/render{id=1")]
    #[case("https://cdn.example/render?", "cdn.example/render")]
    #[case("https://app.example/?next=/a/../b", "app.example/_index{next=%2Fa%2F..%2Fb")]
    #[case("https://app.example/x?a=%2F", "app.example/x{a=%252F")]
    fn test_from_url(#[case] url: &str, #[case] expected: &str) {
        let url = Url::parse(url).unwrap();
        assert_eq!(from_url(&url).unwrap(), Path::new(expected));
    }

    #[test]
    fn test_from_url_keeps_queries_apart() {
        let paths: Vec<_> = ["render?id=1", "render?id=2", "render", "render?id=1/2", "render?id=1%2F2"]
            .iter()
            .map(|rest| from_url(&Url::parse(&format!("https://cdn.example/{rest}")).unwrap()).unwrap())
            .collect();
        for (i, a) in paths.iter().enumerate() {
            for b in &paths[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[rstest]
    #[case("data:image/png;base64,AAAA")]
    #[case("mailto:someone@example.com")]
    fn test_from_url_unmappable(#[case] url: &str) {
        let url = Url::parse(url).unwrap();
        let err = from_url(&url).unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnmappableUrl(_)));
    }
}
