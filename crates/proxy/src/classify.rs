//! Resource classification.

use dexsprite_remote::{Method, RemoteRequest, header};
use std::fmt;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "avif", "svg", "ico"];
const STATIC_EXTENSIONS: &[&str] = &["js", "mjs", "css", "woff", "woff2", "ttf", "otf", "wasm", "map", "json"];

/// How a request is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceClass {
    /// Cache first, then network (populating the cache).
    Image,
    /// Network first, falling back to the cached page or shell.
    Navigation,
    /// The discovery API. Network (or local handler), inspected afterwards.
    VariantApi,
    /// Scripts, styles, fonts: network first with cache fallback.
    Static,
    /// Passed through untouched.
    Other,
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Image => "image",
            Self::Navigation => "navigation",
            Self::VariantApi => "variant-api",
            Self::Static => "static",
            Self::Other => "other",
        })
    }
}

fn header_is(request: &RemoteRequest, name: header::HeaderName, value: &str) -> bool {
    request.headers.get(name).and_then(|v| v.to_str().ok()).is_some_and(|v| v.eq_ignore_ascii_case(value))
}

fn accepts(request: &RemoteRequest, prefix: &str) -> bool {
    request
        .headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.split(',').any(|part| part.trim().starts_with(prefix)))
}

fn extension(request: &RemoteRequest) -> Option<String> {
    let last = request.url.path_segments()?.next_back()?;
    let (_, ext) = last.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}

/// Classify `request`. Only `GET`s are ever served from cache; the discovery
/// API is recognised by its path (`api_path`).
pub fn classify(request: &RemoteRequest, api_path: &str) -> ResourceClass {
    if request.method != Method::GET {
        return ResourceClass::Other;
    }
    if request.url.path() == api_path {
        return ResourceClass::VariantApi;
    }
    if header_is(request, header::HeaderName::from_static("sec-fetch-mode"), "navigate") {
        return ResourceClass::Navigation;
    }
    let ext = extension(request);
    let dest_image = header_is(request, header::HeaderName::from_static("sec-fetch-dest"), "image");
    if dest_image || ext.as_deref().is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext)) {
        return ResourceClass::Image;
    }
    if ext.as_deref().is_some_and(|ext| STATIC_EXTENSIONS.contains(&ext)) {
        return ResourceClass::Static;
    }
    if ext.is_none() && accepts(request, "text/html") {
        return ResourceClass::Navigation;
    }
    ResourceClass::Other
}

#[cfg(test)]
mod tests {
    use super::*;
    use dexsprite_remote::Url;
    use dexsprite_remote::header::{HeaderMap, HeaderValue};
    use rstest::rstest;

    fn request(method: Method, url: &str, headers: &[(&'static str, &'static str)]) -> RemoteRequest {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.insert(*name, HeaderValue::from_static(value));
        }
        RemoteRequest::new(method, Url::parse(url).unwrap()).with_headers(map)
    }

    #[rstest]
    #[case::sprite(Method::GET, "https://cdn.example/sprites/25a.png", &[], ResourceClass::Image)]
    #[case::upper_ext(Method::GET, "https://cdn.example/x/ICON.PNG", &[], ResourceClass::Image)]
    #[case::image_dest(Method::GET, "https://cdn.example/render?id=1", &[("sec-fetch-dest", "image")], ResourceClass::Image)]
    #[case::api(Method::GET, "https://app.example/variants?id=1.2", &[], ResourceClass::VariantApi)]
    #[case::api_other_path(Method::GET, "https://app.example/variants/extra?id=1", &[], ResourceClass::Other)]
    #[case::navigate(Method::GET, "https://app.example/team/3", &[("sec-fetch-mode", "navigate")], ResourceClass::Navigation)]
    #[case::html_accept(Method::GET, "https://app.example/", &[("accept", "text/html,application/xhtml+xml")], ResourceClass::Navigation)]
    #[case::script(Method::GET, "https://app.example/assets/app.js", &[], ResourceClass::Static)]
    #[case::font(Method::GET, "https://app.example/assets/font.woff2", &[], ResourceClass::Static)]
    #[case::post(Method::POST, "https://cdn.example/sprites/25.png", &[], ResourceClass::Other)]
    #[case::plain(Method::GET, "https://app.example/health", &[], ResourceClass::Other)]
    fn test_classify(
        #[case] method: Method,
        #[case] url: &str,
        #[case] headers: &[(&'static str, &'static str)],
        #[case] expected: ResourceClass,
    ) {
        assert_eq!(classify(&request(method, url, headers), "/variants"), expected);
    }
}
