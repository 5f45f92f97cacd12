//! Discovery API: `GET <api path>?id=<canonical key>`.

use dexsprite_discovery::VariantDiscoverer;
use dexsprite_remote::header::{self, HeaderValue};
use dexsprite_remote::{RemoteResponse, StatusCode, Url};
use dexsprite_variant::{Subject, VariantList};
use serde::{Deserialize, Serialize};
use time::UtcDateTime;
use tracing::{debug, warn};

/// Successful response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantsResponse {
    pub variants: VariantList,
    pub cache_key: String,
    /// When the variants were discovered, in Unix milliseconds.
    pub timestamp: i64,
}
impl VariantsResponse {
    pub fn new(cache_key: impl Into<String>, variants: VariantList, discovered_at: UtcDateTime) -> Self {
        let timestamp = (discovered_at.unix_timestamp_nanos() / 1_000_000) as i64;
        Self { variants, cache_key: cache_key.into(), timestamp }
    }

    pub fn subject(&self) -> Option<Subject> {
        self.cache_key.parse().ok()
    }
}

/// Error response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
}

/// The `id` query parameter, parsed.
pub fn parse_id(url: &Url) -> Result<Subject, String> {
    let id = url
        .query_pairs()
        .find_map(|(name, value)| (name == "id").then(|| value.into_owned()))
        .ok_or_else(|| "missing id parameter".to_string())?;
    id.parse::<Subject>().map_err(|_| format!("malformed id: {id:?}"))
}

fn json(status: StatusCode, body: &impl Serialize) -> RemoteResponse {
    match serde_json::to_vec(body) {
        Ok(bytes) => RemoteResponse::new(status, bytes)
            .with_header(header::CONTENT_TYPE, HeaderValue::from_static("application/json")),
        Err(e) => {
            warn!(error = ?e, "Failed to serialise API response");
            RemoteResponse::new(StatusCode::INTERNAL_SERVER_ERROR, Vec::new())
        },
    }
}

/// Serves the discovery API locally from a [`VariantDiscoverer`].
#[derive(Clone)]
pub struct VariantsApi {
    discoverer: VariantDiscoverer,
}

impl VariantsApi {
    pub fn new(discoverer: VariantDiscoverer) -> Self {
        Self { discoverer }
    }

    /// Answer one API request. Malformed ids are a `400` with an
    /// [`ApiError`] body; nothing here fails at the transport level.
    pub async fn handle(&self, url: &Url) -> RemoteResponse {
        let subject = match parse_id(url) {
            Ok(subject) => subject,
            Err(error) => {
                debug!(%url, error, "Rejected discovery API request");
                return json(StatusCode::BAD_REQUEST, &ApiError { error });
            },
        };
        match self.discoverer.discover_entry(&subject, self.discoverer.max_depth()).await {
            Ok(entry) => json(StatusCode::OK, &VariantsResponse::new(entry.key, entry.variants, entry.discovered_at)),
            Err(e) => {
                warn!(key = %subject, error = ?e, "Discovery failed");
                json(StatusCode::INTERNAL_SERVER_ERROR, &ApiError { error: e.to_string() })
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dexsprite_cache::{Database, Repository, TieredCache, TieredCacheOptions};
    use dexsprite_discovery::DiscoveryOptions;
    use dexsprite_remote::{MockRemote, Probe};
    use dexsprite_variant::UrlBuilder;
    use rstest::rstest;
    use std::sync::Arc;

    const BASE: &str = "https://cdn.example/sprites/";

    async fn api(names: &[&str]) -> VariantsApi {
        let remote = Arc::new(MockRemote::with_resources(names.iter().map(|n| (format!("{BASE}{n}.png"), b"x".to_vec()))));
        let db = Database::connect_in_memory().await.unwrap();
        let cache = TieredCache::new(Repository::from(&db), TieredCacheOptions::default());
        let urls = UrlBuilder::new(BASE, "png").unwrap();
        VariantsApi::new(VariantDiscoverer::new(cache, Probe::new(remote), urls, DiscoveryOptions::default()))
    }

    fn url(query: &str) -> Url {
        Url::parse(&format!("https://app.example/variants{query}")).unwrap()
    }

    #[tokio::test]
    async fn test_success_body() {
        let api = api(&["25", "25a"]).await;
        let response = api.handle(&url("?id=25")).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.content_type(), Some("application/json"));
        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["variants"], serde_json::json!(["", "a"]));
        assert_eq!(body["cacheKey"], "25");
        assert!(body["timestamp"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_fusion_key() {
        let api = api(&["1.2"]).await;
        let response = api.handle(&url("?id=1.2")).await;
        let body: VariantsResponse = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body.cache_key, "1.2");
        assert_eq!(body.subject(), Some(Subject::fusion(1, 2)));
        assert_eq!(body.variants.as_slice(), [""]);
    }

    #[rstest]
    #[case::missing("")]
    #[case::empty("?id=")]
    #[case::letters("?id=pikachu")]
    #[case::three_parts("?id=1.2.3")]
    #[case::negative("?id=-1")]
    #[tokio::test]
    async fn test_malformed_id_is_400(#[case] query: &str) {
        let api = api(&[]).await;
        let response = api.handle(&url(query)).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        let body: ApiError = serde_json::from_slice(&response.body).unwrap();
        assert!(!body.error.is_empty());
    }

    #[test]
    fn test_timestamp_is_millis() {
        let at = UtcDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let response = VariantsResponse::new("4", VariantList::new(), at);
        assert_eq!(response.timestamp, 1_700_000_000_000);
    }
}
