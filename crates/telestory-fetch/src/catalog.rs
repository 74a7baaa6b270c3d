//! Catalog client: one query against the story provider per request.

use std::io::Read;
use std::time::Duration;

use flate2::read::GzDecoder;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_ENCODING};
use reqwest::{Client, Url};
use serde::{Deserialize, Deserializer};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::deadline::bounded;
use crate::error::FetchError;

const STORIES_PATH: &str = "get_stories_by_username";

/// User-Agent sent on every outbound request.
pub const USER_AGENT: &str = concat!("telestory/", env!("CARGO_PKG_VERSION"));

/// One ephemeral media item listed by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogItem {
    /// Media path relative to [`Catalog::base_url`]. Empty when the provider
    /// omits it; such an item fails on its own at download time.
    #[serde(rename = "url", default, deserialize_with = "null_as_default")]
    pub path: String,
    /// Publication time, unix seconds.
    #[serde(rename = "date", default)]
    pub timestamp: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub caption: String,
}

/// The decoded provider response for one identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    pub items: Vec<CatalogItem>,
    pub base_url: String,
}

#[derive(Debug, Deserialize)]
struct StoriesResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    success: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    stories: Vec<CatalogItem>,
    #[serde(default, deserialize_with = "null_as_default")]
    base_url: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Connection settings for the provider.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Base endpoint, e.g. `https://api.example.com`.
    pub endpoint: String,
    pub api_key: String,
    /// Upper bound for the whole query, body included.
    pub timeout: Duration,
}

/// Strip one leading `@` (handle) or `+` (phone number) from user input.
pub fn normalize_identifier(raw: &str) -> &str {
    raw.strip_prefix('@')
        .or_else(|| raw.strip_prefix('+'))
        .unwrap_or(raw)
}

/// Queries the provider for the stories of one identifier.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    stories_url: Url,
    api_key: String,
    timeout: Duration,
    client: Client,
}

impl CatalogClient {
    /// Build a client with its own connection pool.
    pub fn new(config: CatalogConfig) -> Result<Self, FetchError> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Self::with_client(config, client)
    }

    /// Build a client on top of an existing [`reqwest::Client`].
    ///
    /// Returns [`FetchError::Config`] when the endpoint or key is missing.
    pub fn with_client(config: CatalogConfig, client: Client) -> Result<Self, FetchError> {
        let endpoint = config.endpoint.trim();
        if endpoint.is_empty() {
            return Err(FetchError::Config("catalog endpoint is not set".to_owned()));
        }
        if config.api_key.trim().is_empty() {
            return Err(FetchError::Config("catalog API key is not set".to_owned()));
        }

        let raw = format!("{}/{}", endpoint.trim_end_matches('/'), STORIES_PATH);
        let stories_url =
            Url::parse(&raw).map_err(|e| FetchError::InvalidUrl(format!("{raw}: {e}")))?;

        Ok(Self {
            stories_url,
            api_key: config.api_key,
            timeout: config.timeout,
            client,
        })
    }

    /// Fetch the catalog for `raw_input`.
    ///
    /// The call is bounded by the configured timeout and abandoned as soon as
    /// `cancel` fires. Nothing is retried.
    pub async fn fetch(
        &self,
        raw_input: &str,
        cancel: &CancellationToken,
    ) -> Result<Catalog, FetchError> {
        let username = normalize_identifier(raw_input);

        let mut url = self.stories_url.clone();
        url.query_pairs_mut()
            .append_pair("api_key", &self.api_key)
            .append_pair("username", username)
            .append_pair("archive", "true")
            .append_pair("mark", "true");

        debug!(username, "querying catalog");
        let (gzip, body) = bounded(cancel, self.timeout, self.get_body(url)).await??;
        let catalog = decode_catalog(&body, gzip)?;

        info!(
            username,
            items = catalog.items.len(),
            base_url = %catalog.base_url,
            "catalog fetched"
        );
        Ok(catalog)
    }

    async fn get_body(&self, url: Url) -> Result<(bool, Vec<u8>), FetchError> {
        let resp = self
            .client
            .get(url)
            .header(ACCEPT_ENCODING, "gzip")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            // Never echo the query string: it carries the API key.
            let mut shown = resp.url().clone();
            shown.set_query(None);
            return Err(FetchError::Status {
                status,
                url: shown.to_string(),
            });
        }

        let gzip = resp
            .headers()
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("gzip"));

        let body = resp.bytes().await?;
        Ok((gzip, body.to_vec()))
    }
}

/// Decode a provider body, inflating it first when it is gzip-encoded.
pub fn decode_catalog(body: &[u8], gzip: bool) -> Result<Catalog, FetchError> {
    let parsed: StoriesResponse = if gzip {
        let mut inflated = Vec::new();
        GzDecoder::new(body)
            .read_to_end(&mut inflated)
            .map_err(FetchError::Decompress)?;
        serde_json::from_slice(&inflated)?
    } else {
        serde_json::from_slice(body)?
    };

    debug!(ok = parsed.ok, success = parsed.success, "catalog response flags");
    Ok(Catalog {
        items: parsed.stories,
        base_url: parsed.base_url,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::GzEncoder;
    use serde_json::json;
    use tracing_test::traced_test;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::error::FailureKind;

    fn client_for(server: &MockServer) -> CatalogClient {
        CatalogClient::new(CatalogConfig {
            endpoint: server.uri(),
            api_key: "secret".to_owned(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn sample_body() -> serde_json::Value {
        json!({
            "ok": true,
            "success": true,
            "base_url": "https://cdn.example.com/media",
            "stories": [
                { "url": "a/1.jpg", "date": 1700000000, "caption": "first" },
                { "url": "a/2.mp4", "date": 1700000100, "caption": null }
            ]
        })
    }

    #[test]
    fn normalize_strips_one_leading_marker() {
        assert_eq!(normalize_identifier("@alice"), "alice");
        assert_eq!(normalize_identifier("+998901234567"), "998901234567");
        assert_eq!(normalize_identifier("alice"), "alice");
        assert_eq!(normalize_identifier("@@alice"), "@alice");
        assert_eq!(normalize_identifier("@+alice"), "+alice");
        assert_eq!(normalize_identifier("al@ice"), "al@ice");
    }

    #[test]
    fn missing_configuration_is_rejected() {
        let err = CatalogClient::new(CatalogConfig {
            endpoint: String::new(),
            api_key: "k".to_owned(),
            timeout: Duration::from_secs(1),
        })
        .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Config);

        let err = CatalogClient::new(CatalogConfig {
            endpoint: "https://api.example.com".to_owned(),
            api_key: "  ".to_owned(),
            timeout: Duration::from_secs(1),
        })
        .unwrap_err();
        assert!(matches!(err, FetchError::Config(_)));
    }

    #[tokio::test]
    #[traced_test]
    async fn fetch_sends_normalized_identifier_and_flags() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/get_stories_by_username"))
            .and(query_param("api_key", "secret"))
            .and(query_param("username", "alice"))
            .and(query_param("archive", "true"))
            .and(query_param("mark", "true"))
            .and(header("accept-encoding", "gzip"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sample_body()))
            .expect(1)
            .mount(&server)
            .await;

        let catalog = client_for(&server)
            .fetch("@alice", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(catalog.base_url, "https://cdn.example.com/media");
        assert_eq!(catalog.items.len(), 2);
        assert_eq!(catalog.items[0].path, "a/1.jpg");
        assert_eq!(catalog.items[0].timestamp, 1_700_000_000);
        assert_eq!(catalog.items[1].caption, "");
        assert!(logs_contain("catalog fetched"));
    }

    #[tokio::test]
    async fn fetch_inflates_gzip_body() {
        let server = MockServer::start().await;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(sample_body().to_string().as_bytes())
            .unwrap();
        let compressed = encoder.finish().unwrap();

        Mock::given(method("GET"))
            .and(path("/get_stories_by_username"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-encoding", "gzip")
                    .set_body_bytes(compressed),
            )
            .mount(&server)
            .await;

        let catalog = client_for(&server)
            .fetch("+15551234", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(catalog.items.len(), 2);
    }

    #[tokio::test]
    async fn null_stories_is_an_empty_catalog() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "ok": true, "stories": null, "base_url": "" })),
            )
            .mount(&server)
            .await;

        let catalog = client_for(&server)
            .fetch("bob", &CancellationToken::new())
            .await
            .unwrap();
        assert!(catalog.items.is_empty());
    }

    #[tokio::test]
    async fn malformed_payload_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .fetch("bob", &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Decode);
    }

    #[test]
    fn story_without_url_keeps_the_rest_of_the_catalog() {
        let body = json!({
            "ok": true,
            "base_url": "https://cdn.example.com/media",
            "stories": [
                { "date": 1700000000, "caption": "no media" },
                { "url": null, "date": 1700000050 },
                { "url": "a/2.mp4", "date": 1700000100 }
            ]
        });

        let catalog = decode_catalog(body.to_string().as_bytes(), false).unwrap();

        assert_eq!(catalog.items.len(), 3);
        assert_eq!(catalog.items[0].path, "");
        assert_eq!(catalog.items[0].caption, "no media");
        assert_eq!(catalog.items[1].path, "");
        assert_eq!(catalog.items[2].path, "a/2.mp4");
    }

    #[test]
    fn corrupt_gzip_is_a_decode_error() {
        let err = decode_catalog(b"definitely not gzip", true).unwrap_err();
        assert!(matches!(err, FetchError::Decompress(_)));
        assert_eq!(err.kind(), FailureKind::Decode);
    }

    #[tokio::test]
    async fn server_error_is_transport_and_hides_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .fetch("bob", &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Transport);
        assert!(!err.to_string().contains("secret"));
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(sample_body())
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let client = CatalogClient::new(CatalogConfig {
            endpoint: format!("{}/", server.uri()),
            api_key: "secret".to_owned(),
            timeout: Duration::from_millis(100),
        })
        .unwrap();

        let err = client
            .fetch("bob", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Timeout(_)));
    }
}
