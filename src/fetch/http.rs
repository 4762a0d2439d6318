//! HTTP fetcher implementation
//!
//! One GET per id, bounded by the configured timeout. The response is
//! classified as follows:
//!
//! | Condition | Outcome |
//! |-----------|---------|
//! | HTTP 429 | RateLimited |
//! | HTTP 404 | NotFound |
//! | Other non-2xx | Transient |
//! | Timeout / connection / body read error | Transient |
//! | 2xx, body not JSON or id missing/mismatched | Fatal |
//! | 2xx, body JSON with matching id | Success |

use crate::config::ApiConfig;
use crate::fetch::{FetchOutcome, FetchedRecord, RecordFetcher};
use crate::{ConfigError, IngestError};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Builds an HTTP client with the configured request timeout
///
/// # Example
///
/// ```no_run
/// use catalog_ingest::config::ApiConfig;
/// use catalog_ingest::fetch::build_http_client;
///
/// # fn example(config: &ApiConfig) -> Result<(), reqwest::Error> {
/// let client = build_http_client(config)?;
/// # Ok(())
/// # }
/// ```
pub fn build_http_client(config: &ApiConfig) -> Result<Client, reqwest::Error> {
    let timeout = config.request_timeout();

    Client::builder()
        .user_agent(format!("catalog-ingest/{}", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches records from the remote API over HTTP
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    record_base: Url,
    config: ApiConfig,
}

impl HttpFetcher {
    /// Creates a fetcher for the configured API
    ///
    /// # Returns
    ///
    /// * `Ok(HttpFetcher)` - Client built and base URL parsed
    /// * `Err(IngestError)` - Invalid base URL or client construction failure
    pub fn new(config: &ApiConfig) -> Result<Self, IngestError> {
        let client = build_http_client(config)?;
        let record_base = Url::parse(&format!(
            "{}/movie/",
            config.base_url.trim_end_matches('/')
        ))
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

        Ok(Self {
            client,
            record_base,
            config: config.clone(),
        })
    }

    /// Builds the request URL for one id, including the API key
    pub fn record_url(&self, id: u64) -> Result<Url, url::ParseError> {
        let mut url = self.record_base.join(&id.to_string())?;
        {
            let mut query = url.query_pairs_mut();
            let optional = [
                ("language", &self.config.language),
                ("append_to_response", &self.config.append_to_response),
                ("include_video_language", &self.config.include_video_language),
                ("include_image_language", &self.config.include_image_language),
            ];
            for (key, value) in optional {
                if !value.is_empty() {
                    query.append_pair(key, value);
                }
            }
            query.append_pair("api_key", &self.config.api_key);
        }
        Ok(url)
    }
}

impl RecordFetcher for HttpFetcher {
    async fn fetch(&self, id: u64) -> FetchOutcome {
        let url = match self.record_url(id) {
            Ok(url) => url,
            Err(e) => return FetchOutcome::Fatal(format!("cannot build request URL: {}", e)),
        };

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => return FetchOutcome::Transient(describe_error(e)),
        };

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return FetchOutcome::RateLimited;
        }
        if status == StatusCode::NOT_FOUND {
            return FetchOutcome::NotFound;
        }
        if !status.is_success() {
            return FetchOutcome::Transient(format!("HTTP {}", status.as_u16()));
        }

        match response.bytes().await {
            Ok(body) => decode_record(id, &body),
            Err(e) => FetchOutcome::Transient(describe_error(e)),
        }
    }
}

/// Decodes a 2xx response body into a record for `id`
pub fn decode_record(id: u64, body: &[u8]) -> FetchOutcome {
    let document: Value = match serde_json::from_slice(body) {
        Ok(document) => document,
        Err(e) => return FetchOutcome::Fatal(format!("malformed payload: {}", e)),
    };

    match document.get("id").and_then(Value::as_u64) {
        Some(found) if found == id => FetchOutcome::Success(FetchedRecord { id, document }),
        Some(found) => FetchOutcome::Fatal(format!(
            "payload id {} does not match requested id {}",
            found, id
        )),
        None => FetchOutcome::Fatal("payload has no numeric id".to_string()),
    }
}

// The request URL carries the API key, so it is stripped before the error
// reaches a log line.
fn describe_error(e: reqwest::Error) -> String {
    if e.is_timeout() {
        "request timeout".to_string()
    } else if e.is_connect() {
        format!("connection failed: {}", e.without_url())
    } else {
        e.without_url().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_config(base_url: &str) -> ApiConfig {
        ApiConfig {
            api_key: "test-key".to_string(),
            base_url: base_url.to_string(),
            request_timeout_secs: 2,
            language: "en".to_string(),
            append_to_response: "credits".to_string(),
            include_video_language: String::new(),
            include_image_language: String::new(),
        }
    }

    async fn fetch_with(server: &MockServer, id: u64) -> FetchOutcome {
        let fetcher = HttpFetcher::new(&create_test_config(&server.uri())).unwrap();
        fetcher.fetch(id).await
    }

    #[test]
    fn test_record_url() {
        let fetcher = HttpFetcher::new(&create_test_config("https://api.example.com/3/")).unwrap();
        let url = fetcher.record_url(603).unwrap();

        assert_eq!(url.path(), "/3/movie/603");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("api_key".to_string(), "test-key".to_string())));
        assert!(pairs.contains(&("append_to_response".to_string(), "credits".to_string())));
        // Empty settings are not sent
        assert!(!pairs.iter().any(|(k, _)| k == "include_video_language"));
    }

    #[test]
    fn test_decode_matching_id() {
        let body = json!({"id": 7, "title": "Seven", "credits": {"cast": []}}).to_string();
        match decode_record(7, body.as_bytes()) {
            FetchOutcome::Success(record) => {
                assert_eq!(record.id, 7);
                assert_eq!(record.document["title"], "Seven");
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_mismatched_id_is_fatal() {
        let body = json!({"id": 8}).to_string();
        assert!(matches!(
            decode_record(7, body.as_bytes()),
            FetchOutcome::Fatal(_)
        ));
    }

    #[test]
    fn test_decode_garbage_is_fatal() {
        assert!(matches!(
            decode_record(7, b"<html>oops</html>"),
            FetchOutcome::Fatal(_)
        ));
        assert!(matches!(
            decode_record(7, br#"{"title": "no id"}"#),
            FetchOutcome::Fatal(_)
        ));
    }

    #[tokio::test]
    async fn test_fetch_success_sends_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/movie/42"))
            .and(query_param("api_key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 42})))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = fetch_with(&server, 42).await;
        assert_eq!(outcome.label(), "success");
    }

    #[tokio::test]
    async fn test_fetch_classifies_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/movie/1"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/movie/2"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/movie/3"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/movie/4"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        assert_eq!(fetch_with(&server, 1).await, FetchOutcome::RateLimited);
        assert_eq!(fetch_with(&server, 2).await, FetchOutcome::NotFound);
        assert_eq!(
            fetch_with(&server, 3).await,
            FetchOutcome::Transient("HTTP 503".to_string())
        );
        assert!(matches!(fetch_with(&server, 4).await, FetchOutcome::Fatal(_)));
    }

    #[tokio::test]
    async fn test_fetch_timeout_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/movie/5"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"id": 5}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let mut config = create_test_config(&server.uri());
        config.request_timeout_secs = 1;
        let fetcher = HttpFetcher::new(&config).unwrap();

        match fetcher.fetch(5).await {
            FetchOutcome::Transient(cause) => assert!(!cause.contains("test-key")),
            other => panic!("expected transient, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        // Nothing listens on port 9 locally
        let fetcher = HttpFetcher::new(&create_test_config("http://127.0.0.1:9")).unwrap();
        assert!(matches!(fetcher.fetch(1).await, FetchOutcome::Transient(_)));
    }
}
