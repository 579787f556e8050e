//! Metrics Gateway
//!
//! Thin client for the Cookie DAO metrics API. Every call is a single GET with the
//! static `x-api-key` header; the gateway never retries, callers decide what to do
//! with a failure.

use reqwest::Client;
use serde_json::Value;
use tracing::{debug, error};

pub const DEFAULT_BASE_URL: &str = "https://api.cookie.fun";
pub const DEFAULT_INTERVAL: &str = "_7Days";
pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 10;

pub const AGENT_BY_TWITTER_PATH: &str = "/v2/agents/twitterUsername/:username";
pub const AGENT_BY_CONTRACT_PATH: &str = "/v2/agents/contractAddress/:address";
pub const AGENTS_PAGED_PATH: &str = "/v2/agents/agentsPaged";
pub const SEARCH_TWEETS_PATH: &str = "/v1/hackathon/search/:searchQuery";

const API_KEY_HEADER: &str = "x-api-key";

/// Failures surfaced by the gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Non-2xx status, or a body without `success: true`.
    #[error("Upstream error (status {status}): {body}")]
    Upstream { status: u16, body: String },
    /// The request never produced a response.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Client for the metrics provider.
#[derive(Clone, Debug)]
pub struct MetricsGateway {
    client: Client,
    base_url: String,
    api_key: String,
}

impl MetricsGateway {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// Builds the absolute URL for `path`.
    ///
    /// When `path_substitution` is present, the first `:name` segment of `path` is
    /// replaced by the URL-escaped substitution. Without one the path is used verbatim.
    pub fn build_url(&self, path: &str, path_substitution: Option<&str>) -> String {
        let path = match path_substitution {
            Some(value) => substitute_placeholder(path, value),
            None => path.to_string(),
        };
        format!("{}{}", self.base_url, path)
    }

    /// Performs a GET against the metrics API and returns the decoded JSON body.
    pub async fn fetch(
        &self,
        path: &str,
        params: &[(&str, String)],
        path_substitution: Option<&str>,
    ) -> Result<Value, GatewayError> {
        let url = self.build_url(path, path_substitution);
        debug!(%url, ?params, "Requesting metrics API");

        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .query(params)
            .send()
            .await
            .inspect_err(|e| error!(%url, error = %e, "Metrics API unreachable"))?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            error!(%url, status = status.as_u16(), %body, "Metrics API returned an error status");
            return Err(GatewayError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        match serde_json::from_str::<Value>(&body) {
            Ok(value) if value.get("success").and_then(Value::as_bool) == Some(true) => Ok(value),
            _ => {
                error!(%url, %body, "Metrics API response is missing its success marker");
                Err(GatewayError::Upstream {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }

    pub async fn agent_by_twitter(
        &self,
        username: &str,
        interval: &str,
    ) -> Result<Value, GatewayError> {
        self.fetch(
            AGENT_BY_TWITTER_PATH,
            &[("interval", interval.to_string())],
            Some(username),
        )
        .await
    }

    pub async fn agent_by_contract(
        &self,
        address: &str,
        interval: &str,
    ) -> Result<Value, GatewayError> {
        self.fetch(
            AGENT_BY_CONTRACT_PATH,
            &[("interval", interval.to_string())],
            Some(address),
        )
        .await
    }

    pub async fn agents_paged(
        &self,
        interval: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Value, GatewayError> {
        self.fetch(
            AGENTS_PAGED_PATH,
            &[
                ("interval", interval.to_string()),
                ("page", page.to_string()),
                ("pageSize", page_size.to_string()),
            ],
            None,
        )
        .await
    }

    /// Searches tweets mentioning `query` between the `from` and `to` dates.
    pub async fn search_tweets(
        &self,
        query: &str,
        from: &str,
        to: &str,
    ) -> Result<Value, GatewayError> {
        self.fetch(
            SEARCH_TWEETS_PATH,
            &[("from", from.to_string()), ("to", to.to_string())],
            Some(query),
        )
        .await
    }
}

/// Extracts the payload the Cookie API nests under `ok`, falling back to the whole body.
pub fn ok_payload(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.contains_key("ok") => map.remove("ok").unwrap_or(Value::Null),
        other => other,
    }
}

fn substitute_placeholder(path: &str, value: &str) -> String {
    let encoded = urlencoding::encode(value);
    let mut replaced = false;
    path.split('/')
        .map(|segment| {
            if !replaced && segment.starts_with(':') {
                replaced = true;
                encoded.as_ref()
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_build_url_escapes_search_query() {
        let gateway = MetricsGateway::new("https://api.cookie.fun/", "key");
        assert_eq!(
            gateway.build_url(SEARCH_TWEETS_PATH, Some("foo bar")),
            "https://api.cookie.fun/v1/hackathon/search/foo%20bar"
        );
    }

    #[test]
    fn test_build_url_without_substitution_keeps_path() {
        let gateway = MetricsGateway::new("https://api.cookie.fun", "key");
        assert_eq!(
            gateway.build_url(AGENTS_PAGED_PATH, None),
            "https://api.cookie.fun/v2/agents/agentsPaged"
        );
        assert_eq!(
            gateway.build_url("/v1/hackathon/search/:searchQuery", None),
            "https://api.cookie.fun/v1/hackathon/search/:searchQuery"
        );
    }

    #[test]
    fn test_only_first_placeholder_is_substituted() {
        assert_eq!(substitute_placeholder("/a/:x/:y", "v/w"), "/a/v%2Fw/:y");
    }

    #[test]
    fn test_ok_payload() {
        assert_eq!(
            ok_payload(json!({"ok": {"agentName": "X"}, "success": true})),
            json!({"agentName": "X"})
        );
        assert_eq!(ok_payload(json!([1, 2])), json!([1, 2]));
    }

    #[tokio::test]
    async fn test_search_tweets_substitutes_query_and_appends_params() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/hackathon/search/foo%20bar"))
            .and(query_param("from", "2025-01-01"))
            .and(query_param("to", "2025-01-20"))
            .and(header("x-api-key", "secret"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"ok": [], "success": true})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let gateway = MetricsGateway::new(server.uri(), "secret");
        let body = gateway
            .search_tweets("foo bar", "2025-01-01", "2025-01-20")
            .await
            .unwrap();
        assert_eq!(body["success"], json!(true));
    }

    #[tokio::test]
    async fn test_agents_paged_sends_pagination_params() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/agents/agentsPaged"))
            .and(query_param("interval", "_3Days"))
            .and(query_param("page", "2"))
            .and(query_param("pageSize", "25"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"ok": {"data": [], "currentPage": 2}, "success": true}),
            ))
            .mount(&server)
            .await;

        let gateway = MetricsGateway::new(server.uri(), "secret");
        let body = gateway.agents_paged("_3Days", 2, 25).await.unwrap();
        assert_eq!(ok_payload(body)["currentPage"], json!(2));
    }

    #[tokio::test]
    async fn test_non_success_status_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let gateway = MetricsGateway::new(server.uri(), "secret");
        let err = gateway
            .agent_by_twitter("nobody", DEFAULT_INTERVAL)
            .await
            .unwrap_err();
        match err {
            GatewayError::Upstream { status, body } => {
                assert_eq!(status, 404);
                assert_eq!(body, "not found");
            }
            other => panic!("Expected Upstream error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_success_marker_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"ok": null, "success": false, "error": "bad"})),
            )
            .mount(&server)
            .await;

        let gateway = MetricsGateway::new(server.uri(), "secret");
        let err = gateway
            .agent_by_contract("0xabc", DEFAULT_INTERVAL)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Upstream { status: 200, .. }));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let gateway = MetricsGateway::new("http://127.0.0.1:1", "secret");
        let err = gateway
            .agents_paged(DEFAULT_INTERVAL, DEFAULT_PAGE, DEFAULT_PAGE_SIZE)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Network(_)));
    }
}
