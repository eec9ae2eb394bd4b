//! Generic typed request/response client.
//!
//! [`ApiClient`] issues JSON requests described by [`Endpoint`] values and
//! decodes typed responses. Every request carries the session access token;
//! an expired token is rejected locally before any bytes leave the device.
//! Transport and 5xx failures are retried per the attached
//! [`RetryConfig`](payrail::config::RetryConfig); decode failures never are.

use std::sync::Arc;
use std::time::Duration;

use http::Method;
use payrail::config::RetryConfig;
use payrail::session::{DecodedSessionToken, unix_now};
use reqwest::Client;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::ApiError;
use crate::retry::{backoff_delay, should_retry};

/// Header carrying the session access token.
pub const CLIENT_TOKEN_HEADER: &str = "X-Client-Token";

/// Description of one backend request.
#[derive(Debug, Clone)]
pub struct Endpoint {
    /// HTTP method.
    pub method: Method,
    /// Fully resolved URL.
    pub url: Url,
    /// JSON body, when present.
    pub body: Option<serde_json::Value>,
    /// Query parameters appended to the URL.
    pub query: Vec<(String, String)>,
    /// Per-request timeout override.
    pub timeout: Option<Duration>,
}

impl Endpoint {
    /// Creates a GET endpoint.
    #[must_use]
    pub const fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            body: None,
            query: Vec::new(),
            timeout: None,
        }
    }

    /// Creates a POST endpoint with a JSON body.
    #[must_use]
    pub const fn post(url: Url, body: serde_json::Value) -> Self {
        Self {
            method: Method::POST,
            url,
            body: Some(body),
            query: Vec::new(),
            timeout: None,
        }
    }

    /// Creates a DELETE endpoint.
    #[must_use]
    pub const fn delete(url: Url) -> Self {
        Self {
            method: Method::DELETE,
            url,
            body: None,
            query: Vec::new(),
            timeout: None,
        }
    }

    /// Adds a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Sets a per-request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Typed JSON client bound to one session token and retry policy.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    token: Arc<DecodedSessionToken>,
    retry: RetryConfig,
}

impl ApiClient {
    /// Creates a client for a session with the default retry policy.
    #[must_use]
    pub fn new(token: Arc<DecodedSessionToken>) -> Self {
        Self {
            http: Client::new(),
            token,
            retry: RetryConfig::default(),
        }
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// The session token this client authenticates with.
    #[must_use]
    pub fn token(&self) -> &Arc<DecodedSessionToken> {
        &self.token
    }

    /// The attached retry policy.
    #[must_use]
    pub const fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Issues a request and decodes the JSON response into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::SessionExpired`] without touching the network when
    /// the session token has expired, [`ApiError::Transport`]/
    /// [`ApiError::Status`] after exhausting retries, and
    /// [`ApiError::Decode`] when the body does not match `T`.
    pub async fn request<T: DeserializeOwned>(&self, endpoint: Endpoint) -> Result<T, ApiError> {
        let body = self.request_raw(&endpoint).await?;
        serde_json::from_slice(&body).map_err(|source| ApiError::Decode {
            context: "response body",
            source,
        })
    }

    /// Issues a request where only success matters (e.g., DELETE).
    ///
    /// # Errors
    ///
    /// Same classes as [`ApiClient::request`], minus decode.
    pub async fn request_unit(&self, endpoint: Endpoint) -> Result<(), ApiError> {
        self.request_raw(&endpoint).await.map(|_| ())
    }

    async fn request_raw(&self, endpoint: &Endpoint) -> Result<Vec<u8>, ApiError> {
        // Expired tokens must never authorize a call.
        if self.token.is_expired(unix_now()) {
            return Err(ApiError::SessionExpired {
                expired_at: self.token.exp.as_secs(),
            });
        }

        #[cfg(feature = "telemetry")]
        tracing::debug!(method = %endpoint.method, url = %endpoint.url, "api request");

        let mut attempt = 0u32;
        loop {
            match self.execute_once(endpoint).await {
                Ok(body) => return Ok(body),
                Err(error) => {
                    if !should_retry(&self.retry, &error, attempt) {
                        return Err(error);
                    }
                    let delay = backoff_delay(&self.retry, attempt);
                    #[cfg(feature = "telemetry")]
                    tracing::debug!(attempt, ?delay, %error, "retrying api request");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn execute_once(&self, endpoint: &Endpoint) -> Result<Vec<u8>, ApiError> {
        let mut builder = self
            .http
            .request(endpoint.method.clone(), endpoint.url.clone())
            .header(CLIENT_TOKEN_HEADER, &self.token.access_token)
            .query(&endpoint.query);
        if let Some(body) = &endpoint.body {
            builder = builder.json(body);
        }
        if let Some(timeout) = endpoint.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|source| ApiError::Transport {
            context: "send request",
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                context: "non-success response",
                status,
                body,
            });
        }

        let bytes = response.bytes().await.map_err(|source| ApiError::Transport {
            context: "read response body",
            source,
        })?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use payrail::session::{Expiry, SessionIntent};
    use serde::Deserialize;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Deserialize)]
    struct Pong {
        ok: bool,
    }

    fn session_token(exp: u64) -> Arc<DecodedSessionToken> {
        Arc::new(DecodedSessionToken {
            access_token: "access-1".into(),
            exp: Expiry::from_secs(exp),
            intent: SessionIntent::Checkout,
            configuration_url: None,
            core_url: None,
            pci_url: None,
            bindata_url: None,
            three_ds_init_url: None,
            status_url: None,
            redirect_url: None,
            qr_code: None,
            voucher_reference: None,
            voucher_expires_at: None,
            stripe_client_secret: None,
        })
    }

    fn url(server: &MockServer, p: &str) -> Url {
        format!("{}{p}", server.uri()).parse().unwrap()
    }

    #[tokio::test]
    async fn sends_client_token_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .and(header(CLIENT_TOKEN_HEADER, "access-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(session_token(u64::MAX)).with_retry(RetryConfig::disabled());
        let pong: Pong = client.request(Endpoint::get(url(&server, "/ping"))).await.unwrap();
        assert!(pong.ok);
    }

    #[tokio::test]
    async fn expired_token_never_reaches_the_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = ApiClient::new(session_token(1_000));
        let err = client
            .request::<Pong>(Endpoint::get(url(&server, "/ping")))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::SessionExpired { expired_at: 1_000 }));
    }

    #[tokio::test]
    async fn five_hundred_not_retried_by_default() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(session_token(u64::MAX));
        let err = client
            .request::<Pong>(Endpoint::get(url(&server, "/flaky")))
            .await
            .unwrap_err();
        assert!(err.is_server_error());
    }

    #[tokio::test]
    async fn five_hundred_retried_when_policy_allows() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let policy = RetryConfig {
            retry_500_errors: true,
            initial_backoff: Duration::from_millis(1),
            max_jitter: Duration::from_millis(1),
            ..RetryConfig::default()
        };
        let client = ApiClient::new(session_token(u64::MAX)).with_retry(policy);
        let pong: Pong = client.request(Endpoint::get(url(&server, "/flaky"))).await.unwrap();
        assert!(pong.ok);
    }

    #[tokio::test]
    async fn decode_failure_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bad"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(session_token(u64::MAX));
        let err = client
            .request::<Pong>(Endpoint::get(url(&server, "/bad")))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Decode { .. }));
    }
}
