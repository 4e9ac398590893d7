//! HTTP Client Implementation using Reqwest

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy},
};
use bytes::{Bytes, BytesMut};
use reqwest::{redirect, Client, ClientBuilder};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Browser-like agent; some deployments of the listing API reject unknown agents.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";

/// Reqwest-based HTTP client implementation
///
/// Provides HTTP operations with:
/// - Connection pooling via reqwest
/// - Automatic retry with exponential backoff on connection errors and
///   the statuses listed in the [`RetryPolicy`]
/// - TLS support by default
/// - A second client that never follows redirects, used by
///   [`HttpClient::probe`] so the redirect page itself is inspected
pub struct ReqwestHttpClient {
    client: Client,
    probe_client: Client,
    policy: RetryPolicy,
}

impl ReqwestHttpClient {
    /// Create a new HTTP client with default configuration
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Create a new HTTP client with custom timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Self::build_client(Self::builder(timeout))?;
        let probe_client =
            Self::build_client(Self::builder(timeout).redirect(redirect::Policy::none()))?;

        Ok(Self::with_clients(client, probe_client))
    }

    /// Create a new HTTP client from preconfigured clients. `probe_client`
    /// should not follow redirects.
    pub fn with_clients(client: Client, probe_client: Client) -> Self {
        Self {
            client,
            probe_client,
            policy: RetryPolicy::default(),
        }
    }

    fn builder(timeout: Duration) -> ClientBuilder {
        Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .user_agent(DEFAULT_USER_AGENT)
    }

    fn build_client(builder: ClientBuilder) -> Result<Client> {
        builder.build().map_err(|e| {
            BridgeError::OperationFailed(format!("Failed to build HTTP client: {}", e))
        })
    }

    /// Replace the retry policy used by [`HttpClient::execute`]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Convert bridge HttpMethod to reqwest Method
    fn convert_method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
        }
    }

    /// Build reqwest request from bridge request
    fn build_request(client: &Client, request: &HttpRequest) -> reqwest::RequestBuilder {
        let method = Self::convert_method(request.method);
        let mut req = client.request(method, &request.url);

        for (key, value) in &request.headers {
            req = req.header(key, value);
        }

        if let Some(body) = &request.body {
            req = req.body(body.clone());
        }

        if let Some(timeout) = request.timeout {
            req = req.timeout(timeout);
        }

        req
    }

    fn collect_headers(response: &reqwest::Response) -> HashMap<String, String> {
        response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
            .collect()
    }

    /// Read at most `limit` bytes of the body, dropping the rest of the stream
    async fn read_limited(mut response: reqwest::Response, limit: usize) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        while buf.len() < limit {
            match response
                .chunk()
                .await
                .map_err(|e| BridgeError::OperationFailed(e.to_string()))?
            {
                Some(chunk) => buf.extend_from_slice(&chunk),
                None => break,
            }
        }
        buf.truncate(limit);
        Ok(buf.freeze())
    }

    /// Execute request with retry logic
    async fn execute_with_retry_internal(
        &self,
        client: &Client,
        request: HttpRequest,
        policy: RetryPolicy,
        body_limit: Option<usize>,
    ) -> Result<HttpResponse> {
        let mut attempt = 0;
        let mut last_error = None;

        while attempt < policy.max_attempts {
            debug!(
                attempt = attempt + 1,
                max_attempts = policy.max_attempts,
                url = %request.url,
                "Executing HTTP request"
            );

            match Self::build_request(client, &request).send().await {
                Ok(response) => {
                    let status = response.status().as_u16();

                    if policy.should_retry_status(status) {
                        warn!(
                            status = status,
                            attempt = attempt + 1,
                            "HTTP request failed with retryable status"
                        );
                        last_error = Some(BridgeError::OperationFailed(format!(
                            "HTTP {} error",
                            status
                        )));
                    } else {
                        let headers = Self::collect_headers(&response);
                        let body = match body_limit {
                            Some(limit) => Self::read_limited(response, limit).await?,
                            None => response
                                .bytes()
                                .await
                                .map_err(|e| BridgeError::OperationFailed(e.to_string()))?,
                        };

                        return Ok(HttpResponse {
                            status,
                            headers,
                            body,
                        });
                    }
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        attempt = attempt + 1,
                        "HTTP request failed"
                    );

                    last_error = Some(if e.is_timeout() {
                        BridgeError::OperationFailed("Request timed out".to_string())
                    } else if e.is_connect() {
                        BridgeError::OperationFailed(format!("Connection failed: {}", e))
                    } else {
                        BridgeError::OperationFailed(e.to_string())
                    });
                }
            }

            attempt += 1;

            if attempt < policy.max_attempts {
                let delay = policy.delay_for(attempt);
                debug!(delay_ms = delay.as_millis() as u64, "Retrying after delay");
                sleep(delay).await;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            BridgeError::OperationFailed("All retry attempts exhausted".to_string())
        }))
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.execute_with_retry_internal(&self.client, request, self.policy.clone(), None)
            .await
    }

    async fn execute_with_retry(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        self.execute_with_retry_internal(&self.client, request, policy, None)
            .await
    }

    async fn probe(&self, request: HttpRequest, max_body_bytes: usize) -> Result<HttpResponse> {
        self.execute_with_retry_internal(
            &self.probe_client,
            request,
            self.policy.clone(),
            Some(max_body_bytes),
        )
        .await
    }
}
