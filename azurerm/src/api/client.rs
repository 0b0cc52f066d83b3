use reqwest::header::{HeaderMap, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tfplug::Context;

use super::auth::TokenCredential;
use super::error::ApiError;
use super::poller;

/// Azure Resource Manager client
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http_client: reqwest::Client,
    base_url: String,
    credential: Arc<dyn TokenCredential>,
    retry_config: RetryConfig,
}

#[derive(Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub timeout_seconds: u64,
    /// Delay between long-running operation polls when ARM sends no Retry-After
    pub poll_interval_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 10000,
            timeout_seconds: 30,
            poll_interval_ms: 10000,
        }
    }
}

/// A successful ARM response, kept raw so callers can inspect polling headers
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
    pub url: String,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn retry_after(&self) -> Option<Duration> {
        retry_after(&self.headers)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_str(&self.body).map_err(|e| {
            tracing::error!("Failed to deserialize response: {}, body: {}", e, self.body);
            ApiError::ParseError(format!("Failed to parse response: {}", e))
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Page<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(default)]
    next_link: Option<String>,
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

impl Client {
    /// Create a new API client with default configuration
    pub fn new(endpoint: &str, credential: Arc<dyn TokenCredential>) -> Result<Self, ApiError> {
        Self::with_config(endpoint, credential, RetryConfig::default())
    }

    /// Create a new API client with custom retry configuration
    pub fn with_config(
        endpoint: &str,
        credential: Arc<dyn TokenCredential>,
        retry_config: RetryConfig,
    ) -> Result<Self, ApiError> {
        let base_url = url::Url::parse(endpoint).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", endpoint, e)))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ApiError::InvalidUrl(format!("{}: scheme must be http or https", endpoint)));
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(retry_config.timeout_seconds))
            .user_agent(concat!("terraform-provider-azurerm/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                http_client,
                base_url: base_url.as_str().trim_end_matches('/').to_string(),
                credential,
                retry_config,
            }),
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.inner.retry_config.poll_interval_ms)
    }

    /// GET a resource and deserialize it
    pub async fn get<T: DeserializeOwned>(&self, path: &str, api_version: &str) -> Result<T, ApiError> {
        self.send(Method::GET, path, Some(api_version), None::<&()>)
            .await?
            .json()
    }

    /// GET every page of a collection, following `nextLink`
    pub async fn list<T: DeserializeOwned>(&self, path: &str, api_version: &str) -> Result<Vec<T>, ApiError> {
        let mut items = Vec::new();
        let mut page: Page<T> = self
            .send(Method::GET, path, Some(api_version), None::<&()>)
            .await?
            .json()?;
        loop {
            items.append(&mut page.value);
            match page.next_link.take() {
                Some(next) if !next.is_empty() => {
                    tracing::debug!("following nextLink {}", next);
                    // nextLink already carries the api-version.
                    page = self.send(Method::GET, &next, None, None::<&()>).await?.json()?;
                }
                _ => return Ok(items),
            }
        }
    }

    /// PUT a resource and wait for ARM to finish provisioning it
    pub async fn put_and_wait<B: Serialize>(
        &self,
        ctx: &Context,
        path: &str,
        api_version: &str,
        body: &B,
    ) -> Result<RawResponse, ApiError> {
        let response = self.send(Method::PUT, path, Some(api_version), Some(body)).await?;
        poller::wait_for_completion(ctx, self, &response).await?;
        Ok(response)
    }

    /// PATCH a resource and wait for completion
    pub async fn patch_and_wait<B: Serialize>(
        &self,
        ctx: &Context,
        path: &str,
        api_version: &str,
        body: &B,
    ) -> Result<RawResponse, ApiError> {
        let response = self.send(Method::PATCH, path, Some(api_version), Some(body)).await?;
        poller::wait_for_completion(ctx, self, &response).await?;
        Ok(response)
    }

    /// DELETE a resource and wait for completion
    pub async fn delete_and_wait(&self, ctx: &Context, path: &str, api_version: &str) -> Result<(), ApiError> {
        let response = self.send(Method::DELETE, path, Some(api_version), None::<&()>).await?;
        poller::wait_for_completion(ctx, self, &response).await
    }

    /// POST an action such as `listKeys`
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        api_version: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(Method::POST, path, Some(api_version), Some(body))
            .await?
            .json()
    }

    /// Issue a request with bearer auth and SDK-style retries. `path` is
    /// either relative to the endpoint or an absolute URL from ARM.
    pub async fn send<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        api_version: Option<&str>,
        body: Option<&B>,
    ) -> Result<RawResponse, ApiError> {
        let url = if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.inner.base_url, path)
        };

        self.execute_with_retry(
            || async {
                let token = self.inner.credential.token().await?;

                tracing::debug!("{} request to: {}", method, url);

                let mut request = self
                    .inner
                    .http_client
                    .request(method.clone(), &url)
                    .header(AUTHORIZATION, format!("Bearer {}", token.token));
                if let Some(version) = api_version {
                    request = request.query(&[("api-version", version)]);
                }
                if let Some(body) = body {
                    request = request.json(body);
                }
                Ok(request.send().await?)
            },
            &url,
        )
        .await
    }

    /// Execute request with retry logic
    async fn execute_with_retry<F, Fut>(&self, request_fn: F, url: &str) -> Result<RawResponse, ApiError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<reqwest::Response, ApiError>>,
    {
        let mut attempt = 0;
        let mut last_error = None;
        let mut server_delay: Option<Duration> = None;

        while attempt <= self.inner.retry_config.max_retries {
            if attempt > 0 {
                let backoff = server_delay.take().unwrap_or_else(|| {
                    Duration::from_millis(std::cmp::min(
                        self.inner.retry_config.initial_backoff_ms * (2_u64.pow(attempt - 1)),
                        self.inner.retry_config.max_backoff_ms,
                    ))
                });
                tracing::debug!(
                    "Retrying request to {} after {:?} (attempt {})",
                    url,
                    backoff,
                    attempt
                );
                tokio::time::sleep(backoff).await;
            }

            match request_fn().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Self::into_raw(response).await;
                    }

                    if status == StatusCode::UNAUTHORIZED {
                        let text = response.text().await.unwrap_or_default();
                        return Err(ApiError::AuthError(text));
                    }

                    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                        server_delay = retry_after(response.headers());
                        last_error = Some(if status == StatusCode::TOO_MANY_REQUESTS {
                            ApiError::RateLimited
                        } else {
                            ApiError::ServiceUnavailable
                        });
                    } else {
                        let status = status.as_u16();
                        let text = response
                            .text()
                            .await
                            .unwrap_or_else(|_| "Unknown error".to_string());
                        return Err(ApiError::from_response(status, &text));
                    }
                }
                Err(ApiError::RequestError(e)) if e.is_timeout() || e.is_connect() => {
                    tracing::debug!("transient failure calling {}: {}", url, e);
                    last_error = Some(if e.is_timeout() {
                        ApiError::Timeout
                    } else {
                        ApiError::RequestError(e)
                    });
                }
                Err(e) => return Err(e),
            }

            attempt += 1;
        }

        Err(last_error.unwrap_or(ApiError::ServiceUnavailable))
    }

    async fn into_raw(response: reqwest::Response) -> Result<RawResponse, ApiError> {
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let url = response.url().to_string();
        let body = response.text().await?;
        tracing::debug!("API response ({}) body: {}", status, body);
        Ok(RawResponse {
            status,
            headers,
            body,
            url,
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::api::auth::StaticTokenCredential;

    pub fn test_client(url: &str) -> Client {
        Client::with_config(
            url,
            Arc::new(StaticTokenCredential::new("test-token")),
            RetryConfig {
                max_retries: 2,
                initial_backoff_ms: 1,
                max_backoff_ms: 5,
                timeout_seconds: 5,
                poll_interval_ms: 1,
            },
        )
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::test_client;
    use super::*;
    use mockito::{Matcher, Server};

    #[derive(Deserialize)]
    struct Named {
        name: String,
    }

    #[test]
    fn rejects_endpoints_that_are_not_http() {
        let credential = Arc::new(crate::api::auth::StaticTokenCredential::new("t"));
        assert!(matches!(
            Client::new("management.azure.com", credential.clone()),
            Err(ApiError::InvalidUrl(_))
        ));
        assert!(matches!(
            Client::new("ftp://management.azure.com", credential),
            Err(ApiError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn get_sends_bearer_token_and_api_version() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/subscriptions/s/resourceGroups/rg")
            .match_query(Matcher::UrlEncoded("api-version".into(), "2020-06-01".into()))
            .match_header("authorization", "Bearer test-token")
            .with_body(r#"{"name":"rg"}"#)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let rg: Named = client
            .get("/subscriptions/s/resourceGroups/rg", "2020-06-01")
            .await
            .unwrap();

        assert_eq!(rg.name, "rg");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn not_found_is_parsed_from_error_body() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/subscriptions/s/resourceGroups/missing")
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body(r#"{"error":{"code":"ResourceGroupNotFound","message":"gone"}}"#)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let err = client
            .get::<Named>("/subscriptions/s/resourceGroups/missing", "2020-06-01")
            .await
            .err()
            .unwrap();

        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn throttled_requests_are_retried() {
        let mut server = Server::new_async().await;
        let throttled = server
            .mock("GET", "/subscriptions/s/resourceGroups/rg")
            .match_query(Matcher::Any)
            .with_status(429)
            .with_header("retry-after", "0")
            .expect(1)
            .create_async()
            .await;
        let ok = server
            .mock("GET", "/subscriptions/s/resourceGroups/rg")
            .match_query(Matcher::Any)
            .with_body(r#"{"name":"rg"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let rg: Named = client
            .get("/subscriptions/s/resourceGroups/rg", "2020-06-01")
            .await
            .unwrap();

        assert_eq!(rg.name, "rg");
        throttled.assert_async().await;
        ok.assert_async().await;
    }

    #[tokio::test]
    async fn server_errors_give_up_after_max_retries() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/subscriptions/s/resourceGroups/rg")
            .match_query(Matcher::Any)
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let result = client
            .get::<Named>("/subscriptions/s/resourceGroups/rg", "2020-06-01")
            .await;

        assert!(matches!(result, Err(ApiError::ServiceUnavailable)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unauthorized_is_not_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/subscriptions/s/resourceGroups/rg")
            .match_query(Matcher::Any)
            .with_status(401)
            .expect(1)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let result = client
            .get::<Named>("/subscriptions/s/resourceGroups/rg", "2020-06-01")
            .await;

        assert!(matches!(result, Err(ApiError::AuthError(_))));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn list_follows_next_link() {
        let mut server = Server::new_async().await;
        let next = format!("{}/subscriptions/s/resourcegroups?page=2", server.url());
        let _first = server
            .mock("GET", "/subscriptions/s/resourcegroups")
            .match_query(Matcher::UrlEncoded("api-version".into(), "2020-06-01".into()))
            .with_body(format!(
                r#"{{"value":[{{"name":"a"}}],"nextLink":"{}"}}"#,
                next
            ))
            .create_async()
            .await;
        let _second = server
            .mock("GET", "/subscriptions/s/resourcegroups")
            .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
            .with_body(r#"{"value":[{"name":"b"}]}"#)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let groups: Vec<Named> = client
            .list("/subscriptions/s/resourcegroups", "2020-06-01")
            .await
            .unwrap();

        let names: Vec<_> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
