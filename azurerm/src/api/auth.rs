//! Credentials for the management plane
//!
//! Every credential hands out bearer tokens through [`TokenCredential`].
//! Tokens are cached and refreshed five minutes before they expire.

use super::environment::Environment;
use super::error::ApiError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;

const REFRESH_MARGIN_MINUTES: i64 = 5;

#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: DateTime<Utc>,
}

impl AccessToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::minutes(REFRESH_MARGIN_MINUTES) < self.expires_on
    }
}

#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn token(&self) -> Result<AccessToken, ApiError>;

    /// Short name used in logs
    fn kind(&self) -> &'static str;
}

#[derive(Default)]
struct TokenCache {
    token: Mutex<Option<AccessToken>>,
}

impl TokenCache {
    async fn get_or_refresh<F, Fut>(&self, refresh: F) -> Result<AccessToken, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<AccessToken, ApiError>>,
    {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.is_fresh(Utc::now()) {
                return Ok(token.clone());
            }
        }
        let token = refresh().await?;
        *cached = Some(token.clone());
        Ok(token)
    }
}

/// OAuth2 client-credentials flow for a service principal
pub struct ClientSecretCredential {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    scope: String,
    cache: TokenCache,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: serde_json::Value,
}

impl ClientSecretCredential {
    pub fn new(
        environment: &Environment,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            token_url: format!(
                "{}/{}/oauth2/v2.0/token",
                environment.authority_host.trim_end_matches('/'),
                tenant_id
            ),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            scope: environment.token_scope(),
            cache: TokenCache::default(),
        })
    }

    async fn request_token(&self) -> Result<AccessToken, ApiError> {
        tracing::debug!("requesting token from {}", self.token_url);

        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", self.scope.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::AuthError(format!(
                "token request returned {}: {}",
                status.as_u16(),
                text
            )));
        }

        let parsed: TokenResponse = serde_json::from_str(&text)
            .map_err(|e| ApiError::ParseError(format!("token response: {}", e)))?;
        // Older endpoints send expires_in as a string.
        let expires_in = match &parsed.expires_in {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        }
        .ok_or_else(|| ApiError::ParseError("token response has no expires_in".to_string()))?;

        Ok(AccessToken {
            token: parsed.access_token,
            expires_on: Utc::now() + Duration::seconds(expires_in),
        })
    }
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    async fn token(&self) -> Result<AccessToken, ApiError> {
        self.cache.get_or_refresh(|| self.request_token()).await
    }

    fn kind(&self) -> &'static str {
        "client_secret"
    }
}

/// Borrows the signed-in Azure CLI session
pub struct AzureCliCredential {
    resource: String,
    tenant_id: Option<String>,
    cache: TokenCache,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CliToken {
    pub access_token: String,
    #[serde(default)]
    pub expires_on: Option<String>,
    /// Unix timestamp, present in newer CLI releases
    #[serde(default, rename = "expires_on")]
    pub expires_on_unix: Option<i64>,
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub tenant: Option<String>,
}

impl CliToken {
    pub fn expiry(&self) -> Result<DateTime<Utc>, ApiError> {
        if let Some(ts) = self.expires_on_unix {
            return Utc
                .timestamp_opt(ts, 0)
                .single()
                .ok_or_else(|| ApiError::ParseError(format!("invalid expires_on {}", ts)));
        }
        let raw = self
            .expires_on
            .as_deref()
            .ok_or_else(|| ApiError::ParseError("CLI token has no expiry".to_string()))?;
        let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
            .map_err(|e| ApiError::ParseError(format!("invalid expiresOn {:?}: {}", raw, e)))?;
        // expiresOn is in the local timezone of the machine running az.
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|t| t.with_timezone(&Utc))
            .ok_or_else(|| ApiError::ParseError(format!("ambiguous expiresOn {:?}", raw)))
    }
}

impl AzureCliCredential {
    pub fn new(environment: &Environment, tenant_id: Option<&str>) -> Self {
        Self {
            resource: environment.resource_manager.clone(),
            tenant_id: tenant_id.map(str::to_string),
            cache: TokenCache::default(),
        }
    }

    async fn request_token(&self) -> Result<AccessToken, ApiError> {
        let mut cmd = tokio::process::Command::new("az");
        cmd.args([
            "account",
            "get-access-token",
            "--output",
            "json",
            "--resource",
            &self.resource,
        ]);
        if let Some(tenant) = &self.tenant_id {
            cmd.args(["--tenant", tenant]);
        }

        tracing::debug!("obtaining token from the Azure CLI");
        let output = cmd
            .output()
            .await
            .map_err(|e| ApiError::AuthError(format!("running the Azure CLI: {}", e)))?;
        if !output.status.success() {
            return Err(ApiError::AuthError(format!(
                "the Azure CLI could not provide a token: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let parsed: CliToken = serde_json::from_slice(&output.stdout)
            .map_err(|e| ApiError::ParseError(format!("Azure CLI token: {}", e)))?;
        Ok(AccessToken {
            expires_on: parsed.expiry()?,
            token: parsed.access_token,
        })
    }
}

#[async_trait]
impl TokenCredential for AzureCliCredential {
    async fn token(&self) -> Result<AccessToken, ApiError> {
        self.cache.get_or_refresh(|| self.request_token()).await
    }

    fn kind(&self) -> &'static str {
        "azure_cli"
    }
}

/// A pre-issued token, mostly for tests
pub struct StaticTokenCredential {
    token: String,
}

impl StaticTokenCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenCredential for StaticTokenCredential {
    async fn token(&self) -> Result<AccessToken, ApiError> {
        Ok(AccessToken {
            token: self.token.clone(),
            expires_on: Utc::now() + Duration::hours(1),
        })
    }

    fn kind(&self) -> &'static str {
        "static"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn environment_for(server: &Server) -> Environment {
        Environment {
            authority_host: server.url(),
            ..Environment::public()
        }
    }

    #[tokio::test]
    async fn client_secret_exchanges_credentials_for_token() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/tenant-1/oauth2/v2.0/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "client_credentials".into()),
                Matcher::UrlEncoded("client_id".into(), "app".into()),
                Matcher::UrlEncoded("client_secret".into(), "s3cret".into()),
                Matcher::UrlEncoded(
                    "scope".into(),
                    "https://management.azure.com/.default".into(),
                ),
            ]))
            .with_body(r#"{"token_type":"Bearer","expires_in":3599,"access_token":"tok-1"}"#)
            .expect(1)
            .create_async()
            .await;

        let credential =
            ClientSecretCredential::new(&environment_for(&server), "tenant-1", "app", "s3cret")
                .unwrap();

        assert_eq!(credential.token().await.unwrap().token, "tok-1");
        // Served from cache the second time.
        assert_eq!(credential.token().await.unwrap().token, "tok-1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn client_secret_rejection_is_an_auth_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/tenant-1/oauth2/v2.0/token")
            .with_status(401)
            .with_body(r#"{"error":"invalid_client"}"#)
            .create_async()
            .await;

        let credential =
            ClientSecretCredential::new(&environment_for(&server), "tenant-1", "app", "bad")
                .unwrap();

        assert!(matches!(credential.token().await, Err(ApiError::AuthError(_))));
    }

    #[test]
    fn tokens_near_expiry_are_not_fresh() {
        let now = Utc::now();
        let token = AccessToken {
            token: "t".into(),
            expires_on: now + Duration::minutes(4),
        };
        assert!(!token.is_fresh(now));

        let token = AccessToken {
            token: "t".into(),
            expires_on: now + Duration::minutes(30),
        };
        assert!(token.is_fresh(now));
    }

    #[test]
    fn cli_token_prefers_unix_expiry() {
        let parsed: CliToken = serde_json::from_str(
            r#"{"accessToken":"abc","expiresOn":"2030-01-01 10:00:00.000000","expires_on":1893492000,"subscription":"sub","tenant":"ten"}"#,
        )
        .unwrap();
        assert_eq!(parsed.expiry().unwrap().timestamp(), 1893492000);
        assert_eq!(parsed.subscription.as_deref(), Some("sub"));
    }

    #[test]
    fn cli_token_parses_local_expiry() {
        let parsed: CliToken =
            serde_json::from_str(r#"{"accessToken":"abc","expiresOn":"2030-01-01 10:00:00.123456"}"#)
                .unwrap();
        assert!(parsed.expiry().unwrap() > Utc::now());
    }
}
