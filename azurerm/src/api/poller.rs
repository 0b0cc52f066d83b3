//! Long-running operation polling
//!
//! ARM acknowledges slow writes with 201/202 (or 200 and a non-terminal
//! `provisioningState`) and points at a status monitor through the
//! `Azure-AsyncOperation` or `Location` header.

use super::client::{Client, RawResponse};
use super::error::{ApiError, ArmErrorBody};
use reqwest::Method;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tfplug::Context;

const ASYNC_OPERATION_HEADER: &str = "azure-asyncoperation";
const LOCATION_HEADER: &str = "location";

#[derive(Debug, Deserialize)]
struct OperationStatus {
    #[serde(default)]
    status: String,
    #[serde(default)]
    error: Option<ArmErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ProvisioningEnvelope {
    #[serde(default)]
    properties: Option<ProvisioningProperties>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProvisioningProperties {
    #[serde(default)]
    provisioning_state: Option<String>,
}

fn is_terminal(state: &str) -> bool {
    matches!(
        state.to_ascii_lowercase().as_str(),
        "succeeded" | "failed" | "canceled" | "cancelled"
    )
}

fn provisioning_state(body: &str) -> Option<String> {
    serde_json::from_str::<ProvisioningEnvelope>(body)
        .ok()
        .and_then(|e| e.properties)
        .and_then(|p| p.provisioning_state)
}

fn check_terminal(status: &str, error: Option<ArmErrorBody>) -> Result<(), ApiError> {
    if status.eq_ignore_ascii_case("succeeded") {
        return Ok(());
    }
    let error = error.unwrap_or_default();
    Err(ApiError::OperationFailed {
        status: status.to_string(),
        code: error.code,
        message: error.message,
    })
}

/// Runs `fut` until it finishes or `ctx` is cancelled or times out,
/// whichever comes first.
pub async fn with_context<T, E, F>(ctx: &Context, fut: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<ApiError>,
{
    tokio::select! {
        result = fut => result,
        _ = ctx.cancelled() => Err(context_error(ctx).into()),
    }
}

fn context_error(ctx: &Context) -> ApiError {
    match ctx.remaining() {
        Some(left) if left.is_zero() => ApiError::Timeout,
        _ => ApiError::Cancelled,
    }
}

async fn pause(ctx: &Context, delay: Duration) -> Result<(), ApiError> {
    tokio::select! {
        _ = tokio::time::sleep(delay) => Ok(()),
        _ = ctx.cancelled() => Err(context_error(ctx)),
    }
}

/// Blocks until the operation started by `initial` completes
pub async fn wait_for_completion(ctx: &Context, client: &Client, initial: &RawResponse) -> Result<(), ApiError> {
    if let Some(url) = initial.header(ASYNC_OPERATION_HEADER) {
        return poll_async_operation(ctx, client, url, initial.retry_after()).await;
    }

    if initial.status == 202 {
        if let Some(url) = initial.header(LOCATION_HEADER) {
            return poll_location(ctx, client, url, initial.retry_after()).await;
        }
        return Ok(());
    }

    match provisioning_state(&initial.body) {
        Some(state) if !is_terminal(&state) => {
            poll_resource(ctx, client, &initial.url, initial.retry_after()).await
        }
        Some(state) => check_terminal(&state, None),
        None => Ok(()),
    }
}

async fn poll_async_operation(
    ctx: &Context,
    client: &Client,
    url: &str,
    mut delay: Option<Duration>,
) -> Result<(), ApiError> {
    loop {
        pause(ctx, delay.unwrap_or_else(|| client.poll_interval())).await?;

        let response = with_context(ctx, client.send(Method::GET, url, None, None::<&()>)).await?;
        let status: OperationStatus = response.json()?;
        tracing::debug!("operation {} is {}", url, status.status);

        if is_terminal(&status.status) {
            return check_terminal(&status.status, status.error);
        }
        delay = response.retry_after();
    }
}

async fn poll_location(
    ctx: &Context,
    client: &Client,
    url: &str,
    mut delay: Option<Duration>,
) -> Result<(), ApiError> {
    loop {
        pause(ctx, delay.unwrap_or_else(|| client.poll_interval())).await?;

        let response = with_context(ctx, client.send(Method::GET, url, None, None::<&()>)).await?;
        tracing::debug!("location {} answered {}", url, response.status);

        if response.status != 202 {
            return Ok(());
        }
        delay = response.retry_after();
    }
}

async fn poll_resource(
    ctx: &Context,
    client: &Client,
    url: &str,
    mut delay: Option<Duration>,
) -> Result<(), ApiError> {
    loop {
        pause(ctx, delay.unwrap_or_else(|| client.poll_interval())).await?;

        let response = with_context(ctx, client.send(Method::GET, url, None, None::<&()>)).await?;
        let state = provisioning_state(&response.body).unwrap_or_else(|| "Succeeded".to_string());
        tracing::debug!("resource {} provisioningState is {}", url, state);

        if is_terminal(&state) {
            return check_terminal(&state, None);
        }
        delay = response.retry_after();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::client::test_support::test_client;
    use mockito::{Matcher, Server};

    async fn put(client: &Client, ctx: &Context) -> Result<RawResponse, ApiError> {
        client
            .put_and_wait(ctx, "/subscriptions/s/thing", "2020-01-01", &serde_json::json!({}))
            .await
    }

    #[tokio::test]
    async fn follows_async_operation_until_success() {
        let mut server = Server::new_async().await;
        let op_url = format!("{}/operations/1", server.url());
        let _put = server
            .mock("PUT", "/subscriptions/s/thing")
            .match_query(Matcher::Any)
            .with_status(201)
            .with_header("azure-asyncoperation", &op_url)
            .with_header("retry-after", "0")
            .with_body("{}")
            .create_async()
            .await;
        let running = server
            .mock("GET", "/operations/1")
            .with_body(r#"{"status":"InProgress"}"#)
            .with_header("retry-after", "0")
            .expect(1)
            .create_async()
            .await;
        let done = server
            .mock("GET", "/operations/1")
            .with_body(r#"{"status":"Succeeded"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = test_client(&server.url());
        put(&client, &Context::new()).await.unwrap();

        running.assert_async().await;
        done.assert_async().await;
    }

    #[tokio::test]
    async fn failed_operation_surfaces_arm_error() {
        let mut server = Server::new_async().await;
        let op_url = format!("{}/operations/2", server.url());
        let _put = server
            .mock("PUT", "/subscriptions/s/thing")
            .match_query(Matcher::Any)
            .with_status(201)
            .with_header("azure-asyncoperation", &op_url)
            .with_body("{}")
            .create_async()
            .await;
        let _op = server
            .mock("GET", "/operations/2")
            .with_body(r#"{"status":"Failed","error":{"code":"InvalidCidr","message":"bad prefix"}}"#)
            .create_async()
            .await;

        let client = test_client(&server.url());
        match put(&client, &Context::new()).await {
            Err(ApiError::OperationFailed { status, code, .. }) => {
                assert_eq!(status, "Failed");
                assert_eq!(code, "InvalidCidr");
            }
            other => panic!("unexpected result: {:?}", other.map(|r| r.status)),
        }
    }

    #[tokio::test]
    async fn location_polling_stops_on_non_accepted() {
        let mut server = Server::new_async().await;
        let location = format!("{}/operationResults/3", server.url());
        let _delete = server
            .mock("DELETE", "/subscriptions/s/thing")
            .match_query(Matcher::Any)
            .with_status(202)
            .with_header("location", &location)
            .create_async()
            .await;
        let pending = server
            .mock("GET", "/operationResults/3")
            .with_status(202)
            .expect(1)
            .create_async()
            .await;
        let finished = server
            .mock("GET", "/operationResults/3")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let client = test_client(&server.url());
        client
            .delete_and_wait(&Context::new(), "/subscriptions/s/thing", "2020-01-01")
            .await
            .unwrap();

        pending.assert_async().await;
        finished.assert_async().await;
    }

    #[tokio::test]
    async fn polling_stops_at_context_deadline() {
        let mut server = Server::new_async().await;
        let op_url = format!("{}/operations/4", server.url());
        let _put = server
            .mock("PUT", "/subscriptions/s/thing")
            .match_query(Matcher::Any)
            .with_status(201)
            .with_header("azure-asyncoperation", &op_url)
            .with_body("{}")
            .create_async()
            .await;
        let _op = server
            .mock("GET", "/operations/4")
            .with_body(r#"{"status":"InProgress"}"#)
            .with_header("retry-after", "1")
            .create_async()
            .await;

        let client = test_client(&server.url());
        let ctx = Context::new().with_timeout(Duration::from_millis(200));
        assert!(matches!(put(&client, &ctx).await, Err(ApiError::Timeout)));
    }

    #[test]
    fn terminal_states_are_case_insensitive() {
        assert!(is_terminal("Succeeded"));
        assert!(is_terminal("canceled"));
        assert!(!is_terminal("Updating"));
    }
}
