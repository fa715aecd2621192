//! Shared HTTP plumbing: client construction and deadline-aware sends

use super::constants;
use crate::error::ApiError;
use log::debug;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Build the HTTP client used for identity and resource manager calls.
///
/// Redirects are never followed automatically; the template downloader
/// follows them itself so it can bound the hop count.
pub fn build_client(user_agent: &str) -> Result<reqwest::Client, ApiError> {
    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .timeout(Duration::from_secs(60))
        .connect_timeout(Duration::from_secs(10))
        .redirect(reqwest::redirect::Policy::none())
        .user_agent(user_agent)
        .build()?;
    Ok(client)
}

/// Default client with this crate's user agent
pub fn default_client() -> Result<reqwest::Client, ApiError> {
    build_client(&constants::user_agent())
}

/// Send a request, abandoning it as soon as `cancel` fires
pub async fn send(
    cancel: &CancellationToken,
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response, ApiError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!("Request abandoned: deadline expired");
            Err(ApiError::Cancelled)
        }
        response = request.send() => Ok(response?),
    }
}

/// Read a body to text, honouring cancellation
pub async fn text(cancel: &CancellationToken, response: reqwest::Response) -> Result<String, ApiError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ApiError::Cancelled),
        body = response.text() => Ok(body?),
    }
}

/// Read a JSON body, honouring cancellation
pub async fn json<T: serde::de::DeserializeOwned>(
    cancel: &CancellationToken,
    response: reqwest::Response,
) -> Result<T, ApiError> {
    let body = text(cancel, response).await?;
    Ok(serde_json::from_str(&body)?)
}

/// Turn a non-success response into [`ApiError::Status`]
pub async fn error_for_status(
    cancel: &CancellationToken,
    response: reqwest::Response,
) -> Result<reqwest::Response, ApiError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let url = response.url().to_string();
    let body = text(cancel, response).await.unwrap_or_default();
    Err(ApiError::Status { status, url, body })
}

/// Parse a `Retry-After` header expressed in seconds
pub fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(constants::headers::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
