//! HTTP retry helpers for transient errors.
//!
//! Every dataset request goes through [`send_json`] instead of calling
//! `reqwest::RequestBuilder::send()` directly, so connection failures,
//! timeouts, rate limiting and server errors are retried with exponential
//! backoff.
//!
//! ```ignore
//! let body = retry::send_json(|| client.get(&url)).await?;
//! ```

use std::time::Duration;

use reqwest::StatusCode;

use crate::FetchError;

/// Maximum retry attempts for transient HTTP errors.
///
/// With backoff (1s, 2s, 4s) the total wait before giving up is 7 seconds.
pub const MAX_RETRIES: u32 = 3;

/// Delay before the first retry; doubled for each further attempt.
const BASE_DELAY: Duration = Duration::from_secs(1);

/// Maximum length of the response body preview included in error logs.
const BODY_PREVIEW_LEN: usize = 300;

/// Sends an HTTP request and parses the response body as JSON.
///
/// The `build_request` closure is called on each attempt to construct a
/// fresh [`reqwest::RequestBuilder`], since builders are consumed by
/// `.send()`.
///
/// Retries up to [`MAX_RETRIES`] times on connection errors, timeouts,
/// HTTP 429 and HTTP 5xx. Other 4xx responses are permanent. A body that
/// is not valid JSON is not retried.
///
/// # Errors
///
/// Returns [`FetchError::Http`] if the request cannot be sent,
/// [`FetchError::Status`] for a non-success status, and
/// [`FetchError::Json`] if the body is not JSON.
#[allow(clippy::future_not_send)]
pub async fn send_json<F>(build_request: F) -> Result<serde_json::Value, FetchError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let response = send_inner(&build_request, MAX_RETRIES, BASE_DELAY).await?;
    decode_json(response).await
}

/// Reads `response` as JSON, logging a preview of the body on failure.
async fn decode_json(response: reqwest::Response) -> Result<serde_json::Value, FetchError> {
    let url = response.url().to_string();
    let status = response.status();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| {
        let preview: String = text.chars().take(BODY_PREVIEW_LEN).collect();
        log::error!(
            "JSON parse failed\n  \
             url: {url}\n  \
             status: {status}\n  \
             content-type: {content_type:?}\n  \
             received: {} bytes\n  \
             parse error: {e}\n  \
             body preview: {preview}",
            text.len(),
        );
        FetchError::Json(e)
    })
}

/// Sends the request built by `build_request`, retrying transient
/// failures, and returns the first 2xx/3xx response.
#[allow(clippy::future_not_send)]
async fn send_inner<F>(
    build_request: &F,
    max_retries: u32,
    base_delay: Duration,
) -> Result<reqwest::Response, FetchError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 0;
    loop {
        if attempt > 0 {
            let delay = scaled_backoff(attempt, base_delay);
            log::warn!("  retry {attempt}/{max_retries} in {delay:?}...");
            tokio::time::sleep(delay).await;
        }
        let last = attempt >= max_retries;
        attempt += 1;

        match build_request().send().await {
            Err(e) => {
                if is_transient(&e) && !last {
                    log::warn!("  transient error: {e}");
                    continue;
                }
                return Err(FetchError::Http(e));
            }
            Ok(response) => {
                let status = response.status();
                if status.is_success() || status.is_redirection() {
                    return Ok(response);
                }
                let url = response.url().to_string();
                if is_retryable_status(status) && !last {
                    log::warn!("  HTTP {status} from {url}");
                    continue;
                }
                return Err(FetchError::Status {
                    url,
                    status: status.as_u16(),
                });
            }
        }
    }
}

/// Delay before retry number `attempt` (1-based): 1s, 2s, 4s, ...
#[must_use]
pub fn backoff(attempt: u32) -> Duration {
    scaled_backoff(attempt, BASE_DELAY)
}

fn scaled_backoff(attempt: u32, base: Duration) -> Duration {
    base * (1u32 << attempt.saturating_sub(1).min(6))
}

/// Returns `true` for statuses worth retrying: 429 and 5xx.
#[must_use]
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_request()
}
