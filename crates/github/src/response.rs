//! Classification of GitHub HTTP responses into [`ApiError`]s.
//!
//! GitHub signals rate limiting in three ways: HTTP 429, HTTP 403 with an
//! exhausted `X-RateLimit-Remaining`, and HTTP 403 whose message mentions the
//! rate limit (secondary limits). All three become [`ApiError::RateLimited`];
//! every other non-success status becomes [`ApiError::Status`].

use std::time::Duration;

use domain::ApiError;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Response, StatusCode};
use tracing::warn;

const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";

/// Remaining-quota level below which a warning is logged.
pub const LOW_QUOTA_WARNING: u64 = 10;

/// Longest error message carried into [`ApiError::Status`].
const MAX_MESSAGE_LEN: usize = 200;

/// Maps a transport-level failure.
pub fn transport_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Transport { message: err.to_string() }
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

/// Decides whether a failed response is a rate limit.
pub fn classify(status: StatusCode, headers: &HeaderMap, body: &str) -> ApiError {
    let remaining = header_u64(headers, RATE_LIMIT_REMAINING);
    let retry_after = header_u64(headers, RETRY_AFTER.as_str()).map(Duration::from_secs);

    let rate_limited = status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN
            && (remaining == Some(0) || body.to_ascii_lowercase().contains("rate limit")));

    if rate_limited {
        return ApiError::RateLimited { status: status.as_u16(), retry_after };
    }

    ApiError::Status { status: status.as_u16(), message: summarize(body) }
}

/// Extracts GitHub's `message` field when present, otherwise a truncated body.
fn summarize(body: &str) -> String {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.to_string());
    message.chars().take(MAX_MESSAGE_LEN).collect()
}

/// Passes successful responses through and turns failures into [`ApiError`].
///
/// Successful responses with a nearly exhausted quota are logged.
pub async fn check(operation: &str, response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        if let Some(remaining) = header_u64(response.headers(), RATE_LIMIT_REMAINING) {
            if remaining < LOW_QUOTA_WARNING {
                warn!(operation, remaining, "GitHub rate-limit quota nearly exhausted");
            }
        }
        return Ok(response);
    }

    let headers = response.headers().clone();
    let body = response.text().await.unwrap_or_default();
    Err(classify(status, &headers, &body))
}
