//! Status and transport mapping shared by the REST adapters.

use std::time::Duration;

use domain::StoreError;
use reqwest::{Response, StatusCode};

/// Bounded timeout for every call to a storage or queue API.
pub(crate) const CALL_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) fn transport(service: &str, err: reqwest::Error) -> StoreError {
    StoreError::unavailable(format!("{service}: {}", err.without_url()))
}

/// Reads the error body of a failed response into a [`StoreError`].
pub(crate) async fn failure(service: &str, key: &str, response: Response) -> StoreError {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return StoreError::NotFound { key: key.to_string() };
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| status.to_string());
    StoreError::unavailable(format!("{service} returned HTTP {}: {message}", status.as_u16()))
}

pub(crate) fn decode_error(service: &str, err: reqwest::Error) -> StoreError {
    StoreError::Corrupt { message: format!("{service}: {}", err.without_url()) }
}
