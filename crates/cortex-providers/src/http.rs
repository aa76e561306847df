// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared HTTP plumbing: client construction and status-to-error mapping.

use std::time::Duration;

use cortex_core::CortexError;
use futures::stream::{self, Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

/// Longest error body excerpt carried in an error message.
const MAX_ERROR_BODY: usize = 300;

/// Build a client with the given default headers. Header values are marked
/// sensitive so they never show up in debug output.
pub(crate) fn build_client(
    provider: &str,
    headers: &[(&'static str, &str)],
    timeout: Duration,
) -> Result<reqwest::Client, CortexError> {
    let mut map = HeaderMap::new();
    map.insert(
        reqwest::header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    for (name, value) in headers {
        let mut value = HeaderValue::from_str(value).map_err(|_| CortexError::InvalidCredential {
            provider: provider.to_string(),
            message: format!("value for header `{name}` is not a valid header"),
        })?;
        value.set_sensitive(true);
        map.insert(HeaderName::from_static(name), value);
    }

    reqwest::Client::builder()
        .default_headers(map)
        .timeout(timeout)
        .build()
        .map_err(|e| CortexError::Provider {
            message: format!("failed to build HTTP client: {e}"),
            source: Some(Box::new(e)),
        })
}

/// Map a transport-level failure. Connection problems and timeouts are
/// transient; everything else is not.
pub(crate) fn transport_error(provider: &str, e: reqwest::Error) -> CortexError {
    if e.is_connect() || e.is_timeout() || e.is_request() {
        CortexError::ProviderUnavailable {
            provider: provider.to_string(),
            message: format!("request failed: {e}"),
            source: Some(Box::new(e)),
        }
    } else {
        CortexError::Provider {
            message: format!("{provider} request failed: {e}"),
            source: Some(Box::new(e)),
        }
    }
}

/// Pass successful responses through; turn everything else into the
/// matching error kind.
pub(crate) async fn check_status(provider: &str, response: Response) -> Result<Response, CortexError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail = error_detail(&body);
    debug!(provider, status = %status, detail = %detail, "provider returned error status");
    Err(status_error(provider, status, detail))
}

pub(crate) fn status_error(provider: &str, status: StatusCode, detail: String) -> CortexError {
    match status.as_u16() {
        401 | 403 => CortexError::InvalidCredential {
            provider: provider.to_string(),
            message: format!("{status}: {detail}"),
        },
        429 | 500..=599 => CortexError::unavailable(provider, format!("{status}: {detail}")),
        _ => CortexError::provider(format!("{provider} returned {status}: {detail}")),
    }
}

/// Pull a human-readable message out of the common error body shapes:
/// `{"error": {"message": ..}}`, `{"error": ".."}` or raw text.
fn error_detail(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let error = &value["error"];
        if let Some(message) = error["message"].as_str() {
            return message.to_string();
        }
        if let Some(message) = error.as_str() {
            return message.to_string();
        }
    }
    let mut detail: String = body.chars().take(MAX_ERROR_BODY).collect();
    if detail.is_empty() {
        detail.push_str("empty response body");
    }
    detail
}

/// Send a request and decode a JSON success body.
pub(crate) async fn send_json<T: DeserializeOwned>(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> Result<T, CortexError> {
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(provider, e))?;
    let response = check_status(provider, response).await?;
    let bytes = response
        .bytes()
        .await
        .map_err(|e| transport_error(provider, e))?;
    serde_json::from_slice(&bytes).map_err(|e| CortexError::Provider {
        message: format!("{provider} returned an unexpected response body: {e}"),
        source: Some(Box::new(e)),
    })
}

/// Split a streaming body into newline-delimited records (NDJSON).
pub(crate) fn ndjson_lines(
    provider: &'static str,
    response: Response,
) -> impl Stream<Item = Result<String, CortexError>> + Send {
    let bytes = response.bytes_stream().boxed();
    stream::unfold(
        (bytes, Vec::<u8>::new(), false),
        move |(mut bytes, mut buf, mut finished)| async move {
            loop {
                if let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buf.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line).trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    return Some((Ok(line), (bytes, buf, finished)));
                }
                if finished {
                    let rest = String::from_utf8_lossy(&buf).trim().to_string();
                    buf.clear();
                    if rest.is_empty() {
                        return None;
                    }
                    return Some((Ok(rest), (bytes, buf, finished)));
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => buf.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        buf.clear();
                        return Some((Err(transport_error(provider, e)), (bytes, buf, true)));
                    }
                    None => finished = true,
                }
            }
        },
    )
}
