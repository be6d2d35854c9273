//! Shared JSON-over-HTTP plumbing for aggregator, token and status APIs

use crate::error::{EngineError, EngineResult};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Build a client with JSON headers plus any service-specific ones
pub fn build_client(
    service_id: &str,
    timeout: Duration,
    extra_headers: &[(&str, &str)],
) -> EngineResult<Client> {
    let mut headers = HeaderMap::new();
    headers.insert("Accept", HeaderValue::from_static("application/json"));
    headers.insert("User-Agent", HeaderValue::from_static("swap-executor/0.1"));

    for (key, value) in extra_headers {
        // Unset `${VAR}` keys substitute to empty strings
        if value.is_empty() {
            continue;
        }
        if let (Ok(name), Ok(value)) = (HeaderName::from_str(key), HeaderValue::from_str(value)) {
            headers.insert(name, value);
        }
    }

    Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(|e| http_error(service_id, e))
}

fn http_error(service_id: &str, e: impl std::fmt::Display) -> EngineError {
    EngineError::Http {
        source_id: service_id.to_string(),
        message: e.to_string(),
    }
}

/// Send a request and decode a JSON body.
///
/// Non-2xx responses are turned into errors carrying the response text so the
/// caller's classification can see aggregator revert messages.
pub async fn send_json<T: DeserializeOwned>(
    service_id: &str,
    request: RequestBuilder,
) -> EngineResult<T> {
    let response = request.send().await.map_err(|e| http_error(service_id, e))?;
    let status = response.status();
    let body = response.text().await.map_err(|e| http_error(service_id, e))?;

    if !status.is_success() {
        debug!("{} responded {}: {}", service_id, status, body);
        return Err(match status.as_u16() {
            400 | 404 | 422 => EngineError::from_message(format!("{}: {}", service_id, body)),
            _ => http_error(service_id, format!("status {}: {}", status, body)),
        });
    }

    serde_json::from_str(&body)
        .map_err(|e| http_error(service_id, format!("invalid response body: {}", e)))
}
