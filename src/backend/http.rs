//! HTTP plumbing shared by the remote backends.

use std::env;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::BackendError;

/// Client for one backend instance. Overall deadlines are applied per request.
pub fn build_client(timeout: Duration) -> Result<Client, BackendError> {
    Client::builder()
        .connect_timeout(timeout)
        .build()
        .map_err(BackendError::ClientBuild)
}

/// Explicit value first, then the environment variable. Empty strings count as unset.
pub fn resolve_setting(explicit: Option<&str>, env_var: &str) -> Option<String> {
    explicit
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| env::var(env_var).ok().filter(|v| !v.is_empty()))
}

/// Send a request and wait for response headers.
///
/// Non-2xx responses are turned into [`BackendError::RemoteRejected`].
pub async fn send(
    backend: &str,
    request: RequestBuilder,
    timeout: Duration,
) -> Result<Response, BackendError> {
    let response = match tokio::time::timeout(timeout, request.send()).await {
        Err(_) => return Err(timed_out(backend, timeout)),
        Ok(Err(e)) => return Err(transport(backend, timeout, e)),
        Ok(Ok(response)) => response,
    };

    if !response.status().is_success() {
        return Err(rejection(backend, response).await);
    }
    Ok(response)
}

/// Read the full body and decode it as JSON.
pub async fn read_json<T: DeserializeOwned>(
    backend: &str,
    response: Response,
    timeout: Duration,
) -> Result<T, BackendError> {
    let body = match tokio::time::timeout(timeout, response.text()).await {
        Err(_) => return Err(timed_out(backend, timeout)),
        Ok(Err(e)) => return Err(transport(backend, timeout, e)),
        Ok(Ok(body)) => body,
    };

    serde_json::from_str(&body).map_err(|e| BackendError::InvalidResponse {
        backend: backend.to_string(),
        reason: format!("{}: {}", e, preview(&body)),
    })
}

pub fn timed_out(backend: &str, timeout: Duration) -> BackendError {
    BackendError::Timeout {
        backend: backend.to_string(),
        secs: timeout.as_secs(),
    }
}

fn transport(backend: &str, timeout: Duration, source: reqwest::Error) -> BackendError {
    if source.is_timeout() {
        return timed_out(backend, timeout);
    }
    BackendError::Transport {
        backend: backend.to_string(),
        source,
    }
}

async fn rejection(backend: &str, response: Response) -> BackendError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body).unwrap_or_else(|| {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            status.canonical_reason().unwrap_or("unknown error").to_string()
        } else {
            trimmed.to_string()
        }
    });

    BackendError::RemoteRejected {
        backend: backend.to_string(),
        status: status.as_u16(),
        message,
    }
}

/// Pull a human-readable message out of a JSON error body.
///
/// Accepts `{"error": {"message": ..}}`, `{"error": ".."}` and `{"message": ..}`.
pub fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let message = match value.get("error") {
        Some(Value::Object(err)) => err.get("message").and_then(Value::as_str),
        Some(Value::String(s)) => Some(s.as_str()),
        _ => value.get("message").and_then(Value::as_str),
    };
    message.map(str::to_string)
}

/// Merge `extras` into `body`, skipping `reserved` keys.
pub fn merge_extra_parameters(
    body: &mut Map<String, Value>,
    extras: &Map<String, Value>,
    reserved: &[&str],
) {
    for (key, value) in extras {
        if reserved.contains(&key.as_str()) {
            tracing::debug!(key = %key, "Ignoring reserved request parameter");
            continue;
        }
        body.insert(key.clone(), value.clone());
    }
}

fn preview(body: &str) -> String {
    let truncated: String = body.chars().take(200).collect();
    if truncated.len() < body.len() {
        format!("{truncated}...")
    } else {
        truncated
    }
}
