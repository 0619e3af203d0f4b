//! Anthropic Messages API backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::backend::http::{self, build_client, merge_extra_parameters, resolve_setting};
use crate::backend::sse::{Frame, text_stream};
use crate::backend::{Backend, BackendConfig, TextStream};
use crate::error::BackendError;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
const API_VERSION: &str = "2023-06-01";

/// The Messages API rejects requests without an output cap.
pub const DEFAULT_MAX_TOKENS: u64 = 4096;

const RESERVED_KEYS: &[&str] = &["model", "messages", "stream", "max_tokens"];

pub struct AnthropicBackend {
    name: String,
    client: Client,
    url: String,
    api_key: String,
    model: String,
    max_tokens: u64,
    timeout: Duration,
    extra_parameters: Map<String, Value>,
}

impl std::fmt::Debug for AnthropicBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicBackend")
            .field("url", &self.url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

impl AnthropicBackend {
    /// Resolve the credential and output cap. Fails before any network traffic.
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let name = config.backend_id.clone();

        let api_key = resolve_setting(config.credential.as_deref(), API_KEY_ENV).ok_or_else(|| {
            BackendError::MissingCredential {
                backend: name.clone(),
                env_var: API_KEY_ENV.to_string(),
            }
        })?;

        let max_tokens = match config.extra_parameters.get("max_tokens") {
            None => DEFAULT_MAX_TOKENS,
            Some(value) => value.as_u64().filter(|n| *n > 0).ok_or_else(|| {
                BackendError::InvalidParameter {
                    backend: name.clone(),
                    key: "max_tokens".to_string(),
                    reason: format!("expected a positive integer, got {value}"),
                }
            })?,
        };

        let base_url = config
            .endpoint_override
            .as_deref()
            .filter(|u| !u.is_empty())
            .unwrap_or(DEFAULT_BASE_URL);

        Ok(Self {
            client: build_client(config.timeout)?,
            url: format!("{}/messages", base_url.trim_end_matches('/')),
            api_key,
            model: config.model_name.clone(),
            max_tokens,
            timeout: config.timeout,
            extra_parameters: config.extra_parameters.clone(),
            name,
        })
    }

    fn request_body(&self, prompt: &str, stream: bool) -> Value {
        let mut body = Map::new();
        body.insert("model".into(), json!(self.model));
        body.insert(
            "messages".into(),
            json!([{"role": "user", "content": prompt}]),
        );
        body.insert("max_tokens".into(), json!(self.max_tokens));
        body.insert("stream".into(), json!(stream));
        merge_extra_parameters(&mut body, &self.extra_parameters, RESERVED_KEYS);
        Value::Object(body)
    }

    async fn post(&self, prompt: &str, stream: bool) -> Result<reqwest::Response, BackendError> {
        debug!(backend = %self.name, model = %self.model, stream, "Sending messages request");
        let mut request = self
            .client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&self.request_body(prompt, stream));
        if !stream {
            request = request.timeout(self.timeout);
        }
        http::send(&self.name, request, self.timeout).await
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    ContentBlockDelta { delta: Delta },
    MessageStop,
    Error { error: StreamError },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Delta {
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    #[serde(default)]
    message: String,
}

/// `content_block_delta` text deltas are content; `message_stop` is terminal.
pub fn decode_message_frame(data: &str) -> Frame {
    match serde_json::from_str::<StreamEvent>(data) {
        Ok(StreamEvent::ContentBlockDelta {
            delta: Delta::TextDelta { text },
        }) => Frame::Content(text),
        Ok(StreamEvent::MessageStop) => Frame::Done,
        Ok(StreamEvent::Error { error }) => Frame::Failed(error.message),
        Ok(_) => Frame::Skip,
        Err(e) => {
            debug!("Skipping malformed stream frame: {}", e);
            Frame::Skip
        }
    }
}

#[async_trait]
impl Backend for AnthropicBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        let response = self.post(prompt, false).await?;
        let envelope: MessagesResponse = http::read_json(&self.name, response, self.timeout).await?;
        envelope
            .content
            .into_iter()
            .next()
            .and_then(|block| block.text)
            .ok_or_else(|| BackendError::InvalidResponse {
                backend: self.name.clone(),
                reason: "response has no content[0].text".to_string(),
            })
    }

    async fn stream(&self, prompt: &str) -> Result<TextStream, BackendError> {
        let response = self.post(prompt, true).await?;
        Ok(text_stream(
            &self.name,
            response.bytes_stream(),
            decode_message_frame,
            self.timeout,
        ))
    }
}
