//! OpenAI-compatible chat-completions backends (OpenAI, DeepSeek, local servers).

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

/// Request keys the backend controls.
const RESERVED_KEYS: &[&str] = &["model", "messages", "stream"];

/// Where an OpenAI-compatible service lives and how it authenticates.
#[derive(Debug, Clone, Copy)]
pub struct Preset {
    pub default_base_url: Option<&'static str>,
    pub base_url_env: Option<&'static str>,
    pub api_key_env: &'static str,
    /// Used when no key is configured; `None` makes the key mandatory.
    pub api_key_fallback: Option<&'static str>,
}

pub const OPENAI: Preset = Preset {
    default_base_url: Some("https://api.openai.com/v1"),
    base_url_env: None,
    api_key_env: "OPENAI_API_KEY",
    api_key_fallback: None,
};

pub const DEEPSEEK: Preset = Preset {
    default_base_url: Some("https://api.deepseek.com/v1"),
    base_url_env: None,
    api_key_env: "DEEPSEEK_API_KEY",
    api_key_fallback: None,
};

/// Ollama and other local servers exposing `/v1/chat/completions`.
pub const LOCAL: Preset = Preset {
    default_base_url: None,
    base_url_env: Some("OLLAMA_BASE_URL"),
    api_key_env: "LOCAL_API_KEY",
    api_key_fallback: Some("ollama"),
};

pub struct OpenAiCompatibleBackend {
    name: String,
    client: Client,
    url: String,
    api_key: String,
    model: String,
    timeout: Duration,
    extra_parameters: Map<String, Value>,
}

impl std::fmt::Debug for OpenAiCompatibleBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleBackend")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl OpenAiCompatibleBackend {
    /// Resolve endpoint and credential. Fails before any network traffic.
    pub fn new(config: &BackendConfig, preset: &Preset) -> Result<Self, BackendError> {
        let name = config.backend_id.clone();

        let base_url = config
            .endpoint_override
            .clone()
            .filter(|u| !u.is_empty())
            .or_else(|| preset.base_url_env.and_then(|var| resolve_setting(None, var)))
            .or_else(|| preset.default_base_url.map(str::to_string))
            .ok_or_else(|| BackendError::MissingEndpoint {
                backend: name.clone(),
                env_var: preset.base_url_env.unwrap_or("base_url").to_string(),
            })?;

        let api_key = resolve_setting(config.credential.as_deref(), preset.api_key_env)
            .or_else(|| preset.api_key_fallback.map(str::to_string))
            .ok_or_else(|| BackendError::MissingCredential {
                backend: name.clone(),
                env_var: preset.api_key_env.to_string(),
            })?;

        Ok(Self {
            client: build_client(config.timeout)?,
            url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            model: config.model_name.clone(),
            timeout: config.timeout,
            extra_parameters: config.extra_parameters.clone(),
            name,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn request_body(&self, prompt: &str, stream: bool) -> Value {
        let mut body = Map::new();
        body.insert("model".into(), json!(self.model));
        body.insert(
            "messages".into(),
            json!([{"role": "user", "content": prompt}]),
        );
        body.insert("stream".into(), json!(stream));
        merge_extra_parameters(&mut body, &self.extra_parameters, RESERVED_KEYS);
        Value::Object(body)
    }

    async fn post(&self, prompt: &str, stream: bool) -> Result<reqwest::Response, BackendError> {
        debug!(
            backend = %self.name,
            model = %self.model,
            stream,
            "Sending chat completion request"
        );
        let mut request = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(prompt, stream));
        if !stream {
            request = request.timeout(self.timeout);
        }
        http::send(&self.name, request, self.timeout).await
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// `data: [DONE]` ends the stream; otherwise emit `choices[0].delta.content`.
///
/// A top-level `error` object fails the stream.
pub fn decode_chat_frame(data: &str) -> Frame {
    let data = data.trim();
    if data == "[DONE]" {
        return Frame::Done;
    }
    match serde_json::from_str::<ChatChunk>(data) {
        Ok(ChatChunk {
            error: Some(error), ..
        }) => Frame::Failed(stream_error_message(&error)),
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .map_or(Frame::Skip, Frame::Content),
        Err(e) => {
            debug!("Skipping malformed stream frame: {}", e);
            Frame::Skip
        }
    }
}

fn stream_error_message(error: &Value) -> String {
    error
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| error.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string())
}

#[async_trait]
impl Backend for OpenAiCompatibleBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        let response = self.post(prompt, false).await?;
        let envelope: ChatResponse = http::read_json(&self.name, response, self.timeout).await?;
        envelope
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| BackendError::InvalidResponse {
                backend: self.name.clone(),
                reason: "response has no choices[0].message.content".to_string(),
            })
    }

    async fn stream(&self, prompt: &str) -> Result<TextStream, BackendError> {
        let response = self.post(prompt, true).await?;
        Ok(text_stream(
            &self.name,
            response.bytes_stream(),
            decode_chat_frame,
            self.timeout,
        ))
    }
}
