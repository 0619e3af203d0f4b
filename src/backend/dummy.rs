//! Offline backend returning a fixed response.

use async_trait::async_trait;
use futures::stream;
use serde_json::Value;

use crate::backend::{Backend, BackendConfig, TextStream};
use crate::error::BackendError;

pub const DEFAULT_RESPONSE: &str = "test response";

#[derive(Debug, Clone)]
pub struct DummyBackend {
    name: String,
    response: String,
}

impl DummyBackend {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            name: "dummy".to_string(),
            response: response.into(),
        }
    }

    /// Uses the `response` extra parameter when present.
    pub fn from_config(config: &BackendConfig) -> Self {
        let response = config
            .extra_parameters
            .get("response")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_RESPONSE);
        Self {
            name: config.backend_id.clone(),
            response: response.to_string(),
        }
    }
}

#[async_trait]
impl Backend for DummyBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, _prompt: &str) -> Result<String, BackendError> {
        Ok(self.response.clone())
    }

    /// One fragment per word, each keeping its trailing space or newline.
    async fn stream(&self, _prompt: &str) -> Result<TextStream, BackendError> {
        let chunks: Vec<Result<String, BackendError>> = self
            .response
            .split_inclusive(char::is_whitespace)
            .map(|word| Ok(word.to_string()))
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }
}
