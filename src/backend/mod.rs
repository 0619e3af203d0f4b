//! Model backends behind one calling contract.
//!
//! Every backend answers a prompt either with a complete string or with a lazy
//! stream of text fragments. Backend-specific wire formats stay inside the
//! backend modules.

pub mod anthropic;
pub mod dummy;
pub mod http;
pub mod openai;
pub mod sse;

use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use serde_json::{Map, Value};

use crate::error::{BackendError, ConfigurationError};
use crate::registry::Registry;

pub use anthropic::AnthropicBackend;
pub use dummy::DummyBackend;
pub use openai::{OpenAiCompatibleBackend, Preset};

/// Lazy, single-pass sequence of text fragments.
///
/// Dropping it closes the underlying connection.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, BackendError>> + Send>>;

/// Table of backend factories keyed by backend id.
pub type BackendRegistry = Registry<BackendConfig, Box<dyn Backend>, BackendError>;

/// Settings a backend is constructed from.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub backend_id: String,
    pub model_name: String,
    pub credential: Option<String>,
    pub endpoint_override: Option<String>,
    pub timeout: Duration,
    /// Merged into the request body; reserved keys are never overridden.
    pub extra_parameters: Map<String, Value>,
}

impl BackendConfig {
    pub fn new(backend_id: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            backend_id: backend_id.into(),
            model_name: model_name.into(),
            credential: None,
            endpoint_override: None,
            timeout: Duration::from_secs(20),
            extra_parameters: Map::new(),
        }
    }
}

/// Output of a generation call.
pub enum Generation {
    Complete(String),
    Stream(TextStream),
}

impl fmt::Debug for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Generation::Complete(text) => f.debug_tuple("Complete").field(text).finish(),
            Generation::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// A language model that can answer a prompt.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Registry id of this backend, used in logs and errors.
    fn name(&self) -> &str;

    /// One request, one complete answer.
    async fn complete(&self, prompt: &str) -> Result<String, BackendError>;

    /// Open a streaming request and return its text fragments as they arrive.
    async fn stream(&self, prompt: &str) -> Result<TextStream, BackendError>;

    /// Streaming is chosen per call, not per backend.
    async fn generate(&self, prompt: &str, stream: bool) -> Result<Generation, BackendError> {
        if stream {
            Ok(Generation::Stream(self.stream(prompt).await?))
        } else {
            Ok(Generation::Complete(self.complete(prompt).await?))
        }
    }
}

/// Registry with every built-in backend.
pub fn backend_registry() -> Result<BackendRegistry, ConfigurationError> {
    let mut registry = BackendRegistry::new("backend");
    registry.register("openai", |cfg: &BackendConfig| {
        Ok(Box::new(OpenAiCompatibleBackend::new(cfg, &openai::OPENAI)?) as Box<dyn Backend>)
    })?;
    registry.register("deepseek", |cfg: &BackendConfig| {
        Ok(Box::new(OpenAiCompatibleBackend::new(cfg, &openai::DEEPSEEK)?) as Box<dyn Backend>)
    })?;
    registry.register("local", |cfg: &BackendConfig| {
        Ok(Box::new(OpenAiCompatibleBackend::new(cfg, &openai::LOCAL)?) as Box<dyn Backend>)
    })?;
    registry.register("claude", |cfg: &BackendConfig| {
        Ok(Box::new(AnthropicBackend::new(cfg)?) as Box<dyn Backend>)
    })?;
    registry.register("dummy", |cfg: &BackendConfig| {
        Ok(Box::new(DummyBackend::from_config(cfg)) as Box<dyn Backend>)
    })?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_builtin_backends_registered() {
        let registry = backend_registry().unwrap();
        let names: Vec<_> = registry.list_names().into_iter().collect();
        assert_eq!(names, vec!["claude", "deepseek", "dummy", "local", "openai"]);
    }

    #[tokio::test]
    async fn test_generate_dispatches_on_stream_flag() {
        let registry = backend_registry().unwrap();
        let backend = registry
            .create("dummy", &BackendConfig::new("dummy", "none"))
            .unwrap();

        match backend.generate("hi", false).await.unwrap() {
            Generation::Complete(text) => assert_eq!(text, "test response"),
            other => panic!("expected complete, got {other:?}"),
        }

        match backend.generate("hi", true).await.unwrap() {
            Generation::Stream(stream) => {
                let chunks: Vec<String> = stream.map(|c| c.unwrap()).collect().await;
                assert_eq!(chunks.concat(), "test response");
            }
            other => panic!("expected stream, got {other:?}"),
        }
    }
}
