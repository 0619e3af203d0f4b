//! aicommit - generate git commit messages from staged changes with a language model.
//!
//! # Overview
//!
//! A run fans out to the configured context collectors (staged diff, recent
//! history, README, linked issue), folds their fragments into one [`Context`],
//! builds a prompt and asks a model backend for a message. Non-streaming
//! answers are cached on disk keyed by the SHA-256 of the diffs. The raw answer
//! is handed to a [`formatter::Formatter`] for the final text.

pub mod backend;
pub mod cache;
pub mod collectors;
pub mod config;
pub mod context;
pub mod error;
pub mod formatter;
pub mod git;
pub mod github;
pub mod pipeline;
pub mod prompt;
pub mod registry;

// Re-export commonly used types
pub use backend::{Backend, BackendConfig, Generation, TextStream};
pub use cache::ResponseCache;
pub use config::Config;
pub use context::{Context, FileChange, Fragment};
pub use error::{
    BackendError, CollectionError, CollectorError, ConfigurationError, FormatterError, GitError,
    GitHubError, PipelineError,
};
pub use pipeline::Pipeline;
pub use registry::Registry;
