//! Error types for aicommit modules using thiserror.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while wiring components together or loading settings.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Duplicate {registry} name '{name}': names must be unique")]
    DuplicateName { registry: &'static str, name: String },

    #[error("Unknown {registry} '{name}'. Available: {available}")]
    UnknownName {
        registry: &'static str,
        name: String,
        available: String,
    },

    #[error("Missing required setting: {0}")]
    MissingSetting(String),

    #[error("Invalid value for {setting}: {reason}")]
    InvalidSetting { setting: String, reason: String },

    #[error("Failed to read config file {}: {source}", path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", path.display())]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: Box<toml::de::Error>,
    },
}

/// Failure creating an instance from a registry.
#[derive(Error, Debug)]
pub enum RegistryError<E>
where
    E: std::error::Error + 'static,
{
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Failed to instantiate {registry} '{name}': {source}")]
    Instantiation {
        registry: &'static str,
        name: String,
        #[source]
        source: E,
    },
}

/// Errors from git operations.
#[derive(Error, Debug)]
pub enum GitError {
    #[error("git executable not found in PATH")]
    NotInstalled,

    #[error("Failed to open repository: {0}")]
    OpenRepository(#[source] git2::Error),

    #[error("Failed to spawn git: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("`git {command}` exited with {}: {stderr}",
            code.map_or("unknown status".to_string(), |c| format!("code {c}")))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Failed to walk commit history: {0}")]
    RevwalkError(#[source] git2::Error),

    #[error("Failed to read HEAD: {0}")]
    HeadUnreadable(#[source] git2::Error),

    #[error("Failed to read index: {0}")]
    IndexFailed(#[source] git2::Error),
}

/// Errors from GitHub API operations.
#[derive(Error, Debug)]
pub enum GitHubError {
    #[error("Failed to build GitHub client: {0}")]
    ClientBuild(#[source] Box<octocrab::Error>),

    #[error("Failed to fetch issue #{number} from {repo}: {source}")]
    FetchIssue {
        repo: String,
        number: u64,
        #[source]
        source: Box<octocrab::Error>,
    },

    #[error("Rate limited by GitHub API. Resets at: {reset_time}")]
    RateLimited { reset_time: String },

    #[error("Invalid repository '{0}': expected owner/name")]
    InvalidRepository(String),
}

/// Failure classification for a single context collector.
#[derive(Error, Debug)]
pub enum CollectorError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    GitHub(#[from] GitHubError),

    #[error("Invalid option '{option}': {reason}")]
    InvalidOption { option: String, reason: String },

    #[error("Failed to encode collected data: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Background task failed: {0}")]
    TaskFailed(#[source] tokio::task::JoinError),
}

/// Errors from the context collection phase.
#[derive(Error, Debug)]
pub enum CollectionError {
    #[error("Collector '{kind}' is not available: {source}")]
    Unavailable {
        kind: String,
        #[source]
        source: ConfigurationError,
    },

    #[error("Collector '{kind}' could not be created: {source}")]
    Instantiation {
        kind: String,
        #[source]
        source: CollectorError,
    },

    #[error("Collector '{kind}' failed: {source}")]
    Failed {
        kind: String,
        #[source]
        source: CollectorError,
    },

    #[error("Collector '{kind}' aborted: {reason}")]
    Aborted { kind: String, reason: String },

    #[error("Collected value for '{key}' has the wrong shape: {source}")]
    InvalidFragment {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CollectionError {
    /// Registry key of the collector responsible, when known.
    pub fn kind(&self) -> Option<&str> {
        match self {
            CollectionError::Unavailable { kind, .. }
            | CollectionError::Instantiation { kind, .. }
            | CollectionError::Failed { kind, .. }
            | CollectionError::Aborted { kind, .. } => Some(kind),
            CollectionError::InvalidFragment { .. } => None,
        }
    }
}

/// Coarse classification of backend failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    Configuration,
    Timeout,
    RemoteRejected,
    Transport,
    InvalidResponse,
    Stream,
}

impl BackendErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendErrorKind::Configuration => "configuration",
            BackendErrorKind::Timeout => "timeout",
            BackendErrorKind::RemoteRejected => "remote rejected",
            BackendErrorKind::Transport => "transport",
            BackendErrorKind::InvalidResponse => "invalid response",
            BackendErrorKind::Stream => "stream",
        }
    }
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from model backends.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("No API key for {backend}: set it in the config or the {env_var} environment variable")]
    MissingCredential { backend: String, env_var: String },

    #[error("No endpoint for {backend}: set base_url in the config or the {env_var} environment variable")]
    MissingEndpoint { backend: String, env_var: String },

    #[error("Invalid parameter '{key}' for {backend}: {reason}")]
    InvalidParameter {
        backend: String,
        key: String,
        reason: String,
    },

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("{backend} request timed out after {secs} seconds")]
    Timeout { backend: String, secs: u64 },

    #[error("{backend} rejected the request (HTTP {status}): {message}")]
    RemoteRejected {
        backend: String,
        status: u16,
        message: String,
    },

    #[error("{backend} request failed: {source}")]
    Transport {
        backend: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{backend} returned an unexpected response: {reason}")]
    InvalidResponse { backend: String, reason: String },

    #[error("{backend} stream failed: {reason}")]
    Stream { backend: String, reason: String },
}

impl BackendError {
    pub fn kind(&self) -> BackendErrorKind {
        match self {
            BackendError::MissingCredential { .. }
            | BackendError::MissingEndpoint { .. }
            | BackendError::InvalidParameter { .. }
            | BackendError::ClientBuild(_) => BackendErrorKind::Configuration,
            BackendError::Timeout { .. } => BackendErrorKind::Timeout,
            BackendError::RemoteRejected { .. } => BackendErrorKind::RemoteRejected,
            BackendError::Transport { .. } => BackendErrorKind::Transport,
            BackendError::InvalidResponse { .. } => BackendErrorKind::InvalidResponse,
            BackendError::Stream { .. } => BackendErrorKind::Stream,
        }
    }
}

/// Errors from rendering the final message.
#[derive(Error, Debug)]
pub enum FormatterError {
    #[error("Unknown formatter '{name}'. Available: {available}")]
    UnknownFormatter { name: String, available: String },

    #[error("Model returned an empty commit message")]
    EmptyMessage,
}

/// Errors surfaced by a pipeline run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Collection(#[from] CollectionError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Formatter(#[from] FormatterError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}
