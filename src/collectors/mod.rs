//! Context collectors.
//!
//! Each collector contributes a [`Fragment`] of context. Collectors doing
//! blocking work (git, filesystem) implement [`BlockingCollector`] and run on
//! the blocking pool; network-bound ones implement [`Collector`].

pub mod diff;
pub mod dummy;
pub mod history;
pub mod issue;
pub mod readme;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::context::Fragment;
use crate::error::{CollectorError, ConfigurationError};
use crate::git::GitProvider;
use crate::registry::Registry;

pub use diff::DiffCollector;
pub use dummy::DummyCollector;
pub use history::HistoryCollector;
pub use issue::IssueCollector;
pub use readme::ReadmeCollector;

/// A collector whose work is I/O-bound and async.
#[async_trait]
pub trait Collector: Send + Sync {
    async fn collect(&self) -> Result<Fragment, CollectorError>;
}

/// A collector that blocks the calling thread while it works.
pub trait BlockingCollector: Send + Sync {
    fn collect(&self) -> Result<Fragment, CollectorError>;
}

/// A constructed collector, tagged with how it must be scheduled.
#[derive(Clone)]
pub enum CollectorHandle {
    Blocking(Arc<dyn BlockingCollector>),
    Async(Arc<dyn Collector>),
}

impl CollectorHandle {
    pub fn blocking(collector: impl BlockingCollector + 'static) -> Self {
        CollectorHandle::Blocking(Arc::new(collector))
    }

    pub fn async_collector(collector: impl Collector + 'static) -> Self {
        CollectorHandle::Async(Arc::new(collector))
    }
}

impl std::fmt::Debug for CollectorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectorHandle::Blocking(_) => f.write_str("CollectorHandle::Blocking(..)"),
            CollectorHandle::Async(_) => f.write_str("CollectorHandle::Async(..)"),
        }
    }
}

/// Constructor arguments shared by every collector factory.
#[derive(Clone)]
pub struct CollectorArgs {
    pub options: Map<String, Value>,
    pub git: Arc<dyn GitProvider>,
    pub workdir: PathBuf,
}

impl CollectorArgs {
    pub fn options(&self) -> Options<'_> {
        Options(&self.options)
    }
}

/// Table of collector factories keyed by collector kind.
pub type CollectorRegistry = Registry<CollectorArgs, CollectorHandle, CollectorError>;

/// Registry with every built-in collector.
pub fn collector_registry() -> Result<CollectorRegistry, ConfigurationError> {
    let mut registry = CollectorRegistry::new("collector");
    registry.register("diff", |args: &CollectorArgs| {
        Ok(CollectorHandle::blocking(DiffCollector::from_args(args)?))
    })?;
    registry.register("history", |args: &CollectorArgs| {
        Ok(CollectorHandle::blocking(HistoryCollector::from_args(args)?))
    })?;
    registry.register("readme", |args: &CollectorArgs| {
        Ok(CollectorHandle::blocking(ReadmeCollector::from_args(args)?))
    })?;
    registry.register("issue", |args: &CollectorArgs| {
        Ok(CollectorHandle::async_collector(IssueCollector::from_args(args)?))
    })?;
    registry.register("dummy", |args: &CollectorArgs| {
        Ok(CollectorHandle::blocking(DummyCollector::from_args(args)?))
    })?;
    Ok(registry)
}

/// Typed access to a collector's option map.
#[derive(Debug, Clone, Copy)]
pub struct Options<'a>(&'a Map<String, Value>);

impl<'a> Options<'a> {
    pub fn new(map: &'a Map<String, Value>) -> Self {
        Options(map)
    }

    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    pub fn bool(&self, key: &str, default: bool) -> Result<bool, CollectorError> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => v.as_bool().ok_or_else(|| invalid(key, "expected true or false", v)),
        }
    }

    pub fn int(&self, key: &str, default: i64) -> Result<i64, CollectorError> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => v.as_i64().ok_or_else(|| invalid(key, "expected an integer", v)),
        }
    }

    pub fn string(&self, key: &str) -> Result<Option<String>, CollectorError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(v) => Err(invalid(key, "expected a string", v)),
        }
    }
}

fn invalid(key: &str, expected: &str, got: &Value) -> CollectorError {
    CollectorError::InvalidOption {
        option: key.to_string(),
        reason: format!("{expected}, got {got}"),
    }
}

/// Single-key fragment.
pub(crate) fn fragment_of(key: &str, value: Value) -> Fragment {
    let mut fragment = Fragment::new();
    fragment.insert(key.to_string(), value);
    fragment
}
