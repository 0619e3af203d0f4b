//! Aggregated context handed to prompt building and formatting.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CollectionError;

/// Partial context produced by one collector.
pub type Fragment = Map<String, Value>;

/// A single changed file and its patch text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub diff: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub functions: Option<Vec<String>>,
}

/// Everything known about the change being committed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    #[serde(default)]
    pub files: Vec<FileChange>,
    #[serde(default)]
    pub readme: Option<String>,
    #[serde(default)]
    pub recent_commits: Vec<String>,
    #[serde(default)]
    pub issues: Vec<Map<String, Value>>,
    #[serde(default)]
    pub meta: Map<String, Value>,
}

impl Context {
    /// Fold collector fragments in the given order into one context.
    ///
    /// For each key the last non-empty value wins. Keys that are not context
    /// fields land in `meta` under their own name.
    pub fn from_fragments<I>(fragments: I) -> Result<Self, CollectionError>
    where
        I: IntoIterator<Item = Fragment>,
    {
        let merged = merge_fragments(fragments);
        let mut context = Context::default();

        for (key, value) in merged {
            match key.as_str() {
                "files" => context.files = typed(&key, value)?,
                "readme" => context.readme = typed(&key, value)?,
                "recent_commits" => context.recent_commits = typed(&key, value)?,
                "issues" => context.issues = typed(&key, value)?,
                "meta" => {
                    let extra: Map<String, Value> = typed(&key, value)?;
                    for (k, v) in extra {
                        context.meta.insert(k, v);
                    }
                }
                _ => {
                    context.meta.insert(key, value);
                }
            }
        }

        Ok(context)
    }

    /// Diff texts of every collected file, in collection order.
    pub fn diffs(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.diff.as_str()).collect()
    }
}

/// Fold fragments into one map; a later non-empty value replaces an earlier one.
pub fn merge_fragments<I>(fragments: I) -> Fragment
where
    I: IntoIterator<Item = Fragment>,
{
    fragments
        .into_iter()
        .flatten()
        .filter(|(_, value)| !is_empty_value(value))
        .fold(Fragment::new(), |mut acc, (key, value)| {
            acc.insert(key, value);
            acc
        })
}

/// `null`, `""`, `[]` and `{}` count as empty. Numbers and booleans never do.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

fn typed<T: serde::de::DeserializeOwned>(key: &str, value: Value) -> Result<T, CollectionError> {
    serde_json::from_value(value).map_err(|source| CollectionError::InvalidFragment {
        key: key.to_string(),
        source,
    })
}
