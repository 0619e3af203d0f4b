//! Recent commit messages.

use std::sync::Arc;

use serde_json::json;

use crate::collectors::{BlockingCollector, CollectorArgs, fragment_of};
use crate::context::Fragment;
use crate::error::CollectorError;
use crate::git::GitProvider;

pub const DEFAULT_COUNT: i64 = 10;

pub struct HistoryCollector {
    git: Arc<dyn GitProvider>,
    count: usize,
}

impl HistoryCollector {
    /// `n` must be positive.
    pub fn new(git: Arc<dyn GitProvider>, n: i64) -> Result<Self, CollectorError> {
        if n <= 0 {
            return Err(CollectorError::InvalidOption {
                option: "n".to_string(),
                reason: format!("must be a positive integer, got {n}"),
            });
        }
        let count = usize::try_from(n).map_err(|_| CollectorError::InvalidOption {
            option: "n".to_string(),
            reason: format!("{n} is too large"),
        })?;
        Ok(Self { git, count })
    }

    pub fn from_args(args: &CollectorArgs) -> Result<Self, CollectorError> {
        Self::new(args.git.clone(), args.options().int("n", DEFAULT_COUNT)?)
    }
}

impl BlockingCollector for HistoryCollector {
    fn collect(&self) -> Result<Fragment, CollectorError> {
        let messages = self.git.recent_commit_messages(self.count)?;
        Ok(fragment_of("recent_commits", json!(messages)))
    }
}
