//! Staged changes, one entry per file.

use std::sync::Arc;

use tracing::debug;

use crate::collectors::{BlockingCollector, CollectorArgs, fragment_of};
use crate::context::Fragment;
use crate::error::CollectorError;
use crate::git::{GitProvider, split_patch};

pub struct DiffCollector {
    git: Arc<dyn GitProvider>,
    staged_only: bool,
    detect_functions: bool,
}

impl DiffCollector {
    pub fn new(git: Arc<dyn GitProvider>, staged_only: bool, detect_functions: bool) -> Self {
        Self {
            git,
            staged_only,
            detect_functions,
        }
    }

    /// Options: `staged_only` (default true), `detect_functions` (default false).
    pub fn from_args(args: &CollectorArgs) -> Result<Self, CollectorError> {
        let options = args.options();
        Ok(Self::new(
            args.git.clone(),
            options.bool("staged_only", true)?,
            options.bool("detect_functions", false)?,
        ))
    }
}

impl BlockingCollector for DiffCollector {
    fn collect(&self) -> Result<Fragment, CollectorError> {
        let patch = self.git.staged_diff(self.staged_only)?;
        let files = split_patch(&patch, self.detect_functions);
        debug!(files = files.len(), staged_only = self.staged_only, "Collected diff");

        let value = serde_json::to_value(&files).map_err(CollectorError::Encode)?;
        Ok(fragment_of("files", value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GitError;
    use crate::git::MockGitProvider;
    use serde_json::json;

    const PATCH: &str = "diff --git a/a.txt b/a.txt\n--- a/a.txt\n+++ b/a.txt\n@@ -0,0 +1 @@\n+a\n";

    #[test]
    fn test_collects_files_from_staged_diff() {
        let mut git = MockGitProvider::new();
        git.expect_staged_diff()
            .withf(|staged_only| *staged_only)
            .times(1)
            .returning(|_| Ok(PATCH.to_string()));

        let collector = DiffCollector::new(Arc::new(git), true, false);
        let fragment = collector.collect().unwrap();
        assert_eq!(fragment["files"][0]["path"], json!("a.txt"));
        assert!(fragment["files"][0]["diff"].as_str().unwrap().ends_with("+a"));
    }

    #[test]
    fn test_empty_diff_yields_empty_files() {
        let mut git = MockGitProvider::new();
        git.expect_staged_diff().returning(|_| Ok(String::new()));

        let collector = DiffCollector::new(Arc::new(git), true, false);
        assert_eq!(collector.collect().unwrap()["files"], json!([]));
    }

    #[test]
    fn test_git_failure_is_fatal() {
        let mut git = MockGitProvider::new();
        git.expect_staged_diff().returning(|_| {
            Err(GitError::CommandFailed {
                command: "diff --cached".into(),
                code: Some(128),
                stderr: "fatal: not a git repository".into(),
            })
        });

        let collector = DiffCollector::new(Arc::new(git), true, false);
        assert!(matches!(
            collector.collect(),
            Err(CollectorError::Git(GitError::CommandFailed { code: Some(128), .. }))
        ));
    }
}
