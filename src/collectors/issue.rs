//! Linked issue metadata, keyed off the number embedded in the branch name.

use std::sync::Arc;

use async_trait::async_trait;
use regex_lite::Regex;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::collectors::{Collector, CollectorArgs, fragment_of};
use crate::context::Fragment;
use crate::error::{CollectorError, GitError};
use crate::git::GitProvider;
use crate::github::{auth::resolve_github_token, fetch_issue_with_client, issues::build_client};

pub struct IssueCollector {
    git: Arc<dyn GitProvider>,
    provider: String,
    repo: Option<String>,
    token_env_var: String,
    api_base: Option<String>,
}

impl IssueCollector {
    /// Options: `provider` (default "github"), `repo` ("owner/name"),
    /// `token_env_var` (default "GITHUB_TOKEN"), `api_base`.
    pub fn from_args(args: &CollectorArgs) -> Result<Self, CollectorError> {
        let options = args.options();
        Ok(Self {
            git: args.git.clone(),
            provider: options.string("provider")?.unwrap_or_else(|| "github".to_string()),
            repo: options.string("repo")?.filter(|r| !r.is_empty()),
            token_env_var: options
                .string("token_env_var")?
                .unwrap_or_else(|| "GITHUB_TOKEN".to_string()),
            api_base: options.string("api_base")?,
        })
    }

    /// Branch name, or `None` outside a repository or on a detached HEAD.
    async fn branch(&self) -> Result<Option<String>, CollectorError> {
        let git = self.git.clone();
        let branch = tokio::task::spawn_blocking(move || {
            if !git.is_repository() {
                return Ok::<_, GitError>(None);
            }
            git.current_branch()
        })
        .await
        .map_err(CollectorError::TaskFailed)??;
        Ok(branch)
    }
}

/// First run of digits in a branch name (`feature/123-login` gives 123).
pub fn extract_issue_number(branch: &str) -> Option<u64> {
    let re = Regex::new(r"\d+").ok()?;
    re.find(branch)?.as_str().parse().ok()
}

#[async_trait]
impl Collector for IssueCollector {
    async fn collect(&self) -> Result<Fragment, CollectorError> {
        let Some(branch) = self.branch().await? else {
            debug!("No branch available, skipping issue collection");
            return Ok(Fragment::new());
        };

        let Some(number) = extract_issue_number(&branch) else {
            info!("No issue number in branch '{}', skipping", branch);
            return Ok(Fragment::new());
        };

        if self.provider != "github" {
            warn!("Issue provider '{}' is not supported", self.provider);
            return Ok(Fragment::new());
        }

        let repo = self.repo.as_deref().ok_or_else(|| CollectorError::InvalidOption {
            option: "repo".to_string(),
            reason: "GitHub repository (owner/name) is required".to_string(),
        })?;

        let token = resolve_github_token(&self.token_env_var);
        if token.is_none() {
            warn!(
                "No GitHub token found in {}; making an unauthenticated request",
                self.token_env_var
            );
        }

        info!("Fetching issue #{} from {}", number, repo);
        let client = build_client(token, self.api_base.as_deref())?;
        match fetch_issue_with_client(&client, repo, number).await? {
            Some(issue) => {
                let record = serde_json::to_value(&issue).map_err(CollectorError::Encode)?;
                Ok(fragment_of("issues", json!([record])))
            }
            None => {
                warn!("Issue #{} not found in {}", number, repo);
                Ok(Fragment::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::MockGitProvider;
    use std::path::PathBuf;

    fn collector(git: MockGitProvider, options: serde_json::Value) -> IssueCollector {
        IssueCollector::from_args(&CollectorArgs {
            options: options.as_object().cloned().unwrap_or_default(),
            git: Arc::new(git),
            workdir: PathBuf::from("."),
        })
        .unwrap()
    }

    #[test]
    fn test_extract_issue_number() {
        assert_eq!(extract_issue_number("feature/123-login"), Some(123));
        assert_eq!(extract_issue_number("fix-42-then-7"), Some(42));
        assert_eq!(extract_issue_number("main"), None);
    }

    #[tokio::test]
    async fn test_outside_repository_is_empty() {
        let mut git = MockGitProvider::new();
        git.expect_is_repository().return_const(false);
        git.expect_current_branch().never();

        let fragment = collector(git, json!({"repo": "o/r"})).collect().await.unwrap();
        assert!(fragment.is_empty());
    }

    #[tokio::test]
    async fn test_branch_without_number_is_empty() {
        let mut git = MockGitProvider::new();
        git.expect_is_repository().return_const(true);
        git.expect_current_branch()
            .returning(|| Ok(Some("main".to_string())));

        let fragment = collector(git, json!({"repo": "o/r"})).collect().await.unwrap();
        assert!(fragment.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_provider_is_empty() {
        let mut git = MockGitProvider::new();
        git.expect_is_repository().return_const(true);
        git.expect_current_branch()
            .returning(|| Ok(Some("feature/9".to_string())));

        let fragment = collector(git, json!({"provider": "gitlab", "repo": "o/r"}))
            .collect()
            .await
            .unwrap();
        assert!(fragment.is_empty());
    }

    #[tokio::test]
    async fn test_missing_repo_is_fatal() {
        let mut git = MockGitProvider::new();
        git.expect_is_repository().return_const(true);
        git.expect_current_branch()
            .returning(|| Ok(Some("feature/9".to_string())));

        let err = collector(git, json!({})).collect().await.unwrap_err();
        assert!(matches!(
            err,
            CollectorError::InvalidOption { ref option, .. } if option == "repo"
        ));
    }
}
