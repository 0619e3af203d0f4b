//! Repository operations behind a mockable trait.
//!
//! Diffs shell out to the system `git` binary so the user's diff config and
//! attributes apply. Everything else goes through git2.

use std::path::{Path, PathBuf};
use std::process::Command;

use git2::{ErrorCode, Repository, Sort, Tree};
use tracing::debug;

use crate::error::GitError;

/// Repository operations needed by collectors and the commit step.
#[cfg_attr(test, mockall::automock)]
pub trait GitProvider: Send + Sync {
    /// Whether the working directory is inside a git repository.
    fn is_repository(&self) -> bool;

    /// Unified diff of the index (`staged_only`) or of the working tree.
    fn staged_diff(&self, staged_only: bool) -> Result<String, GitError>;

    /// Up to `n` full commit messages, newest first. Empty for a repo with no commits.
    fn recent_commit_messages(&self, n: usize) -> Result<Vec<String>, GitError>;

    /// Short name of the checked-out branch, `None` when HEAD is detached.
    fn current_branch(&self) -> Result<Option<String>, GitError>;

    fn has_staged_changes(&self) -> Result<bool, GitError>;

    /// Commit the current index with `message`, returning the new commit id.
    fn commit(&self, message: &str) -> Result<String, GitError>;
}

/// [`GitProvider`] backed by the `git` binary and git2.
#[derive(Debug, Clone)]
pub struct SystemGit {
    workdir: PathBuf,
}

impl SystemGit {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn open(&self) -> Result<Repository, GitError> {
        Repository::discover(&self.workdir).map_err(GitError::OpenRepository)
    }

    /// Run git and return stdout. Exit codes listed in `ok_codes` count as success.
    fn run_git(&self, args: &[&str], ok_codes: &[i32]) -> Result<String, GitError> {
        if which::which("git").is_err() {
            return Err(GitError::NotInstalled);
        }

        let output = Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .map_err(GitError::SpawnFailed)?;

        let code = output.status.code();
        if !code.is_some_and(|c| ok_codes.contains(&c)) {
            return Err(GitError::CommandFailed {
                command: args.join(" "),
                code,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Resolve the HEAD tree, treating an unborn branch as "no tree".
fn resolve_head_tree(repo: &Repository) -> Result<Option<Tree<'_>>, GitError> {
    let head = match repo.head() {
        Ok(r) => r,
        Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
            return Ok(None);
        }
        Err(e) => return Err(GitError::HeadUnreadable(e)),
    };
    let tree = head.peel_to_tree().map_err(GitError::HeadUnreadable)?;
    Ok(Some(tree))
}

impl GitProvider for SystemGit {
    fn is_repository(&self) -> bool {
        Repository::discover(&self.workdir).is_ok()
    }

    fn staged_diff(&self, staged_only: bool) -> Result<String, GitError> {
        // `git diff` reports 1 when differences exist and --exit-code is in effect
        if staged_only {
            self.run_git(&["diff", "--cached"], &[0, 1])
        } else {
            self.run_git(&["diff"], &[0, 1])
        }
    }

    fn recent_commit_messages(&self, n: usize) -> Result<Vec<String>, GitError> {
        let repo = self.open()?;
        if resolve_head_tree(&repo)?.is_none() {
            debug!("Repository has no commits yet");
            return Ok(Vec::new());
        }

        let mut revwalk = repo.revwalk().map_err(GitError::RevwalkError)?;
        revwalk.push_head().map_err(GitError::RevwalkError)?;
        revwalk
            .set_sorting(Sort::TOPOLOGICAL | Sort::TIME)
            .map_err(GitError::RevwalkError)?;

        let mut messages = Vec::with_capacity(n);
        for oid in revwalk.take(n) {
            let oid = oid.map_err(GitError::RevwalkError)?;
            let commit = repo.find_commit(oid).map_err(GitError::RevwalkError)?;
            let message = String::from_utf8_lossy(commit.message_bytes()).trim().to_string();
            if !message.is_empty() {
                messages.push(message);
            }
        }
        Ok(messages)
    }

    fn current_branch(&self) -> Result<Option<String>, GitError> {
        let repo = self.open()?;
        match repo.head() {
            Ok(head) if head.is_branch() => Ok(head.shorthand().map(str::to_string)),
            Ok(_) => Ok(None),
            Err(e) if e.code() == ErrorCode::UnbornBranch => {
                // HEAD still names the branch even before the first commit
                let head = repo.find_reference("HEAD").map_err(GitError::HeadUnreadable)?;
                Ok(head
                    .symbolic_target()
                    .and_then(|t| t.strip_prefix("refs/heads/"))
                    .map(str::to_string))
            }
            Err(e) => Err(GitError::HeadUnreadable(e)),
        }
    }

    fn has_staged_changes(&self) -> Result<bool, GitError> {
        let repo = self.open()?;
        let head_tree = resolve_head_tree(&repo)?;
        let diff = repo
            .diff_tree_to_index(head_tree.as_ref(), None, None)
            .map_err(GitError::IndexFailed)?;
        Ok(diff.deltas().len() > 0)
    }

    fn commit(&self, message: &str) -> Result<String, GitError> {
        self.run_git(&["commit", "--quiet", "-m", message], &[0])?;

        let repo = self.open()?;
        let head = repo.head().map_err(GitError::HeadUnreadable)?;
        let commit = head.peel_to_commit().map_err(GitError::HeadUnreadable)?;
        Ok(commit.id().to_string())
    }
}
