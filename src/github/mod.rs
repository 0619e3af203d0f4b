//! GitHub API operations using octocrab.

pub mod auth;
pub mod issues;

pub use auth::resolve_github_token;
pub use issues::{IssueRecord, fetch_issue_with_client};
