//! Issue lookup via octocrab.

use octocrab::Octocrab;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::GitHubError;

/// Maximum issue body length kept in the prompt context.
const MAX_BODY_LENGTH: usize = 10 * 1024;

/// The parts of a GitHub issue that are useful as commit context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueRecord {
    pub number: u64,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    pub state: String,
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl IssueRecord {
    fn from_api(number: u64, raw: &Value) -> Self {
        let text = |key: &str| raw.get(key).and_then(Value::as_str).map(str::to_string);

        let body = text("body").filter(|b| !b.is_empty()).map(|b| {
            if b.len() > MAX_BODY_LENGTH {
                let cut = floor_char_boundary(&b, MAX_BODY_LENGTH);
                format!("{}... [truncated]", &b[..cut])
            } else {
                b
            }
        });

        let labels = raw
            .get("labels")
            .and_then(Value::as_array)
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|l| match l {
                        Value::String(s) => Some(s.clone()),
                        other => other.get("name").and_then(Value::as_str).map(str::to_string),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            number: raw.get("number").and_then(Value::as_u64).unwrap_or(number),
            title: text("title").unwrap_or_default(),
            body,
            state: text("state").unwrap_or_else(|| "unknown".to_string()),
            labels,
            url: text("html_url"),
        }
    }
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Split `owner/name`.
pub fn parse_repo_slug(repo: &str) -> Result<(&str, &str), GitHubError> {
    match repo.trim().split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok((owner, name))
        }
        _ => Err(GitHubError::InvalidRepository(repo.to_string())),
    }
}

/// Build a client, optionally authenticated and pointed at a custom API base.
pub fn build_client(
    token: Option<String>,
    api_base: Option<&str>,
) -> Result<Octocrab, GitHubError> {
    let mut builder = Octocrab::builder();
    if let Some(base) = api_base {
        builder = builder
            .base_uri(base)
            .map_err(|e| GitHubError::ClientBuild(Box::new(e)))?;
    }
    if let Some(token) = token {
        builder = builder.personal_token(token);
    }
    builder.build().map_err(|e| GitHubError::ClientBuild(Box::new(e)))
}

/// Fetch one issue using a pre-configured octocrab client.
///
/// Returns `Ok(None)` when GitHub answers 404.
pub async fn fetch_issue_with_client(
    octocrab: &Octocrab,
    repo: &str,
    number: u64,
) -> Result<Option<IssueRecord>, GitHubError> {
    let (owner, name) = parse_repo_slug(repo)?;
    let route = format!("/repos/{owner}/{name}/issues/{number}");

    match octocrab.get::<Value, _, ()>(route, None).await {
        Ok(raw) => Ok(Some(IssueRecord::from_api(number, &raw))),
        Err(e) => {
            // Check error content using both Display and Debug output
            // to handle different octocrab error formats
            let err_display = e.to_string();
            let err_debug = format!("{:?}", e);

            if err_display.contains("Not Found") || err_debug.contains("Not Found") {
                debug!("Issue #{} not found in {}", number, repo);
                return Ok(None);
            }
            if err_display.to_lowercase().contains("rate limit")
                || err_debug.to_lowercase().contains("rate limit")
            {
                return Err(GitHubError::RateLimited {
                    reset_time: "unknown".to_string(),
                });
            }
            Err(GitHubError::FetchIssue {
                repo: repo.to_string(),
                number,
                source: Box::new(e),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_repo_slug() {
        assert_eq!(parse_repo_slug("owner/repo").unwrap(), ("owner", "repo"));
        assert!(parse_repo_slug("owner").is_err());
        assert!(parse_repo_slug("/repo").is_err());
        assert!(parse_repo_slug("a/b/c").is_err());
    }

    #[test]
    fn test_record_from_api() {
        let raw = json!({
            "number": 123,
            "title": "Login fails",
            "body": "Steps to reproduce",
            "state": "open",
            "labels": [{"name": "bug"}, "triage"],
            "html_url": "https://github.com/owner/repo/issues/123"
        });
        let record = IssueRecord::from_api(123, &raw);
        assert_eq!(record.title, "Login fails");
        assert_eq!(record.labels, vec!["bug", "triage"]);
        assert_eq!(record.state, "open");
        assert_eq!(record.url.as_deref(), Some("https://github.com/owner/repo/issues/123"));
    }

    #[test]
    fn test_long_body_truncated() {
        let raw = json!({"title": "t", "body": "é".repeat(MAX_BODY_LENGTH)});
        let record = IssueRecord::from_api(1, &raw);
        let body = record.body.unwrap();
        assert!(body.ends_with("... [truncated]"));
        assert!(body.len() <= MAX_BODY_LENGTH + "... [truncated]".len());
        assert_eq!(record.number, 1);
    }
}
