//! GitHub token lookup.
//!
//! Order:
//! 1. The configured environment variable (default `GITHUB_TOKEN`)
//! 2. `gh auth token` (gh CLI)
//! 3. `GH_TOKEN`
//!
//! A missing token is not an error: public issues can be read anonymously.

use std::env;
use std::process::Command;

/// Find a GitHub token, preferring `env_var`.
pub fn resolve_github_token(env_var: &str) -> Option<String> {
    if let Some(token) = non_empty_env(env_var) {
        return Some(token);
    }

    if let Some(token) = get_token_from_gh_cli() {
        return Some(token);
    }

    non_empty_env("GH_TOKEN")
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Try to get a token from the gh CLI.
fn get_token_from_gh_cli() -> Option<String> {
    which::which("gh").ok()?;

    let output = Command::new("gh").args(["auth", "token"]).output().ok()?;
    if !output.status.success() {
        return None;
    }

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_configured_variable_wins() {
        temp_env::with_vars(
            [("AICOMMIT_ISSUE_TOKEN", Some("configured")), ("GH_TOKEN", Some("fallback"))],
            || {
                assert_eq!(
                    resolve_github_token("AICOMMIT_ISSUE_TOKEN").as_deref(),
                    Some("configured")
                );
            },
        );
    }

    #[test]
    #[serial]
    fn test_blank_variable_is_ignored() {
        temp_env::with_var("AICOMMIT_ISSUE_TOKEN", Some("   "), || {
            assert_ne!(
                resolve_github_token("AICOMMIT_ISSUE_TOKEN").as_deref(),
                Some("   ")
            );
        });
    }
}
