//! Prompt construction for commit message generation.

use serde_json::Value;

use crate::context::Context;

/// Characters of the README included in the prompt.
const README_EXCERPT_CHARS: usize = 500;

const NO_CONTEXT: &str = "No additional context provided.";

/// Build the prompt for the model from the aggregated context.
///
/// Sections appear in a fixed order: README excerpt, recent commits, related
/// issues, then one fenced diff per file.
pub fn build_prompt(context: &Context, language: &str) -> String {
    let summary = context_summary(context);

    let diffs = context
        .files
        .iter()
        .map(|file| format!("File: {}\n```diff\n{}\n```", file.path, file.diff))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        r#"
You are an expert at writing git commit messages.
Your task is to write a commit message for the following changes.

The commit message must follow the Conventional Commits specification.
The output language should be {language}.

Here is the context for the changes:
{summary}

And here are the file-by-file changes (diffs):
{diffs}

Please generate a concise and informative commit message.
Do not include any extra text or explanations, only the commit message itself.
"#
    )
}

fn context_summary(context: &Context) -> String {
    let mut parts = Vec::new();

    if let Some(readme) = context.readme.as_deref().filter(|r| !r.is_empty()) {
        let excerpt: String = readme.chars().take(README_EXCERPT_CHARS).collect();
        parts.push(format!("README Summary:\n{excerpt}..."));
    }

    if !context.recent_commits.is_empty() {
        let commits = context
            .recent_commits
            .iter()
            .map(|c| format!("- {c}"))
            .collect::<Vec<_>>()
            .join("\n");
        parts.push(format!("Recent Commits:\n{commits}"));
    }

    if !context.issues.is_empty() {
        let issues = context
            .issues
            .iter()
            .map(|issue| {
                let title = issue.get("title").and_then(Value::as_str).unwrap_or("N/A");
                format!("- {title}")
            })
            .collect::<Vec<_>>()
            .join("\n");
        parts.push(format!("Related Issues:\n{issues}"));
    }

    if parts.is_empty() {
        NO_CONTEXT.to_string()
    } else {
        parts.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FileChange;
    use serde_json::json;

    fn file(path: &str, diff: &str) -> FileChange {
        FileChange {
            path: path.into(),
            diff: diff.into(),
            language: None,
            functions: None,
        }
    }

    #[test]
    fn test_empty_context_placeholder() {
        let prompt = build_prompt(&Context::default(), "en");
        assert!(prompt.contains("The output language should be en."));
        assert!(prompt.contains("No additional context provided."));
    }

    #[test]
    fn test_sections_in_fixed_order() {
        let ctx = Context {
            files: vec![file("src/lib.rs", "+pub fn x() {}")],
            readme: Some("My project".into()),
            recent_commits: vec!["feat: one".into(), "fix: two".into()],
            issues: vec![
                json!({"title": "Crash on start"}).as_object().cloned().unwrap(),
                json!({"number": 5}).as_object().cloned().unwrap(),
            ],
            ..Context::default()
        };
        let prompt = build_prompt(&ctx, "de");

        let readme = prompt.find("README Summary:\nMy project...").unwrap();
        let commits = prompt.find("Recent Commits:\n- feat: one\n- fix: two").unwrap();
        let issues = prompt.find("Related Issues:\n- Crash on start\n- N/A").unwrap();
        let diff = prompt.find("File: src/lib.rs\n```diff\n+pub fn x() {}\n```").unwrap();
        assert!(readme < commits && commits < issues && issues < diff);
        assert!(!prompt.contains("No additional context provided."));
    }

    #[test]
    fn test_readme_excerpt_truncated_on_char_boundary() {
        let ctx = Context {
            readme: Some("ü".repeat(600)),
            ..Context::default()
        };
        let prompt = build_prompt(&ctx, "en");
        let expected = format!("README Summary:\n{}...", "ü".repeat(500));
        assert!(prompt.contains(&expected));
        assert!(!prompt.contains(&"ü".repeat(501)));
    }

    #[test]
    fn test_diffs_joined_with_blank_line() {
        let ctx = Context {
            files: vec![file("a", "+a"), file("b", "+b")],
            ..Context::default()
        };
        let prompt = build_prompt(&ctx, "en");
        assert!(prompt.contains("```\n\nFile: b\n"));
    }
}
