//! Splitting `git diff` output into per-file changes.

use std::path::Path;

use crate::context::FileChange;

const FILE_HEADER: &str = "diff --git ";

/// Split a unified diff into one [`FileChange`] per `diff --git` section.
///
/// Each change keeps its full section text (headers included). With
/// `detect_functions`, hunk-header context such as `@@ -1,2 +1,3 @@ fn main()`
/// is collected into `functions`.
pub fn split_patch(patch: &str, detect_functions: bool) -> Vec<FileChange> {
    let mut changes = Vec::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in patch.lines() {
        if let Some(header) = line.strip_prefix(FILE_HEADER) {
            if let Some((path, lines)) = current.take() {
                changes.push(build_change(path, &lines, detect_functions));
            }
            current = Some((path_from_header(header), vec![line]));
        } else if let Some((_, lines)) = current.as_mut() {
            lines.push(line);
        }
    }

    if let Some((path, lines)) = current {
        changes.push(build_change(path, &lines, detect_functions));
    }

    changes
}

fn build_change(path: String, lines: &[&str], detect_functions: bool) -> FileChange {
    let functions = detect_functions.then(|| {
        let mut names: Vec<String> = Vec::new();
        for name in lines.iter().filter_map(|l| hunk_context(l)) {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        names
    });

    FileChange {
        language: detect_language(&path).map(str::to_string),
        path,
        diff: lines.join("\n"),
        functions,
    }
}

/// Destination path from `a/<old> b/<new>`.
fn path_from_header(header: &str) -> String {
    match header.rfind(" b/") {
        Some(idx) => header[idx + 3..].to_string(),
        None => header.trim_start_matches("a/").to_string(),
    }
}

/// Text after the closing `@@` of a hunk header, if any.
fn hunk_context(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("@@")?;
    let end = rest.find("@@")?;
    let context = rest[end + 2..].trim();
    (!context.is_empty()).then_some(context)
}

/// Best-effort language name from a file extension.
pub fn detect_language(path: &str) -> Option<&'static str> {
    let file_name = Path::new(path).file_name()?.to_str()?;
    if file_name == "Dockerfile" {
        return Some("dockerfile");
    }
    if file_name == "Makefile" {
        return Some("make");
    }

    let ext = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
    let language = match ext.as_str() {
        "rs" => "rust",
        "py" => "python",
        "js" | "mjs" | "cjs" => "javascript",
        "ts" => "typescript",
        "tsx" | "jsx" => "react",
        "go" => "go",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "c" | "h" => "c",
        "cc" | "cpp" | "cxx" | "hpp" => "cpp",
        "cs" => "csharp",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "sh" | "bash" | "zsh" => "shell",
        "md" | "markdown" => "markdown",
        "rst" => "restructuredtext",
        "toml" => "toml",
        "yaml" | "yml" => "yaml",
        "json" => "json",
        "html" | "htm" => "html",
        "css" | "scss" => "css",
        "sql" => "sql",
        _ => return None,
    };
    Some(language)
}
