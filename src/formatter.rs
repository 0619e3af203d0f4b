//! Rendering raw model output into the final commit message.

use crate::config::{FormatterSettings, OutputSettings};
use crate::context::Context;
use crate::error::FormatterError;

const FORMATTERS: &[&str] = &["conventional", "simple"];

/// Turns model output into the message that gets committed.
pub trait Formatter: Send + Sync {
    fn format(&self, context: &Context, raw: &str) -> Result<String, FormatterError>;
}

/// Returns the model output unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughFormatter;

impl Formatter for PassthroughFormatter {
    fn format(&self, _context: &Context, raw: &str) -> Result<String, FormatterError> {
        Ok(raw.to_string())
    }
}

/// Normalizes output into `subject`, blank line, wrapped body.
///
/// Strips a surrounding Markdown code fence, truncates the subject to
/// `max_subject_len` characters and wraps body lines at `wrap_body_at`
/// (0 disables wrapping).
#[derive(Debug, Clone, Copy)]
pub struct ConventionalFormatter {
    pub max_subject_len: usize,
    pub wrap_body_at: usize,
}

impl ConventionalFormatter {
    pub fn new(output: &OutputSettings) -> Self {
        Self {
            max_subject_len: output.max_subject_len,
            wrap_body_at: output.wrap_body_at,
        }
    }
}

impl Formatter for ConventionalFormatter {
    fn format(&self, _context: &Context, raw: &str) -> Result<String, FormatterError> {
        let text = strip_code_fence(raw.trim());
        let mut lines = text.lines().map(str::trim_end).skip_while(|l| l.trim().is_empty());

        let subject = lines.next().map(str::trim).ok_or(FormatterError::EmptyMessage)?;
        let subject: String = subject.chars().take(self.max_subject_len).collect();
        let subject = subject.trim_end();

        let mut body: Vec<String> = Vec::new();
        for line in lines.skip_while(|l| l.trim().is_empty()) {
            if line.trim().is_empty() {
                // collapse runs of blank lines
                if body.last().is_some_and(|l| l.is_empty()) {
                    continue;
                }
                body.push(String::new());
            } else {
                body.extend(wrap_line(line, self.wrap_body_at));
            }
        }
        while body.last().is_some_and(|l| l.is_empty()) {
            body.pop();
        }

        if body.is_empty() {
            Ok(subject.to_string())
        } else {
            Ok(format!("{}\n\n{}", subject, body.join("\n")))
        }
    }
}

/// Formatter named by the settings.
pub fn formatter_for(
    settings: &FormatterSettings,
    output: &OutputSettings,
) -> Result<Box<dyn Formatter>, FormatterError> {
    match settings.name.as_str() {
        "conventional" => Ok(Box::new(ConventionalFormatter::new(output))),
        "simple" | "passthrough" => Ok(Box::new(PassthroughFormatter)),
        other => Err(FormatterError::UnknownFormatter {
            name: other.to_string(),
            available: FORMATTERS.join(", "),
        }),
    }
}

fn strip_code_fence(text: &str) -> &str {
    if !text.starts_with("```") || !text.ends_with("```") || text.len() < 6 {
        return text;
    }
    let inner = &text[3..text.len() - 3];
    // drop the info string (```text) on the opening line
    match inner.find('\n') {
        Some(pos) => inner[pos + 1..].trim(),
        None => inner.trim(),
    }
}

/// Greedy word wrap. Bullet continuations are indented two spaces.
fn wrap_line(line: &str, width: usize) -> Vec<String> {
    if width == 0 || line.chars().count() <= width {
        return vec![line.to_string()];
    }

    let indent_len = line.len() - line.trim_start().len();
    let indent = &line[..indent_len];
    let trimmed = line.trim_start();
    let continuation = if trimmed.starts_with("- ") || trimmed.starts_with("* ") {
        format!("{indent}  ")
    } else {
        indent.to_string()
    };

    let mut out = Vec::new();
    let mut current = indent.to_string();
    let mut current_len = indent.chars().count();
    let mut has_word = false;

    for word in trimmed.split_whitespace() {
        let word_len = word.chars().count();
        if has_word && current_len + 1 + word_len > width {
            out.push(std::mem::take(&mut current));
            current = continuation.clone();
            current_len = continuation.chars().count();
            has_word = false;
        }
        if has_word {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
        has_word = true;
    }
    if has_word {
        out.push(current);
    }
    out
}
