use once_cell::sync::Lazy;
use regex::Regex;

static SPACE_BEFORE_NEWLINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\S\n]+\n").unwrap());
static SPACE_AFTER_NEWLINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[^\S\n]+").unwrap());
static SPACE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").unwrap());
static BLANK_LINE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Canonicalize whitespace in extracted text.
///
/// Applied in order:
/// 1. whitespace other than `\n` directly before a newline is dropped (`"a \r\n"` → `"a\n"`)
/// 2. whitespace other than `\n` directly after a newline is dropped
/// 3. runs of spaces and tabs become a single space
/// 4. three or more newlines become exactly two
/// 5. the result is trimmed
///
/// Idempotent: `normalize_text(&normalize_text(s)) == normalize_text(s)`.
pub fn normalize_text(text: &str) -> String {
    let text = SPACE_BEFORE_NEWLINE.replace_all(text, "\n");
    let text = SPACE_AFTER_NEWLINE.replace_all(&text, "\n");
    let text = SPACE_RUNS.replace_all(&text, " ");
    let text = BLANK_LINE_RUNS.replace_all(&text, "\n\n");
    text.trim().to_string()
}
