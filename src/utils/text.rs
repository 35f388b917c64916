use once_cell::sync::Lazy;
use regex::Regex;

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\s*\n(.*?)\n?\s*```$").expect("code fence pattern"));

/// Trims the answer and unwraps a single Markdown code fence around it, if any.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    CODE_FENCE
        .captures(trimmed)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or(trimmed)
}

pub fn normalize_tag(tag: &str) -> String {
    tag.to_lowercase()
}
