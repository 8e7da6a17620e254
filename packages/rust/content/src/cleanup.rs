//! Cleanup passes for generated documents.
//!
//! Each pass is a function `&str -> String` applied in sequence. Generative
//! output often arrives wrapped in a code fence, with a duplicate H1 or with
//! ragged whitespace; these passes normalise it before parsing.

use std::sync::LazyLock;

use regex::Regex;

/// Strip a code fence wrapping the whole response (```` ```mdx ... ``` ````).
pub fn strip_wrapping_fence(text: &str) -> &str {
    static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)^\s*```[a-zA-Z]*[ \t]*\r?\n(.*?)\r?\n```\s*$").expect("valid regex")
    });

    match FENCE_RE.captures(text).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => text.trim(),
    }
}

/// Run the full cleanup pipeline on a generated body.
pub fn clean_body(md: &str) -> String {
    let mut result = md.to_string();

    result = demote_h1(&result);
    result = clean_blank_lines(&result);
    result = normalize_whitespace(&result);
    result = ensure_trailing_newline(&result);

    result
}

// ---------------------------------------------------------------------------
// Pass 1: Demote H1
// ---------------------------------------------------------------------------

/// The page title comes from frontmatter, so body headings start at H2.
fn demote_h1(md: &str) -> String {
    let mut in_code_block = false;
    md.lines()
        .map(|line| {
            if line.trim_start().starts_with("```") {
                in_code_block = !in_code_block;
            }
            match line.strip_prefix("# ") {
                Some(text) if !in_code_block => format!("## {text}"),
                _ => line.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Pass 2: Collapse blank lines
// ---------------------------------------------------------------------------

/// Collapse runs of 2+ blank lines into exactly 1.
fn clean_blank_lines(md: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").expect("valid regex"));

    MULTI_BLANK_RE.replace_all(md, "\n\n").to_string()
}

// ---------------------------------------------------------------------------
// Pass 3: Whitespace
// ---------------------------------------------------------------------------

fn normalize_whitespace(md: &str) -> String {
    md.lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
        .trim_start_matches('\n')
        .to_string()
}

/// Ensure the text ends with exactly one newline.
fn ensure_trailing_newline(md: &str) -> String {
    let trimmed = md.trim_end_matches('\n');
    format!("{trimmed}\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_mdx_fence() {
        let raw = "```mdx\n---\ntitle: x\n---\n\nBody\n```\n";
        assert_eq!(strip_wrapping_fence(raw), "---\ntitle: x\n---\n\nBody");
    }

    #[test]
    fn unfenced_text_is_trimmed() {
        assert_eq!(strip_wrapping_fence("\n  ---\nbody\n"), "---\nbody");
    }

    #[test]
    fn demotes_h1_outside_code() {
        let md = "# Title\n\n```bash\n# comment\n```\n\n## Section";
        let cleaned = clean_body(md);
        assert!(cleaned.starts_with("## Title"));
        assert!(cleaned.contains("\n# comment\n"));
        assert!(cleaned.contains("\n## Section\n"));
    }

    #[test]
    fn collapses_blank_lines_and_trailing_space() {
        let md = "Para one.   \n\n\n\nPara two.\n\n\n";
        assert_eq!(clean_body(md), "Para one.\n\nPara two.\n");
    }
}
