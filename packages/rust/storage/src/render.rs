//! Markdown view of the strategy document.

use std::fmt::Write;

use seoagent_shared::{StrategyDocument, position_label};

/// Render the strategy document as the human-readable markdown file.
///
/// Layout: title and context, the keyword tracking table, the content
/// backlog (written topics struck through with their slug), then the
/// session log with one `###` heading per dated entry.
pub fn render_markdown(doc: &StrategyDocument) -> String {
    let mut out = String::new();
    out.push_str("# SEO Strategy\n\n");

    if !doc.context.trim().is_empty() {
        out.push_str(doc.context.trim());
        out.push_str("\n\n");
    }

    out.push_str("## Keyword Tracking\n\n");
    out.push_str("| # | Keyword | Current Position | Last Checked |\n");
    out.push_str("|---|---------|------------------|--------------|\n");
    for (i, state) in doc.keywords.iter().enumerate() {
        let checked = state
            .last_checked
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "never".to_string());
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} |",
            i + 1,
            state.keyword.replace('|', "/"),
            position_label(state.current),
            checked
        );
    }
    out.push('\n');

    out.push_str("## Content to create\n\n");
    if doc.backlog.is_empty() {
        out.push_str("_Backlog is empty._\n");
    }
    for (i, topic) in doc.backlog.iter().enumerate() {
        let line = match &topic.notes {
            Some(notes) if !notes.trim().is_empty() => {
                format!("{} - {}", topic.keyword, notes.trim())
            }
            _ => topic.keyword.clone(),
        };
        match &topic.completed_slug {
            Some(slug) => {
                let _ = writeln!(out, "{}. ~~{line}~~ (done: `{slug}`)", i + 1);
            }
            None => {
                let _ = writeln!(out, "{}. {line}", i + 1);
            }
        }
    }
    out.push('\n');

    out.push_str("## Session Log\n");
    for entry in &doc.session_log {
        let _ = write!(
            out,
            "\n### {}\n\n{}\n",
            entry.date.format("%Y-%m-%d"),
            entry.summary.trim()
        );
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use seoagent_shared::{BacklogTopic, KeywordState, SessionEntry};

    #[test]
    fn renders_all_sections() {
        let doc = StrategyDocument {
            context: "Mobile wheel repair across Devon.".into(),
            keywords: vec![
                KeywordState {
                    keyword: "alloy wheel repair exeter".into(),
                    current: Some(8.0),
                    previous: Some(9.0),
                    last_checked: NaiveDate::from_ymd_opt(2026, 10, 16),
                },
                KeywordState::new("kerb damage repair"),
            ],
            backlog: vec![
                BacklogTopic {
                    keyword: "diamond cut wheel repair".into(),
                    notes: Some("cover cost and turnaround".into()),
                    completed_slug: Some("diamond-cut-wheel-repair".into()),
                },
                BacklogTopic {
                    keyword: "bumper scuff repair".into(),
                    notes: None,
                    completed_slug: None,
                },
            ],
            session_log: vec![SessionEntry {
                date: NaiveDate::from_ymd_opt(2026, 10, 16).unwrap(),
                summary: "Wrote the diamond cut article.".into(),
            }],
        };

        let md = render_markdown(&doc);
        assert!(md.starts_with("# SEO Strategy\n\nMobile wheel repair across Devon."));
        assert!(md.contains("| 1 | alloy wheel repair exeter | Position 8 | 2026-10-16 |"));
        assert!(md.contains("| 2 | kerb damage repair | not indexed yet | never |"));
        assert!(md.contains(
            "1. ~~diamond cut wheel repair - cover cost and turnaround~~ (done: `diamond-cut-wheel-repair`)"
        ));
        assert!(md.contains("2. bumper scuff repair\n"));
        assert!(md.contains("### 2026-10-16\n\nWrote the diamond cut article."));
    }

    #[test]
    fn empty_document_still_has_headings() {
        let md = render_markdown(&StrategyDocument::default());
        assert!(md.contains("## Keyword Tracking"));
        assert!(md.contains("_Backlog is empty._"));
        assert!(md.contains("## Session Log"));
    }
}
