//! One-shot import of a hand-maintained strategy markdown file.
//!
//! Accepts the layout produced by [`render_markdown`](crate::render_markdown)
//! as well as older hand-edited variants: a keyword table under a heading
//! mentioning "keyword", a numbered or bulleted backlog under a heading
//! mentioning "content" or "backlog", and a session log of `###` dated
//! entries under a heading mentioning "session".

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use seoagent_shared::{
    BacklogTopic, KeywordState, Result, SeoAgentError, SessionEntry, StrategyDocument,
    parse_position,
};
use tracing::{debug, warn};

use crate::strategy::keyword_key;

static LIST_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:\d+[.)]|[-*+])\s+(.+)$").expect("list item regex"));

static DONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^~~(.+?)~~\s*(?:\(done:\s*`?([a-z0-9-]+)`?\))?").expect("done regex")
});

static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4}-\d{2}-\d{2})").expect("date regex"));

/// A `## ` section of the legacy file.
struct Section<'a> {
    heading: String,
    lines: Vec<&'a str>,
}

/// Parse a legacy strategy markdown file into a [`StrategyDocument`].
///
/// Duplicate keyword rows collapse to the first occurrence. Fails only when
/// no keyword table can be found at all.
pub fn import_legacy_markdown(markdown: &str) -> Result<StrategyDocument> {
    let (preamble, sections) = split_sections(markdown);

    let mut doc = StrategyDocument {
        context: preamble
            .iter()
            .filter(|l| !l.starts_with("# "))
            .copied()
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string(),
        ..Default::default()
    };

    let mut found_table = false;
    for section in &sections {
        let heading = section.heading.to_lowercase();
        if heading.contains("keyword") {
            found_table = true;
            for state in parse_keyword_table(&section.lines) {
                if doc
                    .keywords
                    .iter()
                    .any(|k| keyword_key(&k.keyword) == keyword_key(&state.keyword))
                {
                    warn!(keyword = %state.keyword, "duplicate keyword row ignored");
                    continue;
                }
                doc.keywords.push(state);
            }
        } else if heading.contains("session") {
            doc.session_log.extend(parse_session_log(&section.lines));
        } else if heading.contains("content") || heading.contains("backlog") {
            doc.backlog.extend(parse_backlog(&section.lines));
        } else {
            debug!(heading = %section.heading, "ignoring unrecognised section");
        }
    }

    if !found_table {
        return Err(SeoAgentError::parse(
            "no keyword tracking section found in strategy markdown",
        ));
    }

    Ok(doc)
}

fn split_sections(markdown: &str) -> (Vec<&str>, Vec<Section<'_>>) {
    let mut preamble = Vec::new();
    let mut sections: Vec<Section<'_>> = Vec::new();

    for line in markdown.lines() {
        if let Some(heading) = line.strip_prefix("## ") {
            sections.push(Section {
                heading: heading.trim().to_string(),
                lines: Vec::new(),
            });
        } else if let Some(current) = sections.last_mut() {
            current.lines.push(line);
        } else {
            preamble.push(line);
        }
    }
    (preamble, sections)
}

fn table_cells(line: &str) -> Option<Vec<String>> {
    let trimmed = line.trim();
    if !trimmed.starts_with('|') {
        return None;
    }
    let cells: Vec<String> = trimmed
        .trim_matches('|')
        .split('|')
        .map(|c| c.trim().replace("**", ""))
        .collect();
    Some(cells)
}

fn is_separator(cells: &[String]) -> bool {
    cells
        .iter()
        .all(|c| !c.is_empty() && c.chars().all(|ch| matches!(ch, '-' | ':' | ' ')))
}

fn parse_keyword_table(lines: &[&str]) -> Vec<KeywordState> {
    let mut states = Vec::new();
    let mut header_seen = false;

    for line in lines {
        let Some(cells) = table_cells(line) else {
            continue;
        };
        if is_separator(&cells) {
            continue;
        }
        if !header_seen {
            header_seen = true;
            if cells.iter().any(|c| c.eq_ignore_ascii_case("keyword")) {
                continue;
            }
        }

        // Leading row-number column is optional.
        let offset = usize::from(cells.first().is_some_and(|c| c.parse::<u32>().is_ok()));
        let Some(keyword) = cells.get(offset).filter(|k| !k.is_empty()) else {
            continue;
        };

        let current = cells.get(offset + 1).and_then(|c| parse_position(c));
        let last_checked = cells
            .get(offset + 2)
            .and_then(|c| DATE_RE.captures(c))
            .and_then(|c| NaiveDate::parse_from_str(&c[1], "%Y-%m-%d").ok());

        states.push(KeywordState {
            keyword: keyword.clone(),
            current,
            previous: None,
            last_checked,
        });
    }
    states
}

fn parse_backlog(lines: &[&str]) -> Vec<BacklogTopic> {
    lines
        .iter()
        .filter_map(|line| LIST_ITEM_RE.captures(line))
        .filter_map(|caps| {
            let item = caps[1].trim().replace("**", "");
            let (text, completed_slug) = match DONE_RE.captures(&item) {
                Some(done) => (
                    done[1].to_string(),
                    Some(
                        done.get(2)
                            .map(|m| m.as_str().to_string())
                            .unwrap_or_default(),
                    ),
                ),
                None => (item.clone(), None),
            };
            let (keyword, notes) = match text.split_once(" - ") {
                Some((k, n)) => (k.trim().to_string(), Some(n.trim().to_string())),
                None => (text.trim().to_string(), None),
            };
            (!keyword.is_empty()).then_some(BacklogTopic {
                keyword,
                notes,
                completed_slug,
            })
        })
        .collect()
}

fn parse_session_log(lines: &[&str]) -> Vec<SessionEntry> {
    let mut entries = Vec::new();
    let mut current: Option<(NaiveDate, Vec<&str>)> = None;

    for line in lines {
        if let Some(heading) = line.strip_prefix("### ") {
            push_entry(&mut entries, current.take());
            match DATE_RE
                .captures(heading)
                .and_then(|c| NaiveDate::parse_from_str(&c[1], "%Y-%m-%d").ok())
            {
                Some(date) => current = Some((date, Vec::new())),
                None => warn!(heading, "session entry without a date skipped"),
            }
        } else if let Some((_, body)) = current.as_mut() {
            body.push(line);
        }
    }
    push_entry(&mut entries, current);
    entries
}

fn push_entry(entries: &mut Vec<SessionEntry>, entry: Option<(NaiveDate, Vec<&str>)>) {
    if let Some((date, body)) = entry {
        entries.push(SessionEntry {
            date,
            summary: body.join("\n").trim().to_string(),
        });
    }
}
