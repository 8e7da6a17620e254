//! Typed strategy store.
//!
//! The strategy document (keyword tracking, topic backlog, session log) is
//! persisted as a JSON file committed alongside the site. A markdown rendering
//! is written next to it on every save for human readers; it is never parsed
//! back during a run.

use std::path::{Path, PathBuf};

use seoagent_shared::{
    BacklogTopic, KeywordState, Result, SeoAgentError, SessionEntry, StrategyDocument,
};
use tracing::{debug, info};

use crate::render::render_markdown;

/// Repository interface over the strategy document.
pub trait StrategyRepository {
    /// Current state of a tracked keyword (case-insensitive).
    fn get_keyword_state(&self, keyword: &str) -> Option<&KeywordState>;

    /// Insert or replace the row for `state.keyword`. Never creates duplicates.
    fn upsert_keyword_state(&mut self, state: KeywordState);

    /// Append one dated entry to the session log.
    fn append_session_entry(&mut self, entry: SessionEntry);

    /// Mark a backlog topic as written. Returns `false` if no open topic matched.
    fn complete_backlog_topic(&mut self, keyword: &str, slug: &str) -> bool;

    /// The whole document, for prompts and rendering.
    fn document(&self) -> &StrategyDocument;

    /// Tracked keywords in table order.
    fn keywords(&self) -> Vec<String> {
        self.document()
            .keywords
            .iter()
            .map(|k| k.keyword.clone())
            .collect()
    }

    /// Backlog topics not yet written, in priority order.
    fn open_backlog(&self) -> Vec<&BacklogTopic> {
        self.document()
            .backlog
            .iter()
            .filter(|t| t.completed_slug.is_none())
            .collect()
    }
}

/// Normalise a keyword for identity comparisons.
pub fn keyword_key(keyword: &str) -> String {
    keyword.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// File-backed [`StrategyRepository`].
#[derive(Debug, Clone)]
pub struct StrategyStore {
    doc: StrategyDocument,
    state_path: PathBuf,
    doc_path: PathBuf,
    dirty: bool,
}

impl StrategyStore {
    /// Load the store from `state_path`. A missing file yields an empty document.
    pub fn open(state_path: &Path, doc_path: &Path) -> Result<Self> {
        let doc = if state_path.exists() {
            let content = std::fs::read_to_string(state_path)
                .map_err(|e| SeoAgentError::io(state_path, e))?;
            serde_json::from_str(&content).map_err(|e| {
                SeoAgentError::Storage(format!(
                    "invalid strategy state {}: {e}",
                    state_path.display()
                ))
            })?
        } else {
            debug!(path = %state_path.display(), "strategy state not found, starting empty");
            StrategyDocument::default()
        };

        Ok(Self::from_document(doc, state_path, doc_path))
    }

    /// Wrap an in-memory document. Duplicate keyword rows are collapsed (first wins).
    pub fn from_document(doc: StrategyDocument, state_path: &Path, doc_path: &Path) -> Self {
        let mut store = Self {
            doc: StrategyDocument {
                keywords: Vec::new(),
                ..doc.clone()
            },
            state_path: state_path.to_path_buf(),
            doc_path: doc_path.to_path_buf(),
            dirty: false,
        };
        for state in doc.keywords {
            if store.get_keyword_state(&state.keyword).is_none() {
                store.doc.keywords.push(state);
            }
        }
        store
    }

    /// Whether anything changed since the last load or save.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Files written by [`save`](Self::save).
    pub fn paths(&self) -> [&Path; 2] {
        [&self.state_path, &self.doc_path]
    }

    /// Write the JSON state and its markdown rendering.
    pub fn save(&mut self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.doc)
            .map_err(|e| SeoAgentError::Storage(format!("failed to serialize strategy: {e}")))?;
        write_file(&self.state_path, &format!("{json}\n"))?;
        write_file(&self.doc_path, &render_markdown(&self.doc))?;

        info!(
            keywords = self.doc.keywords.len(),
            backlog = self.doc.backlog.len(),
            sessions = self.doc.session_log.len(),
            "strategy saved"
        );
        self.dirty = false;
        Ok(())
    }

    /// Replace the whole document (used by the legacy importer).
    pub fn replace_document(&mut self, doc: StrategyDocument) {
        *self = Self::from_document(doc, &self.state_path.clone(), &self.doc_path.clone());
        self.dirty = true;
    }
}

impl StrategyRepository for StrategyStore {
    fn get_keyword_state(&self, keyword: &str) -> Option<&KeywordState> {
        let key = keyword_key(keyword);
        self.doc
            .keywords
            .iter()
            .find(|k| keyword_key(&k.keyword) == key)
    }

    fn upsert_keyword_state(&mut self, state: KeywordState) {
        let key = keyword_key(&state.keyword);
        match self
            .doc
            .keywords
            .iter_mut()
            .find(|k| keyword_key(&k.keyword) == key)
        {
            Some(existing) => *existing = state,
            None => self.doc.keywords.push(state),
        }
        self.dirty = true;
    }

    fn append_session_entry(&mut self, entry: SessionEntry) {
        self.doc.session_log.push(entry);
        self.dirty = true;
    }

    fn complete_backlog_topic(&mut self, keyword: &str, slug: &str) -> bool {
        let key = keyword_key(keyword);
        let topic = self
            .doc
            .backlog
            .iter_mut()
            .find(|t| t.completed_slug.is_none() && keyword_key(&t.keyword) == key);
        match topic {
            Some(t) => {
                t.completed_slug = Some(slug.to_string());
                self.dirty = true;
                true
            }
            None => false,
        }
    }

    fn document(&self) -> &StrategyDocument {
        &self.doc
    }
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| SeoAgentError::io(parent, e))?;
    }
    std::fs::write(path, content).map_err(|e| SeoAgentError::io(path, e))
}
