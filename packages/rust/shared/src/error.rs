//! Error types for the seo-agent pipeline.
//!
//! Library crates use [`SeoAgentError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all seo-agent operations.
#[derive(Debug, thiserror::Error)]
pub enum SeoAgentError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error (sitemaps, APIs, SMTP transport setup).
    #[error("network error: {0}")]
    Network(String),

    /// Parsing error for documents, sitemaps, or service responses.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Strategy store or run-record store error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Generative text service error (transport, API, or empty response).
    #[error("generation error: {0}")]
    Generation(String),

    /// Search analytics provider error.
    #[error("analytics error: {0}")]
    Analytics(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (frontmatter schema, invalid values, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Version control error (commit, rebase, push).
    #[error("git error: {0}")]
    Git(String),

    /// Report delivery error.
    #[error("email error: {0}")]
    Email(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SeoAgentError>;

impl SeoAgentError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = SeoAgentError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = SeoAgentError::validation("description exceeds 160 characters");
        assert!(err.to_string().contains("160 characters"));

        let err = SeoAgentError::Git("rebase failed".into());
        assert_eq!(err.to_string(), "git error: rebase failed");
    }
}
