//! Publisher: persists the run's state through git.
//!
//! The strategy store is always saved to disk. When publishing is enabled
//! the store plus the changed content is staged, committed under the bot
//! identity, rebased onto the remote branch once and pushed. An empty
//! staged diff is a successful no-op.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use seoagent_shared::{PublishConfig, Result, SeoAgentError};
use seoagent_storage::StrategyStore;

/// Captured result of one git invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GitOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    fn into_checked(self, args: &[&str]) -> Result<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(SeoAgentError::Git(format!(
                "git {} failed ({}): {}",
                args.join(" "),
                self.code.map_or_else(|| "signal".into(), |c| c.to_string()),
                self.stderr.trim()
            )))
        }
    }
}

/// Runs git in the site repository.
#[async_trait]
pub trait GitRunner: Send + Sync {
    /// Run `git <args>`. A non-zero exit is a normal [`GitOutput`]; only
    /// spawn failures and timeouts are errors.
    async fn run(&self, args: &[&str]) -> Result<GitOutput>;
}

/// [`GitRunner`] backed by the `git` binary.
pub struct CommandGitRunner {
    repo_root: PathBuf,
    timeout: Duration,
}

impl CommandGitRunner {
    pub fn new(repo_root: impl Into<PathBuf>, timeout_secs: u64) -> Self {
        Self {
            repo_root: repo_root.into(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

#[async_trait]
impl GitRunner for CommandGitRunner {
    async fn run(&self, args: &[&str]) -> Result<GitOutput> {
        debug!(?args, dir = %self.repo_root.display(), "running git");

        let child = Command::new("git")
            .args(args)
            .current_dir(&self.repo_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| {
                SeoAgentError::Git(format!(
                    "git {} timed out after {}s",
                    args.join(" "),
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| SeoAgentError::Git(format!("failed to spawn git: {e}")))?;

        Ok(GitOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

// ---------------------------------------------------------------------------
// Publishing
// ---------------------------------------------------------------------------

/// What the publisher did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// A commit was created and pushed.
    Committed { message: String, paths: Vec<String> },
    /// Nothing was staged.
    NoChanges,
    /// Publishing disabled for this run; state was saved locally only.
    Skipped,
}

/// Content files changed this run.
#[derive(Debug, Clone)]
pub struct ChangeSet<'a> {
    pub files: &'a [PathBuf],
    pub content_dir: &'a Path,
}

pub struct Publisher<'a> {
    pub git: &'a dyn GitRunner,
    pub config: &'a PublishConfig,
    pub repo_root: &'a Path,
}

impl Publisher<'_> {
    /// Save the strategy store and, if enabled, commit and push.
    #[instrument(skip_all, fields(enabled = self.config.enabled, files = changes.files.len()))]
    pub async fn publish(
        &self,
        strategy: &mut StrategyStore,
        changes: &ChangeSet<'_>,
        message: &str,
    ) -> Result<PublishOutcome> {
        strategy.save()?;

        if !self.config.enabled {
            info!("publishing disabled, state saved locally");
            return Ok(PublishOutcome::Skipped);
        }

        let mut paths: Vec<String> = strategy
            .paths()
            .iter()
            .map(|p| self.relative(p))
            .collect();
        match changes.files {
            [] => {}
            [single] => paths.push(self.relative(single)),
            _ => paths.push(self.relative(changes.content_dir)),
        }

        let mut add: Vec<&str> = vec!["add", "--"];
        add.extend(paths.iter().map(String::as_str));
        self.checked(&add).await?;

        let diff = self.git.run(&["diff", "--cached", "--quiet"]).await?;
        let code = diff.code;
        match code {
            Some(0) => {
                info!("nothing staged, skipping commit");
                return Ok(PublishOutcome::NoChanges);
            }
            Some(1) => {}
            _ => {
                diff.into_checked(&["diff", "--cached", "--quiet"])?;
            }
        }

        let name = format!("user.name={}", self.config.bot_name);
        let email = format!("user.email={}", self.config.bot_email);
        self.checked(&[
            "-c",
            name.as_str(),
            "-c",
            email.as_str(),
            "commit",
            "--quiet",
            "-m",
            message,
        ])
        .await?;

        let remote = self.config.remote.as_str();
        let branch = self.config.branch.as_str();
        let rebase = self.git.run(&["pull", "--rebase", remote, branch]).await?;
        if !rebase.success {
            warn!(stderr = %rebase.stderr.trim(), "rebase failed, aborting");
            if let Err(e) = self.git.run(&["rebase", "--abort"]).await {
                warn!(error = %e, "rebase --abort failed");
            }
            return Err(SeoAgentError::Git(format!(
                "could not rebase onto {remote}/{branch}: {}",
                rebase.stderr.trim()
            )));
        }

        let refspec = format!("HEAD:{branch}");
        self.checked(&["push", remote, refspec.as_str()]).await?;

        info!(paths = paths.len(), %remote, %branch, "changes published");
        Ok(PublishOutcome::Committed {
            message: message.to_string(),
            paths,
        })
    }

    async fn checked(&self, args: &[&str]) -> Result<GitOutput> {
        self.git.run(args).await?.into_checked(args)
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(self.repo_root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use chrono::NaiveDate;
    use seoagent_shared::{SessionEntry, StrategyDocument};
    use seoagent_storage::StrategyRepository;
    use uuid::Uuid;

    /// Records every call; answers from a script keyed by the git subcommand.
    #[derive(Default)]
    struct RecordingGit {
        calls: Mutex<Vec<Vec<String>>>,
        staged_diff: bool,
        rebase_fails: bool,
    }

    impl RecordingGit {
        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }

        fn subcommands(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .map(|args| {
                    args.into_iter()
                        .find(|a| !a.starts_with('-') && !a.contains('='))
                        .unwrap_or_default()
                })
                .collect()
        }
    }

    #[async_trait]
    impl GitRunner for RecordingGit {
        async fn run(&self, args: &[&str]) -> Result<GitOutput> {
            self.calls
                .lock()
                .unwrap()
                .push(args.iter().map(|a| a.to_string()).collect());

            let ok = GitOutput {
                success: true,
                code: Some(0),
                ..Default::default()
            };
            let failed = GitOutput {
                success: false,
                code: Some(1),
                stderr: "CONFLICT (content): Merge conflict in docs/seo-strategy.md".into(),
                ..Default::default()
            };
            Ok(match args {
                ["diff", ..] if self.staged_diff => failed,
                ["pull", ..] if self.rebase_fails => failed,
                _ => ok,
            })
        }
    }

    fn temp_root() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("seoagent_publish_{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn store(root: &Path) -> StrategyStore {
        let mut store = StrategyStore::from_document(
            StrategyDocument::default(),
            &root.join("docs/seo-strategy.json"),
            &root.join("docs/seo-strategy.md"),
        );
        store.append_session_entry(SessionEntry {
            date: NaiveDate::from_ymd_opt(2026, 10, 16).unwrap(),
            summary: "run".into(),
        });
        store
    }

    fn publisher<'a>(git: &'a RecordingGit, config: &'a PublishConfig, root: &'a Path) -> Publisher<'a> {
        Publisher {
            git,
            config,
            repo_root: root,
        }
    }

    #[tokio::test]
    async fn empty_diff_is_a_noop() {
        let root = temp_root();
        let git = RecordingGit::default();
        let config = PublishConfig::default();
        let mut strategy = store(&root);
        let changes = ChangeSet {
            files: &[],
            content_dir: &root.join("content/blog"),
        };

        let outcome = publisher(&git, &config, &root)
            .publish(&mut strategy, &changes, "seo-agent: run")
            .await
            .unwrap();
        assert_eq!(outcome, PublishOutcome::NoChanges);
        assert_eq!(git.subcommands(), vec!["add", "diff"]);
        assert!(root.join("docs/seo-strategy.json").exists());
        assert!(root.join("docs/seo-strategy.md").exists());
    }

    #[tokio::test]
    async fn single_file_commit_rebase_push() {
        let root = temp_root();
        let git = RecordingGit {
            staged_diff: true,
            ..Default::default()
        };
        let config = PublishConfig::default();
        let mut strategy = store(&root);
        let files = vec![root.join("content/blog/2026-10-new-post.mdx")];
        let changes = ChangeSet {
            files: &files,
            content_dir: &root.join("content/blog"),
        };

        let outcome = publisher(&git, &config, &root)
            .publish(&mut strategy, &changes, "seo-agent: run")
            .await
            .unwrap();
        assert!(matches!(outcome, PublishOutcome::Committed { .. }));
        assert_eq!(git.subcommands(), vec!["add", "diff", "commit", "pull", "push"]);

        let calls = git.calls();
        assert_eq!(
            calls[0],
            vec![
                "add",
                "--",
                "docs/seo-strategy.json",
                "docs/seo-strategy.md",
                "content/blog/2026-10-new-post.mdx"
            ]
        );
        assert!(calls[2].contains(&"user.name=seo-agent[bot]".to_string()));
        assert_eq!(calls[3], vec!["pull", "--rebase", "origin", "main"]);
        assert_eq!(calls[4], vec!["push", "origin", "HEAD:main"]);
    }

    #[tokio::test]
    async fn many_files_stage_content_dir() {
        let root = temp_root();
        let git = RecordingGit {
            staged_diff: true,
            ..Default::default()
        };
        let config = PublishConfig::default();
        let mut strategy = store(&root);
        let files = vec![
            root.join("content/blog/a.mdx"),
            root.join("content/blog/b.mdx"),
        ];
        let changes = ChangeSet {
            files: &files,
            content_dir: &root.join("content/blog"),
        };

        publisher(&git, &config, &root)
            .publish(&mut strategy, &changes, "m")
            .await
            .unwrap();
        assert_eq!(git.calls()[0].last().unwrap(), "content/blog");
    }

    #[tokio::test]
    async fn failed_rebase_aborts_and_fails() {
        let root = temp_root();
        let git = RecordingGit {
            staged_diff: true,
            rebase_fails: true,
            ..Default::default()
        };
        let config = PublishConfig::default();
        let mut strategy = store(&root);
        let changes = ChangeSet {
            files: &[],
            content_dir: &root.join("content/blog"),
        };

        let err = publisher(&git, &config, &root)
            .publish(&mut strategy, &changes, "m")
            .await
            .unwrap_err();
        assert!(matches!(err, SeoAgentError::Git(_)));
        assert!(err.to_string().contains("CONFLICT"));
        assert_eq!(git.subcommands(), vec!["add", "diff", "commit", "pull", "rebase"]);
    }

    #[tokio::test]
    async fn disabled_saves_without_git() {
        let root = temp_root();
        let git = RecordingGit::default();
        let config = PublishConfig {
            enabled: false,
            ..Default::default()
        };
        let mut strategy = store(&root);
        let changes = ChangeSet {
            files: &[],
            content_dir: &root.join("content/blog"),
        };

        let outcome = publisher(&git, &config, &root)
            .publish(&mut strategy, &changes, "m")
            .await
            .unwrap();
        assert_eq!(outcome, PublishOutcome::Skipped);
        assert!(git.calls().is_empty());
        assert!(!strategy.is_dirty());
        assert!(root.join("docs/seo-strategy.md").exists());
    }
}
