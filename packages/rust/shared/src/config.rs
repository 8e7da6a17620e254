//! Application configuration for seo-agent.
//!
//! The config is read once at process start from `seo-agent.toml` and passed
//! by reference through the pipeline. Secrets never live in the file: each
//! section names the environment variable that holds its secret.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SeoAgentError};
use crate::types::Pillar;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "seo-agent.toml";

/// Fallback config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".seo-agent";

// ---------------------------------------------------------------------------
// Config structs (matching seo-agent.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub site: SiteConfig,

    #[serde(default)]
    pub openrouter: OpenRouterConfig,

    #[serde(default)]
    pub search_console: SearchConsoleConfig,

    #[serde(default)]
    pub content: ContentConfig,

    #[serde(default)]
    pub competitor_scan: CompetitorScanConfig,

    /// Competitor roster.
    #[serde(default)]
    pub competitors: Vec<CompetitorConfig>,

    #[serde(default)]
    pub publish: PublishConfig,

    #[serde(default)]
    pub email: EmailConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Hero image pools, matched against topic keywords in order.
    #[serde(default = "default_image_pools")]
    pub image_pools: Vec<ImagePool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            site: SiteConfig::default(),
            openrouter: OpenRouterConfig::default(),
            search_console: SearchConsoleConfig::default(),
            content: ContentConfig::default(),
            competitor_scan: CompetitorScanConfig::default(),
            competitors: Vec::new(),
            publish: PublishConfig::default(),
            email: EmailConfig::default(),
            telemetry: TelemetryConfig::default(),
            image_pools: default_image_pools(),
        }
    }
}

/// `[site]` section: where things live in the website repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Business name used in prompts and the report.
    #[serde(default = "default_site_name")]
    pub name: String,
    /// Public origin of the site.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Root of the git working tree.
    #[serde(default = "default_repo_root")]
    pub repo_root: PathBuf,
    /// Content asset directory, relative to `repo_root`.
    #[serde(default = "default_content_dir")]
    pub content_dir: PathBuf,
    /// App-router page directory scanned for site routes, relative to `repo_root`.
    #[serde(default = "default_pages_dir")]
    pub pages_dir: PathBuf,
    /// Typed strategy store, relative to `repo_root`.
    #[serde(default = "default_strategy_state")]
    pub strategy_state: PathBuf,
    /// Human-readable rendering of the strategy store, relative to `repo_root`.
    #[serde(default = "default_strategy_doc")]
    pub strategy_doc: PathBuf,
    /// Author written into new assets.
    #[serde(default = "default_author")]
    pub author: String,
    /// Route prefix of blog posts; internal links are `[text](/blog/slug)`.
    #[serde(default = "default_blog_prefix")]
    pub blog_prefix: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: default_site_name(),
            base_url: default_base_url(),
            repo_root: default_repo_root(),
            content_dir: default_content_dir(),
            pages_dir: default_pages_dir(),
            strategy_state: default_strategy_state(),
            strategy_doc: default_strategy_doc(),
            author: default_author(),
            blog_prefix: default_blog_prefix(),
        }
    }
}

impl SiteConfig {
    pub fn content_path(&self) -> PathBuf {
        self.repo_root.join(&self.content_dir)
    }

    pub fn pages_path(&self) -> PathBuf {
        self.repo_root.join(&self.pages_dir)
    }

    pub fn strategy_state_path(&self) -> PathBuf {
        self.repo_root.join(&self.strategy_state)
    }

    pub fn strategy_doc_path(&self) -> PathBuf {
        self.repo_root.join(&self.strategy_doc)
    }
}

fn default_site_name() -> String {
    "Exeter Alloy Wheel Repair".into()
}
fn default_base_url() -> String {
    "https://www.example.co.uk".into()
}
fn default_repo_root() -> PathBuf {
    PathBuf::from(".")
}
fn default_content_dir() -> PathBuf {
    PathBuf::from("content/blog")
}
fn default_pages_dir() -> PathBuf {
    PathBuf::from("app")
}
fn default_strategy_state() -> PathBuf {
    PathBuf::from("docs/seo-strategy.json")
}
fn default_strategy_doc() -> PathBuf {
    PathBuf::from("docs/seo-strategy.md")
}
fn default_author() -> String {
    "The Workshop Team".into()
}
fn default_blog_prefix() -> String {
    "/blog".into()
}

/// `[openrouter]` section: the generative text service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for every generation task.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Chat-completions base URL.
    #[serde(default = "default_openrouter_url")]
    pub base_url: String,

    /// Request timeout in seconds.
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            default_model: default_model(),
            base_url: default_openrouter_url(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_openrouter_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_generation_timeout() -> u64 {
    180
}

/// `[search_console]` section: the search-analytics provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConsoleConfig {
    /// Property identifier, e.g. `sc-domain:example.co.uk`.
    #[serde(default)]
    pub site_url: String,
    /// Env var holding an OAuth access token.
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,
    #[serde(default = "default_search_console_url")]
    pub base_url: String,
    /// Trailing window in days.
    #[serde(default = "default_window_days")]
    pub window_days: u32,
    #[serde(default = "default_short_timeout")]
    pub timeout_secs: u64,
}

impl Default for SearchConsoleConfig {
    fn default() -> Self {
        Self {
            site_url: String::new(),
            access_token_env: default_access_token_env(),
            base_url: default_search_console_url(),
            window_days: default_window_days(),
            timeout_secs: default_short_timeout(),
        }
    }
}

fn default_access_token_env() -> String {
    "GSC_ACCESS_TOKEN".into()
}
fn default_search_console_url() -> String {
    "https://searchconsole.googleapis.com/webmasters/v3".into()
}
fn default_window_days() -> u32 {
    28
}
fn default_short_timeout() -> u64 {
    30
}

/// `[content]` section: selector and generator thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    #[serde(default = "default_min_words")]
    pub min_words: usize,
    #[serde(default = "default_max_words")]
    pub max_words: usize,
    /// Assets younger than this are never refreshed.
    #[serde(default = "default_refresh_min_age")]
    pub refresh_min_age_days: i64,
    /// Unranked assets older than this are refreshed.
    #[serde(default = "default_stale_unranked")]
    pub stale_unranked_days: i64,
    /// Position drop that triggers a refresh.
    #[serde(default = "default_regression_threshold")]
    pub regression_threshold: f64,
    /// Internal links each asset should carry.
    #[serde(default = "default_target_links")]
    pub target_links: usize,
    /// Pillar used when the generated document omits one.
    #[serde(default = "default_pillar")]
    pub default_pillar: Pillar,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            min_words: default_min_words(),
            max_words: default_max_words(),
            refresh_min_age_days: default_refresh_min_age(),
            stale_unranked_days: default_stale_unranked(),
            regression_threshold: default_regression_threshold(),
            target_links: default_target_links(),
            default_pillar: default_pillar(),
        }
    }
}

fn default_min_words() -> usize {
    1000
}
fn default_max_words() -> usize {
    1500
}
fn default_refresh_min_age() -> i64 {
    60
}
fn default_stale_unranked() -> i64 {
    120
}
fn default_regression_threshold() -> f64 {
    5.0
}
fn default_target_links() -> usize {
    3
}
fn default_pillar() -> Pillar {
    Pillar::General
}

/// `[competitor_scan]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompetitorScanConfig {
    /// Per-request timeout for sitemap fetches.
    #[serde(default = "default_sitemap_timeout")]
    pub timeout_secs: u64,
    /// Child sitemaps followed per sitemap index.
    #[serde(default = "default_max_child_sitemaps")]
    pub max_child_sitemaps: usize,
    /// Only pages modified within this many months are reported.
    #[serde(default = "default_recent_months")]
    pub recent_months: u32,
    /// Pages kept per competitor.
    #[serde(default = "default_top_pages")]
    pub top_pages: usize,
}

impl Default for CompetitorScanConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_sitemap_timeout(),
            max_child_sitemaps: default_max_child_sitemaps(),
            recent_months: default_recent_months(),
            top_pages: default_top_pages(),
        }
    }
}

fn default_sitemap_timeout() -> u64 {
    10
}
fn default_max_child_sitemaps() -> usize {
    5
}
fn default_recent_months() -> u32 {
    3
}
fn default_top_pages() -> usize {
    10
}

/// `[[competitors]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompetitorConfig {
    pub name: String,
    pub domain: String,
    pub sitemap_url: String,
}

/// `[publish]` section: how state is committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_remote")]
    pub remote: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_bot_name")]
    pub bot_name: String,
    #[serde(default = "default_bot_email")]
    pub bot_email: String,
    /// Timeout for each git invocation.
    #[serde(default = "default_git_timeout")]
    pub timeout_secs: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            remote: default_remote(),
            branch: default_branch(),
            bot_name: default_bot_name(),
            bot_email: default_bot_email(),
            timeout_secs: default_git_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_remote() -> String {
    "origin".into()
}
fn default_branch() -> String {
    "main".into()
}
fn default_bot_name() -> String {
    "seo-agent[bot]".into()
}
fn default_bot_email() -> String {
    "seo-agent@users.noreply.github.com".into()
}
fn default_git_timeout() -> u64 {
    120
}

/// `[email]` section: report delivery over SMTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub username: String,
    /// Env var holding the SMTP password.
    #[serde(default = "default_password_env")]
    pub password_env: String,
    #[serde(default = "default_from")]
    pub from: String,
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default = "default_short_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            username: String::new(),
            password_env: default_password_env(),
            from: default_from(),
            to: Vec::new(),
            timeout_secs: default_short_timeout(),
        }
    }
}

impl EmailConfig {
    /// Whether enough is configured to attempt delivery.
    pub fn is_configured(&self) -> bool {
        !self.smtp_host.is_empty() && !self.to.is_empty()
    }
}

fn default_smtp_port() -> u16 {
    587
}
fn default_password_env() -> String {
    "SMTP_PASSWORD".into()
}
fn default_from() -> String {
    "SEO Agent <seo-agent@example.co.uk>".into()
}

/// `[telemetry]` section: the run-record store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Local path, or a `libsql://` / `https://` URL for a remote database.
    #[serde(default = "default_database")]
    pub database: String,
    /// Env var holding the auth token for remote databases.
    #[serde(default = "default_auth_token_env")]
    pub auth_token_env: String,
    /// Deadline for opening the store and for each read or write.
    #[serde(default = "default_short_timeout")]
    pub timeout_secs: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            auth_token_env: default_auth_token_env(),
            timeout_secs: default_short_timeout(),
        }
    }
}

impl TelemetryConfig {
    pub fn is_remote(&self) -> bool {
        self.database.starts_with("libsql://") || self.database.starts_with("https://")
    }
}

fn default_database() -> String {
    ".seo-agent/runs.db".into()
}
fn default_auth_token_env() -> String {
    "TELEMETRY_AUTH_TOKEN".into()
}

/// `[[image_pools]]` entry: topic patterns mapped to a set of hero images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagePool {
    pub category: String,
    /// Case-insensitive substrings matched against the topic.
    pub patterns: Vec<String>,
    pub images: Vec<String>,
}

fn default_image_pools() -> Vec<ImagePool> {
    let pool = |category: &str, patterns: &[&str], images: &[&str]| ImagePool {
        category: category.into(),
        patterns: patterns.iter().map(|p| (*p).into()).collect(),
        images: images.iter().map(|i| (*i).into()).collect(),
    };
    vec![
        pool(
            "alloy",
            &["alloy", "wheel", "rim", "kerb", "curb", "diamond cut"],
            &[
                "/images/blog/alloy-refurb-1.jpg",
                "/images/blog/alloy-refurb-2.jpg",
                "/images/blog/diamond-cut.jpg",
                "/images/blog/kerb-damage.jpg",
            ],
        ),
        pool(
            "bodywork",
            &["scratch", "dent", "bumper", "paint", "scuff", "smart repair"],
            &[
                "/images/blog/bumper-scuff.jpg",
                "/images/blog/paint-match.jpg",
                "/images/blog/dent-repair.jpg",
            ],
        ),
        pool(
            "general",
            &[],
            &[
                "/images/blog/workshop.jpg",
                "/images/blog/mobile-van.jpg",
            ],
        ),
    ]
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the fallback config directory (`~/.seo-agent/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| SeoAgentError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Resolve which config file to read.
///
/// An explicit path wins, then `./seo-agent.toml`, then `~/.seo-agent/seo-agent.toml`.
/// Returns `None` when no file exists (defaults apply).
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(SeoAgentError::config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        return Ok(Some(path.to_path_buf()));
    }

    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return Ok(Some(local));
    }

    let home = config_dir()?.join(CONFIG_FILE_NAME);
    if home.exists() {
        return Ok(Some(home));
    }

    Ok(None)
}

/// Load the application config. Returns defaults if no file exists.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    match resolve_config_path(explicit)? {
        Some(path) => load_config_from(&path),
        None => {
            tracing::debug!("config file not found, using defaults");
            Ok(AppConfig::default())
        }
    }
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| SeoAgentError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        SeoAgentError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Write a default config file to `./seo-agent.toml`.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let path = PathBuf::from(CONFIG_FILE_NAME);
    if path.exists() {
        return Err(SeoAgentError::config(format!(
            "{} already exists",
            path.display()
        )));
    }

    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SeoAgentError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SeoAgentError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the OpenRouter API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    let var_name = &config.openrouter.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(()),
        _ => Err(SeoAgentError::config(format!(
            "OpenRouter API key not found. Set the {var_name} environment variable.\n\
             Get a key at https://openrouter.ai/keys"
        ))),
    }
}
