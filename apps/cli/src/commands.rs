//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use seoagent_competitors::CompetitorCollector;
use seoagent_core::{
    CommandGitRunner, Mailer, OpenRouterClient, Pipeline, ProgressReporter, RunContext,
    RunOptions, RunReport, SearchConsoleClient, Services, SmtpMailer,
};
use seoagent_shared::{
    AppConfig, ContentOutcome, Trigger, init_config, load_config, resolve_config_path,
    validate_api_key,
};
use seoagent_storage::{
    DeadlineRunStore, RunStore, Storage, StrategyRepository, StrategyStore, import_legacy_markdown,
    render_markdown, with_deadline,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// seo-agent: unattended monthly SEO content operations.
#[derive(Parser)]
#[command(
    name = "seo-agent",
    version,
    about = "Measure rankings, publish one article, maintain links and email a monthly SEO report.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ./seo-agent.toml, then ~/.seo-agent/seo-agent.toml).
    #[arg(long, global = true, env = "SEO_AGENT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// How the run was started.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum TriggerArg {
    Scheduled,
    Manual,
}

impl From<TriggerArg> for Trigger {
    fn from(arg: TriggerArg) -> Self {
        match arg {
            TriggerArg::Scheduled => Trigger::Scheduled,
            TriggerArg::Manual => Trigger::Manual,
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Execute the monthly pipeline once.
    Run {
        /// Recorded trigger of this run.
        #[arg(long, value_enum, default_value = "manual")]
        trigger: TriggerArg,

        /// Skip topic selection and article generation.
        #[arg(long)]
        no_content: bool,

        /// Save state locally without committing or pushing.
        #[arg(long)]
        no_publish: bool,

        /// Do not send the report email.
        #[arg(long)]
        no_email: bool,
    },

    /// Strategy document management.
    Strategy {
        #[command(subcommand)]
        action: StrategyAction,
    },

    /// List recent run records.
    Runs {
        /// Maximum number of runs to show.
        #[arg(long, default_value = "10")]
        limit: u32,

        /// Print full records as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Strategy subcommands.
#[derive(Subcommand)]
pub(crate) enum StrategyAction {
    /// Import a legacy markdown strategy document into the typed store.
    Import {
        /// Markdown file to import.
        file: PathBuf,
    },
    /// Print the markdown rendering of the current strategy.
    Render,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "seoagent=info",
        1 => "seoagent=debug",
        _ => "seoagent=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run {
            trigger,
            no_content,
            no_publish,
            no_email,
        } => {
            let mut options = RunOptions::new(trigger.into(), Local::now().date_naive());
            options.generate_content = !no_content;
            options.publish = !no_publish;
            options.send_email = !no_email;
            cmd_run(config_path, options).await
        }
        Command::Strategy { action } => match action {
            StrategyAction::Import { file } => cmd_strategy_import(config_path, &file),
            StrategyAction::Render => cmd_strategy_render(config_path),
        },
        Command::Runs { limit, json } => cmd_runs(config_path, limit, json).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

async fn cmd_run(config_path: Option<&Path>, options: RunOptions) -> Result<()> {
    let config = load_config(config_path)?;
    validate_api_key(&config)?;

    let services = build_services(&config).await?;
    info!(
        trigger = options.trigger.as_str(),
        publish = options.publish,
        email = options.send_email,
        "starting monthly run"
    );

    let mut ctx = RunContext::new(config, options, services);
    let reporter = CliProgress::new();
    let report = Pipeline::standard().run(&mut ctx, &reporter).await;

    print_report(&report);

    match report.failure {
        Some(failure) => Err(eyre!(
            "run failed during {}: {}",
            failure.stage,
            failure.error
        )),
        None => Ok(()),
    }
}

async fn build_services(config: &AppConfig) -> Result<Services> {
    let generator = OpenRouterClient::from_config(&config.openrouter)?;
    let analytics = SearchConsoleClient::from_config(&config.search_console)?;
    let git = CommandGitRunner::new(config.site.repo_root.clone(), config.publish.timeout_secs);
    let competitors = CompetitorCollector::new(&config.competitor_scan)?;

    let mailer = SmtpMailer::from_config(&config.email)?.map(|m| Box::new(m) as Box<dyn Mailer>);
    if mailer.is_none() {
        info!("email not configured, the report will not be sent");
    }

    let run_store = match Storage::open_from_config(&config.telemetry, &config.site.repo_root).await
    {
        Ok(storage) => {
            let timeout = Duration::from_secs(config.telemetry.timeout_secs);
            Some(Box::new(DeadlineRunStore::new(storage, timeout)) as Box<dyn RunStore>)
        }
        Err(e) => {
            warn!(error = %e, "run store unavailable, this run will not be recorded");
            None
        }
    };

    Ok(Services {
        generator: Box::new(generator),
        analytics: Box::new(analytics),
        git: Box::new(git),
        mailer,
        run_store,
        competitors,
    })
}

fn print_report(report: &RunReport) {
    let record = &report.record;
    println!();
    if report.succeeded() {
        println!("  Run completed.");
    } else {
        println!("  Run failed.");
    }
    println!("  ID:       {}", record.id);
    println!("  Status:   {}", record.status.as_str());
    match &record.content {
        Some(ContentOutcome::Created { path, .. }) => println!("  Created:  {path}"),
        Some(ContentOutcome::Refreshed { path, .. }) => println!("  Refreshed: {path}"),
        Some(ContentOutcome::Rejected { topic, reason }) => {
            println!("  Rejected: {topic} ({reason})")
        }
        _ => {}
    }
    println!(
        "  Keywords: {} tracked, {} indexed",
        record.metrics.keywords_tracked, record.metrics.keywords_indexed
    );
    println!(
        "  Links:    {} added",
        record.linking.iter().map(|l| l.links_added).sum::<usize>()
    );
    println!("  Time:     {:.1}s", record.duration_ms as f64 / 1000.0);
    println!("  Summary:  {}", record.summary);
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(format!("Running {name}"));
    }

    fn stage_finished(&self, name: &str) {
        self.spinner.println(format!("  ✓ {name}"));
    }

    fn done(&self, _report: &RunReport) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// strategy / runs / config
// ---------------------------------------------------------------------------

fn open_strategy(config: &AppConfig) -> Result<StrategyStore> {
    let site = &config.site;
    Ok(StrategyStore::open(
        &site.strategy_state_path(),
        &site.strategy_doc_path(),
    )?)
}

fn cmd_strategy_import(config_path: Option<&Path>, file: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let markdown = std::fs::read_to_string(file)
        .map_err(|e| eyre!("cannot read {}: {e}", file.display()))?;
    let doc = import_legacy_markdown(&markdown)?;

    let mut store = open_strategy(&config)?;
    store.replace_document(doc);
    store.save()?;

    let doc = store.document();
    info!(file = %file.display(), "strategy imported");
    println!("Imported {}:", file.display());
    println!("  Keywords: {}", doc.keywords.len());
    println!("  Backlog:  {}", doc.backlog.len());
    println!("  Sessions: {}", doc.session_log.len());
    println!("  Saved to: {}", config.site.strategy_state_path().display());
    Ok(())
}

fn cmd_strategy_render(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_strategy(&config)?;
    print!("{}", render_markdown(store.document()));
    Ok(())
}

async fn cmd_runs(config_path: Option<&Path>, limit: u32, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let storage = Storage::open_from_config(&config.telemetry, &config.site.repo_root).await?;
    let runs = with_deadline(
        Duration::from_secs(config.telemetry.timeout_secs),
        "listing runs",
        storage.list_runs(limit),
    )
    .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }
    if runs.is_empty() {
        println!("No runs recorded yet.");
        return Ok(());
    }
    for run in &runs {
        println!(
            "{}  {:<9}  {:<7}  {:>6.1}s  {}",
            run.created_at.format("%Y-%m-%d %H:%M"),
            run.trigger.as_str(),
            run.status.as_str(),
            run.duration_ms as f64 / 1000.0,
            run.summary
        );
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    match resolve_config_path(config_path)? {
        Some(path) => println!("# {}", path.display()),
        None => println!("# no config file found, showing defaults"),
    }
    let config: AppConfig = load_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
