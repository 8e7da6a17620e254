//! Shared run context threaded through every pipeline stage.

use std::path::PathBuf;

use chrono::NaiveDate;

use seoagent_competitors::CompetitorCollector;
use seoagent_content::ContentAsset;
use seoagent_shared::{
    AppConfig, CompetitorProfile, ContentOutcome, LinkOutcome, Recommendation, Result,
    StrategyDocument, Trigger,
};
use seoagent_storage::{RunStore, StrategyStore};

use crate::generative::TextGenerator;
use crate::publisher::{GitRunner, PublishOutcome};
use crate::rankings::{RankingSnapshot, SearchAnalytics};
use crate::report::{DeliveryOutcome, Mailer};

/// External collaborators of a run.
pub struct Services {
    pub generator: Box<dyn TextGenerator>,
    pub analytics: Box<dyn SearchAnalytics>,
    pub git: Box<dyn GitRunner>,
    /// `None` when email is not configured.
    pub mailer: Option<Box<dyn Mailer>>,
    /// `None` when the telemetry database could not be opened.
    pub run_store: Option<Box<dyn RunStore>>,
    pub competitors: CompetitorCollector,
}

/// Per-run switches.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub trigger: Trigger,
    pub generate_content: bool,
    pub publish: bool,
    pub send_email: bool,
    pub today: NaiveDate,
}

impl RunOptions {
    pub fn new(trigger: Trigger, today: NaiveDate) -> Self {
        Self {
            trigger,
            generate_content: true,
            publish: true,
            send_email: true,
            today,
        }
    }
}

/// What each stage produced. Stages only ever add to this.
#[derive(Debug, Default)]
pub struct StageResults {
    pub rankings: Option<RankingSnapshot>,
    pub content: Option<ContentOutcome>,
    pub linking: Vec<LinkOutcome>,
    /// Content files written this run, deduplicated.
    pub changed_files: Vec<PathBuf>,
    pub competitors: Vec<CompetitorProfile>,
    pub recommendations: Vec<Recommendation>,
    /// Public page routes of the site.
    pub site_pages: Vec<String>,
    pub publish: Option<PublishOutcome>,
    pub email: Option<DeliveryOutcome>,
    /// Plain-text summary, set once content work is done.
    pub summary: String,
}

impl StageResults {
    pub fn mark_changed(&mut self, path: PathBuf) {
        if !self.changed_files.contains(&path) {
            self.changed_files.push(path);
        }
    }
}

/// Everything a stage may read or mutate.
pub struct RunContext {
    pub config: AppConfig,
    pub options: RunOptions,
    pub services: Services,
    pub strategy: StrategyStore,
    pub inventory: Vec<ContentAsset>,
    pub results: StageResults,
}

impl RunContext {
    /// A context with an empty strategy and inventory; the prepare stage loads both.
    pub fn new(config: AppConfig, options: RunOptions, services: Services) -> Self {
        let strategy = StrategyStore::from_document(
            StrategyDocument::default(),
            &config.site.strategy_state_path(),
            &config.site.strategy_doc_path(),
        );
        Self {
            config,
            options,
            services,
            strategy,
            inventory: Vec::new(),
            results: StageResults::default(),
        }
    }

    /// Reload the content inventory from disk.
    pub fn reload_inventory(&mut self) -> Result<()> {
        self.inventory = seoagent_content::load_inventory(&self.config.site.content_path())?;
        Ok(())
    }
}
