//! Monthly pipeline: prepare → rankings → content → linking → competitors →
//! recommendations → publish → report, then the run logger.
//!
//! Stages run strictly in order against one [`RunContext`]. The first
//! stage error stops the run; the run logger executes regardless and its
//! own failures never replace the stage error.

use std::path::PathBuf;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info, instrument};

use seoagent_shared::{ContentOutcome, Result, RunRecord, SeoAgentError, SessionEntry};
use seoagent_storage::{StrategyRepository, StrategyStore, render_markdown};

use crate::context::RunContext;
use crate::generator::{GeneratorContext, generate};
use crate::linking::{LinkingOptions, link_corpus};
use crate::publisher::{ChangeSet, Publisher};
use crate::rankings::{apply_rankings, collect_rankings};
use crate::recommendations::{RecommendationInput, recommend, scan_site_pages};
use crate::report::{DeliveryOutcome, ReportInput, render_report, report_subject};
use crate::run_log::{self, RunEnd};
use crate::selector::{Decision, SelectorInput, select};

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a stage.
    fn phase(&self, name: &str);
    /// Called when a stage completed without error.
    fn stage_finished(&self, name: &str);
    /// Called once the run record exists.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn stage_finished(&self, _name: &str) {}
    fn done(&self, _report: &RunReport) {}
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// One step of the pipeline.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;
    async fn run(&self, ctx: &mut RunContext) -> Result<()>;
}

/// The stage that stopped a run.
#[derive(Debug)]
pub struct StageFailure {
    pub stage: &'static str,
    pub error: SeoAgentError,
}

/// Result of [`Pipeline::run`].
#[derive(Debug)]
pub struct RunReport {
    pub record: RunRecord,
    pub failure: Option<StageFailure>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    /// Process exit code: 0 on success, 1 on any stage failure.
    pub fn exit_code(&self) -> i32 {
        if self.succeeded() { 0 } else { 1 }
    }
}

/// Ordered list of stages.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    /// The monthly content-operations pipeline.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(PrepareStage),
            Box::new(RankingsStage),
            Box::new(ContentStage),
            Box::new(LinkingStage),
            Box::new(CompetitorsStage),
            Box::new(RecommendationsStage),
            Box::new(PublishStage),
            Box::new(ReportStage),
        ])
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage, stopping at the first error, then always log the run.
    #[instrument(skip_all, fields(trigger = ctx.options.trigger.as_str(), date = %ctx.options.today))]
    pub async fn run(&self, ctx: &mut RunContext, progress: &dyn ProgressReporter) -> RunReport {
        let started_at = Utc::now();
        let start = Instant::now();
        info!(stages = self.stages.len(), "starting run");

        let mut failure = None;
        for stage in &self.stages {
            progress.phase(stage.name());
            match stage.run(ctx).await {
                Ok(()) => progress.stage_finished(stage.name()),
                Err(e) => {
                    error!(stage = stage.name(), error = %e, "stage failed, stopping run");
                    failure = Some(StageFailure {
                        stage: stage.name(),
                        error: e,
                    });
                    break;
                }
            }
        }

        progress.phase("run log");
        let end = RunEnd {
            started_at,
            duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            trigger: ctx.options.trigger,
            failure: failure
                .as_ref()
                .map(|f| (f.stage, f.error.to_string())),
        };
        let record = run_log::log_run(
            &ctx.results,
            &end,
            ctx.services.generator.as_ref(),
            ctx.services.run_store.as_deref(),
        )
        .await;

        info!(
            run_id = %record.id,
            status = record.status.as_str(),
            duration_ms = record.duration_ms,
            "run finished"
        );
        let report = RunReport { record, failure };
        progress.done(&report);
        report
    }
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// Load the strategy store, content inventory and site page listing.
pub struct PrepareStage;

#[async_trait]
impl Stage for PrepareStage {
    fn name(&self) -> &'static str {
        "prepare"
    }

    async fn run(&self, ctx: &mut RunContext) -> Result<()> {
        let site = &ctx.config.site;
        ctx.strategy = StrategyStore::open(&site.strategy_state_path(), &site.strategy_doc_path())?;
        ctx.reload_inventory()?;
        ctx.results.site_pages = scan_site_pages(&ctx.config.site.pages_path());

        info!(
            keywords = ctx.strategy.document().keywords.len(),
            backlog = ctx.strategy.open_backlog().len(),
            assets = ctx.inventory.len(),
            pages = ctx.results.site_pages.len(),
            "run prepared"
        );
        Ok(())
    }
}

pub struct RankingsStage;

#[async_trait]
impl Stage for RankingsStage {
    fn name(&self) -> &'static str {
        "rankings"
    }

    async fn run(&self, ctx: &mut RunContext) -> Result<()> {
        let today = ctx.options.today;
        let snapshot = collect_rankings(
            ctx.services.analytics.as_ref(),
            &ctx.strategy,
            today,
            ctx.config.search_console.window_days,
        )
        .await;
        apply_rankings(&mut ctx.strategy, &snapshot, today);
        ctx.results.rankings = Some(snapshot);
        Ok(())
    }
}

/// Select and execute at most one content action.
pub struct ContentStage;

#[async_trait]
impl Stage for ContentStage {
    fn name(&self) -> &'static str {
        "content"
    }

    async fn run(&self, ctx: &mut RunContext) -> Result<()> {
        if !ctx.options.generate_content {
            info!("content generation disabled for this run");
            ctx.results.content = Some(ContentOutcome::Skipped);
            return Ok(());
        }

        let today = ctx.options.today;
        let snapshot = ctx.results.rankings.clone().unwrap_or_default();
        let input = SelectorInput {
            inventory: &ctx.inventory,
            rankings: &snapshot.rankings,
            degraded: snapshot.degraded,
            strategy: &ctx.strategy,
            config: &ctx.config.content,
            today,
        };
        let Some(decision) = select(&input, ctx.services.generator.as_ref()).await? else {
            info!("no content action due");
            ctx.results.content = Some(ContentOutcome::NoAction);
            return Ok(());
        };

        let strategy_markdown = render_markdown(ctx.strategy.document());
        let content_dir = ctx.config.site.content_path();
        let generator_ctx = GeneratorContext {
            site: &ctx.config.site,
            content: &ctx.config.content,
            image_pools: &ctx.config.image_pools,
            strategy_markdown: &strategy_markdown,
            inventory: &ctx.inventory,
            content_dir: &content_dir,
            today,
        };
        let outcome = generate(&decision, &generator_ctx, ctx.services.generator.as_ref()).await?;

        if let (
            Decision::Create {
                keyword,
                from_backlog: true,
                ..
            },
            ContentOutcome::Created { slug, .. },
        ) = (&decision, &outcome)
        {
            if ctx.strategy.complete_backlog_topic(keyword, slug) {
                info!(%keyword, %slug, "backlog topic completed");
            }
        }

        if let Some(path) = outcome.written_path() {
            ctx.results.mark_changed(PathBuf::from(path));
            ctx.reload_inventory()?;
        }
        ctx.results.content = Some(outcome);
        Ok(())
    }
}

pub struct LinkingStage;

#[async_trait]
impl Stage for LinkingStage {
    fn name(&self) -> &'static str {
        "linking"
    }

    async fn run(&self, ctx: &mut RunContext) -> Result<()> {
        let options = LinkingOptions {
            prefix: ctx.config.site.blog_prefix.clone(),
            target_links: ctx.config.content.target_links,
        };
        let report = link_corpus(
            &mut ctx.inventory,
            &options,
            ctx.services.generator.as_ref(),
        )
        .await?;

        for path in report.changed_files {
            ctx.results.mark_changed(path);
        }
        ctx.results.linking = report.outcomes;
        Ok(())
    }
}

pub struct CompetitorsStage;

#[async_trait]
impl Stage for CompetitorsStage {
    fn name(&self) -> &'static str {
        "competitors"
    }

    async fn run(&self, ctx: &mut RunContext) -> Result<()> {
        ctx.results.competitors = ctx
            .services
            .competitors
            .collect(&ctx.config.competitors, ctx.options.today)
            .await;
        Ok(())
    }
}

pub struct RecommendationsStage;

#[async_trait]
impl Stage for RecommendationsStage {
    fn name(&self) -> &'static str {
        "recommendations"
    }

    async fn run(&self, ctx: &mut RunContext) -> Result<()> {
        let strategy_markdown = render_markdown(ctx.strategy.document());
        let input = RecommendationInput {
            site_name: &ctx.config.site.name,
            strategy_markdown: &strategy_markdown,
            rankings: ctx
                .results
                .rankings
                .as_ref()
                .map(|s| s.rankings.as_slice())
                .unwrap_or_default(),
            inventory: &ctx.inventory,
            site_pages: &ctx.results.site_pages,
            competitors: &ctx.results.competitors,
        };
        let recommendations = recommend(&input, ctx.services.generator.as_ref()).await;
        ctx.results.recommendations = recommendations;
        Ok(())
    }
}

/// Append the session entry, save the strategy and publish.
pub struct PublishStage;

#[async_trait]
impl Stage for PublishStage {
    fn name(&self) -> &'static str {
        "publish"
    }

    async fn run(&self, ctx: &mut RunContext) -> Result<()> {
        let today = ctx.options.today;
        let summary = run_log::summarize(&ctx.results);
        ctx.strategy.append_session_entry(SessionEntry {
            date: today,
            summary: summary.clone(),
        });
        ctx.results.summary = summary;

        let mut config = ctx.config.publish.clone();
        config.enabled &= ctx.options.publish;
        let publisher = Publisher {
            git: ctx.services.git.as_ref(),
            config: &config,
            repo_root: &ctx.config.site.repo_root,
        };
        let content_dir = ctx.config.site.content_path();
        let changes = ChangeSet {
            files: &ctx.results.changed_files,
            content_dir: &content_dir,
        };
        let message = format!("seo-agent: monthly run {today}");

        let outcome = publisher.publish(&mut ctx.strategy, &changes, &message).await?;
        ctx.results.publish = Some(outcome);
        Ok(())
    }
}

/// Render and send the report email.
pub struct ReportStage;

#[async_trait]
impl Stage for ReportStage {
    fn name(&self) -> &'static str {
        "report"
    }

    async fn run(&self, ctx: &mut RunContext) -> Result<()> {
        if !ctx.options.send_email {
            info!("email disabled for this run");
            ctx.results.email = Some(DeliveryOutcome::Skipped);
            return Ok(());
        }
        let Some(mailer) = ctx.services.mailer.as_deref() else {
            info!("email not configured, report not sent");
            ctx.results.email = Some(DeliveryOutcome::NotConfigured);
            return Ok(());
        };

        let results = &ctx.results;
        let snapshot = results.rankings.clone().unwrap_or_default();
        let html = render_report(&ReportInput {
            site_name: &ctx.config.site.name,
            today: ctx.options.today,
            rankings: &snapshot.rankings,
            rankings_degraded: snapshot.degraded,
            content: results.content.as_ref(),
            linking: &results.linking,
            competitors: &results.competitors,
            recommendations: &results.recommendations,
            summary: &results.summary,
        });
        let subject = report_subject(&ctx.config.site.name, ctx.options.today);

        mailer.send(&subject, &html).await?;
        ctx.results.email = Some(DeliveryOutcome::Sent);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use chrono::NaiveDate;
    use seoagent_competitors::CompetitorCollector;
    use seoagent_shared::{
        AppConfig, BacklogTopic, CompetitorScanConfig, KeywordState, RunStatus, StrategyDocument,
        Trigger,
    };
    use seoagent_storage::RunStore;
    use uuid::Uuid;

    use crate::context::{RunOptions, Services};
    use crate::generative::{GenerationRequest, TextGenerator};
    use crate::publisher::{GitOutput, GitRunner, PublishOutcome};
    use crate::rankings::{KeywordPerformance, SearchAnalytics};
    use crate::report::Mailer;

    /// Answers by task; `draft = None` makes article generation fail.
    struct Scripted {
        draft: Option<String>,
        tasks: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl TextGenerator for Scripted {
        async fn complete(&self, request: &GenerationRequest) -> Result<String> {
            self.tasks.lock().unwrap().push(request.task);
            match request.task {
                "create" | "refresh" => self
                    .draft
                    .clone()
                    .ok_or_else(|| SeoAgentError::Generation("HTTP 502 from upstream".into())),
                "recommendations" => Ok("[]".into()),
                "note" => Ok("Keep going.".into()),
                other => Err(SeoAgentError::Generation(format!("unexpected task {other}"))),
            }
        }
    }

    struct Unranked;

    #[async_trait]
    impl SearchAnalytics for Unranked {
        async fn keyword_performance(
            &self,
            _keyword: &str,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Option<KeywordPerformance>> {
            Ok(None)
        }
    }

    struct RecordingGit(Arc<Mutex<Vec<String>>>);

    #[async_trait]
    impl GitRunner for RecordingGit {
        async fn run(&self, args: &[&str]) -> Result<GitOutput> {
            self.0.lock().unwrap().push(args.join(" "));
            Ok(GitOutput {
                success: true,
                code: Some(0),
                ..Default::default()
            })
        }
    }

    struct CaptureMailer(Arc<Mutex<Vec<(String, String)>>>);

    #[async_trait]
    impl Mailer for CaptureMailer {
        async fn send(&self, subject: &str, html: &str) -> Result<()> {
            self.0
                .lock()
                .unwrap()
                .push((subject.to_string(), html.to_string()));
            Ok(())
        }
    }

    struct MemoryStore(Arc<Mutex<Vec<RunRecord>>>);

    #[async_trait]
    impl RunStore for MemoryStore {
        async fn insert_run_record(&self, record: &RunRecord) -> Result<()> {
            self.0.lock().unwrap().push(record.clone());
            Ok(())
        }

        async fn latest_run_note(&self) -> Result<Option<String>> {
            Ok(self
                .0
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find_map(|r| r.note_for_next_run.clone()))
        }
    }

    #[derive(Default)]
    struct RecordingProgress(Mutex<Vec<String>>);

    impl ProgressReporter for RecordingProgress {
        fn phase(&self, name: &str) {
            self.0.lock().unwrap().push(name.to_string());
        }
        fn stage_finished(&self, _name: &str) {}
        fn done(&self, _report: &RunReport) {}
    }

    #[derive(Default)]
    struct Recorded {
        tasks: Arc<Mutex<Vec<&'static str>>>,
        git: Arc<Mutex<Vec<String>>>,
        mail: Arc<Mutex<Vec<(String, String)>>>,
        runs: Arc<Mutex<Vec<RunRecord>>>,
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    fn site_root() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("seoagent_pipeline_{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn config(root: &Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.site.repo_root = root.to_path_buf();
        config.site.name = "Wheel Co".into();
        config
    }

    fn seed_strategy(config: &AppConfig) {
        let doc = StrategyDocument {
            keywords: vec![KeywordState::new("diamond cut wheels")],
            backlog: vec![BacklogTopic {
                keyword: "diamond cut wheels".into(),
                notes: Some("Explain the lathe process.".into()),
                completed_slug: None,
            }],
            ..Default::default()
        };
        let mut store = StrategyStore::from_document(
            doc,
            &config.site.strategy_state_path(),
            &config.site.strategy_doc_path(),
        );
        store.save().unwrap();
    }

    fn draft() -> String {
        format!(
            "---\ntitle: Diamond Cut Wheels Explained\nslug: diamond-cut-wheels\n\
             description: How diamond cut alloys are refinished on a lathe.\n\
             pillar: alloy-wheels\n---\n\n## What it is\n\n{}\n",
            vec!["word"; 1100].join(" ")
        )
    }

    fn context(
        config: AppConfig,
        options: RunOptions,
        draft: Option<String>,
        rec: &Recorded,
    ) -> RunContext {
        let services = Services {
            generator: Box::new(Scripted {
                draft,
                tasks: rec.tasks.clone(),
            }),
            analytics: Box::new(Unranked),
            git: Box::new(RecordingGit(rec.git.clone())),
            mailer: Some(Box::new(CaptureMailer(rec.mail.clone()))),
            run_store: Some(Box::new(MemoryStore(rec.runs.clone()))),
            competitors: CompetitorCollector::new(&CompetitorScanConfig::default()).unwrap(),
        };
        RunContext::new(config, options, services)
    }

    #[tokio::test]
    async fn full_run_creates_publishes_and_reports() {
        let root = site_root();
        let config = config(&root);
        seed_strategy(&config);
        let rec = Recorded::default();
        let mut ctx = context(
            config.clone(),
            RunOptions::new(Trigger::Scheduled, today()),
            Some(draft()),
            &rec,
        );
        let progress = RecordingProgress::default();

        let pipeline = Pipeline::standard();
        let report = pipeline.run(&mut ctx, &progress).await;

        assert!(report.succeeded(), "{:?}", report.failure);
        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.record.status, RunStatus::Success);
        assert_eq!(report.record.note_for_next_run.as_deref(), Some("Keep going."));
        match &report.record.content {
            Some(ContentOutcome::Created {
                slug,
                within_length,
                ..
            }) => {
                assert_eq!(slug, "diamond-cut-wheels");
                assert!(*within_length);
            }
            other => panic!("expected a created asset, got {other:?}"),
        }

        let mut phases = pipeline.stage_names();
        phases.push("run log");
        assert_eq!(*progress.0.lock().unwrap(), phases);

        let written = config.site.content_path().join("2026-10-diamond-cut-wheels.mdx");
        assert!(written.exists());

        let store = StrategyStore::open(
            &config.site.strategy_state_path(),
            &config.site.strategy_doc_path(),
        )
        .unwrap();
        assert!(store.open_backlog().is_empty());
        assert_eq!(store.document().session_log.len(), 1);
        let state = store.get_keyword_state("diamond cut wheels").unwrap();
        assert_eq!(state.last_checked, Some(today()));
        assert!(config.site.strategy_doc_path().exists());

        assert!(rec.git.lock().unwrap()[0].starts_with("add --"));
        assert_eq!(ctx.results.publish, Some(PublishOutcome::NoChanges));

        let mail = rec.mail.lock().unwrap();
        assert_eq!(mail.len(), 1);
        assert_eq!(mail[0].0, "SEO report for Wheel Co: October 2026");
        assert!(mail[0].1.contains("Diamond Cut Wheels Explained"));

        assert_eq!(rec.runs.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn generator_failure_still_records_run() {
        let root = site_root();
        let config = config(&root);
        seed_strategy(&config);
        let rec = Recorded::default();
        let mut ctx = context(
            config,
            RunOptions::new(Trigger::Manual, today()),
            None,
            &rec,
        );

        let report = Pipeline::standard().run(&mut ctx, &SilentProgress).await;

        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.failure.as_ref().map(|f| f.stage), Some("content"));

        let runs = rec.runs.lock().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Error);
        assert_eq!(runs[0].failed_stage.as_deref(), Some("content"));
        assert!(runs[0].error_message.as_deref().unwrap().contains("HTTP 502"));
        assert_eq!(runs[0].rankings.len(), 1);

        assert!(rec.git.lock().unwrap().is_empty());
        assert!(rec.mail.lock().unwrap().is_empty());
        assert!(rec.tasks.lock().unwrap().contains(&"note"));
    }

    #[tokio::test]
    async fn disabled_switches_record_skips() {
        let root = site_root();
        let config = config(&root);
        seed_strategy(&config);
        let rec = Recorded::default();
        let mut options = RunOptions::new(Trigger::Manual, today());
        options.generate_content = false;
        options.publish = false;
        options.send_email = false;
        let mut ctx = context(config.clone(), options, Some(draft()), &rec);

        let report = Pipeline::standard().run(&mut ctx, &SilentProgress).await;

        assert!(report.succeeded());
        assert_eq!(report.record.content, Some(ContentOutcome::Skipped));
        assert_eq!(ctx.results.publish, Some(PublishOutcome::Skipped));
        assert_eq!(ctx.results.email, Some(DeliveryOutcome::Skipped));
        assert!(rec.git.lock().unwrap().is_empty());
        assert!(rec.mail.lock().unwrap().is_empty());
        assert!(!rec.tasks.lock().unwrap().contains(&"create"));

        // state is still saved locally
        let store = StrategyStore::open(
            &config.site.strategy_state_path(),
            &config.site.strategy_doc_path(),
        )
        .unwrap();
        assert_eq!(store.document().session_log.len(), 1);
        assert_eq!(store.open_backlog().len(), 1);
    }

    #[tokio::test]
    async fn topic_request_failure_is_fatal() {
        let root = site_root();
        let rec = Recorded::default();
        let mut options = RunOptions::new(Trigger::Manual, today());
        options.publish = false;
        let mut ctx = context(config(&root), options, None, &rec);

        // empty strategy: no backlog, so the selector asks for a topic
        let report = Pipeline::standard().run(&mut ctx, &SilentProgress).await;

        assert_eq!(report.failure.as_ref().map(|f| f.stage), Some("content"));
        assert!(rec.tasks.lock().unwrap().contains(&"topic"));
        assert_eq!(rec.runs.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unconfigured_mailer_is_not_an_error() {
        let rec = Recorded::default();
        let mut ctx = context(
            AppConfig::default(),
            RunOptions::new(Trigger::Manual, today()),
            None,
            &rec,
        );
        ctx.services.mailer = None;

        ReportStage.run(&mut ctx).await.unwrap();
        assert_eq!(ctx.results.email, Some(DeliveryOutcome::NotConfigured));
    }
}
