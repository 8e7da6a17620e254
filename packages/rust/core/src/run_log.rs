//! Run logger: metrics, the plain-text summary, the note for the next run,
//! and the one run record persisted per invocation.

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use seoagent_shared::{
    CompetitorStatus, ContentOutcome, KeywordRanking, RunId, RunMetrics, RunRecord, RunStatus,
    Trigger, format_position,
};
use seoagent_storage::RunStore;

use crate::context::StageResults;
use crate::generative::{GenerationRequest, TextGenerator};

/// Aggregate ranking metrics. The average covers indexed keywords only.
pub fn compute_metrics(rankings: &[KeywordRanking]) -> RunMetrics {
    let indexed: Vec<f64> = rankings.iter().filter_map(|r| r.position).collect();
    let avg_position = if indexed.is_empty() {
        None
    } else {
        Some(indexed.iter().sum::<f64>() / indexed.len() as f64)
    };

    RunMetrics {
        avg_position,
        total_clicks: rankings.iter().map(|r| r.clicks).sum(),
        total_impressions: rankings.iter().map(|r| r.impressions).sum(),
        keywords_tracked: rankings.len(),
        keywords_indexed: indexed.len(),
    }
}

/// One-paragraph plain-text summary of what the run did so far.
pub fn summarize(results: &StageResults) -> String {
    let mut parts = Vec::new();

    if let Some(snapshot) = &results.rankings {
        let metrics = compute_metrics(&snapshot.rankings);
        let mut line = format!(
            "Checked {} keyword(s), {} indexed",
            metrics.keywords_tracked, metrics.keywords_indexed
        );
        if let Some(avg) = metrics.avg_position {
            line.push_str(&format!(", average position {}", format_position(avg)));
        }
        if snapshot.degraded {
            line.push_str(" (ranking data unavailable)");
        }
        parts.push(format!("{line}."));
    }

    match &results.content {
        Some(ContentOutcome::Created { title, .. }) => parts.push(format!("Created \"{title}\".")),
        Some(ContentOutcome::Refreshed { title, reason, .. }) => {
            parts.push(format!("Refreshed \"{title}\" ({reason})."))
        }
        Some(ContentOutcome::Rejected { topic, .. }) => {
            parts.push(format!("Draft for \"{topic}\" was rejected."))
        }
        Some(ContentOutcome::NoAction) => parts.push("No content action was due.".into()),
        Some(ContentOutcome::Skipped) => parts.push("Content generation was skipped.".into()),
        None => {}
    }

    let links: usize = results.linking.iter().map(|l| l.links_added).sum();
    if links > 0 {
        parts.push(format!("Added {links} internal link(s)."));
    }

    if !results.competitors.is_empty() {
        let failed = results
            .competitors
            .iter()
            .filter(|c| matches!(c.status, CompetitorStatus::Error { .. }))
            .count();
        let recent: usize = results.competitors.iter().map(|c| c.recent_pages.len()).sum();
        let mut line = format!(
            "Scanned {} competitor(s), {recent} recently updated page(s)",
            results.competitors.len()
        );
        if failed > 0 {
            line.push_str(&format!(", {failed} unavailable"));
        }
        parts.push(format!("{line}."));
    }

    if !results.recommendations.is_empty() {
        parts.push(format!("{} recommendation(s).", results.recommendations.len()));
    }

    if parts.is_empty() {
        "Nothing was done.".into()
    } else {
        parts.join(" ")
    }
}

/// Ask the generative service for a short note to the next run.
/// Any failure yields `None`.
#[instrument(skip_all)]
pub async fn note_to_self(
    generator: &dyn TextGenerator,
    summary: &str,
    failure: Option<&str>,
    previous_note: Option<&str>,
) -> Option<String> {
    let prompt = format!(
        "This month's run of our SEO agent:\n{summary}\n\n\
         Outcome: {outcome}\n\n\
         Note left by last month's run: {previous}\n\n\
         Write a note of at most three sentences for next month's run: what to watch, \
         what to try next. Plain text only.",
        outcome = failure.map_or_else(|| "success".to_string(), |f| format!("failed: {f}")),
        previous = previous_note.unwrap_or("(none)"),
    );
    let request = GenerationRequest::new(
        "note",
        "You are an SEO agent keeping notes for your future self. Be brief and specific.",
        prompt,
    )
    .max_tokens(300)
    .temperature(0.4);

    match generator.complete(&request).await {
        Ok(note) => {
            let note = note.trim();
            (!note.is_empty()).then(|| note.to_string())
        }
        Err(e) => {
            warn!(error = %e, "note to self failed");
            None
        }
    }
}

/// Where and how a run ended.
pub struct RunEnd<'a> {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub trigger: Trigger,
    /// `(stage, error)` of the first fatal error.
    pub failure: Option<(&'a str, String)>,
}

/// Assemble the run record from everything the stages produced.
pub fn build_record(
    results: &StageResults,
    end: &RunEnd<'_>,
    summary: String,
    note_for_next_run: Option<String>,
) -> RunRecord {
    let rankings = results
        .rankings
        .as_ref()
        .map(|s| s.rankings.clone())
        .unwrap_or_default();

    RunRecord {
        id: RunId::new(),
        created_at: end.started_at,
        trigger: end.trigger,
        status: if end.failure.is_some() {
            RunStatus::Error
        } else {
            RunStatus::Success
        },
        duration_ms: end.duration_ms,
        error_message: end.failure.as_ref().map(|(_, e)| e.clone()),
        failed_stage: end.failure.as_ref().map(|(s, _)| s.to_string()),
        metrics: compute_metrics(&rankings),
        rankings,
        content: results.content.clone(),
        linking: results.linking.clone(),
        competitors: results.competitors.clone(),
        recommendations: results.recommendations.clone(),
        summary,
        note_for_next_run,
    }
}

/// Finish a run: summary, note, record. Never fails.
#[instrument(skip_all, fields(trigger = end.trigger.as_str(), failed = end.failure.is_some()))]
pub async fn log_run(
    results: &StageResults,
    end: &RunEnd<'_>,
    generator: &dyn TextGenerator,
    store: Option<&dyn RunStore>,
) -> RunRecord {
    let mut summary = if results.summary.is_empty() {
        summarize(results)
    } else {
        results.summary.clone()
    };
    if let Some((stage, error)) = &end.failure {
        summary.push_str(&format!(" Run failed during {stage}: {error}"));
    }

    let previous_note = match store {
        Some(store) => match store.latest_run_note().await {
            Ok(note) => note,
            Err(e) => {
                warn!(error = %e, "could not read previous run note");
                None
            }
        },
        None => None,
    };

    let failure = end.failure.as_ref().map(|(_, e)| e.as_str());
    let note = note_to_self(generator, &summary, failure, previous_note.as_deref()).await;
    let record = build_record(results, end, summary, note);

    persist(store, &record).await;
    record
}

/// Persist a record; failures are only warned about.
pub async fn persist(store: Option<&dyn RunStore>, record: &RunRecord) -> bool {
    let Some(store) = store else {
        warn!(run_id = %record.id, "no run store configured, record not persisted");
        return false;
    };
    match store.insert_run_record(record).await {
        Ok(()) => {
            info!(run_id = %record.id, status = record.status.as_str(), "run recorded");
            true
        }
        Err(e) => {
            warn!(run_id = %record.id, error = %e, "failed to persist run record");
            false
        }
    }
}
