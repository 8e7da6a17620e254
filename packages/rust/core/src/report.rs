//! Reporter: the monthly HTML email.

use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, instrument};

use seoagent_shared::{
    CompetitorProfile, CompetitorStatus, ContentOutcome, EmailConfig, KeywordRanking,
    LinkOutcome, Priority, Recommendation, Result, SeoAgentError, format_position, position_label,
};

const GREEN: &str = "#1a7f37";
const RED: &str = "#cf222e";
const GREY: &str = "#6e7781";

/// Everything the report shows.
pub struct ReportInput<'a> {
    pub site_name: &'a str,
    pub today: NaiveDate,
    pub rankings: &'a [KeywordRanking],
    pub rankings_degraded: bool,
    pub content: Option<&'a ContentOutcome>,
    pub linking: &'a [LinkOutcome],
    pub competitors: &'a [CompetitorProfile],
    pub recommendations: &'a [Recommendation],
    pub summary: &'a str,
}

/// Subject line for a report.
pub fn report_subject(site_name: &str, today: NaiveDate) -> String {
    format!("SEO report for {site_name}: {}", today.format("%B %Y"))
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Escape text for HTML element and attribute content.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Delta cell text and colour. Lower positions are better.
fn delta_cell(ranking: &KeywordRanking) -> (String, &'static str) {
    match (ranking.previous_position(), ranking.position) {
        (Some(prev), Some(now)) => {
            let delta = now - prev;
            if delta < 0.0 {
                (format!("&#9650; {}", format_position(-delta)), GREEN)
            } else if delta > 0.0 {
                (format!("&#9660; {}", format_position(delta)), RED)
            } else {
                ("no change".into(), GREY)
            }
        }
        (None, Some(_)) => ("new".into(), GREEN),
        (Some(_), None) => ("dropped out".into(), RED),
        (None, None) => ("&mdash;".into(), GREY),
    }
}

/// Render the report as a standalone HTML document.
pub fn render_report(input: &ReportInput<'_>) -> String {
    let mut html = String::new();
    let title = escape_html(&report_subject(input.site_name, input.today));

    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{title}</title></head>\n\
         <body style=\"font-family: -apple-system, 'Segoe UI', Roboto, sans-serif; max-width: 720px; margin: 0 auto; padding: 20px;\">\n\
         <h1>{title}</h1>\n"
    );

    // Summary
    let _ = write!(html, "<p>{}</p>\n", escape_html(input.summary));

    // Rankings
    html.push_str("<h2>Rankings</h2>\n");
    if input.rankings_degraded {
        html.push_str(
            "<p style=\"color: #9a6700;\">Ranking data was unavailable this month; positions are not updated.</p>\n",
        );
    }
    if input.rankings.is_empty() {
        html.push_str("<p>No keywords are tracked yet.</p>\n");
    } else {
        html.push_str(
            "<table cellpadding=\"6\" style=\"border-collapse: collapse;\">\n\
             <tr><th align=\"left\">Keyword</th><th>Position</th><th>Previous</th><th>Change</th><th>Clicks</th><th>Impressions</th></tr>\n",
        );
        for r in input.rankings {
            let (delta, colour) = delta_cell(r);
            let _ = write!(
                html,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td style=\"color: {colour};\">{delta}</td><td>{}</td><td>{}</td></tr>\n",
                escape_html(&r.keyword),
                escape_html(&position_label(r.position)),
                escape_html(&r.previous),
                r.clicks,
                r.impressions,
            );
        }
        html.push_str("</table>\n");
    }

    // Content
    html.push_str("<h2>Content</h2>\n");
    let content_line = match input.content {
        Some(ContentOutcome::Created {
            title,
            keyword,
            word_count,
            within_length,
            ..
        }) => format!(
            "Published <strong>{}</strong> targeting \"{}\" ({word_count} words{}).",
            escape_html(title),
            escape_html(keyword),
            if *within_length { "" } else { ", outside the target length" }
        ),
        Some(ContentOutcome::Refreshed {
            title,
            reason,
            word_count,
            ..
        }) => format!(
            "Refreshed <strong>{}</strong> because the {} ({word_count} words).",
            escape_html(title),
            escape_html(reason)
        ),
        Some(ContentOutcome::Rejected { topic, reason }) => format!(
            "A draft for \"{}\" was rejected: {}.",
            escape_html(topic),
            escape_html(reason)
        ),
        Some(ContentOutcome::NoAction) => "No content action was due this month.".into(),
        Some(ContentOutcome::Skipped) | None => "The content stage did not run.".into(),
    };
    let _ = write!(html, "<p>{content_line}</p>\n");

    let added: usize = input.linking.iter().map(|l| l.links_added).sum();
    let touched = input.linking.iter().filter(|l| l.links_added > 0).count();
    let _ = write!(
        html,
        "<p>Internal linking added {added} link(s) across {touched} article(s).</p>\n"
    );

    // Competitors
    html.push_str("<h2>Competitor activity</h2>\n");
    if input.competitors.is_empty() {
        html.push_str("<p>No competitors configured.</p>\n");
    }
    for c in input.competitors {
        let _ = write!(
            html,
            "<h3>{} <small style=\"color: {GREY};\">{}</small></h3>\n",
            escape_html(&c.name),
            escape_html(&c.domain)
        );
        match &c.status {
            CompetitorStatus::Error { reason } => {
                let _ = write!(
                    html,
                    "<p style=\"color: {RED};\">Sitemap unavailable: {}</p>\n",
                    escape_html(reason)
                );
            }
            CompetitorStatus::Ok if c.recent_pages.is_empty() => {
                let _ = write!(
                    html,
                    "<p>No recently updated pages ({} URLs in sitemap).</p>\n",
                    c.total_urls
                );
            }
            CompetitorStatus::Ok => {
                let _ = write!(html, "<p>{} URLs in sitemap. Recently updated:</p>\n<ul>\n", c.total_urls);
                for page in &c.recent_pages {
                    let url = escape_html(&page.url);
                    let _ = write!(
                        html,
                        "<li><a href=\"{url}\">{url}</a> ({})</li>\n",
                        page.last_modified
                    );
                }
                html.push_str("</ul>\n");
            }
        }
    }

    // Recommendations
    html.push_str("<h2>Recommendations</h2>\n");
    if input.recommendations.is_empty() {
        html.push_str("<p>No recommendations this month.</p>\n");
    } else {
        html.push_str("<ol>\n");
        for rec in input.recommendations {
            let colour = match rec.priority {
                Priority::High => RED,
                Priority::Medium => "#9a6700",
                Priority::Low => GREY,
            };
            let _ = write!(
                html,
                "<li><strong style=\"color: {colour};\">[{:?}]</strong> <strong>{}</strong> <em>({})</em><br>{}</li>\n",
                rec.priority,
                escape_html(&rec.title),
                escape_html(&rec.category),
                escape_html(&rec.description)
            );
        }
        html.push_str("</ol>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

/// What happened to the report this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent,
    /// No SMTP host or recipients configured.
    NotConfigured,
    /// Email disabled for this run.
    Skipped,
}

/// Delivers a rendered report.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, subject: &str, html: &str) -> Result<()>;
}

/// SMTP delivery over STARTTLS.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl SmtpMailer {
    /// Build a mailer. Returns `Ok(None)` when email is not configured.
    pub fn from_config(config: &EmailConfig) -> Result<Option<Self>> {
        if !config.is_configured() {
            return Ok(None);
        }

        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| SeoAgentError::config(format!("invalid email.from '{}': {e}", config.from)))?;
        let to = config
            .to
            .iter()
            .map(|addr| {
                addr.parse::<Mailbox>()
                    .map_err(|e| SeoAgentError::config(format!("invalid email.to '{addr}': {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| SeoAgentError::Email(e.to_string()))?
            .port(config.smtp_port)
            .timeout(Some(Duration::from_secs(config.timeout_secs)));

        if !config.username.is_empty() {
            let password = std::env::var(&config.password_env).unwrap_or_default();
            builder = builder.credentials(Credentials::new(config.username.clone(), password));
        }

        Ok(Some(Self {
            transport: builder.build(),
            from,
            to,
        }))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    #[instrument(skip_all, fields(recipients = self.to.len()))]
    async fn send(&self, subject: &str, html: &str) -> Result<()> {
        let mut builder = Message::builder().from(self.from.clone()).subject(subject);
        for to in &self.to {
            builder = builder.to(to.clone());
        }
        let message = builder
            .header(ContentType::TEXT_HTML)
            .body(html.to_string())
            .map_err(|e| SeoAgentError::Email(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| SeoAgentError::Email(e.to_string()))?;

        info!("report sent");
        Ok(())
    }
}
