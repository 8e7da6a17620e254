//! Content generator: turns a selector decision into a written asset.
//!
//! The generative service drafts the whole document (frontmatter + body).
//! Fields the pipeline owns (dates, slug on refresh, author, hero image,
//! target keyword) are overridden before validation. A draft that still
//! fails validation is a rejected outcome, not an error.

use std::collections::HashSet;
use std::path::Path;

use chrono::NaiveDate;
use tracing::{info, instrument, warn};

use seoagent_content::cleanup::{clean_body, strip_wrapping_fence};
use seoagent_content::{
    ContentAsset, DraftOverrides, MAX_DESCRIPTION_CHARS, asset_filename, parse_draft,
};
use seoagent_shared::{ContentConfig, ContentOutcome, ImagePool, Result, SiteConfig};

use crate::generative::{GenerationRequest, TextGenerator};
use crate::images::choose_hero_image;
use crate::selector::Decision;

/// Everything the generator reads besides the decision.
pub struct GeneratorContext<'a> {
    pub site: &'a SiteConfig,
    pub content: &'a ContentConfig,
    pub image_pools: &'a [ImagePool],
    /// Markdown rendering of the strategy document.
    pub strategy_markdown: &'a str,
    pub inventory: &'a [ContentAsset],
    pub content_dir: &'a Path,
    pub today: NaiveDate,
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

const SYSTEM_PROMPT: &str = "You are an expert content writer for a local automotive \
repair business. You write helpful, specific, locally relevant articles in British English. \
You output a single MDX document and nothing else.";

/// Build the generation request for a decision.
pub fn build_prompt(decision: &Decision, ctx: &GeneratorContext<'_>) -> GenerationRequest {
    let format = document_format(ctx);
    let related = related_articles(ctx.inventory, decision);

    let prompt = match decision {
        Decision::Create {
            keyword, context, ..
        } => format!(
            "Business: {site}\n\n\
             Our SEO strategy:\n\n{strategy}\n\n\
             Write a new blog article targeting the search keyword \"{keyword}\".\n\
             {context_line}\
             Length: between {min} and {max} words of body text.\n\
             Tone: practical, trustworthy, no hype. Use H2/H3 headings, never H1.\n\
             Where it reads naturally, link to related articles:\n{related}\n\n\
             {format}",
            site = ctx.site.name,
            strategy = ctx.strategy_markdown,
            context_line = if context.is_empty() {
                String::new()
            } else {
                format!("Context: {context}\n")
            },
            min = ctx.content.min_words,
            max = ctx.content.max_words,
        ),
        Decision::Refresh { asset, reason } => format!(
            "Business: {site}\n\n\
             Our SEO strategy:\n\n{strategy}\n\n\
             Refresh the existing article below. Why it needs work: {reason}.\n\
             Keep its slug \"{slug}\" and its target keyword \"{keyword}\". Improve depth, \
             accuracy and search intent coverage; keep existing internal links.\n\
             Length: between {min} and {max} words of body text.\n\
             Related articles you may link to:\n{related}\n\n\
             Current title: {title}\n\nCurrent body:\n\n{body}\n\n\
             {format}",
            site = ctx.site.name,
            strategy = ctx.strategy_markdown,
            slug = asset.slug(),
            keyword = asset.target_keyword(),
            title = asset.title(),
            body = asset.body,
            min = ctx.content.min_words,
            max = ctx.content.max_words,
        ),
    };

    let task = match decision {
        Decision::Create { .. } => "create",
        Decision::Refresh { .. } => "refresh",
    };
    GenerationRequest::new(task, SYSTEM_PROMPT, prompt).max_tokens(6000)
}

fn document_format(ctx: &GeneratorContext<'_>) -> String {
    format!(
        "Output format: a YAML frontmatter block between --- lines, then the markdown body.\n\
         Frontmatter keys: title, slug (lowercase kebab-case), description (at most \
         {MAX_DESCRIPTION_CHARS} characters), keywords (list), pillar (one of: alloy-wheels, \
         smart-repair, general).\n\
         Internal links use the form [anchor text]({prefix}/slug).",
        prefix = ctx.site.blog_prefix.trim_end_matches('/'),
    )
}

fn related_articles(inventory: &[ContentAsset], decision: &Decision) -> String {
    let own_slug = match decision {
        Decision::Refresh { asset, .. } => Some(asset.slug()),
        Decision::Create { .. } => None,
    };
    let lines: Vec<String> = inventory
        .iter()
        .filter(|a| Some(a.slug()) != own_slug)
        .map(|a| format!("- {} (slug: {})", a.title(), a.slug()))
        .collect();
    if lines.is_empty() {
        "(none yet)".into()
    } else {
        lines.join("\n")
    }
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Execute a decision. Transport failures propagate; unusable drafts
/// become [`ContentOutcome::Rejected`].
#[instrument(skip_all, fields(decision = %decision.describe()))]
pub async fn generate(
    decision: &Decision,
    ctx: &GeneratorContext<'_>,
    generator: &dyn TextGenerator,
) -> Result<ContentOutcome> {
    let overrides = owned_fields(decision, ctx);
    let request = build_prompt(decision, ctx);
    let reply = generator.complete(&request).await?;

    let topic = match decision {
        Decision::Create { keyword, .. } => keyword.clone(),
        Decision::Refresh { asset, .. } => asset.slug().to_string(),
    };
    let reject = |reason: String| -> Result<ContentOutcome> {
        warn!(%topic, %reason, "generated document rejected");
        Ok(ContentOutcome::Rejected {
            topic: topic.clone(),
            reason,
        })
    };

    let (frontmatter, body) = match parse_draft(strip_wrapping_fence(&reply), &overrides) {
        Ok(parsed) => parsed,
        Err(e) => return reject(e.to_string()),
    };

    let path = match decision {
        Decision::Refresh { asset, .. } => asset.path.clone(),
        Decision::Create { .. } => {
            if ctx.inventory.iter().any(|a| a.slug() == frontmatter.slug) {
                return reject(format!("slug '{}' already exists", frontmatter.slug));
            }
            let path = ctx
                .content_dir
                .join(asset_filename(frontmatter.published_at, &frontmatter.slug));
            if path.exists() {
                return reject(format!("{} already exists", path.display()));
            }
            path
        }
    };

    let asset = ContentAsset {
        path,
        frontmatter,
        body: clean_body(&body),
    };
    asset.write()?;

    let word_count = asset.word_count();
    let within_length = (ctx.content.min_words..=ctx.content.max_words).contains(&word_count);
    if !within_length {
        warn!(
            word_count,
            min = ctx.content.min_words,
            max = ctx.content.max_words,
            "generated length outside target range"
        );
    }

    let path = asset.path.display().to_string();
    info!(slug = asset.slug(), word_count, %path, "asset written");

    Ok(match decision {
        Decision::Create { keyword, .. } => ContentOutcome::Created {
            slug: asset.slug().to_string(),
            title: asset.title().to_string(),
            keyword: keyword.clone(),
            path,
            word_count,
            within_length,
        },
        Decision::Refresh { reason, .. } => ContentOutcome::Refreshed {
            slug: asset.slug().to_string(),
            title: asset.title().to_string(),
            reason: reason.clone(),
            path,
            word_count,
            within_length,
        },
    })
}

fn owned_fields(decision: &Decision, ctx: &GeneratorContext<'_>) -> DraftOverrides {
    match decision {
        Decision::Create { keyword, .. } => {
            let used: HashSet<String> = ctx
                .inventory
                .iter()
                .map(|a| a.frontmatter.hero_image.clone())
                .collect();
            let hero_image = choose_hero_image(ctx.image_pools, keyword, &used, &mut rand::rng());
            DraftOverrides {
                slug: None,
                published_at: Some(ctx.today),
                updated_at: None,
                target_keyword: Some(keyword.clone()),
                author: Some(ctx.site.author.clone()),
                hero_image,
                default_pillar: Some(ctx.content.default_pillar),
            }
        }
        Decision::Refresh { asset, .. } => {
            let fm = &asset.frontmatter;
            DraftOverrides {
                slug: Some(fm.slug.clone()),
                published_at: Some(fm.published_at),
                updated_at: Some(ctx.today),
                target_keyword: Some(fm.target_keyword.clone()),
                author: Some(fm.author.clone()),
                hero_image: Some(fm.hero_image.clone()),
                default_pillar: Some(fm.pillar),
            }
        }
    }
}
