//! Internal linking engine.
//!
//! Assets carrying fewer than the target number of internal links get a
//! generative pass that adds the missing links. The reply is accepted only
//! if it verifiably honoured the contract; anything else is a no-op. An
//! asset already at the target is skipped, so repeated runs converge.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use tracing::{debug, info, instrument, warn};

use seoagent_content::cleanup::{clean_body, strip_wrapping_fence};
use seoagent_content::{
    ContentAsset, count_external_links, count_internal_links, hash_file, internal_link_targets,
};
use seoagent_shared::{LinkOutcome, Result};

use crate::generative::{GenerationRequest, TextGenerator};

/// Linking parameters.
#[derive(Debug, Clone)]
pub struct LinkingOptions {
    /// Route prefix of internal links (`/blog`).
    pub prefix: String,
    /// Internal links each asset should carry.
    pub target_links: usize,
}

/// Result of a pass over the corpus.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkingReport {
    /// One entry per asset, in inventory order.
    pub outcomes: Vec<LinkOutcome>,
    /// Files whose bytes changed on disk.
    pub changed_files: Vec<PathBuf>,
}

impl LinkingReport {
    pub fn links_added(&self) -> usize {
        self.outcomes.iter().map(|o| o.links_added).sum()
    }
}

/// A link target offered to the generative service.
#[derive(Debug, Clone)]
struct Candidate {
    slug: String,
    title: String,
    keyword: String,
}

const ARTICLE_START: &str = "<<<ARTICLE";
const ARTICLE_END: &str = "ARTICLE>>>";

// ---------------------------------------------------------------------------
// Corpus pass
// ---------------------------------------------------------------------------

/// Run the linking engine over the whole inventory, updating bodies in
/// place and on disk. Generative failures for one asset are logged and the
/// pass continues.
#[instrument(skip_all, fields(assets = inventory.len(), target = options.target_links))]
pub async fn link_corpus(
    inventory: &mut [ContentAsset],
    options: &LinkingOptions,
    generator: &dyn TextGenerator,
) -> Result<LinkingReport> {
    let candidates: Vec<Candidate> = inventory
        .iter()
        .map(|a| Candidate {
            slug: a.slug().to_string(),
            title: a.title().to_string(),
            keyword: a.target_keyword().to_string(),
        })
        .collect();
    let known: HashSet<&str> = candidates.iter().map(|c| c.slug.as_str()).collect();

    let mut report = LinkingReport::default();
    for asset in inventory.iter_mut() {
        let before = count_internal_links(&asset.body, &options.prefix);
        let mut outcome = LinkOutcome {
            slug: asset.slug().to_string(),
            links_before: before,
            links_after: before,
            links_added: 0,
        };

        if before >= options.target_links {
            debug!(slug = asset.slug(), links = before, "link target met, skipping");
            report.outcomes.push(outcome);
            continue;
        }

        let linked: HashSet<String> = internal_link_targets(&asset.body, &options.prefix)
            .into_iter()
            .collect();
        let offered: Vec<&Candidate> = candidates
            .iter()
            .filter(|c| c.slug != asset.slug() && !linked.contains(&c.slug))
            .collect();
        if offered.is_empty() {
            debug!(slug = asset.slug(), "no link candidates");
            report.outcomes.push(outcome);
            continue;
        }

        let needed = options.target_links.saturating_sub(before).max(1);
        match inject_links(asset, &offered, needed, &known, options, generator).await {
            Ok(Some(body)) => {
                let hash_before = hash_file(&asset.path).ok();
                asset.body = body;
                asset.write()?;
                if hash_file(&asset.path).ok() != hash_before {
                    report.changed_files.push(asset.path.clone());
                }

                outcome.links_after = count_internal_links(&asset.body, &options.prefix);
                outcome.links_added = outcome.links_after - before;
                info!(
                    slug = asset.slug(),
                    added = outcome.links_added,
                    "internal links injected"
                );
            }
            Ok(None) => {}
            Err(e) => warn!(slug = asset.slug(), error = %e, "link injection failed"),
        }
        report.outcomes.push(outcome);
    }

    info!(
        added = report.links_added(),
        changed = report.changed_files.len(),
        "linking pass complete"
    );
    Ok(report)
}

/// Ask for `needed` new links in one asset. Returns the accepted body, or
/// `None` when the reply broke the contract.
async fn inject_links(
    asset: &ContentAsset,
    offered: &[&Candidate],
    needed: usize,
    known: &HashSet<&str>,
    options: &LinkingOptions,
    generator: &dyn TextGenerator,
) -> Result<Option<String>> {
    let request = link_request(asset, offered, needed, options);
    let reply = generator.complete(&request).await?;

    let body = strip_wrapping_fence(&reply);
    let body = body
        .strip_prefix(ARTICLE_START)
        .and_then(|b| b.strip_suffix(ARTICLE_END))
        .unwrap_or(body);
    let body = clean_body(body);

    match verify_injection(&asset.body, &body, asset.slug(), known, &options.prefix) {
        Ok(()) => Ok(Some(body)),
        Err(reason) => {
            warn!(slug = asset.slug(), %reason, "link injection rejected");
            Ok(None)
        }
    }
}

fn link_request(
    asset: &ContentAsset,
    offered: &[&Candidate],
    needed: usize,
    options: &LinkingOptions,
) -> GenerationRequest {
    let prefix = options.prefix.trim_end_matches('/');
    let list = offered
        .iter()
        .map(|c| format!("- {} ({prefix}/{}) keyword: {}", c.title, c.slug, c.keyword))
        .collect::<Vec<_>>()
        .join("\n");

    let prompt = format!(
        "Add {needed} contextual internal link(s) to the article below.\n\n\
         Rules:\n\
         - Link format: [anchor text]({prefix}/slug), using only the articles listed.\n\
         - Change nothing else. Keep every sentence, heading and existing link exactly as is.\n\
         - Never add external links.\n\
         - Reply with the full article body only, no frontmatter and no commentary.\n\n\
         Articles you can link to:\n{list}\n\n\
         {ARTICLE_START}\n{body}\n{ARTICLE_END}",
        body = asset.body.trim_end(),
    );

    GenerationRequest::new(
        "links",
        "You are a careful copy editor. You make the smallest possible edit.",
        prompt,
    )
    .temperature(0.2)
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Check an edited body against the linking contract.
///
/// The internal link count must grow, every pre-existing internal link must
/// survive, the external link count must not grow, and every new target
/// must be a known slug other than the asset's own.
pub fn verify_injection(
    before: &str,
    after: &str,
    own_slug: &str,
    known: &HashSet<&str>,
    prefix: &str,
) -> std::result::Result<(), String> {
    let old_targets = internal_link_targets(before, prefix);
    let new_targets = internal_link_targets(after, prefix);

    if new_targets.len() <= old_targets.len() {
        return Err(format!(
            "internal links did not increase ({} -> {})",
            old_targets.len(),
            new_targets.len()
        ));
    }

    let mut remaining: HashMap<&str, usize> = HashMap::new();
    for slug in &new_targets {
        *remaining.entry(slug.as_str()).or_default() += 1;
    }
    for slug in &old_targets {
        match remaining.get_mut(slug.as_str()) {
            Some(n) if *n > 0 => *n -= 1,
            _ => return Err(format!("existing link to '{slug}' was removed")),
        }
    }

    if let Some((slug, _)) = remaining
        .iter()
        .find(|(slug, n)| **n > 0 && (**slug == own_slug || !known.contains(**slug)))
    {
        return Err(format!("link to unknown or own slug '{slug}'"));
    }

    let external_before = count_external_links(before);
    let external_after = count_external_links(after);
    if external_after > external_before {
        return Err(format!(
            "external links grew ({external_before} -> {external_after})"
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use seoagent_content::{Frontmatter, load_inventory};
    use seoagent_shared::{Pillar, SeoAgentError};
    use uuid::Uuid;

    /// Appends links to the first offered candidate until the asset has three.
    struct LinkingModel {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl TextGenerator for LinkingModel {
        async fn complete(&self, request: &GenerationRequest) -> Result<String> {
            *self.calls.lock().unwrap() += 1;
            let prompt = &request.prompt;
            let start = prompt.find(ARTICLE_START).unwrap() + ARTICLE_START.len() + 1;
            let end = prompt.find(ARTICLE_END).unwrap() - 1;
            let body = &prompt[start..end];

            let slug = prompt
                .lines()
                .find(|l| l.starts_with("- ") && l.contains("keyword:"))
                .and_then(|l| l.split("(/blog/").nth(1))
                .and_then(|rest| rest.split(')').next())
                .unwrap();
            let needed: usize = prompt
                .strip_prefix("Add ")
                .and_then(|p| p.split(' ').next())
                .and_then(|n| n.parse().ok())
                .unwrap();

            let links: Vec<String> = (0..needed)
                .map(|i| format!("See [related guide {i}](/blog/{slug})."))
                .collect();
            Ok(format!("{body}\n\n{}", links.join(" ")))
        }
    }

    struct Echo;

    #[async_trait]
    impl TextGenerator for Echo {
        async fn complete(&self, request: &GenerationRequest) -> Result<String> {
            let p = &request.prompt;
            let start = p.find(ARTICLE_START).unwrap() + ARTICLE_START.len() + 1;
            let end = p.find(ARTICLE_END).unwrap() - 1;
            Ok(p[start..end].to_string())
        }
    }

    struct Down;

    #[async_trait]
    impl TextGenerator for Down {
        async fn complete(&self, _request: &GenerationRequest) -> Result<String> {
            Err(SeoAgentError::Generation("HTTP 500".into()))
        }
    }

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("seoagent_linking_{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_asset(dir: &Path, slug: &str, body: &str) {
        ContentAsset {
            path: dir.join(format!("2026-01-{slug}.mdx")),
            frontmatter: Frontmatter {
                title: format!("Guide to {slug}"),
                slug: slug.into(),
                description: "desc".into(),
                keywords: vec![slug.into()],
                published_at: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                updated_at: None,
                target_keyword: slug.replace('-', " "),
                author: "Team".into(),
                pillar: Pillar::General,
                hero_image: "/a.jpg".into(),
            },
            body: body.into(),
        }
        .write()
        .unwrap();
    }

    fn options() -> LinkingOptions {
        LinkingOptions {
            prefix: "/blog".into(),
            target_links: 3,
        }
    }

    #[tokio::test]
    async fn second_pass_adds_nothing() {
        let dir = temp_dir();
        write_asset(&dir, "alpha", "Alpha body.\n");
        write_asset(&dir, "beta", "Beta body with [one](/blog/alpha).\n");
        write_asset(
            &dir,
            "gamma",
            "Gamma [a](/blog/alpha) [b](/blog/beta) [c](/blog/alpha).\n",
        );

        let model = LinkingModel {
            calls: Mutex::new(0),
        };
        let mut inventory = load_inventory(&dir).unwrap();
        let first = link_corpus(&mut inventory, &options(), &model).await.unwrap();

        let added: Vec<usize> = first.outcomes.iter().map(|o| o.links_added).collect();
        assert_eq!(added, vec![3, 2, 0]);
        assert_eq!(first.changed_files.len(), 2);
        assert_eq!(*model.calls.lock().unwrap(), 2);

        let mut reloaded = load_inventory(&dir).unwrap();
        let second = link_corpus(&mut reloaded, &options(), &model).await.unwrap();
        assert!(second.outcomes.iter().all(|o| o.links_added == 0));
        assert!(second.changed_files.is_empty());
        assert_eq!(*model.calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn unchanged_reply_is_a_noop() {
        let dir = temp_dir();
        write_asset(&dir, "alpha", "Alpha body.\n");
        write_asset(&dir, "beta", "Beta body.\n");

        let mut inventory = load_inventory(&dir).unwrap();
        let report = link_corpus(&mut inventory, &options(), &Echo).await.unwrap();
        assert_eq!(report.links_added(), 0);
        assert!(report.changed_files.is_empty());
        assert_eq!(report.outcomes.len(), 2);
    }

    #[tokio::test]
    async fn generator_failure_is_per_item() {
        let dir = temp_dir();
        write_asset(&dir, "alpha", "Alpha body.\n");
        write_asset(&dir, "beta", "Beta body.\n");

        let mut inventory = load_inventory(&dir).unwrap();
        let report = link_corpus(&mut inventory, &options(), &Down).await.unwrap();
        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.links_added(), 0);
    }

    #[test]
    fn verification_rules() {
        let known: HashSet<&str> = ["alpha", "beta", "gamma"].into_iter().collect();
        let before = "Text [a](/blog/alpha) and [site](https://example.com).";

        let good = "Text [a](/blog/alpha) and [site](https://example.com). [b](/blog/beta)";
        assert!(verify_injection(before, good, "gamma", &known, "/blog").is_ok());

        let same = before;
        assert!(verify_injection(before, same, "gamma", &known, "/blog").is_err());

        let removed = "Text [b](/blog/beta) [c](/blog/beta) [site](https://example.com).";
        assert!(
            verify_injection(before, removed, "gamma", &known, "/blog")
                .unwrap_err()
                .contains("removed")
        );

        let unknown = "Text [a](/blog/alpha) [site](https://example.com) [z](/blog/zeta)";
        assert!(verify_injection(before, unknown, "gamma", &known, "/blog").is_err());

        let own = "Text [a](/blog/alpha) [site](https://example.com) [g](/blog/gamma)";
        assert!(verify_injection(before, own, "gamma", &known, "/blog").is_err());

        let external = "Text [a](/blog/alpha) [site](https://example.com) [b](/blog/beta) [x](https://x.io)";
        assert!(
            verify_injection(before, external, "gamma", &known, "/blog")
                .unwrap_err()
                .contains("external")
        );
    }
}
