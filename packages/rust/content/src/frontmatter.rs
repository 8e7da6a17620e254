//! Typed frontmatter: parse, validate, serialize.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use seoagent_shared::{Pillar, Result, SeoAgentError};

/// Maximum length of the `description` field, in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 160;

static FRONTMATTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*---\r?\n(.*?)\r?\n---[ \t]*(?:\r?\n(.*))?$").expect("valid regex")
});

static SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("valid regex"));

/// Mandatory metadata block of a content asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frontmatter {
    pub title: String,
    /// Unique, immutable across refreshes.
    pub slug: String,
    pub description: String,
    pub keywords: Vec<String>,
    /// Immutable across refreshes.
    pub published_at: NaiveDate,
    /// Set only on refresh.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<NaiveDate>,
    pub target_keyword: String,
    pub author: String,
    pub pillar: Pillar,
    pub hero_image: String,
}

impl Frontmatter {
    /// Check the schema rules serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(SeoAgentError::validation("title is empty"));
        }
        if !SLUG_RE.is_match(&self.slug) {
            return Err(SeoAgentError::validation(format!(
                "slug '{}' is not lowercase kebab-case",
                self.slug
            )));
        }
        let description_len = self.description.chars().count();
        if self.description.trim().is_empty() {
            return Err(SeoAgentError::validation("description is empty"));
        }
        if description_len > MAX_DESCRIPTION_CHARS {
            return Err(SeoAgentError::validation(format!(
                "description is {description_len} characters (max {MAX_DESCRIPTION_CHARS})"
            )));
        }
        if self.keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(SeoAgentError::validation("keywords list is empty"));
        }
        if self.target_keyword.trim().is_empty() {
            return Err(SeoAgentError::validation("targetKeyword is empty"));
        }
        if self.author.trim().is_empty() {
            return Err(SeoAgentError::validation("author is empty"));
        }
        if !self.hero_image.starts_with('/') {
            return Err(SeoAgentError::validation(format!(
                "heroImage '{}' must be a site-absolute path",
                self.hero_image
            )));
        }
        if let Some(updated) = self.updated_at {
            if updated < self.published_at {
                return Err(SeoAgentError::validation(format!(
                    "updatedAt {updated} is before publishedAt {}",
                    self.published_at
                )));
            }
        }
        Ok(())
    }

    /// Date the asset was last written (refresh date, else publish date).
    pub fn last_touched(&self) -> NaiveDate {
        self.updated_at.unwrap_or(self.published_at)
    }
}

/// Split a document into validated frontmatter and body.
pub fn parse_document(raw: &str) -> Result<(Frontmatter, String)> {
    let caps = FRONTMATTER_RE
        .captures(raw)
        .ok_or_else(|| SeoAgentError::validation("document has no frontmatter block"))?;

    let yaml = &caps[1];
    let body = caps.get(2).map(|m| m.as_str()).unwrap_or_default();

    let frontmatter: Frontmatter = serde_yaml::from_str(yaml)
        .map_err(|e| SeoAgentError::validation(format!("invalid frontmatter: {e}")))?;
    frontmatter.validate()?;

    Ok((frontmatter, body.trim_start_matches(['\r', '\n']).to_string()))
}

/// Fields the pipeline owns on a generated draft. `Some` values replace
/// whatever the draft says; `None` keeps the draft's value.
#[derive(Debug, Clone, Default)]
pub struct DraftOverrides {
    pub slug: Option<String>,
    pub published_at: Option<NaiveDate>,
    pub updated_at: Option<NaiveDate>,
    pub target_keyword: Option<String>,
    pub author: Option<String>,
    pub hero_image: Option<String>,
    /// Used only when the draft has no `pillar`.
    pub default_pillar: Option<Pillar>,
}

/// Parse a generated draft, applying `overrides` before schema validation.
///
/// A draft missing `keywords` gets `[targetKeyword]`. Every other mandatory
/// field must come from the draft or the overrides.
pub fn parse_draft(raw: &str, overrides: &DraftOverrides) -> Result<(Frontmatter, String)> {
    let caps = FRONTMATTER_RE
        .captures(raw)
        .ok_or_else(|| SeoAgentError::validation("document has no frontmatter block"))?;

    let yaml = &caps[1];
    let body = caps.get(2).map(|m| m.as_str()).unwrap_or_default();

    let mut map: Mapping = serde_yaml::from_str(yaml)
        .map_err(|e| SeoAgentError::validation(format!("invalid frontmatter: {e}")))?;

    let mut set = |key: &str, value: Option<String>| {
        if let Some(value) = value {
            map.insert(Value::from(key), Value::from(value));
        }
    };
    set("slug", overrides.slug.clone());
    set("publishedAt", overrides.published_at.map(|d| d.to_string()));
    set("updatedAt", overrides.updated_at.map(|d| d.to_string()));
    set("targetKeyword", overrides.target_keyword.clone());
    set("author", overrides.author.clone());
    set("heroImage", overrides.hero_image.clone());

    if let Some(pillar) = overrides.default_pillar {
        if !map.contains_key("pillar") {
            map.insert(Value::from("pillar"), Value::from(pillar.as_str()));
        }
    }
    if !map.contains_key("keywords") {
        if let Some(target) = map.get("targetKeyword").cloned() {
            map.insert(Value::from("keywords"), Value::Sequence(vec![target]));
        }
    }

    let frontmatter: Frontmatter = serde_yaml::from_value(Value::Mapping(map))
        .map_err(|e| SeoAgentError::validation(format!("invalid frontmatter: {e}")))?;
    frontmatter.validate()?;

    Ok((frontmatter, body.trim_start_matches(['\r', '\n']).to_string()))
}

/// Render frontmatter and body back into a document.
pub fn serialize_document(frontmatter: &Frontmatter, body: &str) -> Result<String> {
    frontmatter.validate()?;
    let yaml = serde_yaml::to_string(frontmatter)
        .map_err(|e| SeoAgentError::parse(format!("failed to serialize frontmatter: {e}")))?;

    let body = body.trim_matches('\n');
    Ok(format!("---\n{}\n---\n\n{body}\n", yaml.trim_end()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Frontmatter {
        Frontmatter {
            title: "Alloy Wheel Repair in Exeter: Costs and Turnaround".into(),
            slug: "alloy-wheel-repair-exeter".into(),
            description: "What alloy wheel repair costs in Exeter, how long it takes, and when a wheel is beyond repair.".into(),
            keywords: vec!["alloy wheel repair".into(), "exeter".into()],
            published_at: NaiveDate::from_ymd_opt(2026, 3, 4).unwrap(),
            updated_at: None,
            target_keyword: "alloy wheel repair exeter".into(),
            author: "Wheel Repair Team".into(),
            pillar: Pillar::AlloyWheels,
            hero_image: "/images/blog/alloy-1.jpg".into(),
        }
    }

    #[test]
    fn roundtrip_preserves_all_fields() {
        let mut fm = sample();
        fm.updated_at = NaiveDate::from_ymd_opt(2026, 10, 16);
        let doc = serialize_document(&fm, "Intro paragraph.\n\n## Costs\n\nDetail.").unwrap();

        assert!(doc.starts_with("---\n"));
        assert!(doc.contains("targetKeyword:"));
        assert!(doc.contains("pillar: alloy-wheels"));

        let (parsed, body) = parse_document(&doc).unwrap();
        assert_eq!(parsed, fm);
        assert_eq!(body, "Intro paragraph.\n\n## Costs\n\nDetail.\n");
    }

    #[test]
    fn missing_field_is_rejected() {
        let doc = "---\ntitle: Test\nslug: test\n---\n\nBody";
        let err = parse_document(doc).unwrap_err();
        assert!(err.to_string().contains("invalid frontmatter"));
    }

    #[test]
    fn no_frontmatter_is_rejected() {
        assert!(parse_document("# Just a heading\n\nBody").is_err());
    }

    #[test]
    fn long_description_is_rejected() {
        let mut fm = sample();
        fm.description = "x".repeat(161);
        let err = fm.validate().unwrap_err();
        assert!(err.to_string().contains("161 characters"));

        fm.description = "y".repeat(160);
        assert!(fm.validate().is_ok());
    }

    #[test]
    fn bad_slug_and_pillar_rejected() {
        let mut fm = sample();
        fm.slug = "Alloy Wheel".into();
        assert!(fm.validate().is_err());

        let doc = serialize_document(&sample(), "Body")
            .unwrap()
            .replace("pillar: alloy-wheels", "pillar: tyres");
        assert!(parse_document(&doc).is_err());
    }

    #[test]
    fn updated_before_published_rejected() {
        let mut fm = sample();
        fm.updated_at = NaiveDate::from_ymd_opt(2025, 1, 1);
        assert!(fm.validate().is_err());
    }

    #[test]
    fn last_touched_prefers_update() {
        let mut fm = sample();
        assert_eq!(fm.last_touched(), fm.published_at);
        fm.updated_at = NaiveDate::from_ymd_opt(2026, 9, 1);
        assert_eq!(fm.last_touched(), NaiveDate::from_ymd_opt(2026, 9, 1).unwrap());
    }

    #[test]
    fn draft_overrides_owned_fields() {
        let draft = "---\ntitle: Kerb Damage Explained\nslug: kerb-damage-explained\ndescription: What kerb damage does to a wheel.\npublishedAt: 1999-01-01\nauthor: Model\n---\n\nBody text.";
        let overrides = DraftOverrides {
            published_at: NaiveDate::from_ymd_opt(2026, 10, 16),
            target_keyword: Some("kerb damage".into()),
            author: Some("Wheel Repair Team".into()),
            hero_image: Some("/images/blog/kerb.jpg".into()),
            default_pillar: Some(Pillar::AlloyWheels),
            ..Default::default()
        };

        let (fm, body) = parse_draft(draft, &overrides).unwrap();
        assert_eq!(fm.published_at, NaiveDate::from_ymd_opt(2026, 10, 16).unwrap());
        assert_eq!(fm.author, "Wheel Repair Team");
        assert_eq!(fm.pillar, Pillar::AlloyWheels);
        assert_eq!(fm.keywords, vec!["kerb damage".to_string()]);
        assert_eq!(body, "Body text.");
    }

    #[test]
    fn draft_keeps_its_own_pillar() {
        let doc = serialize_document(&sample(), "Body").unwrap();
        let overrides = DraftOverrides {
            default_pillar: Some(Pillar::General),
            ..Default::default()
        };
        let (fm, _) = parse_draft(&doc, &overrides).unwrap();
        assert_eq!(fm.pillar, Pillar::AlloyWheels);
    }

    #[test]
    fn draft_missing_title_is_rejected() {
        let draft = "---\nslug: x\ndescription: d\n---\n\nBody";
        let overrides = DraftOverrides {
            published_at: NaiveDate::from_ymd_opt(2026, 10, 16),
            target_keyword: Some("x".into()),
            author: Some("a".into()),
            hero_image: Some("/x.jpg".into()),
            default_pillar: Some(Pillar::General),
            ..Default::default()
        };
        let err = parse_draft(draft, &overrides).unwrap_err();
        assert!(err.to_string().contains("title"));
    }
}
