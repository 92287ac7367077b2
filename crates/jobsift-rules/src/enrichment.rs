//! Topic tags and work modality derived from posting text.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use jobsift_core::{JobPosting, Modality};
use regex::Regex;

use crate::config::TagRules;
use crate::signals::Matcher;
use crate::RulesError;

/// Compiled tag categories, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct TagSet {
    categories: Vec<(String, Matcher)>,
}

impl TagSet {
    pub fn compile(rules: &TagRules) -> Result<Self, RulesError> {
        let categories = rules
            .rules
            .iter()
            .map(|rule| {
                let matcher = Matcher::compile(&rule.contains_any, true).map_err(|source| {
                    RulesError::InvalidPattern {
                        list: format!("tags.{}", rule.tag),
                        source,
                    }
                })?;
                Ok((rule.tag.clone(), matcher))
            })
            .collect::<Result<Vec<_>, RulesError>>()?;
        Ok(Self { categories })
    }

    /// Matched keywords per category; categories with no hit are omitted.
    pub fn extract(&self, text: &str) -> BTreeMap<String, Vec<String>> {
        let mut tags: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (tag, matcher) in &self.categories {
            let found = matcher.find_all(text);
            if !found.is_empty() {
                tags.entry(tag.clone()).or_default().extend(found);
            }
        }
        tags
    }
}

static FULL_ONSITE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(100%\s*(on-site|onsite|presencial)|exclusivamente\s*presencial)\b").unwrap()
});
static REMOTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(remoto|remote|desde\s*casa|work\s*from\s*home|wfh|teletrabajo|anywhere)\b")
        .unwrap()
});
static ONSITE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(presencial|on-site|onsite|oficina|sede|caba|buenos\s*aires|viajes)\b").unwrap()
});
static HYBRID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(híbrido|híbrida|hibrido|hibrida|hybrid|mixto)\b").unwrap());

/// Explicit fully on-site wording wins; remote plus on-site mentions read as hybrid.
pub fn extract_modality(text: &str) -> Modality {
    if FULL_ONSITE_RE.is_match(text) {
        return Modality::OnSite;
    }
    let remote = REMOTE_RE.is_match(text);
    let onsite = ONSITE_RE.is_match(text);
    if HYBRID_RE.is_match(text) || (remote && onsite) {
        Modality::Hybrid
    } else if onsite {
        Modality::OnSite
    } else if remote {
        Modality::Remote
    } else {
        Modality::NotSpecified
    }
}

pub fn enrich(tags: &TagSet, posting: &mut JobPosting) {
    let text = posting.full_text();
    posting.tags = tags.extract(&text);
    posting.modality = extract_modality(&text);
}

pub fn enrich_all(tags: &TagSet, postings: &mut [JobPosting]) {
    for posting in postings {
        enrich(tags, posting);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::posting;
    use crate::Ruleset;

    #[test]
    fn tags_group_keywords_by_category() {
        let ruleset = Ruleset::builtin().unwrap();
        let tags = ruleset.tags().extract("Python, React y Docker. Testing con Selenium.");
        assert_eq!(tags["languages"], vec!["python".to_string()]);
        assert_eq!(tags["frameworks"], vec!["react".to_string()]);
        assert_eq!(tags["cloud_devops"], vec!["docker".to_string()]);
        assert_eq!(tags["qa"], vec!["selenium".to_string(), "testing".to_string()]);
        assert!(!tags.contains_key("security"));
    }

    #[test]
    fn modality_rules() {
        assert_eq!(extract_modality("Trabajo 100% presencial en oficina"), Modality::OnSite);
        assert_eq!(extract_modality("Modalidad remoto"), Modality::Remote);
        assert_eq!(extract_modality("Esquema híbrido"), Modality::Hybrid);
        assert_eq!(extract_modality("Remote, con visitas a la oficina"), Modality::Hybrid);
        assert_eq!(extract_modality("Sede Palermo"), Modality::OnSite);
        assert_eq!(extract_modality("Python developer"), Modality::NotSpecified);
    }

    #[test]
    fn enrich_fills_tags_and_modality() {
        let ruleset = Ruleset::builtin().unwrap();
        let mut p = posting("1", "Desarrollador Python", "Trabajo remoto con AWS");
        enrich(ruleset.tags(), &mut p);
        assert_eq!(p.modality, Modality::Remote);
        assert_eq!(p.tag_keywords().collect::<Vec<_>>(), ["aws", "python"]);
    }
}
