//! Word-boundary-safe keyword matchers compiled once from the term lists.

use std::collections::BTreeSet;

use regex::{Regex, RegexBuilder};

use crate::config::SignalLists;
use crate::RulesError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalCategory {
    AreaExclusion,
    SeniorityExclusion,
    PositiveSeniority,
    RequiredIt,
    WeakIt,
    StrongRole,
    StrongTech,
    AmbiguousRole,
    ExplicitDomain,
}

impl SignalCategory {
    pub const ALL: [SignalCategory; 9] = [
        SignalCategory::AreaExclusion,
        SignalCategory::SeniorityExclusion,
        SignalCategory::PositiveSeniority,
        SignalCategory::RequiredIt,
        SignalCategory::WeakIt,
        SignalCategory::StrongRole,
        SignalCategory::StrongTech,
        SignalCategory::AmbiguousRole,
        SignalCategory::ExplicitDomain,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalCategory::AreaExclusion => "area_exclusion",
            SignalCategory::SeniorityExclusion => "seniority_exclusion",
            SignalCategory::PositiveSeniority => "positive_seniority",
            SignalCategory::RequiredIt => "required_it",
            SignalCategory::WeakIt => "weak_it",
            SignalCategory::StrongRole => "strong_role",
            SignalCategory::StrongTech => "strong_tech",
            SignalCategory::AmbiguousRole => "ambiguous_role",
            SignalCategory::ExplicitDomain => "explicit_domain",
        }
    }
}

/// Alternation over a term list. A term only matches when it is not glued to
/// surrounding word characters, so "it" never fires inside "Visitor".
#[derive(Debug, Clone)]
pub struct Matcher {
    regex: Option<Regex>,
}

impl Matcher {
    pub fn compile(terms: &[String], case_insensitive: bool) -> Result<Self, regex::Error> {
        let mut terms: Vec<&str> = terms
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect();
        if terms.is_empty() {
            return Ok(Self { regex: None });
        }
        // Longest first so "machine learning engineer" wins over "machine learning".
        terms.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then(a.cmp(b)));
        terms.dedup();

        let pattern = terms
            .iter()
            .map(|t| bounded_term(t))
            .collect::<Vec<_>>()
            .join("|");
        let regex = RegexBuilder::new(&pattern)
            .case_insensitive(case_insensitive)
            .build()?;
        Ok(Self { regex: Some(regex) })
    }

    /// Distinct matched terms, lowercased with inner whitespace collapsed.
    pub fn find_all(&self, text: &str) -> BTreeSet<String> {
        let Some(regex) = &self.regex else {
            return BTreeSet::new();
        };
        regex
            .find_iter(text)
            .filter(|m| standalone(text, m.start(), m.end()))
            .map(|m| {
                m.as_str()
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ")
                    .to_lowercase()
            })
            .collect()
    }

    pub fn is_match(&self, text: &str) -> bool {
        let Some(regex) = &self.regex else {
            return false;
        };
        regex
            .find_iter(text)
            .any(|m| standalone(text, m.start(), m.end()))
    }

    pub fn is_empty(&self) -> bool {
        self.regex.is_none()
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn bounded_term(term: &str) -> String {
    let escaped = term
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+");
    let lead = if term.starts_with(is_word_char) { r"\b" } else { "" };
    let trail = if term.ends_with(is_word_char) { r"\b" } else { "" };
    format!("{lead}{escaped}{trail}")
}

// Terms like "c++" or ".net" end or start with punctuation, where `\b` cannot help.
fn standalone(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
}

/// Years-of-experience extraction from free text.
#[derive(Debug, Clone, Default)]
pub struct ExperienceDetector {
    patterns: Vec<Regex>,
}

impl ExperienceDetector {
    pub fn compile(patterns: &[String]) -> Result<Self, RulesError> {
        let patterns = patterns
            .iter()
            .filter(|p| !p.trim().is_empty())
            .map(|p| {
                let regex = RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| RulesError::InvalidPattern {
                        list: "experience_patterns".to_string(),
                        source,
                    })?;
                if regex.captures_len() < 2 {
                    return Err(RulesError::MissingCapture(p.clone()));
                }
                Ok(regex)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Largest number of years any pattern mentions.
    pub fn max_years(&self, text: &str) -> Option<u32> {
        self.patterns
            .iter()
            .flat_map(|re| re.captures_iter(text))
            .filter_map(|caps| caps.get(1)?.as_str().parse::<u32>().ok())
            .max()
    }
}

/// One matcher per signal category plus the experience detector.
#[derive(Debug, Clone)]
pub struct SignalSet {
    area_exclusion: Matcher,
    seniority_exclusion: Matcher,
    positive_seniority: Matcher,
    required_it: Matcher,
    weak_it: Matcher,
    strong_role: Matcher,
    strong_tech: Matcher,
    ambiguous_role: Matcher,
    explicit_domain: Matcher,
    experience: ExperienceDetector,
}

impl SignalSet {
    pub fn compile(lists: &SignalLists) -> Result<Self, RulesError> {
        let build = |category: SignalCategory, terms: &[String], case_insensitive: bool| {
            Matcher::compile(terms, case_insensitive).map_err(|source| RulesError::InvalidPattern {
                list: category.as_str().to_string(),
                source,
            })
        };
        Ok(Self {
            area_exclusion: build(SignalCategory::AreaExclusion, &lists.area_exclusion, true)?,
            seniority_exclusion: build(
                SignalCategory::SeniorityExclusion,
                &lists.seniority_exclusion,
                true,
            )?,
            positive_seniority: build(
                SignalCategory::PositiveSeniority,
                &lists.positive_seniority,
                true,
            )?,
            required_it: build(SignalCategory::RequiredIt, &lists.required_it, true)?,
            weak_it: build(SignalCategory::WeakIt, &lists.weak_it, true)?,
            strong_role: build(SignalCategory::StrongRole, &lists.strong_role, true)?,
            strong_tech: build(SignalCategory::StrongTech, &lists.strong_tech, true)?,
            ambiguous_role: build(SignalCategory::AmbiguousRole, &lists.ambiguous_role, true)?,
            explicit_domain: build(SignalCategory::ExplicitDomain, &lists.explicit_domain, false)?,
            experience: ExperienceDetector::compile(&lists.experience_patterns)?,
        })
    }

    pub fn matcher(&self, category: SignalCategory) -> &Matcher {
        match category {
            SignalCategory::AreaExclusion => &self.area_exclusion,
            SignalCategory::SeniorityExclusion => &self.seniority_exclusion,
            SignalCategory::PositiveSeniority => &self.positive_seniority,
            SignalCategory::RequiredIt => &self.required_it,
            SignalCategory::WeakIt => &self.weak_it,
            SignalCategory::StrongRole => &self.strong_role,
            SignalCategory::StrongTech => &self.strong_tech,
            SignalCategory::AmbiguousRole => &self.ambiguous_role,
            SignalCategory::ExplicitDomain => &self.explicit_domain,
        }
    }

    pub fn find_all(&self, category: SignalCategory, text: &str) -> BTreeSet<String> {
        self.matcher(category).find_all(text)
    }

    pub fn matches(&self, category: SignalCategory, text: &str) -> bool {
        self.matcher(category).is_match(text)
    }

    pub fn experience(&self) -> &ExperienceDetector {
        &self.experience
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn it_does_not_match_inside_visitor() {
        let m = Matcher::compile(&terms(&["it", "developer"]), true).unwrap();
        assert!(!m.is_match("Visitor Management Specialist"));
        assert!(m.find_all("Visitor Management Specialist").is_empty());
        assert!(m.is_match("Soporte IT"));
    }

    #[test]
    fn find_all_returns_distinct_lowercased_terms() {
        let m = Matcher::compile(&terms(&["python", "django"]), true).unwrap();
        let found = m.find_all("Python, PYTHON and Django");
        assert_eq!(
            found.into_iter().collect::<Vec<_>>(),
            vec!["django".to_string(), "python".to_string()]
        );
    }

    #[test]
    fn punctuated_terms_keep_their_edges() {
        let m = Matcher::compile(&terms(&["c++", ".net", "c#"]), true).unwrap();
        assert!(m.is_match("Experiencia en C++ y .NET"));
        assert!(m.is_match("stack: c#"));
        assert!(!m.is_match("abc++"));
        assert!(!m.is_match("asp.network"));
    }

    #[test]
    fn multiword_terms_tolerate_extra_whitespace() {
        let m = Matcher::compile(&terms(&["soporte técnico"]), true).unwrap();
        assert_eq!(
            m.find_all("Analista de Soporte   Técnico").into_iter().collect::<Vec<_>>(),
            vec!["soporte técnico".to_string()]
        );
    }

    #[test]
    fn empty_list_never_matches() {
        let m = Matcher::compile(&[], true).unwrap();
        assert!(m.is_empty());
        assert!(!m.is_match("anything at all"));
        let blanks = Matcher::compile(&terms(&["", "   "]), true).unwrap();
        assert!(!blanks.is_match(" "));
    }

    #[test]
    fn case_sensitive_matcher_only_hits_exact_case() {
        let m = Matcher::compile(&terms(&["IT"]), false).unwrap();
        assert!(m.is_match("Soporte IT Junior"));
        assert!(!m.is_match("make it work"));
    }

    #[test]
    fn experience_detector_takes_maximum() {
        let detector = ExperienceDetector::compile(&terms(&[
            r"(\d{1,2})\s*\+?\s*(?:years?|años)",
        ]))
        .unwrap();
        assert_eq!(detector.max_years("2 years of Python, 5+ years overall"), Some(5));
        assert_eq!(detector.max_years("sin experiencia"), None);
    }

    #[test]
    fn experience_pattern_without_group_fails_at_compile() {
        let err = ExperienceDetector::compile(&terms(&[r"\d+ years"])).unwrap_err();
        assert!(matches!(err, RulesError::MissingCapture(_)));
        let err = ExperienceDetector::compile(&terms(&[r"(\d+"])).unwrap_err();
        assert!(matches!(err, RulesError::InvalidPattern { .. }));
    }
}
