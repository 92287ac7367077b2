//! YAML rule files: term lists, scoring weights and tag keywords.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::RulesError;

const BUILTIN_SIGNALS: &str = include_str!("../../../rules/signals.yaml");
const BUILTIN_SCORING: &str = include_str!("../../../rules/scoring.yaml");
const BUILTIN_TAGS: &str = include_str!("../../../rules/tags.yaml");

/// Term lists feeding the signal matchers. Every list may be empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalLists {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub area_exclusion: Vec<String>,
    #[serde(default)]
    pub seniority_exclusion: Vec<String>,
    #[serde(default)]
    pub positive_seniority: Vec<String>,
    #[serde(default)]
    pub required_it: Vec<String>,
    #[serde(default)]
    pub weak_it: Vec<String>,
    #[serde(default)]
    pub strong_role: Vec<String>,
    #[serde(default)]
    pub strong_tech: Vec<String>,
    #[serde(default)]
    pub ambiguous_role: Vec<String>,
    /// Matched case-sensitively, as whole words, against the title.
    #[serde(default)]
    pub explicit_domain: Vec<String>,
    /// Regexes whose first capture group is a number of years.
    #[serde(default)]
    pub experience_patterns: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierCutoffs {
    pub excellent: f64,
    pub good: f64,
    pub review: f64,
}

impl Default for TierCutoffs {
    fn default() -> Self {
        Self {
            excellent: 80.0,
            good: 65.0,
            review: 50.0,
        }
    }
}

/// Every weight, cap and threshold the scorer reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub version: u32,
    pub base: f64,
    pub seniority_bonus_strong: f64,
    pub seniority_bonus_weak: f64,
    pub strong_evidence_min_required: usize,
    pub strong_role_bonus: f64,
    pub explicit_domain_bonus: f64,
    pub strong_tech_per_signal: f64,
    pub strong_tech_cap: f64,
    pub it_signal_per_signal: f64,
    pub it_signal_cap: f64,
    pub weak_signal_per_signal: f64,
    pub weak_signal_cap: f64,
    pub rich_description_threshold: usize,
    pub rich_description_per_signal: f64,
    pub rich_description_cap: f64,
    pub combination_bonus: f64,
    pub only_weak_signals_penalty: f64,
    pub few_signals_min: usize,
    pub few_signals_penalty: f64,
    pub ambiguous_role_penalty: f64,
    pub senior_experience_penalty: f64,
    pub senior_years_threshold: u32,
    /// Maximum number of matched terms kept as evidence per breakdown entry.
    pub evidence_sample: usize,
    pub tiers: TierCutoffs,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            version: 1,
            base: 50.0,
            seniority_bonus_strong: 20.0,
            seniority_bonus_weak: 10.0,
            strong_evidence_min_required: 2,
            strong_role_bonus: 15.0,
            explicit_domain_bonus: 10.0,
            strong_tech_per_signal: 12.0,
            strong_tech_cap: 30.0,
            it_signal_per_signal: 2.0,
            it_signal_cap: 20.0,
            weak_signal_per_signal: 0.5,
            weak_signal_cap: 5.0,
            rich_description_threshold: 5,
            rich_description_per_signal: 1.0,
            rich_description_cap: 10.0,
            combination_bonus: 5.0,
            only_weak_signals_penalty: 25.0,
            few_signals_min: 2,
            few_signals_penalty: 15.0,
            ambiguous_role_penalty: 25.0,
            senior_experience_penalty: 20.0,
            senior_years_threshold: 3,
            evidence_sample: 5,
            tiers: TierCutoffs::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagRule {
    pub tag: String,
    pub contains_any: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagRules {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub rules: Vec<TagRule>,
}

impl TagRules {
    pub fn as_map(&self) -> BTreeMap<&str, &[String]> {
        self.rules
            .iter()
            .map(|r| (r.tag.as_str(), r.contains_any.as_slice()))
            .collect()
    }
}

/// The three rule files, parsed but not yet compiled.
#[derive(Debug, Clone, PartialEq)]
pub struct RulesConfig {
    pub signals: SignalLists,
    pub scoring: ScoringWeights,
    pub tags: TagRules,
}

impl RulesConfig {
    /// Rules shipped with the binary, identical to the checked-in `rules/` directory.
    pub fn builtin() -> Result<Self, RulesError> {
        Ok(Self {
            signals: parse_yaml("builtin:signals.yaml", BUILTIN_SIGNALS)?,
            scoring: parse_yaml("builtin:scoring.yaml", BUILTIN_SCORING)?,
            tags: parse_yaml("builtin:tags.yaml", BUILTIN_TAGS)?,
        })
    }

    /// Load `signals.yaml`, `scoring.yaml` and `tags.yaml` from a rules directory.
    pub fn from_dir(dir: &Path) -> Result<Self, RulesError> {
        Ok(Self {
            signals: read_yaml(&dir.join("signals.yaml"))?,
            scoring: read_yaml(&dir.join("scoring.yaml"))?,
            tags: read_yaml(&dir.join("tags.yaml"))?,
        })
    }
}

fn read_yaml<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Result<T, RulesError> {
    let raw = std::fs::read_to_string(path).map_err(|source| RulesError::Io {
        path: path.clone(),
        source,
    })?;
    parse_yaml(&path.display().to_string(), &raw)
}

fn parse_yaml<T: serde::de::DeserializeOwned>(origin: &str, raw: &str) -> Result<T, RulesError> {
    serde_yaml::from_str(raw).map_err(|source| RulesError::Yaml {
        origin: origin.to_string(),
        source,
    })
}
