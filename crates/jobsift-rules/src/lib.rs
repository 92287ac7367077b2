//! Classification rules: signal matchers, pre-filter, scorer, threshold partition,
//! enrichment and trend aggregation. Everything here is pure and synchronous.

use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod config;
pub mod enrichment;
pub mod prefilter;
pub mod scoring;
pub mod signals;
pub mod threshold;
pub mod trends;

#[cfg(test)]
mod testutil;

pub use config::{RulesConfig, ScoringWeights, SignalLists, TagRules, TierCutoffs};
pub use enrichment::TagSet;
pub use signals::{Matcher, SignalCategory, SignalSet};

pub const CRATE_NAME: &str = "jobsift-rules";

#[derive(Debug, Error)]
pub enum RulesError {
    #[error("invalid pattern in {list}: {source}")]
    InvalidPattern {
        list: String,
        #[source]
        source: regex::Error,
    },
    #[error("experience pattern `{0}` needs a capture group for the number of years")]
    MissingCapture(String),
    #[error("reading rules file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing rules {origin}: {source}")]
    Yaml {
        origin: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Immutable compiled ruleset, built once at startup and shared by reference.
#[derive(Debug, Clone)]
pub struct Ruleset {
    signals: SignalSet,
    weights: ScoringWeights,
    tags: TagSet,
}

impl Ruleset {
    pub fn compile(config: &RulesConfig) -> Result<Self, RulesError> {
        let signals = SignalSet::compile(&config.signals)?;
        let tags = TagSet::compile(&config.tags)?;
        tracing::debug!(
            tag_categories = config.tags.rules.len(),
            strong_tech_terms = config.signals.strong_tech.len(),
            "compiled ruleset"
        );
        Ok(Self {
            signals,
            weights: config.scoring.clone(),
            tags,
        })
    }

    pub fn builtin() -> Result<Self, RulesError> {
        Self::compile(&RulesConfig::builtin()?)
    }

    /// Compile from a rules directory when given, otherwise from the built-in rules.
    pub fn load(dir: Option<&Path>) -> Result<Self, RulesError> {
        match dir {
            Some(dir) => Self::compile(&RulesConfig::from_dir(dir)?),
            None => Self::builtin(),
        }
    }

    pub fn signals(&self) -> &SignalSet {
        &self.signals
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }
}
