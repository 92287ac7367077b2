//! Core domain model for jobsift: canonical postings, score breakdowns and trend records.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

pub mod dates;

pub const CRATE_NAME: &str = "jobsift-core";

/// Display value for postings that do not advertise a salary.
pub const SALARY_NOT_SPECIFIED: &str = "not specified";

/// Pre-normalization handoff contract from source adapters into the ingestion normalizer.
///
/// Every field is optional and loosely typed: sources disagree on whether ids are numbers,
/// whether salaries are ranges, and how dates are written.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawPosting {
    #[serde(default)]
    pub id: Option<JsonValue>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub salary: Option<JsonValue>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub published_at: Option<JsonValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Modality {
    #[serde(rename = "On-site")]
    OnSite,
    #[serde(rename = "Remote")]
    Remote,
    #[serde(rename = "Hybrid")]
    Hybrid,
    #[default]
    #[serde(rename = "Not Specified")]
    NotSpecified,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::OnSite => "On-site",
            Modality::Remote => "Remote",
            Modality::Hybrid => "Hybrid",
            Modality::NotSpecified => "Not Specified",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-readable quality band derived from the final score. Reporting only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreTier {
    Excellent,
    Good,
    Review,
    Reject,
}

impl ScoreTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreTier::Excellent => "excellent",
            ScoreTier::Good => "good",
            ScoreTier::Review => "review",
            ScoreTier::Reject => "reject",
        }
    }
}

impl fmt::Display for ScoreTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scoring rule that fired for a posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreCategory {
    Base,
    NoItSignals,
    OnlyWeakSignals,
    SeniorityStrongEvidence,
    SeniorityWeakEvidence,
    StrongRole,
    ExplicitDomain,
    StrongTech,
    ItSignals,
    WeakSignals,
    RichDescription,
    Combination,
    FewSignals,
    AmbiguousRole,
    SeniorExperience,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub category: ScoreCategory,
    pub delta: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<String>,
}

/// Ordered audit trail of a score: every bonus and penalty in application order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub entries: Vec<ScoreEntry>,
    /// Accumulated value before clamping into `[0, 100]`.
    pub raw_total: f64,
    pub score: f64,
    pub tier: ScoreTier,
    pub fatal: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub years_required: Option<u32>,
}

impl ScoreBreakdown {
    pub fn entry(&self, category: ScoreCategory) -> Option<&ScoreEntry> {
        self.entries.iter().find(|e| e.category == category)
    }

    pub fn has(&self, category: ScoreCategory) -> bool {
        self.entry(category).is_some()
    }
}

/// Canonical posting produced by ingestion and enriched/scored by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
    pub id: String,
    pub title: String,
    pub company: String,
    pub description: String,
    pub source: String,
    pub salary: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    /// Set when `published_at` could not be parsed and was approximated with the run instant.
    #[serde(default)]
    pub published_at_estimated: bool,
    pub date_scraped: DateTime<Utc>,
    #[serde(default)]
    pub tags: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub modality: Modality,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_details: Option<ScoreBreakdown>,
}

impl JobPosting {
    /// Title and description joined the way every text-wide matcher sees them.
    pub fn full_text(&self) -> String {
        format!("{} {}", self.title, self.description)
    }

    /// Flattened tag keywords across all categories, in category order.
    pub fn tag_keywords(&self) -> impl Iterator<Item = &str> {
        self.tags.values().flatten().map(String::as_str)
    }
}

/// Machine-parseable rejection reason, rendered as `<stage>: <detail>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RejectionReason {
    Area(Vec<String>),
    Seniority(Vec<String>),
    LowScore(f64),
}

impl RejectionReason {
    pub fn stage(&self) -> &'static str {
        match self {
            RejectionReason::Area(_) => "area",
            RejectionReason::Seniority(_) => "seniority",
            RejectionReason::LowScore(_) => "low_score",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::Area(terms) | RejectionReason::Seniority(terms) => {
                write!(f, "{}: {}", self.stage(), terms.join(", "))
            }
            RejectionReason::LowScore(score) => write!(f, "low_score: {score}"),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("unrecognized rejection reason: {0}")]
pub struct ParseReasonError(String);

impl FromStr for RejectionReason {
    type Err = ParseReasonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (stage, detail) = s
            .split_once(':')
            .ok_or_else(|| ParseReasonError(s.to_string()))?;
        let detail = detail.trim();
        let terms = || {
            detail
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
        };
        match stage.trim() {
            "area" => Ok(RejectionReason::Area(terms())),
            "seniority" => Ok(RejectionReason::Seniority(terms())),
            "low_score" => detail
                .parse::<f64>()
                .map(RejectionReason::LowScore)
                .map_err(|_| ParseReasonError(s.to_string())),
            _ => Err(ParseReasonError(s.to_string())),
        }
    }
}

impl TryFrom<String> for RejectionReason {
    type Error = ParseReasonError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RejectionReason> for String {
    fn from(value: RejectionReason) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedPosting {
    #[serde(flatten)]
    pub posting: JobPosting,
    pub rejection_reason: RejectionReason,
}

/// Persistence bucket of an accepted posting relative to the run day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Current,
    Previous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendPeriod {
    Day,
    Month,
}

impl TrendPeriod {
    pub fn key_for(&self, date: NaiveDate) -> String {
        match self {
            TrendPeriod::Day => date.format("%Y-%m-%d").to_string(),
            TrendPeriod::Month => date.format("%Y_%m").to_string(),
        }
    }

    /// First calendar day covered by a period key, if the key is well formed.
    pub fn start_of(&self, key: &str) -> Option<NaiveDate> {
        match self {
            TrendPeriod::Day => NaiveDate::parse_from_str(key, "%Y-%m-%d").ok(),
            TrendPeriod::Month => {
                let (year, month) = key.split_once('_')?;
                NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, 1)
            }
        }
    }
}

/// Period-bucketed count of accepted postings and matched tag keywords.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendRecord {
    pub period: TrendPeriod,
    pub period_key: String,
    pub total_jobs: u64,
    #[serde(default)]
    pub tags: BTreeMap<String, u64>,
}

impl TrendRecord {
    pub fn empty(period: TrendPeriod, period_key: impl Into<String>) -> Self {
        Self {
            period,
            period_key: period_key.into(),
            total_jobs: 0,
            tags: BTreeMap::new(),
        }
    }
}

static HTML_TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Strip HTML tags and collapse runs of whitespace.
pub fn clean_text(text: &str) -> String {
    let without_tags = HTML_TAG_RE.replace_all(text, " ");
    WHITESPACE_RE
        .replace_all(&without_tags, " ")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_reasons_render_and_parse() {
        let area = RejectionReason::Area(vec!["marketing".into(), "ventas".into()]);
        assert_eq!(area.to_string(), "area: marketing, ventas");
        assert_eq!("area: marketing, ventas".parse::<RejectionReason>().unwrap(), area);

        let low = RejectionReason::LowScore(37.5);
        assert_eq!(low.to_string(), "low_score: 37.5");
        assert_eq!(low.to_string().parse::<RejectionReason>().unwrap(), low);
        assert_eq!(RejectionReason::LowScore(0.0).to_string(), "low_score: 0");
        assert_eq!(
            "low_score: 0".parse::<RejectionReason>().unwrap(),
            RejectionReason::LowScore(0.0)
        );
        assert!("weird".parse::<RejectionReason>().is_err());
    }

    #[test]
    fn rejection_reason_serializes_as_plain_string() {
        let json = serde_json::to_string(&RejectionReason::Seniority(vec!["senior".into()])).unwrap();
        assert_eq!(json, "\"seniority: senior\"");
    }

    #[test]
    fn trend_period_keys() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        assert_eq!(TrendPeriod::Day.key_for(date), "2026-03-07");
        assert_eq!(TrendPeriod::Month.key_for(date), "2026_03");
        assert_eq!(
            TrendPeriod::Month.start_of("2026_03"),
            NaiveDate::from_ymd_opt(2026, 3, 1)
        );
        assert_eq!(TrendPeriod::Day.start_of("garbage"), None);
    }

    #[test]
    fn clean_text_strips_markup() {
        assert_eq!(
            clean_text("<p>Hola   <b>mundo</b></p>\n\n dev"),
            "Hola mundo dev"
        );
        assert_eq!(clean_text(""), "");
    }

    #[test]
    fn modality_uses_display_labels_on_the_wire() {
        assert_eq!(serde_json::to_string(&Modality::OnSite).unwrap(), "\"On-site\"");
        assert_eq!(
            serde_json::from_str::<Modality>("\"Not Specified\"").unwrap(),
            Modality::NotSpecified
        );
    }
}
