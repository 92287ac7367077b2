//! Source adapter contracts and capture-bundle parsing for the job feeds jobsift reads.
//!
//! Fetching happens elsewhere; what reaches this crate is a capture bundle: the records a
//! fetcher saw for one source, in that source's native shape.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use jobsift_core::RawPosting;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use thiserror::Error;

pub mod normalize;

pub use normalize::{normalize, normalize_all, IngestContext, IngestError};

pub const CRATE_NAME: &str = "jobsift-adapters";

/// Native record layout of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    /// GetOnBoard API job objects.
    GetOnBoard,
    /// JobSpy rows from Indeed/LinkedIn.
    JobSpy,
    /// Job cards extracted from the EducaciónIT board.
    EducacionIt,
    /// Records already laid out as [`RawPosting`].
    Canonical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureBundle {
    pub capture_id: String,
    pub source_id: String,
    pub captured_from_url: String,
    pub fetched_at: DateTime<Utc>,
    pub extractor_version: String,
    #[serde(default)]
    pub records: Vec<JsonValue>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("record is not a json object")]
    NotAnObject,
    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub fn load_capture_bundle(path: impl AsRef<Path>) -> Result<CaptureBundle> {
    read_json_file(path)
}

fn read_json_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

pub trait SourceAdapter: Send + Sync {
    fn shape(&self) -> Shape;

    /// Map one native record. `Ok(None)` means the source itself marks it out of scope.
    fn parse_record(&self, record: &JsonValue) -> Result<Option<RawPosting>, AdapterError>;

    /// Map every record of a bundle, skipping (and logging) the ones that fail.
    fn parse_bundle(&self, bundle: &CaptureBundle) -> Vec<RawPosting> {
        let mut out = Vec::with_capacity(bundle.records.len());
        for (index, record) in bundle.records.iter().enumerate() {
            match self.parse_record(record) {
                Ok(Some(raw)) => out.push(raw),
                Ok(None) => {
                    tracing::debug!(source_id = %bundle.source_id, index, "record out of scope for source");
                }
                Err(err) => {
                    tracing::warn!(
                        source_id = %bundle.source_id,
                        capture_id = %bundle.capture_id,
                        index,
                        error = %err,
                        "skipping malformed record"
                    );
                }
            }
        }
        out
    }
}

fn json_value<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a JsonValue> {
    let mut cur = value;
    for segment in path {
        cur = cur.get(*segment)?;
    }
    if cur.is_null() {
        None
    } else {
        Some(cur)
    }
}

fn json_str<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a str> {
    json_value(value, path)?.as_str()
}

fn json_string(value: &JsonValue, path: &[&str]) -> Option<String> {
    let text = json_str(value, path)?.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

fn ensure_object(record: &JsonValue) -> Result<(), AdapterError> {
    if record.is_object() {
        Ok(())
    } else {
        Err(AdapterError::NotAnObject)
    }
}

/// A numeric salary bound; zero and non-numeric values count as absent.
fn salary_bound(value: &JsonValue, path: &[&str]) -> Option<JsonValue> {
    let bound = json_value(value, path)?;
    match bound.as_f64() {
        Some(n) if n > 0.0 => Some(bound.clone()),
        _ => None,
    }
}

fn salary_range(record: &JsonValue, min_path: &[&str], max_path: &[&str]) -> Option<JsonValue> {
    let min = salary_bound(record, min_path)?;
    let max = salary_bound(record, max_path)?;
    Some(json!({ "min": min, "max": max }))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GetOnBoardAdapter;

impl GetOnBoardAdapter {
    pub const SOURCE_NAME: &'static str = "GetOnBoard";
    /// Seniority ids GetOnBoard uses for trainee (1) and junior (2).
    pub const JUNIOR_SENIORITY_IDS: [u64; 2] = [1, 2];
}

impl SourceAdapter for GetOnBoardAdapter {
    fn shape(&self) -> Shape {
        Shape::GetOnBoard
    }

    fn parse_record(&self, record: &JsonValue) -> Result<Option<RawPosting>, AdapterError> {
        ensure_object(record)?;
        let seniority = json_value(record, &["attributes", "seniority", "data", "id"])
            .and_then(JsonValue::as_u64);
        if !seniority.is_some_and(|id| Self::JUNIOR_SENIORITY_IDS.contains(&id)) {
            return Ok(None);
        }
        Ok(Some(RawPosting {
            id: json_value(record, &["id"]).cloned(),
            title: json_string(record, &["attributes", "title"]),
            company: json_string(
                record,
                &["attributes", "company", "data", "attributes", "name"],
            ),
            description: json_string(record, &["attributes", "description"]),
            source: Some(Self::SOURCE_NAME.to_string()),
            salary: salary_range(
                record,
                &["attributes", "min_salary"],
                &["attributes", "max_salary"],
            ),
            url: json_string(record, &["links", "public_url"]),
            published_at: json_value(record, &["attributes", "published_at"]).cloned(),
        }))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JobSpyAdapter;

impl JobSpyAdapter {
    pub const FALLBACK_SOURCE_NAME: &'static str = "JobSpy";
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

impl SourceAdapter for JobSpyAdapter {
    fn shape(&self) -> Shape {
        Shape::JobSpy
    }

    fn parse_record(&self, record: &JsonValue) -> Result<Option<RawPosting>, AdapterError> {
        ensure_object(record)?;
        let source = json_string(record, &["site"])
            .or_else(|| json_string(record, &["site_name"]))
            .map(|site| capitalize(&site))
            .unwrap_or_else(|| Self::FALLBACK_SOURCE_NAME.to_string());
        let salary = salary_range(record, &["min_amount"], &["max_amount"])
            .or_else(|| json_value(record, &["salary"]).cloned());
        Ok(Some(RawPosting {
            id: json_value(record, &["id"]).cloned(),
            title: json_string(record, &["title"]),
            company: json_string(record, &["company"]),
            description: json_string(record, &["description"]),
            source: Some(source),
            salary,
            url: json_string(record, &["job_url"]),
            published_at: json_value(record, &["date_posted"]).cloned(),
        }))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EducacionItAdapter;

impl EducacionItAdapter {
    pub const SOURCE_NAME: &'static str = "EducaciónIT";
    const SALARY_PREFIX: &'static str = "Remuneración:";
}

impl SourceAdapter for EducacionItAdapter {
    fn shape(&self) -> Shape {
        Shape::EducacionIt
    }

    fn parse_record(&self, record: &JsonValue) -> Result<Option<RawPosting>, AdapterError> {
        ensure_object(record)?;
        let id = json_string(record, &["card_id"])
            .map(|card| JsonValue::String(format!("educacionit-{card}")));
        let salary = json_string(record, &["salary"]).map(|s| {
            JsonValue::String(s.replace(Self::SALARY_PREFIX, "").trim().to_string())
        });
        Ok(Some(RawPosting {
            id,
            title: json_string(record, &["title"]),
            company: json_string(record, &["company"]),
            description: json_string(record, &["description"]),
            source: Some(Self::SOURCE_NAME.to_string()),
            salary,
            url: json_string(record, &["url"]),
            published_at: json_value(record, &["date"]).cloned(),
        }))
    }
}

#[derive(Debug, Clone, Default)]
pub struct CanonicalAdapter {
    /// Source name applied to records that do not carry one.
    pub default_source: Option<String>,
}

impl SourceAdapter for CanonicalAdapter {
    fn shape(&self) -> Shape {
        Shape::Canonical
    }

    fn parse_record(&self, record: &JsonValue) -> Result<Option<RawPosting>, AdapterError> {
        ensure_object(record)?;
        let mut raw: RawPosting = serde_json::from_value(record.clone())?;
        if raw.source.as_deref().map_or(true, |s| s.trim().is_empty()) {
            raw.source = self.default_source.clone();
        }
        Ok(Some(raw))
    }
}

/// Adapter for a registered source. `display_name` labels canonical records without a source.
pub fn adapter_for_shape(shape: Shape, display_name: &str) -> Box<dyn SourceAdapter> {
    match shape {
        Shape::GetOnBoard => Box::new(GetOnBoardAdapter),
        Shape::JobSpy => Box::new(JobSpyAdapter),
        Shape::EducacionIt => Box::new(EducacionItAdapter),
        Shape::Canonical => Box::new(CanonicalAdapter {
            default_source: Some(display_name.to_string()),
        }),
    }
}
