//! Ingestion normalizer: loosely typed [`RawPosting`]s into canonical [`JobPosting`]s.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use jobsift_core::dates::DateNormalizer;
use jobsift_core::{JobPosting, Modality, RawPosting, SALARY_NOT_SPECIFIED};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

/// Per-run inputs shared by every record: the run instant becomes `date_scraped`.
#[derive(Debug, Clone, Copy)]
pub struct IngestContext {
    pub run_time: DateTime<Utc>,
    pub dates: DateNormalizer,
}

#[derive(Debug, Error, PartialEq)]
pub enum IngestError {
    #[error("unsupported id value: {0}")]
    InvalidId(String),
}

fn text(value: Option<String>) -> String {
    value.map(|v| v.trim().to_string()).unwrap_or_default()
}

fn render_number(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Number(n) => Some(format!("${n}")),
        JsonValue::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Salary display text. Absent, blank or "not specified" in any spelling collapses to the sentinel.
fn render_salary(value: Option<&JsonValue>) -> String {
    let rendered = match value {
        Some(JsonValue::String(s)) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Some(JsonValue::Number(n)) => Some(format!("${n}")),
        Some(JsonValue::Object(range)) => {
            match (
                range.get("min").and_then(render_number),
                range.get("max").and_then(render_number),
            ) {
                (Some(min), Some(max)) => Some(format!("{min} - {max}")),
                _ => None,
            }
        }
        _ => None,
    };
    match rendered {
        Some(s) if !is_unspecified(&s) => s,
        _ => SALARY_NOT_SPECIFIED.to_string(),
    }
}

fn is_unspecified(salary: &str) -> bool {
    matches!(
        salary.to_lowercase().as_str(),
        "no especificado" | "not specified" | "n/a" | "nan" | "none"
    )
}

fn render_id(value: Option<&JsonValue>) -> Result<Option<String>, IngestError> {
    match value {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(s)) => Ok(Some(s.trim().to_string()).filter(|s| !s.is_empty())),
        Some(JsonValue::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(IngestError::InvalidId(other.to_string())),
    }
}

/// Stable id for records whose source does not provide one.
pub fn fallback_id(source: &str, url: &str, title: &str, company: &str) -> String {
    let key = format!("{source}|{url}|{title}|{company}");
    Uuid::new_v5(&Uuid::NAMESPACE_URL, key.as_bytes()).to_string()
}

pub fn normalize(raw: RawPosting, ctx: &IngestContext) -> Result<JobPosting, IngestError> {
    let id = render_id(raw.id.as_ref())?;
    let title = text(raw.title);
    let company = text(raw.company);
    let source = text(raw.source);
    let url = text(raw.url);
    let id = id.unwrap_or_else(|| fallback_id(&source, &url, &title, &company));
    let published = ctx.dates.normalize(raw.published_at.as_ref(), ctx.run_time);

    Ok(JobPosting {
        id,
        title,
        company,
        description: text(raw.description),
        source,
        salary: render_salary(raw.salary.as_ref()),
        url,
        published_at: published.instant,
        published_at_estimated: published.estimated,
        date_scraped: ctx.run_time,
        tags: BTreeMap::new(),
        modality: Modality::NotSpecified,
        score: None,
        score_details: None,
    })
}

/// Normalize a batch; a record that fails is logged and skipped.
pub fn normalize_all(raws: Vec<RawPosting>, ctx: &IngestContext) -> (Vec<JobPosting>, usize) {
    let mut postings = Vec::with_capacity(raws.len());
    let mut skipped = 0;
    for raw in raws {
        let source = raw.source.clone().unwrap_or_default();
        match normalize(raw, ctx) {
            Ok(posting) => postings.push(posting),
            Err(err) => {
                skipped += 1;
                tracing::warn!(source = %source, error = %err, "skipping posting at ingestion");
            }
        }
    }
    (postings, skipped)
}
