//! Persistence and delivery boundaries for jobsift, plus a JSON-file implementation.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use jobsift_core::{clean_text, Bucket, JobPosting, Modality, RejectedPosting, TrendPeriod, TrendRecord};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

mod json_store;
mod notify;

pub use json_store::JsonFileStore;
pub use notify::{OutboxNotifier, TracingNotifier};

pub const CRATE_NAME: &str = "jobsift-storage";

/// Equality-list limit of the original document store; lookups are chunked to this size.
pub const DEFAULT_LOOKUP_BATCH_SIZE: usize = 30;

const DESCRIPTION_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed json document {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Posting collections held by a historical store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    /// Accepted postings published on the run's local day.
    Current,
    /// Accepted postings published earlier.
    Previous,
    Rejected,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Collection::Current, Collection::Previous, Collection::Rejected];

    pub fn file_name(&self) -> &'static str {
        match self {
            Collection::Current => "jobs_today.json",
            Collection::Previous => "jobs_previous.json",
            Collection::Rejected => "rejected_jobs.json",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Current => "jobs_today",
            Collection::Previous => "jobs_previous",
            Collection::Rejected => "rejected_jobs",
        }
    }
}

impl From<Bucket> for Collection {
    fn from(bucket: Bucket) -> Self {
        match bucket {
            Bucket::Current => Collection::Current,
            Bucket::Previous => Collection::Previous,
        }
    }
}

/// Previously seen postings, keyed by id.
#[async_trait]
pub trait HistoricalStore: Send + Sync {
    fn lookup_batch_size(&self) -> usize {
        DEFAULT_LOOKUP_BATCH_SIZE
    }

    /// Which of `ids` already exist among accepted postings. Callers pass at most
    /// `lookup_batch_size()` ids per call.
    async fn existing_ids(&self, ids: &[String]) -> Result<HashSet<String>, StoreError>;

    /// Insert or replace accepted postings by id. `collection` is Current or Previous.
    async fn upsert_postings(
        &self,
        collection: Collection,
        postings: &[JobPosting],
    ) -> Result<usize, StoreError>;

    async fn upsert_rejected(&self, rejected: &[RejectedPosting]) -> Result<usize, StoreError>;

    /// Delete records whose `date_scraped` is before `cutoff`.
    async fn delete_scraped_before(
        &self,
        collection: Collection,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, StoreError>;
}

/// Period-keyed trend aggregates.
#[async_trait]
pub trait TrendStore: Send + Sync {
    async fn load(&self, period: TrendPeriod, key: &str) -> Result<Option<TrendRecord>, StoreError>;

    async fn save(&self, record: &TrendRecord) -> Result<(), StoreError>;

    /// Delete records of `period` whose period starts before `cutoff`.
    async fn delete_before(&self, period: TrendPeriod, cutoff: NaiveDate) -> Result<usize, StoreError>;
}

/// Display payload handed to a delivery channel, one per accepted posting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub company: String,
    pub salary: String,
    pub tags: Vec<String>,
    pub modality: Modality,
    pub description: String,
    pub url: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl Notification {
    pub fn from_posting(posting: &JobPosting) -> Self {
        let mut seen = HashSet::new();
        let tags = posting
            .tag_keywords()
            .filter(|k| seen.insert(*k))
            .map(str::to_string)
            .collect();
        Self {
            id: posting.id.clone(),
            title: clean_text(&posting.title),
            company: clean_text(&posting.company),
            salary: clean_text(&posting.salary),
            tags,
            modality: posting.modality,
            description: preview(&clean_text(&posting.description), DESCRIPTION_PREVIEW_CHARS),
            url: posting.url.trim().to_string(),
            source: clean_text(&posting.source),
            score: posting.score,
        }
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Delivery channel. Receives postings already in final order.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, notifications: &[Notification]) -> Result<usize, StoreError>;
}

pub(crate) fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError {
    let path = path.to_path_buf();
    move |source| StoreError::Io { path, source }
}

/// Write a file through a temp file in the same directory and an atomic rename.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let parent = path
        .parent()
        .ok_or_else(|| StoreError::Unavailable(format!("{} has no parent directory", path.display())))?;
    fs::create_dir_all(parent).await.map_err(io_error(parent))?;

    let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&temp_path)
        .await
        .map_err(io_error(&temp_path))?;
    file.write_all(bytes).await.map_err(io_error(&temp_path))?;
    file.flush().await.map_err(io_error(&temp_path))?;
    drop(file);

    if let Err(source) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::TimeZone;
    use jobsift_core::SALARY_NOT_SPECIFIED;
    use tempfile::tempdir;

    use super::*;

    pub(crate) fn sample_posting(id: &str) -> JobPosting {
        let at = Utc.with_ymd_and_hms(2026, 3, 9, 15, 0, 0).unwrap();
        JobPosting {
            id: id.to_string(),
            title: "Desarrollador <b>Junior</b>".to_string(),
            company: "Acme".to_string(),
            description: "Python ".repeat(60),
            source: "jobspy".to_string(),
            salary: SALARY_NOT_SPECIFIED.to_string(),
            url: format!("https://jobs.example/{id}"),
            published_at: at,
            published_at_estimated: false,
            date_scraped: at,
            tags: BTreeMap::from([("languages".to_string(), vec!["python".to_string()])]),
            modality: Modality::Remote,
            score: Some(91.0),
            score_details: None,
        }
    }

    #[test]
    fn notification_cleans_and_truncates() {
        let note = Notification::from_posting(&sample_posting("n1"));
        assert_eq!(note.title, "Desarrollador Junior");
        assert_eq!(note.salary, "not specified");
        assert_eq!(note.tags, vec!["python".to_string()]);
        assert!(note.description.ends_with("..."));
        assert_eq!(note.description.chars().count(), DESCRIPTION_PREVIEW_CHARS + 3);
    }

    #[test]
    fn short_descriptions_are_untouched() {
        assert_eq!(preview("corto", 200), "corto");
        assert_eq!(preview("ñandú", 2), "ña...");
    }

    #[tokio::test]
    async fn atomic_write_replaces_content() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("doc.json");
        write_atomic(&path, b"first").await.expect("first write");
        write_atomic(&path, b"second").await.expect("second write");
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        let leftovers = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn buckets_map_to_collections() {
        assert_eq!(Collection::from(Bucket::Current).file_name(), "jobs_today.json");
        assert_eq!(Collection::from(Bucket::Previous).as_str(), "jobs_previous");
    }
}
