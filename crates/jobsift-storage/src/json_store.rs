use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use jobsift_core::{JobPosting, RejectedPosting, TrendPeriod, TrendRecord};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;

use crate::{io_error, write_atomic, Collection, HistoricalStore, StoreError, TrendStore};

const TRENDS_FILE: &str = "trends.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct TrendsDocument {
    #[serde(default)]
    daily: BTreeMap<String, TrendRecord>,
    #[serde(default)]
    monthly: BTreeMap<String, TrendRecord>,
}

impl TrendsDocument {
    fn records_mut(&mut self, period: TrendPeriod) -> &mut BTreeMap<String, TrendRecord> {
        match period {
            TrendPeriod::Day => &mut self.daily,
            TrendPeriod::Month => &mut self.monthly,
        }
    }
}

/// One JSON document per collection under a data directory, keyed by id or period.
///
/// Every mutation is a read-modify-write under a single lock, persisted with an
/// atomic rename, so a crash never leaves a half-written document behind.
#[derive(Debug)]
pub struct JsonFileStore {
    root: PathBuf,
    lock: Mutex<()>,
    lookup_batch_size: usize,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock: Mutex::new(()),
            lookup_batch_size: crate::DEFAULT_LOOKUP_BATCH_SIZE,
        }
    }

    pub fn with_lookup_batch_size(mut self, size: usize) -> Self {
        self.lookup_batch_size = size.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, collection: Collection) -> PathBuf {
        self.root.join(collection.file_name())
    }

    pub async fn postings(&self, collection: Collection) -> Result<Vec<JobPosting>, StoreError> {
        let _guard = self.lock.lock().await;
        match collection {
            Collection::Rejected => Ok(self
                .read_rejected()
                .await?
                .into_values()
                .map(|r| r.posting)
                .collect()),
            _ => Ok(self.read_accepted(collection).await?.into_values().collect()),
        }
    }

    pub async fn rejected(&self) -> Result<Vec<RejectedPosting>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_rejected().await?.into_values().collect())
    }

    pub async fn trend_records(&self, period: TrendPeriod) -> Result<Vec<TrendRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        let mut doc: TrendsDocument = read_doc(&self.root.join(TRENDS_FILE)).await?;
        Ok(doc.records_mut(period).values().cloned().collect())
    }

    async fn read_accepted(
        &self,
        collection: Collection,
    ) -> Result<BTreeMap<String, JobPosting>, StoreError> {
        read_doc(&self.path_for(collection)).await
    }

    async fn read_rejected(&self) -> Result<BTreeMap<String, RejectedPosting>, StoreError> {
        read_doc(&self.path_for(Collection::Rejected)).await
    }
}

async fn read_doc<T: DeserializeOwned + Default>(path: &Path) -> Result<T, StoreError> {
    match fs::read(path).await {
        Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(T::default()),
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| StoreError::Json {
            path: path.to_path_buf(),
            source,
        }),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(err) => Err(io_error(path)(err)),
    }
}

async fn write_doc<T: Serialize>(path: &Path, doc: &T) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(doc).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    write_atomic(path, &bytes).await
}

#[async_trait]
impl HistoricalStore for JsonFileStore {
    fn lookup_batch_size(&self) -> usize {
        self.lookup_batch_size
    }

    async fn existing_ids(&self, ids: &[String]) -> Result<HashSet<String>, StoreError> {
        if ids.len() > self.lookup_batch_size {
            return Err(StoreError::Unavailable(format!(
                "lookup of {} ids exceeds batch limit {}",
                ids.len(),
                self.lookup_batch_size
            )));
        }
        let _guard = self.lock.lock().await;
        let current = self.read_accepted(Collection::Current).await?;
        let previous = self.read_accepted(Collection::Previous).await?;
        Ok(ids
            .iter()
            .filter(|id| current.contains_key(*id) || previous.contains_key(*id))
            .cloned()
            .collect())
    }

    async fn upsert_postings(
        &self,
        collection: Collection,
        postings: &[JobPosting],
    ) -> Result<usize, StoreError> {
        if collection == Collection::Rejected {
            return Err(StoreError::Unavailable(
                "accepted postings cannot be written to rejected_jobs".to_string(),
            ));
        }
        if postings.is_empty() {
            return Ok(0);
        }
        let _guard = self.lock.lock().await;
        let mut doc = self.read_accepted(collection).await?;
        for posting in postings {
            doc.insert(posting.id.clone(), posting.clone());
        }
        write_doc(&self.path_for(collection), &doc).await?;
        tracing::debug!(collection = collection.as_str(), count = postings.len(), "upserted postings");
        Ok(postings.len())
    }

    async fn upsert_rejected(&self, rejected: &[RejectedPosting]) -> Result<usize, StoreError> {
        if rejected.is_empty() {
            return Ok(0);
        }
        let _guard = self.lock.lock().await;
        let mut doc = self.read_rejected().await?;
        for item in rejected {
            doc.insert(item.posting.id.clone(), item.clone());
        }
        write_doc(&self.path_for(Collection::Rejected), &doc).await?;
        Ok(rejected.len())
    }

    async fn delete_scraped_before(
        &self,
        collection: Collection,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let _guard = self.lock.lock().await;
        let path = self.path_for(collection);
        let removed = match collection {
            Collection::Rejected => {
                let mut doc = self.read_rejected().await?;
                let before = doc.len();
                doc.retain(|_, r| r.posting.date_scraped >= cutoff);
                let removed = before - doc.len();
                if removed > 0 {
                    write_doc(&path, &doc).await?;
                }
                removed
            }
            _ => {
                let mut doc = self.read_accepted(collection).await?;
                let before = doc.len();
                doc.retain(|_, p| p.date_scraped >= cutoff);
                let removed = before - doc.len();
                if removed > 0 {
                    write_doc(&path, &doc).await?;
                }
                removed
            }
        };
        Ok(removed)
    }
}

#[async_trait]
impl TrendStore for JsonFileStore {
    async fn load(&self, period: TrendPeriod, key: &str) -> Result<Option<TrendRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        let mut doc: TrendsDocument = read_doc(&self.root.join(TRENDS_FILE)).await?;
        Ok(doc.records_mut(period).remove(key))
    }

    async fn save(&self, record: &TrendRecord) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let path = self.root.join(TRENDS_FILE);
        let mut doc: TrendsDocument = read_doc(&path).await?;
        doc.records_mut(record.period)
            .insert(record.period_key.clone(), record.clone());
        write_doc(&path, &doc).await
    }

    async fn delete_before(&self, period: TrendPeriod, cutoff: NaiveDate) -> Result<usize, StoreError> {
        let _guard = self.lock.lock().await;
        let path = self.root.join(TRENDS_FILE);
        let mut doc: TrendsDocument = read_doc(&path).await?;
        let records = doc.records_mut(period);
        let before = records.len();
        records.retain(|key, _| period.start_of(key).map_or(true, |start| start >= cutoff));
        let removed = before - records.len();
        if removed > 0 {
            write_doc(&path, &doc).await?;
        }
        Ok(removed)
    }
}
