use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobsift_core::dates::UnparseableDatePolicy;
use jobsift_core::{JobPosting, RejectedPosting, TrendPeriod};
use jobsift_storage::{
    Collection, HistoricalStore, JsonFileStore, Notification, StoreError, TrendStore,
};
use jobsift_sync::{report_daily_markdown, SyncConfig, SyncPipeline};
use tempfile::tempdir;

fn repo_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..")
}

fn run_time() -> DateTime<Utc> {
    "2026-03-09T15:00:00Z".parse().unwrap()
}

fn config(workspace: &Path) -> SyncConfig {
    let mut config = SyncConfig::for_workspace(workspace);
    config.rules_dir = repo_root().join("rules");
    config.captures_dir = repo_root().join("fixtures");
    config.scoring_workers = 2;
    config.write_reports = false;
    config.outbox_path = Some(workspace.join("outbox.jsonl"));
    config
}

fn outbox_ids(workspace: &Path) -> Vec<String> {
    let path = workspace.join("outbox.jsonl");
    if !path.exists() {
        return Vec::new();
    }
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str::<Notification>(line).unwrap().id)
        .collect()
}

#[tokio::test]
async fn fixture_run_classifies_every_source() {
    let dir = tempdir().expect("tempdir");
    let config = config(dir.path());
    let store = JsonFileStore::new(config.data_dir.clone());
    let pipeline = SyncPipeline::new(config).unwrap();

    let summary = pipeline.run_once_at(run_time()).await.unwrap();
    assert_eq!(summary.enabled_sources, 3);
    assert_eq!(summary.failed_sources, 0);
    assert_eq!(summary.fetched_records, 12);
    assert_eq!(summary.local_duplicates, 1);
    assert_eq!(summary.stale, 1);
    assert_eq!(summary.fresh, 10);
    assert_eq!(summary.bypassed, 2);
    assert_eq!(summary.bypass_dropped, 1);
    assert_eq!(summary.rejected_area, 1);
    assert_eq!(summary.rejected_seniority, 1);
    assert_eq!(summary.scored, 6);
    assert_eq!(summary.rejected_low_score, 2);
    assert_eq!(summary.accepted, 5);
    assert_eq!(summary.rejected, 4);
    assert_eq!(summary.persisted_current, 4);
    assert_eq!(summary.persisted_previous, 1);
    assert_eq!(summary.notified, 5);

    assert_eq!(
        outbox_ids(dir.path()),
        [
            "in-1001",
            "li-2007",
            "educacionit-5501",
            "educacionit-5502",
            "python-developer-acme-software",
        ]
    );

    let previous = store.postings(Collection::Previous).await.unwrap();
    assert_eq!(previous.len(), 1);
    assert_eq!(previous[0].id, "li-2007");

    let rejected = store.rejected().await.unwrap();
    assert_eq!(rejected.len(), 4);
    let reason_of = |id: &str| {
        rejected
            .iter()
            .find(|r| r.posting.id == id)
            .map(|r| r.rejection_reason.to_string())
            .unwrap()
    };
    assert!(reason_of("in-1003").starts_with("seniority:"));
    assert!(reason_of("in-1004").starts_with("area:"));
    assert_eq!(reason_of("in-1005"), "low_score: 0");
    assert_eq!(reason_of("educacionit-5503"), "low_score: 0");
    assert!(rejected.iter().all(|r| r.posting.id != "li-2002"));
    assert!(rejected
        .iter()
        .all(|r| r.posting.id != "ejecutivo-comercial-trainee-ventas-sa"));

    let today = store
        .load(TrendPeriod::Day, "2026-03-09")
        .await
        .unwrap()
        .expect("daily trend");
    assert_eq!(today.total_jobs, 5);
    assert_eq!(today.tags.get("python"), Some(&2));
    let month = store.load(TrendPeriod::Month, "2026_03").await.unwrap().unwrap();
    assert_eq!(month.total_jobs, 5);
}

#[tokio::test]
async fn rerun_neither_renotifies_nor_double_counts() {
    let dir = tempdir().expect("tempdir");
    let config = config(dir.path());
    let store = JsonFileStore::new(config.data_dir.clone());
    let pipeline = SyncPipeline::new(config).unwrap();

    pipeline.run_once_at(run_time()).await.unwrap();
    let second = pipeline.run_once_at(run_time()).await.unwrap();

    assert_eq!(second.already_seen, 5);
    assert_eq!(second.accepted, 0);
    assert_eq!(second.notified, 0);
    assert_eq!(outbox_ids(dir.path()).len(), 5);
    assert_eq!(store.rejected().await.unwrap().len(), 4);

    let today = store.load(TrendPeriod::Day, "2026-03-09").await.unwrap().unwrap();
    assert_eq!(today.total_jobs, 5);
}

#[tokio::test]
async fn known_posting_is_not_scored_or_notified_again() {
    let dir = tempdir().expect("tempdir");
    let config = config(dir.path());
    let store = JsonFileStore::new(config.data_dir.clone());

    let mut known: JobPosting = serde_json::from_value(serde_json::json!({
        "id": "in-1001",
        "title": "Desarrollador Junior Python",
        "company": "Tech Andina",
        "description": "",
        "source": "Indeed",
        "salary": "not specified",
        "url": "https://ar.indeed.com/viewjob?jk=1001",
        "published_at": "2026-03-08T12:00:00Z",
        "date_scraped": "2026-03-08T12:00:00Z"
    }))
    .unwrap();
    known.score = Some(100.0);
    store.upsert_postings(Collection::Previous, &[known]).await.unwrap();

    let summary = SyncPipeline::new(config)
        .unwrap()
        .run_once_at(run_time())
        .await
        .unwrap();
    assert_eq!(summary.already_seen, 1);
    assert_eq!(summary.scored, 5);
    assert_eq!(summary.notified, 4);
    assert!(!outbox_ids(dir.path()).contains(&"in-1001".to_string()));
}

struct UnreachableLookups(Arc<JsonFileStore>);

#[async_trait]
impl HistoricalStore for UnreachableLookups {
    async fn existing_ids(&self, _ids: &[String]) -> Result<HashSet<String>, StoreError> {
        Err(StoreError::Unavailable("lookup timed out".into()))
    }

    async fn upsert_postings(
        &self,
        collection: Collection,
        postings: &[JobPosting],
    ) -> Result<usize, StoreError> {
        self.0.upsert_postings(collection, postings).await
    }

    async fn upsert_rejected(&self, rejected: &[RejectedPosting]) -> Result<usize, StoreError> {
        self.0.upsert_rejected(rejected).await
    }

    async fn delete_scraped_before(
        &self,
        collection: Collection,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        self.0.delete_scraped_before(collection, cutoff).await
    }
}

#[tokio::test]
async fn lookup_failure_lets_everything_through() {
    let dir = tempdir().expect("tempdir");
    let config = config(dir.path());
    let store = Arc::new(JsonFileStore::new(config.data_dir.clone()));
    let pipeline = SyncPipeline::new(config)
        .unwrap()
        .with_stores(Arc::new(UnreachableLookups(store.clone())), store.clone());

    pipeline.run_once_at(run_time()).await.unwrap();
    let second = pipeline.run_once_at(run_time()).await.unwrap();
    assert!(second.lookup_failed);
    assert_eq!(second.already_seen, 0);
    assert_eq!(second.notified, 5);
}

struct ReadOnlyHistory;

#[async_trait]
impl HistoricalStore for ReadOnlyHistory {
    async fn existing_ids(&self, _ids: &[String]) -> Result<HashSet<String>, StoreError> {
        Ok(HashSet::new())
    }

    async fn upsert_postings(&self, _: Collection, _: &[JobPosting]) -> Result<usize, StoreError> {
        Err(StoreError::Unavailable("read-only replica".into()))
    }

    async fn upsert_rejected(&self, _: &[RejectedPosting]) -> Result<usize, StoreError> {
        Err(StoreError::Unavailable("read-only replica".into()))
    }

    async fn delete_scraped_before(&self, _: Collection, _: DateTime<Utc>) -> Result<usize, StoreError> {
        Ok(0)
    }
}

#[tokio::test]
async fn store_write_failure_fails_the_run() {
    let dir = tempdir().expect("tempdir");
    let config = config(dir.path());
    let trends = Arc::new(JsonFileStore::new(config.data_dir.clone()));
    let pipeline = SyncPipeline::new(config)
        .unwrap()
        .with_stores(Arc::new(ReadOnlyHistory), trends);

    let err = pipeline.run_once_at(run_time()).await.unwrap_err();
    assert!(format!("{err:#}").contains("read-only replica"));
    assert!(outbox_ids(dir.path()).is_empty());
}

#[tokio::test]
async fn drop_policy_discards_undated_postings() {
    let dir = tempdir().expect("tempdir");
    let mut config = config(dir.path());
    config.unparseable_dates = UnparseableDatePolicy::Drop;
    let summary = SyncPipeline::new(config)
        .unwrap()
        .run_once_at(run_time())
        .await
        .unwrap();
    assert_eq!(summary.undated_dropped, 1);
    assert_eq!(summary.accepted, 4);
    assert!(!outbox_ids(dir.path()).contains(&"educacionit-5502".to_string()));
}

#[tokio::test]
async fn reports_are_written_and_summarised() {
    let dir = tempdir().expect("tempdir");
    let mut config = config(dir.path());
    config.write_reports = true;
    let summary = SyncPipeline::new(config)
        .unwrap()
        .run_once_at(run_time())
        .await
        .unwrap();

    let reports_dir = PathBuf::from(summary.reports_dir.clone().unwrap());
    assert!(reports_dir.join("daily_brief.md").exists());
    assert!(reports_dir.join("run_delta.json").exists());
    assert!(PathBuf::from(summary.parquet_manifest.clone().unwrap()).exists());

    let brief = std::fs::read_to_string(reports_dir.join("daily_brief.md")).unwrap();
    assert!(brief.contains("- local duplicates: 1"));
    assert!(brief.contains("- area: 1"));
    assert!(brief.contains("- bypass dropped at pre-filter: 1"));

    let markdown = report_daily_markdown(3, Some(dir.path().to_path_buf())).unwrap();
    assert!(markdown.contains(&summary.run_id.to_string()));
    assert!(markdown.contains("accepted: 5"));
}

#[tokio::test]
async fn missing_bundle_skips_only_that_source() {
    let dir = tempdir().expect("tempdir");
    let mut config = config(dir.path());
    config.capture_set = "does-not-exist".to_string();
    let summary = SyncPipeline::new(config)
        .unwrap()
        .run_once_at(run_time())
        .await
        .unwrap();
    assert_eq!(summary.failed_sources, 3);
    assert_eq!(summary.accepted, 0);
    assert_eq!(summary.notified, 0);
}

#[tokio::test]
async fn oversized_windows_fall_back_without_panicking() {
    let dir = tempdir().expect("tempdir");
    let mut config = config(dir.path());
    config.max_age_hours = i64::MAX / 2;
    config.accepted_retention_days = i64::MAX;
    config.rejected_retention_days = i64::MAX;
    let summary = SyncPipeline::new(config)
        .unwrap()
        .run_once_at(run_time())
        .await
        .unwrap();
    assert_eq!(summary.stale, 1);
    assert_eq!(summary.accepted, 5);
    let cleanup = summary.cleanup.unwrap();
    assert_eq!(cleanup.current + cleanup.previous + cleanup.rejected, 0);
}

#[tokio::test]
async fn negative_max_age_uses_the_default_window() {
    let dir = tempdir().expect("tempdir");
    let mut config = config(dir.path());
    config.max_age_hours = -1;
    let summary = SyncPipeline::new(config)
        .unwrap()
        .run_once_at(run_time())
        .await
        .unwrap();
    assert_eq!(summary.stale, 1);
    assert_eq!(summary.accepted, 5);
}
