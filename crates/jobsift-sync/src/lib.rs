//! Pipeline orchestration: capture bundles in, persisted and notified postings out.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use jobsift_adapters::{adapter_for_shape, load_capture_bundle, normalize_all, IngestContext, Shape};
use jobsift_core::dates::{DateNormalizer, UnparseableDatePolicy};
use jobsift_core::{Bucket, JobPosting, RejectedPosting, TrendPeriod};
use jobsift_rules::enrichment::enrich_all;
use jobsift_rules::prefilter::prefilter;
use jobsift_rules::scoring::score_all;
use jobsift_rules::threshold::{merge_accepted, merge_rejected, partition_by_score};
use jobsift_rules::trends::{self, TrendMergePolicy};
use jobsift_rules::Ruleset;
use jobsift_storage::{
    Collection, HistoricalStore, JsonFileStore, Notification, Notifier, OutboxNotifier,
    TracingNotifier, TrendStore,
};
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

pub mod reports;
pub mod stages;

pub use reports::report_daily_markdown;

pub const CRATE_NAME: &str = "jobsift-sync";

#[derive(Debug, Clone, Deserialize)]
pub struct SourceRegistry {
    pub sources: Vec<SourceConfig>,
}

impl SourceRegistry {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn enabled(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub source_id: String,
    pub display_name: String,
    pub enabled: bool,
    pub shape: Shape,
    /// Trusted feed: accepted after the pre-filter without scoring.
    #[serde(default)]
    pub bypass_scoring: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub workspace_root: PathBuf,
    pub data_dir: PathBuf,
    pub rules_dir: PathBuf,
    pub captures_dir: PathBuf,
    pub capture_set: String,
    pub min_score: f64,
    pub max_age_hours: i64,
    pub utc_offset_hours: i32,
    /// Source ids bypassing scoring in addition to the ones flagged in `sources.yaml`.
    pub bypass_sources: Vec<String>,
    /// Retention windows; zero or negative disables the deletion.
    pub accepted_retention_days: i64,
    pub rejected_retention_days: i64,
    pub daily_trend_retention_days: u32,
    pub trend_retention_months: u32,
    pub trend_merge: TrendMergePolicy,
    pub unparseable_dates: UnparseableDatePolicy,
    pub scoring_workers: usize,
    pub persist_rejected: bool,
    pub write_reports: bool,
    /// JSON-lines outbox for notifications; log-only delivery when unset.
    pub outbox_path: Option<PathBuf>,
}

const DEFAULT_MAX_AGE_HOURS: i64 = 48;
const DEFAULT_ACCEPTED_RETENTION_DAYS: i64 = 30;
const DEFAULT_REJECTED_RETENTION_DAYS: i64 = 7;
/// Longest staleness or retention window accepted from configuration.
const MAX_WINDOW_DAYS: i64 = 3_650_000;

fn window(delta: Option<Duration>) -> Option<Duration> {
    delta.filter(|d| *d > Duration::zero() && *d <= Duration::days(MAX_WINDOW_DAYS))
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|err| {
            warn!(key, value = %raw, error = %err, "ignoring invalid setting");
            default
        }),
        Err(_) => default,
    }
}

impl SyncConfig {
    /// Defaults rooted at `workspace_root`.
    pub fn for_workspace(workspace_root: impl Into<PathBuf>) -> Self {
        let workspace_root = workspace_root.into();
        Self {
            data_dir: workspace_root.join("data"),
            rules_dir: workspace_root.join("rules"),
            captures_dir: workspace_root.join("fixtures"),
            capture_set: "sample".to_string(),
            min_score: 50.0,
            max_age_hours: DEFAULT_MAX_AGE_HOURS,
            utc_offset_hours: -3,
            bypass_sources: Vec::new(),
            accepted_retention_days: DEFAULT_ACCEPTED_RETENTION_DAYS,
            rejected_retention_days: DEFAULT_REJECTED_RETENTION_DAYS,
            daily_trend_retention_days: 90,
            trend_retention_months: 12,
            trend_merge: TrendMergePolicy::default(),
            unparseable_dates: UnparseableDatePolicy::default(),
            scoring_workers: default_workers(),
            persist_rejected: true,
            write_reports: true,
            outbox_path: None,
            workspace_root,
        }
    }

    pub fn from_env() -> Self {
        let root = std::env::var("JOBSIFT_WORKSPACE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));
        let defaults = Self::for_workspace(root);
        let path_or = |key: &str, default: &PathBuf| {
            std::env::var(key)
                .map(PathBuf::from)
                .unwrap_or_else(|_| default.clone())
        };

        Self {
            data_dir: path_or("JOBSIFT_DATA_DIR", &defaults.data_dir),
            rules_dir: path_or("JOBSIFT_RULES_DIR", &defaults.rules_dir),
            captures_dir: path_or("JOBSIFT_CAPTURES_DIR", &defaults.captures_dir),
            capture_set: std::env::var("JOBSIFT_CAPTURE_SET")
                .unwrap_or_else(|_| defaults.capture_set.clone()),
            min_score: env_parse("JOBSIFT_MIN_SCORE", defaults.min_score),
            max_age_hours: env_parse("JOBSIFT_MAX_AGE_HOURS", defaults.max_age_hours),
            utc_offset_hours: env_parse("JOBSIFT_UTC_OFFSET_HOURS", defaults.utc_offset_hours),
            bypass_sources: std::env::var("JOBSIFT_BYPASS_SOURCES")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            accepted_retention_days: env_parse(
                "JOBSIFT_ACCEPTED_RETENTION_DAYS",
                defaults.accepted_retention_days,
            ),
            rejected_retention_days: env_parse(
                "JOBSIFT_REJECTED_RETENTION_DAYS",
                defaults.rejected_retention_days,
            ),
            daily_trend_retention_days: env_parse(
                "JOBSIFT_DAILY_TREND_RETENTION_DAYS",
                defaults.daily_trend_retention_days,
            ),
            trend_retention_months: env_parse(
                "JOBSIFT_TREND_RETENTION_MONTHS",
                defaults.trend_retention_months,
            ),
            trend_merge: env_parse("JOBSIFT_TREND_MERGE", defaults.trend_merge),
            unparseable_dates: env_parse("JOBSIFT_UNPARSEABLE_DATES", defaults.unparseable_dates),
            scoring_workers: env_parse("JOBSIFT_SCORING_WORKERS", defaults.scoring_workers),
            persist_rejected: env_flag("JOBSIFT_PERSIST_REJECTED", defaults.persist_rejected),
            write_reports: env_flag("JOBSIFT_WRITE_REPORTS", defaults.write_reports),
            outbox_path: std::env::var("JOBSIFT_OUTBOX").ok().map(PathBuf::from),
            workspace_root: defaults.workspace_root,
        }
        .validated()
    }

    /// Replace non-positive or out-of-range windows with their defaults.
    ///
    /// Retention values of zero or below are kept: they disable the deletion.
    pub fn validated(mut self) -> Self {
        if window(Duration::try_hours(self.max_age_hours)).is_none() {
            warn!(value = self.max_age_hours, "max age out of range; using default");
            self.max_age_hours = DEFAULT_MAX_AGE_HOURS;
        }
        let retention = |name: &str, days: i64, default: i64| {
            if days > 0 && window(Duration::try_days(days)).is_none() {
                warn!(setting = name, value = days, "retention out of range; using default");
                default
            } else {
                days
            }
        };
        self.accepted_retention_days = retention(
            "accepted_retention_days",
            self.accepted_retention_days,
            DEFAULT_ACCEPTED_RETENTION_DAYS,
        );
        self.rejected_retention_days = retention(
            "rejected_retention_days",
            self.rejected_retention_days,
            DEFAULT_REJECTED_RETENTION_DAYS,
        );
        self
    }

    /// Staleness window, falling back to the default when the setting is unusable.
    pub fn max_age(&self) -> Duration {
        window(Duration::try_hours(self.max_age_hours)).unwrap_or_else(|| {
            warn!(value = self.max_age_hours, "max age out of range; using default");
            Duration::hours(DEFAULT_MAX_AGE_HOURS)
        })
    }

    pub fn sources_file(&self) -> PathBuf {
        self.rules_dir.join("sources.yaml")
    }

    pub fn bundle_path_for(&self, source: &SourceConfig) -> PathBuf {
        self.captures_dir
            .join(&source.source_id)
            .join(&self.capture_set)
            .join("bundle.json")
    }

    pub fn date_normalizer(&self) -> Result<DateNormalizer> {
        DateNormalizer::from_utc_offset_hours(self.utc_offset_hours)
            .ok_or_else(|| anyhow!("utc offset out of range: {} hours", self.utc_offset_hours))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreStats {
    pub max: f64,
    pub mean: f64,
    pub min: f64,
}

impl ScoreStats {
    pub fn from_scores(scores: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut max = f64::MIN;
        let mut min = f64::MAX;
        for score in scores {
            count += 1;
            sum += score;
            max = max.max(score);
            min = min.min(score);
        }
        (count > 0).then(|| ScoreStats {
            max,
            mean: sum / count as f64,
            min,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupSummary {
    pub current: usize,
    pub previous: usize,
    pub rejected: usize,
    pub daily_trends: usize,
    pub monthly_trends: usize,
}

/// Per-stage counts of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub enabled_sources: usize,
    pub failed_sources: usize,
    pub fetched_records: usize,
    pub ingest_skipped: usize,
    pub local_duplicates: usize,
    pub undated_dropped: usize,
    pub stale: usize,
    pub already_seen: usize,
    pub lookup_failed: bool,
    /// Postings that reached the pre-filter.
    pub fresh: usize,
    pub bypassed: usize,
    /// Bypass-source postings the pre-filter turned away; never persisted as rejected.
    #[serde(default)]
    pub bypass_dropped: usize,
    pub rejected_area: usize,
    pub rejected_seniority: usize,
    pub scored: usize,
    pub rejected_low_score: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub persisted_current: usize,
    pub persisted_previous: usize,
    pub persisted_rejected: usize,
    pub notified: usize,
    pub score_stats: Option<ScoreStats>,
    pub reports_dir: Option<String>,
    pub parquet_manifest: Option<String>,
    pub cleanup: Option<CleanupSummary>,
}

impl RunSummary {
    fn start(run_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            started_at,
            finished_at: started_at,
            enabled_sources: 0,
            failed_sources: 0,
            fetched_records: 0,
            ingest_skipped: 0,
            local_duplicates: 0,
            undated_dropped: 0,
            stale: 0,
            already_seen: 0,
            lookup_failed: false,
            fresh: 0,
            bypassed: 0,
            bypass_dropped: 0,
            rejected_area: 0,
            rejected_seniority: 0,
            scored: 0,
            rejected_low_score: 0,
            accepted: 0,
            rejected: 0,
            persisted_current: 0,
            persisted_previous: 0,
            persisted_rejected: 0,
            notified: 0,
            score_stats: None,
            reports_dir: None,
            parquet_manifest: None,
            cleanup: None,
        }
    }
}

/// Postings normalized from every enabled source, with the ids of trusted-feed postings.
#[derive(Debug, Default)]
pub struct Ingested {
    pub postings: Vec<JobPosting>,
    pub bypass_ids: HashSet<String>,
    pub fetched_records: usize,
    pub skipped: usize,
    pub failed_sources: usize,
}

pub struct SyncPipeline {
    config: SyncConfig,
    ruleset: Arc<Ruleset>,
    dates: DateNormalizer,
    history: Arc<dyn HistoricalStore>,
    trends: Arc<dyn TrendStore>,
    notifier: Arc<dyn Notifier>,
}

impl SyncPipeline {
    /// Compile the ruleset and open the JSON stores under `data_dir`.
    pub fn new(config: SyncConfig) -> Result<Self> {
        let rules_dir = config.rules_dir.is_dir().then_some(config.rules_dir.as_path());
        if rules_dir.is_none() {
            info!(rules_dir = %config.rules_dir.display(), "rules directory missing; using built-in rules");
        }
        let ruleset = Ruleset::load(rules_dir).context("compiling ruleset")?;
        let dates = config.date_normalizer()?;
        let store = Arc::new(JsonFileStore::new(config.data_dir.clone()));
        let notifier: Arc<dyn Notifier> = match &config.outbox_path {
            Some(path) => Arc::new(OutboxNotifier::new(path.clone())),
            None => Arc::new(TracingNotifier),
        };
        Ok(Self {
            ruleset: Arc::new(ruleset),
            dates,
            history: store.clone(),
            trends: store,
            notifier,
            config,
        })
    }

    pub fn with_ruleset(mut self, ruleset: Arc<Ruleset>) -> Self {
        self.ruleset = ruleset;
        self
    }

    pub fn with_stores(
        mut self,
        history: Arc<dyn HistoricalStore>,
        trends: Arc<dyn TrendStore>,
    ) -> Self {
        self.history = history;
        self.trends = trends;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn ruleset(&self) -> &Ruleset {
        &self.ruleset
    }

    pub async fn run_once(&self) -> Result<RunSummary> {
        self.run_once_at(Utc::now()).await
    }

    /// One full pass with `now` as the run instant.
    pub async fn run_once_at(&self, now: DateTime<Utc>) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let span = info_span!("sync_run", %run_id);
        self.run(run_id, now).instrument(span).await
    }

    async fn run(&self, run_id: Uuid, now: DateTime<Utc>) -> Result<RunSummary> {
        let mut summary = RunSummary::start(run_id, now);
        let registry = SourceRegistry::load(&self.config.sources_file())?;
        let sources: Vec<_> = registry.enabled().cloned().collect();
        summary.enabled_sources = sources.len();

        let ingested = self.ingest(&sources, now);
        summary.fetched_records = ingested.fetched_records;
        summary.ingest_skipped = ingested.skipped;
        summary.failed_sources = ingested.failed_sources;

        let (postings, duplicates) = stages::local_dedup(ingested.postings);
        summary.local_duplicates = duplicates;
        let (postings, undated) = stages::apply_date_policy(postings, self.config.unparseable_dates);
        summary.undated_dropped = undated;
        let (mut postings, stale) = stages::drop_stale(postings, self.config.max_age(), now);
        summary.stale = stale;

        enrich_all(self.ruleset.tags(), &mut postings);

        let unseen = stages::filter_unseen(self.history.as_ref(), postings).await;
        summary.local_duplicates += unseen.repeated_ids;
        summary.already_seen = unseen.already_seen;
        summary.lookup_failed = unseen.lookup_failed;
        summary.fresh = unseen.fresh.len();
        info!(
            fetched = summary.fetched_records,
            duplicates = summary.local_duplicates,
            stale,
            already_seen = summary.already_seen,
            fresh = summary.fresh,
            "ingestion complete"
        );

        let (bypassed, candidates) = stages::split_bypass(unseen.fresh, &ingested.bypass_ids);
        summary.bypassed = bypassed.len();
        let signals = self.ruleset.signals();
        let bypass_filtered = prefilter(signals, bypassed);
        summary.bypass_dropped = bypass_filtered.rejected.len();
        if summary.bypass_dropped > 0 {
            info!(dropped = summary.bypass_dropped, "bypass postings dropped at pre-filter");
        }
        let candidate_filtered = prefilter(signals, candidates);
        summary.rejected_area = candidate_filtered.rejected_at("area");
        summary.rejected_seniority = candidate_filtered.rejected_at("seniority");

        let scored = self.score(candidate_filtered.passed).await?;
        summary.scored = scored.len();
        summary.score_stats = ScoreStats::from_scores(scored.iter().filter_map(|p| p.score));
        if let Some(stats) = summary.score_stats {
            info!(max = stats.max, mean = stats.mean, min = stats.min, "score distribution");
        }

        let threshold = partition_by_score(scored, self.config.min_score);
        summary.rejected_low_score = threshold.rejected.len();
        let accepted = merge_accepted(threshold.accepted, bypass_filtered.passed);
        let rejected = merge_rejected(candidate_filtered.rejected, threshold.rejected);
        summary.accepted = accepted.len();
        summary.rejected = rejected.len();
        info!(
            accepted = summary.accepted,
            area = summary.rejected_area,
            seniority = summary.rejected_seniority,
            low_score = summary.rejected_low_score,
            "classification complete"
        );

        self.persist(&accepted, &rejected, now, &mut summary).await?;
        self.update_trends(&accepted, now).await?;
        summary.notified = self.notify(&accepted).await?;

        summary.finished_at = Utc::now().max(now);
        if self.config.write_reports {
            let reports_dir = reports::run_reports_dir(&self.config.workspace_root, &summary);
            summary.reports_dir = Some(reports_dir.display().to_string());
            summary.parquet_manifest =
                Some(reports::manifest_path(&reports_dir).display().to_string());
            reports::write_reports(&reports_dir, &summary, &accepted, &rejected).await?;
        }

        summary.cleanup = Some(self.cleanup_at(now).await?);
        Ok(summary)
    }

    /// Load, adapt and normalize every enabled source's capture bundle.
    ///
    /// A source whose bundle cannot be read is logged and skipped.
    pub fn ingest(&self, sources: &[SourceConfig], now: DateTime<Utc>) -> Ingested {
        let ctx = IngestContext {
            run_time: now,
            dates: self.dates,
        };
        let mut ingested = Ingested::default();
        for source in sources {
            let path = self.config.bundle_path_for(source);
            let bundle = match load_capture_bundle(&path) {
                Ok(bundle) => bundle,
                Err(err) => {
                    let reason = format!("{err:#}");
                    warn!(source_id = %source.source_id, error = %reason, "skipping source");
                    ingested.failed_sources += 1;
                    continue;
                }
            };
            let adapter = adapter_for_shape(source.shape, &source.display_name);
            let raws = adapter.parse_bundle(&bundle);
            ingested.fetched_records += raws.len();

            let (postings, skipped) = normalize_all(raws, &ctx);
            ingested.skipped += skipped;
            let bypass = source.bypass_scoring || self.config.bypass_sources.contains(&source.source_id);
            if bypass {
                ingested
                    .bypass_ids
                    .extend(postings.iter().map(|p| p.id.clone()));
            }
            info!(
                source_id = %source.source_id,
                capture_id = %bundle.capture_id,
                postings = postings.len(),
                bypass,
                "ingested capture bundle"
            );
            ingested.postings.extend(postings);
        }
        ingested
    }

    async fn score(&self, postings: Vec<JobPosting>) -> Result<Vec<JobPosting>> {
        let ruleset = Arc::clone(&self.ruleset);
        let workers = self.config.scoring_workers;
        tokio::task::spawn_blocking(move || score_all(&ruleset, postings, workers))
            .await
            .context("scoring task failed")
    }

    async fn persist(
        &self,
        accepted: &[JobPosting],
        rejected: &[RejectedPosting],
        now: DateTime<Utc>,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let (current, previous): (Vec<_>, Vec<_>) = accepted
            .iter()
            .cloned()
            .partition(|p| self.dates.bucket(p.published_at, now) == Bucket::Current);

        for (collection, postings) in [(Collection::Current, &current), (Collection::Previous, &previous)] {
            if postings.is_empty() {
                continue;
            }
            let written = self
                .history
                .upsert_postings(collection, postings)
                .await
                .with_context(|| format!("saving accepted postings to {}", collection.as_str()))?;
            match collection {
                Collection::Current => summary.persisted_current = written,
                _ => summary.persisted_previous = written,
            }
        }

        if self.config.persist_rejected && !rejected.is_empty() {
            summary.persisted_rejected = self
                .history
                .upsert_rejected(rejected)
                .await
                .context("saving rejected postings")?;
        }
        Ok(())
    }

    /// Fold this run's accepted postings into the daily and monthly trend records.
    async fn update_trends(&self, accepted: &[JobPosting], now: DateTime<Utc>) -> Result<()> {
        if accepted.is_empty() {
            return Ok(());
        }
        let today = self.dates.local_date(now);
        for period in [TrendPeriod::Day, TrendPeriod::Month] {
            let incoming = trends::aggregate(accepted, period, today);
            let existing = self
                .trends
                .load(period, &incoming.period_key)
                .await
                .with_context(|| format!("loading trend {}", incoming.period_key))?;
            let merged = trends::merge(existing, incoming, self.config.trend_merge, today);
            self.trends
                .save(&merged)
                .await
                .with_context(|| format!("saving trend {}", merged.period_key))?;
        }
        Ok(())
    }

    async fn notify(&self, accepted: &[JobPosting]) -> Result<usize> {
        if accepted.is_empty() {
            info!("no new postings to notify");
            return Ok(0);
        }
        let notifications: Vec<_> = accepted.iter().map(Notification::from_posting).collect();
        self.notifier
            .deliver(&notifications)
            .await
            .context("delivering notifications")
    }

    /// Delete postings and trend records past their retention windows.
    pub async fn cleanup_at(&self, now: DateTime<Utc>) -> Result<CleanupSummary> {
        let mut cleanup = CleanupSummary::default();
        if let Some(cutoff) = retention_instant(
            now,
            self.config.accepted_retention_days,
            DEFAULT_ACCEPTED_RETENTION_DAYS,
        ) {
            cleanup.current = self.delete_scraped(Collection::Current, cutoff).await?;
            cleanup.previous = self.delete_scraped(Collection::Previous, cutoff).await?;
        }
        if let Some(cutoff) = retention_instant(
            now,
            self.config.rejected_retention_days,
            DEFAULT_REJECTED_RETENTION_DAYS,
        ) {
            cleanup.rejected = self.delete_scraped(Collection::Rejected, cutoff).await?;
        }

        let today = self.dates.local_date(now);
        for (period, keep) in [
            (TrendPeriod::Day, self.config.daily_trend_retention_days),
            (TrendPeriod::Month, self.config.trend_retention_months),
        ] {
            if keep == 0 {
                continue;
            }
            let Some(cutoff) = trends::retention_cutoff(period, today, keep) else {
                continue;
            };
            let removed = self
                .trends
                .delete_before(period, cutoff)
                .await
                .context("pruning trend records")?;
            match period {
                TrendPeriod::Day => cleanup.daily_trends = removed,
                TrendPeriod::Month => cleanup.monthly_trends = removed,
            }
        }
        info!(?cleanup, "retention cleanup complete");
        Ok(cleanup)
    }

    async fn delete_scraped(&self, collection: Collection, cutoff: DateTime<Utc>) -> Result<usize> {
        self.history
            .delete_scraped_before(collection, cutoff)
            .await
            .with_context(|| format!("deleting expired {}", collection.as_str()))
    }
}

fn retention_instant(now: DateTime<Utc>, days: i64, default_days: i64) -> Option<DateTime<Utc>> {
    if days <= 0 {
        return None;
    }
    let delta = window(Duration::try_days(days)).unwrap_or_else(|| {
        warn!(value = days, "retention out of range; using default");
        Duration::days(default_days)
    });
    now.checked_sub_signed(delta)
}

pub async fn run_sync_once_from_env() -> Result<RunSummary> {
    let pipeline = SyncPipeline::new(SyncConfig::from_env())?;
    pipeline.run_once().await
}

pub async fn run_cleanup_from_env() -> Result<CleanupSummary> {
    let pipeline = SyncPipeline::new(SyncConfig::from_env())?;
    pipeline.cleanup_at(Utc::now()).await
}
