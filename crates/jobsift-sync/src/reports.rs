//! Per-run report artifacts: Markdown brief, JSON delta and Parquet snapshots.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{BooleanArray, Float64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field as ArrowField, Schema};
use jobsift_core::{JobPosting, RejectedPosting};
use parquet::arrow::ArrowWriter;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;

use crate::RunSummary;

pub const DAILY_BRIEF_FILE: &str = "daily_brief.md";
pub const RUN_DELTA_FILE: &str = "run_delta.json";
pub const SNAPSHOT_DIR: &str = "snapshots";
pub const MANIFEST_FILE: &str = "manifest.json";

const TOP_TAGS: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParquetManifest {
    pub schema_version: u32,
    pub files: Vec<ParquetManifestFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParquetManifestFile {
    pub name: String,
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
}

#[derive(Debug, Deserialize)]
struct RunDelta {
    run: RunSummary,
    accepted: Vec<JobPosting>,
}

pub fn run_reports_dir(workspace_root: &Path, summary: &RunSummary) -> PathBuf {
    workspace_root.join("reports").join(summary.run_id.to_string())
}

pub fn manifest_path(reports_dir: &Path) -> PathBuf {
    reports_dir.join(SNAPSHOT_DIR).join(MANIFEST_FILE)
}

/// Write the brief, the JSON delta and the Parquet snapshots for one run.
pub async fn write_reports(
    reports_dir: &Path,
    summary: &RunSummary,
    accepted: &[JobPosting],
    rejected: &[RejectedPosting],
) -> Result<()> {
    fs::create_dir_all(reports_dir)
        .await
        .with_context(|| format!("creating {}", reports_dir.display()))?;

    let brief = render_daily_brief(summary, accepted, rejected);
    fs::write(reports_dir.join(DAILY_BRIEF_FILE), brief)
        .await
        .with_context(|| format!("writing {DAILY_BRIEF_FILE}"))?;

    let delta = serde_json::to_vec_pretty(&serde_json::json!({
        "run": summary,
        "accepted": accepted,
        "rejected": rejected,
    }))
    .context("serializing run delta")?;
    fs::write(reports_dir.join(RUN_DELTA_FILE), delta)
        .await
        .with_context(|| format!("writing {RUN_DELTA_FILE}"))?;

    export_parquet_snapshots(reports_dir, accepted, rejected).await?;
    Ok(())
}

fn bullet_counts<'a>(counts: impl IntoIterator<Item = (&'a str, usize)>) -> String {
    let lines: Vec<_> = counts
        .into_iter()
        .map(|(k, v)| format!("- {k}: {v}"))
        .collect();
    if lines.is_empty() {
        "- none".to_string()
    } else {
        lines.join("\n")
    }
}

fn top_tags(accepted: &[JobPosting]) -> Vec<(&str, usize)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for keyword in accepted.iter().flat_map(JobPosting::tag_keywords) {
        *counts.entry(keyword).or_default() += 1;
    }
    let mut ranked: Vec<_> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    ranked.truncate(TOP_TAGS);
    ranked
}

pub fn render_daily_brief(
    summary: &RunSummary,
    accepted: &[JobPosting],
    rejected: &[RejectedPosting],
) -> String {
    let mut per_source: BTreeMap<&str, usize> = BTreeMap::new();
    for posting in accepted {
        *per_source.entry(posting.source.as_str()).or_default() += 1;
    }
    let mut per_stage: BTreeMap<&str, usize> = BTreeMap::new();
    for item in rejected {
        *per_stage.entry(item.rejection_reason.stage()).or_default() += 1;
    }
    let scores = match &summary.score_stats {
        Some(stats) => format!(
            "- max: {:.1}\n- mean: {:.1}\n- min: {:.1}",
            stats.max, stats.mean, stats.min
        ),
        None => "- no postings scored".to_string(),
    };

    format!(
        "# jobsift daily brief\n\n\
         - Run ID: `{}`\n- Started: {}\n- Finished: {}\n- Enabled sources: {}\n\n\
         ## Funnel\n\
         - fetched: {}\n- skipped at ingestion: {}\n- local duplicates: {}\n- undated dropped: {}\n\
         - stale: {}\n- already seen: {}{}\n- bypassed scoring: {}\n\
         - bypass dropped at pre-filter: {}\n- scored: {}\n\
         - accepted: {}\n- rejected: {}\n- notified: {}\n\n\
         ## Rejections by stage\n{}\n\n\
         ## Accepted by source\n{}\n\n\
         ## Scores\n{}\n\n\
         ## Top tags\n{}\n",
        summary.run_id,
        summary.started_at,
        summary.finished_at,
        summary.enabled_sources,
        summary.fetched_records,
        summary.ingest_skipped,
        summary.local_duplicates,
        summary.undated_dropped,
        summary.stale,
        summary.already_seen,
        if summary.lookup_failed { " (lookup failed, all treated as new)" } else { "" },
        summary.bypassed,
        summary.bypass_dropped,
        summary.scored,
        summary.accepted,
        summary.rejected,
        summary.notified,
        bullet_counts(per_stage),
        bullet_counts(per_source),
        scores,
        bullet_counts(top_tags(accepted)),
    )
}

async fn export_parquet_snapshots(
    reports_dir: &Path,
    accepted: &[JobPosting],
    rejected: &[RejectedPosting],
) -> Result<PathBuf> {
    let snapshot_dir = reports_dir.join(SNAPSHOT_DIR);
    fs::create_dir_all(&snapshot_dir)
        .await
        .with_context(|| format!("creating {}", snapshot_dir.display()))?;

    let accepted_path = snapshot_dir.join("accepted.parquet");
    let rejected_path = snapshot_dir.join("rejected.parquet");
    let tags_path = snapshot_dir.join("tags.parquet");

    write_accepted_parquet(&accepted_path, accepted)?;
    write_rejected_parquet(&rejected_path, rejected)?;
    write_tags_parquet(&tags_path, accepted)?;

    let manifest = ParquetManifest {
        schema_version: 1,
        files: vec![
            manifest_entry("accepted", reports_dir, &accepted_path)?,
            manifest_entry("rejected", reports_dir, &rejected_path)?,
            manifest_entry("tags", reports_dir, &tags_path)?,
        ],
    };

    let path = manifest_path(reports_dir);
    let bytes = serde_json::to_vec_pretty(&manifest).context("serializing parquet manifest")?;
    fs::write(&path, bytes)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

fn write_parquet(path: &Path, batch: RecordBatch) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)
        .with_context(|| format!("opening parquet writer {}", path.display()))?;
    writer
        .write(&batch)
        .with_context(|| format!("writing record batch {}", path.display()))?;
    writer
        .close()
        .with_context(|| format!("closing parquet writer {}", path.display()))?;
    Ok(())
}

fn strings<'a>(values: impl Iterator<Item = &'a str>) -> StringArray {
    StringArray::from(values.map(Some).collect::<Vec<_>>())
}

fn write_accepted_parquet(path: &Path, accepted: &[JobPosting]) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        ArrowField::new("id", DataType::Utf8, false),
        ArrowField::new("title", DataType::Utf8, false),
        ArrowField::new("company", DataType::Utf8, false),
        ArrowField::new("source", DataType::Utf8, false),
        ArrowField::new("score", DataType::Float64, true),
        ArrowField::new("tier", DataType::Utf8, true),
        ArrowField::new("modality", DataType::Utf8, false),
        ArrowField::new("published_at", DataType::Utf8, false),
        ArrowField::new("published_at_estimated", DataType::Boolean, false),
        ArrowField::new("url", DataType::Utf8, false),
    ]));

    let tiers = StringArray::from(
        accepted
            .iter()
            .map(|p| p.score_details.as_ref().map(|d| d.tier.as_str()))
            .collect::<Vec<_>>(),
    );
    let published = StringArray::from(
        accepted
            .iter()
            .map(|p| Some(p.published_at.to_rfc3339()))
            .collect::<Vec<_>>(),
    );

    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(strings(accepted.iter().map(|p| p.id.as_str()))),
            Arc::new(strings(accepted.iter().map(|p| p.title.as_str()))),
            Arc::new(strings(accepted.iter().map(|p| p.company.as_str()))),
            Arc::new(strings(accepted.iter().map(|p| p.source.as_str()))),
            Arc::new(Float64Array::from(
                accepted.iter().map(|p| p.score).collect::<Vec<_>>(),
            )),
            Arc::new(tiers),
            Arc::new(strings(accepted.iter().map(|p| p.modality.as_str()))),
            Arc::new(published),
            Arc::new(BooleanArray::from(
                accepted
                    .iter()
                    .map(|p| p.published_at_estimated)
                    .collect::<Vec<_>>(),
            )),
            Arc::new(strings(accepted.iter().map(|p| p.url.as_str()))),
        ],
    )
    .context("building accepted record batch")?;
    write_parquet(path, batch)
}

fn write_rejected_parquet(path: &Path, rejected: &[RejectedPosting]) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        ArrowField::new("id", DataType::Utf8, false),
        ArrowField::new("title", DataType::Utf8, false),
        ArrowField::new("source", DataType::Utf8, false),
        ArrowField::new("stage", DataType::Utf8, false),
        ArrowField::new("reason", DataType::Utf8, false),
        ArrowField::new("score", DataType::Float64, true),
    ]));

    let reasons = StringArray::from(
        rejected
            .iter()
            .map(|r| Some(r.rejection_reason.to_string()))
            .collect::<Vec<_>>(),
    );

    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(strings(rejected.iter().map(|r| r.posting.id.as_str()))),
            Arc::new(strings(rejected.iter().map(|r| r.posting.title.as_str()))),
            Arc::new(strings(rejected.iter().map(|r| r.posting.source.as_str()))),
            Arc::new(strings(rejected.iter().map(|r| r.rejection_reason.stage()))),
            Arc::new(reasons),
            Arc::new(Float64Array::from(
                rejected.iter().map(|r| r.posting.score).collect::<Vec<_>>(),
            )),
        ],
    )
    .context("building rejected record batch")?;
    write_parquet(path, batch)
}

fn write_tags_parquet(path: &Path, accepted: &[JobPosting]) -> Result<()> {
    let rows = accepted
        .iter()
        .flat_map(|p| {
            p.tags.iter().flat_map(move |(category, keywords)| {
                keywords
                    .iter()
                    .map(move |k| (p.id.as_str(), category.as_str(), k.as_str()))
            })
        })
        .collect::<Vec<_>>();

    let schema = Arc::new(Schema::new(vec![
        ArrowField::new("posting_id", DataType::Utf8, false),
        ArrowField::new("category", DataType::Utf8, false),
        ArrowField::new("keyword", DataType::Utf8, false),
    ]));
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(strings(rows.iter().map(|(id, _, _)| *id))),
            Arc::new(strings(rows.iter().map(|(_, c, _)| *c))),
            Arc::new(strings(rows.iter().map(|(_, _, k)| *k))),
        ],
    )
    .context("building tags record batch")?;
    write_parquet(path, batch)
}

fn manifest_entry(name: &str, reports_dir: &Path, path: &Path) -> Result<ParquetManifestFile> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let sha256 = hex::encode(hasher.finalize());
    let rel = path
        .strip_prefix(reports_dir)
        .unwrap_or(path)
        .display()
        .to_string();
    Ok(ParquetManifestFile {
        name: name.to_string(),
        path: rel,
        sha256,
        bytes: bytes.len() as u64,
    })
}

/// Markdown summary of the most recent `runs` runs found under `<root>/reports`.
pub fn report_daily_markdown(runs: usize, workspace_root: Option<PathBuf>) -> Result<String> {
    let root = workspace_root.unwrap_or_else(|| PathBuf::from("."));
    let reports_root = root.join("reports");
    let mut deltas = Vec::new();
    for entry in std::fs::read_dir(&reports_root)
        .with_context(|| format!("reading {}", reports_root.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
    {
        let delta_path = entry.path().join(RUN_DELTA_FILE);
        if !delta_path.exists() {
            continue;
        }
        let delta: RunDelta = serde_json::from_str(
            &std::fs::read_to_string(&delta_path)
                .with_context(|| format!("reading {}", delta_path.display()))?,
        )
        .with_context(|| format!("parsing {}", delta_path.display()))?;
        deltas.push((entry.path(), delta));
    }
    deltas.sort_by(|a, b| b.1.run.started_at.cmp(&a.1.run.started_at));
    deltas.truncate(runs.max(1));

    let mut lines = vec!["# jobsift recent runs".to_string(), String::new()];
    for (dir, delta) in deltas {
        let run = &delta.run;
        lines.push(format!("## Run `{}` ({})", run.run_id, run.started_at));
        lines.push(format!(
            "- accepted: {} / rejected: {} / notified: {}",
            run.accepted, run.rejected, run.notified
        ));
        lines.push(format!(
            "- new: {} of {} fetched ({} already seen)",
            run.fresh, run.fetched_records,
            run.already_seen
        ));
        if let Some(best) = delta.accepted.first() {
            lines.push(format!(
                "- top posting: {} @ {} ({})",
                best.title,
                best.company,
                best.score
                    .map(|s| format!("{s:.0}"))
                    .unwrap_or_else(|| "bypass".to_string())
            ));
        }
        let brief = dir.join(DAILY_BRIEF_FILE);
        if brief.exists() {
            lines.push(format!("- daily brief: `{}`", brief.display()));
        }
        let manifest = manifest_path(&dir);
        if manifest.exists() {
            lines.push(format!("- parquet manifest: `{}`", manifest.display()));
        }
        lines.push(String::new());
    }

    Ok(lines.join("\n"))
}
