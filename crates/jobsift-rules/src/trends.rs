//! Period-bucketed trend aggregates over accepted postings.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Days, Months, NaiveDate};
use jobsift_core::{JobPosting, TrendPeriod, TrendRecord};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a run's aggregate combines with a stored record for the same period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendMergePolicy {
    /// Sum counts into the stored record.
    #[default]
    Accumulate,
    /// Overwrite today's daily record with this run's counts; everything else accumulates.
    ReplaceToday,
}

impl fmt::Display for TrendMergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendMergePolicy::Accumulate => f.write_str("accumulate"),
            TrendMergePolicy::ReplaceToday => f.write_str("replace_today"),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("unknown trend merge policy `{0}` (expected accumulate or replace_today)")]
pub struct ParsePolicyError(String);

impl FromStr for TrendMergePolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "accumulate" | "sum" => Ok(TrendMergePolicy::Accumulate),
            "replace_today" | "overwrite" => Ok(TrendMergePolicy::ReplaceToday),
            other => Err(ParsePolicyError(other.to_string())),
        }
    }
}

/// Count accepted postings and their tag keywords for one period.
pub fn aggregate(accepted: &[JobPosting], period: TrendPeriod, day: NaiveDate) -> TrendRecord {
    let mut record = TrendRecord::empty(period, period.key_for(day));
    record.total_jobs = accepted.len() as u64;
    for keyword in accepted.iter().flat_map(JobPosting::tag_keywords) {
        *record.tags.entry(keyword.to_string()).or_insert(0) += 1;
    }
    record
}

/// Combine a run's record with what the trend store already holds for that key.
pub fn merge(
    existing: Option<TrendRecord>,
    incoming: TrendRecord,
    policy: TrendMergePolicy,
    today: NaiveDate,
) -> TrendRecord {
    let Some(mut current) = existing else {
        return incoming;
    };
    let replaces = policy == TrendMergePolicy::ReplaceToday
        && incoming.period == TrendPeriod::Day
        && incoming.period_key == TrendPeriod::Day.key_for(today);
    if replaces {
        return incoming;
    }
    current.total_jobs += incoming.total_jobs;
    for (tag, count) in incoming.tags {
        *current.tags.entry(tag).or_insert(0) += count;
    }
    current
}

/// Earliest period start still retained when keeping `keep` periods back from `today`.
pub fn retention_cutoff(period: TrendPeriod, today: NaiveDate, keep: u32) -> Option<NaiveDate> {
    match period {
        TrendPeriod::Day => today.checked_sub_days(Days::new(u64::from(keep))),
        TrendPeriod::Month => today
            .with_day(1)?
            .checked_sub_months(Months::new(keep)),
    }
}

/// A record is expired when its period starts before the cutoff. Malformed keys are kept.
pub fn is_expired(record: &TrendRecord, cutoff: NaiveDate) -> bool {
    record
        .period
        .start_of(&record.period_key)
        .is_some_and(|start| start < cutoff)
}

pub fn prune(records: Vec<TrendRecord>, cutoff: NaiveDate) -> (Vec<TrendRecord>, usize) {
    let before = records.len();
    let kept: Vec<_> = records.into_iter().filter(|r| !is_expired(r, cutoff)).collect();
    let removed = before - kept.len();
    (kept, removed)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::testutil::posting;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn tagged(id: &str, keywords: &[&str]) -> JobPosting {
        let mut p = posting(id, "t", "d");
        p.tags = BTreeMap::from([(
            "languages".to_string(),
            keywords.iter().map(|k| k.to_string()).collect(),
        )]);
        p
    }

    #[test]
    fn aggregate_counts_jobs_and_keywords() {
        let accepted = vec![tagged("1", &["python", "java"]), tagged("2", &["python"])];
        let record = aggregate(&accepted, TrendPeriod::Month, day(2026, 3, 9));
        assert_eq!(record.period_key, "2026_03");
        assert_eq!(record.total_jobs, 2);
        assert_eq!(record.tags["python"], 2);
        assert_eq!(record.tags["java"], 1);
    }

    #[test]
    fn accumulate_sums_counts() {
        let today = day(2026, 3, 9);
        let first = aggregate(&[tagged("1", &["python"])], TrendPeriod::Day, today);
        let second = aggregate(&[tagged("2", &["python", "sql"])], TrendPeriod::Day, today);
        let merged = merge(Some(first), second, TrendMergePolicy::Accumulate, today);
        assert_eq!(merged.total_jobs, 2);
        assert_eq!(merged.tags["python"], 2);
        assert_eq!(merged.tags["sql"], 1);
    }

    #[test]
    fn replace_today_overwrites_only_todays_daily_record() {
        let today = day(2026, 3, 9);
        let stored = aggregate(&[tagged("1", &["python"])], TrendPeriod::Day, today);
        let rerun = aggregate(&[tagged("1", &["python"])], TrendPeriod::Day, today);
        let merged = merge(Some(stored), rerun.clone(), TrendMergePolicy::ReplaceToday, today);
        assert_eq!(merged, rerun);

        let month = aggregate(&[tagged("1", &["python"])], TrendPeriod::Month, today);
        let merged = merge(Some(month.clone()), month, TrendMergePolicy::ReplaceToday, today);
        assert_eq!(merged.total_jobs, 2);
    }

    #[test]
    fn retention_cutoffs_and_pruning() {
        let today = day(2026, 3, 9);
        assert_eq!(retention_cutoff(TrendPeriod::Month, today, 12), Some(day(2025, 3, 1)));
        assert_eq!(retention_cutoff(TrendPeriod::Day, today, 90), Some(day(2025, 12, 9)));

        let records = vec![
            TrendRecord::empty(TrendPeriod::Month, "2025_02"),
            TrendRecord::empty(TrendPeriod::Month, "2025_03"),
            TrendRecord::empty(TrendPeriod::Month, "garbage"),
        ];
        let (kept, removed) = prune(records, day(2025, 3, 1));
        assert_eq!(removed, 1);
        assert_eq!(
            kept.iter().map(|r| r.period_key.as_str()).collect::<Vec<_>>(),
            ["2025_03", "garbage"]
        );
    }

    #[test]
    fn policy_parses_from_env_strings() {
        assert_eq!("accumulate".parse::<TrendMergePolicy>(), Ok(TrendMergePolicy::Accumulate));
        assert_eq!(
            "REPLACE_TODAY".parse::<TrendMergePolicy>(),
            Ok(TrendMergePolicy::ReplaceToday)
        );
        assert!("nope".parse::<TrendMergePolicy>().is_err());
    }
}
