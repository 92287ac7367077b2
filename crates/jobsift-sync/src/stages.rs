//! Collection-level stages that sit between ingestion and scoring.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use jobsift_core::dates::{is_older_than, UnparseableDatePolicy};
use jobsift_core::JobPosting;
use jobsift_storage::HistoricalStore;
use tracing::warn;

fn dedup_key(posting: &JobPosting) -> String {
    format!(
        "{}|{}",
        posting.title.trim().to_lowercase(),
        posting.company.trim().to_lowercase()
    )
}

/// Collapse postings sharing title and company, keeping the first. Returns the number dropped.
pub fn local_dedup(postings: Vec<JobPosting>) -> (Vec<JobPosting>, usize) {
    let before = postings.len();
    let mut seen = HashSet::new();
    let kept: Vec<_> = postings
        .into_iter()
        .filter(|p| seen.insert(dedup_key(p)))
        .collect();
    let dropped = before - kept.len();
    (kept, dropped)
}

/// Apply the unparseable-date policy. Returns the number dropped.
pub fn apply_date_policy(
    postings: Vec<JobPosting>,
    policy: UnparseableDatePolicy,
) -> (Vec<JobPosting>, usize) {
    match policy {
        UnparseableDatePolicy::AssumeNow => (postings, 0),
        UnparseableDatePolicy::Drop => {
            let before = postings.len();
            let kept: Vec<_> = postings
                .into_iter()
                .filter(|p| !p.published_at_estimated)
                .collect();
            let dropped = before - kept.len();
            (kept, dropped)
        }
    }
}

/// Drop postings published more than `max_age` before `now`.
pub fn drop_stale(
    postings: Vec<JobPosting>,
    max_age: Duration,
    now: DateTime<Utc>,
) -> (Vec<JobPosting>, usize) {
    let before = postings.len();
    let kept: Vec<_> = postings
        .into_iter()
        .filter(|p| !is_older_than(p.published_at, max_age, now))
        .collect();
    let dropped = before - kept.len();
    (kept, dropped)
}

#[derive(Debug, Default)]
pub struct UnseenOutcome {
    pub fresh: Vec<JobPosting>,
    pub already_seen: usize,
    /// Postings dropped because an earlier one in the batch had the same id.
    pub repeated_ids: usize,
    /// Set when a lookup failed and every posting was let through.
    pub lookup_failed: bool,
}

/// Keep only postings whose id the historical store has never accepted.
///
/// Repeated ids collapse to their first posting, then ids are looked up in chunks
/// of the store's batch size. Any lookup error fails open: the whole collapsed
/// input is returned as new.
pub async fn filter_unseen(store: &dyn HistoricalStore, postings: Vec<JobPosting>) -> UnseenOutcome {
    let before = postings.len();
    let mut unique = HashSet::new();
    let postings: Vec<_> = postings
        .into_iter()
        .filter(|p| unique.insert(p.id.clone()))
        .collect();
    let repeated_ids = before - postings.len();

    let ids: Vec<String> = postings.iter().map(|p| p.id.clone()).collect();
    let batch_size = store.lookup_batch_size().max(1);
    let mut existing = HashSet::new();

    for chunk in ids.chunks(batch_size) {
        match store.existing_ids(chunk).await {
            Ok(found) => existing.extend(found),
            Err(err) => {
                warn!(
                    error = %err,
                    postings = postings.len(),
                    "historical lookup failed; treating every posting as new"
                );
                return UnseenOutcome {
                    fresh: postings,
                    already_seen: 0,
                    repeated_ids,
                    lookup_failed: true,
                };
            }
        }
    }

    let unique_count = postings.len();
    let fresh: Vec<_> = postings
        .into_iter()
        .filter(|p| !existing.contains(&p.id))
        .collect();
    UnseenOutcome {
        already_seen: unique_count - fresh.len(),
        fresh,
        repeated_ids,
        lookup_failed: false,
    }
}

/// Split postings into (bypassed, scored) by id membership.
pub fn split_bypass(
    postings: Vec<JobPosting>,
    bypass_ids: &HashSet<String>,
) -> (Vec<JobPosting>, Vec<JobPosting>) {
    postings.into_iter().partition(|p| bypass_ids.contains(&p.id))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::TimeZone;
    use jobsift_core::{Modality, RejectedPosting, SALARY_NOT_SPECIFIED};
    use jobsift_storage::{Collection, StoreError};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 9, 15, 0, 0).unwrap()
    }

    fn posting(id: &str, title: &str, company: &str) -> JobPosting {
        JobPosting {
            id: id.to_string(),
            title: title.to_string(),
            company: company.to_string(),
            description: String::new(),
            source: "test".to_string(),
            salary: SALARY_NOT_SPECIFIED.to_string(),
            url: String::new(),
            published_at: now(),
            published_at_estimated: false,
            date_scraped: now(),
            tags: BTreeMap::new(),
            modality: Modality::NotSpecified,
            score: None,
            score_details: None,
        }
    }

    struct FakeHistory {
        known: HashSet<String>,
        batch: usize,
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl HistoricalStore for FakeHistory {
        fn lookup_batch_size(&self) -> usize {
            self.batch
        }

        async fn existing_ids(&self, ids: &[String]) -> Result<HashSet<String>, StoreError> {
            assert!(ids.len() <= self.batch);
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(StoreError::Unavailable("offline".into()));
            }
            Ok(ids.iter().filter(|id| self.known.contains(*id)).cloned().collect())
        }

        async fn upsert_postings(&self, _: Collection, p: &[JobPosting]) -> Result<usize, StoreError> {
            Ok(p.len())
        }

        async fn upsert_rejected(&self, r: &[RejectedPosting]) -> Result<usize, StoreError> {
            Ok(r.len())
        }

        async fn delete_scraped_before(&self, _: Collection, _: DateTime<Utc>) -> Result<usize, StoreError> {
            Ok(0)
        }
    }

    #[test]
    fn local_dedup_keeps_first_by_title_and_company() {
        let (kept, dropped) = local_dedup(vec![
            posting("a", "Dev Jr", "Acme"),
            posting("b", "  dev jr ", "ACME "),
            posting("c", "Dev Jr", "Other"),
        ]);
        assert_eq!(dropped, 1);
        let ids: Vec<_> = kept.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["a", "c"]);
    }

    #[test]
    fn drop_policy_removes_only_estimated_dates() {
        let mut undated = posting("u", "Dev", "A");
        undated.published_at_estimated = true;
        let input = vec![undated, posting("d", "QA", "B")];

        let (kept, dropped) = apply_date_policy(input.clone(), UnparseableDatePolicy::AssumeNow);
        assert_eq!((kept.len(), dropped), (2, 0));

        let (kept, dropped) = apply_date_policy(input, UnparseableDatePolicy::Drop);
        assert_eq!(dropped, 1);
        assert_eq!(kept[0].id, "d");
    }

    #[test]
    fn stale_postings_are_dropped_at_the_boundary() {
        let mut old = posting("old", "Dev", "A");
        old.published_at = now() - Duration::hours(49);
        let mut edge = posting("edge", "Dev", "B");
        edge.published_at = now() - Duration::hours(48);
        let (kept, dropped) = drop_stale(vec![old, edge], Duration::hours(48), now());
        assert_eq!(dropped, 1);
        assert_eq!(kept[0].id, "edge");
    }

    #[tokio::test]
    async fn unseen_filter_batches_lookups() {
        let store = FakeHistory {
            known: HashSet::from(["p3".to_string(), "p7".to_string()]),
            batch: 3,
            calls: AtomicUsize::new(0),
            fail: false,
        };
        let postings: Vec<_> = (0..8).map(|i| posting(&format!("p{i}"), &format!("t{i}"), "c")).collect();
        let outcome = filter_unseen(&store, postings).await;
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.already_seen, 2);
        assert_eq!(outcome.fresh.len(), 6);
        assert!(outcome.fresh.iter().all(|p| p.id != "p3" && p.id != "p7"));
        assert!(!outcome.lookup_failed);
    }

    #[tokio::test]
    async fn unseen_filter_fails_open() {
        let store = FakeHistory {
            known: HashSet::from(["p1".to_string()]),
            batch: 30,
            calls: AtomicUsize::new(0),
            fail: true,
        };
        let outcome = filter_unseen(&store, vec![posting("p1", "a", "b"), posting("p2", "c", "d")]).await;
        assert!(outcome.lookup_failed);
        assert_eq!(outcome.fresh.len(), 2);
        assert_eq!(outcome.already_seen, 0);
    }

    #[tokio::test]
    async fn repeated_ids_collapse_before_lookup() {
        let store = FakeHistory {
            known: HashSet::new(),
            batch: 30,
            calls: AtomicUsize::new(0),
            fail: false,
        };
        let postings = vec![
            posting("same", "Dev Jr", "Acme"),
            posting("same", "Desarrollador Jr", "Acme SA"),
            posting("other", "QA", "Beta"),
        ];
        let outcome = filter_unseen(&store, postings.clone()).await;
        assert_eq!(outcome.repeated_ids, 1);
        let ids: Vec<_> = outcome.fresh.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["same", "other"]);
        assert_eq!(outcome.fresh[0].title, "Dev Jr");

        let failing = FakeHistory {
            known: HashSet::new(),
            batch: 30,
            calls: AtomicUsize::new(0),
            fail: true,
        };
        let outcome = filter_unseen(&failing, postings).await;
        assert!(outcome.lookup_failed);
        assert_eq!(outcome.fresh.len(), 2);
        assert_eq!(outcome.repeated_ids, 1);
    }

    #[test]
    fn bypass_split_preserves_order() {
        let bypass = HashSet::from(["b1".to_string(), "b2".to_string()]);
        let (bypassed, scored) = split_bypass(
            vec![
                posting("b1", "x", "1"),
                posting("s1", "y", "2"),
                posting("b2", "z", "3"),
            ],
            &bypass,
        );
        assert_eq!(bypassed.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(), ["b1", "b2"]);
        assert_eq!(scored[0].id, "s1");
    }
}
