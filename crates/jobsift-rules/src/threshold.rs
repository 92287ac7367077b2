//! Score-threshold partition and final ordering of the accepted set.

use jobsift_core::{JobPosting, RejectedPosting, RejectionReason};

#[derive(Debug, Default)]
pub struct ThresholdOutcome {
    /// Sorted by score, highest first; ties keep input order.
    pub accepted: Vec<JobPosting>,
    pub rejected: Vec<RejectedPosting>,
}

/// Split scored postings at `min_score`. Unscored postings count as zero.
pub fn partition_by_score(scored: Vec<JobPosting>, min_score: f64) -> ThresholdOutcome {
    let mut outcome = ThresholdOutcome::default();
    for posting in scored {
        let score = posting.score.unwrap_or(0.0);
        if score >= min_score {
            outcome.accepted.push(posting);
        } else {
            outcome.rejected.push(RejectedPosting {
                posting,
                rejection_reason: RejectionReason::LowScore(score),
            });
        }
    }
    sort_by_score_desc(&mut outcome.accepted);
    outcome
}

/// Stable descending sort on score.
pub fn sort_by_score_desc(postings: &mut [JobPosting]) {
    postings.sort_by(|a, b| {
        b.score
            .unwrap_or(0.0)
            .total_cmp(&a.score.unwrap_or(0.0))
    });
}

/// Final accepted list: scored postings in score order, then bypass postings in input order.
pub fn merge_accepted(scored: Vec<JobPosting>, bypassed: Vec<JobPosting>) -> Vec<JobPosting> {
    let mut accepted = scored;
    accepted.extend(bypassed);
    accepted
}

/// Unified rejected set: pre-filter rejects first, then low-score rejects.
pub fn merge_rejected(
    prefilter: Vec<RejectedPosting>,
    low_score: Vec<RejectedPosting>,
) -> Vec<RejectedPosting> {
    let mut rejected = prefilter;
    rejected.extend(low_score);
    rejected
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::testutil::posting;

    fn scored(id: &str, score: f64) -> JobPosting {
        let mut p = posting(id, "t", "d");
        p.score = Some(score);
        p
    }

    #[test]
    fn accepted_sorted_descending_with_stable_ties() {
        let input = vec![
            scored("a", 60.0),
            scored("b", 90.0),
            scored("c", 60.0),
            scored("d", 10.0),
            scored("e", 90.0),
        ];
        let outcome = partition_by_score(input, 50.0);
        let ids: Vec<_> = outcome.accepted.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["b", "e", "a", "c"]);
        for pair in outcome.accepted.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn partition_is_complete_and_disjoint() {
        let input: Vec<_> = (0..20).map(|i| scored(&i.to_string(), (i * 5) as f64)).collect();
        let all: BTreeSet<_> = input.iter().map(|p| p.id.clone()).collect();
        let outcome = partition_by_score(input, 50.0);

        let accepted: BTreeSet<_> = outcome.accepted.iter().map(|p| p.id.clone()).collect();
        let rejected: BTreeSet<_> = outcome.rejected.iter().map(|r| r.posting.id.clone()).collect();
        assert!(accepted.is_disjoint(&rejected));
        assert_eq!(accepted.union(&rejected).cloned().collect::<BTreeSet<_>>(), all);
    }

    #[test]
    fn threshold_is_inclusive_and_reason_is_low_score() {
        let outcome = partition_by_score(vec![scored("edge", 50.0), scored("zero", 0.0)], 50.0);
        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(outcome.rejected[0].rejection_reason.to_string(), "low_score: 0");
    }

    #[test]
    fn fractional_score_below_threshold_keeps_its_value() {
        let outcome = partition_by_score(vec![scored("close", 49.5)], 50.0);
        assert!(outcome.accepted.is_empty());
        let reason = &outcome.rejected[0].rejection_reason;
        assert_eq!(reason.to_string(), "low_score: 49.5");
        match reason.to_string().parse::<RejectionReason>().unwrap() {
            RejectionReason::LowScore(score) => assert!(score < 50.0),
            other => panic!("unexpected reason {other}"),
        }
    }

    #[test]
    fn bypass_postings_follow_scored_ones() {
        let merged = merge_accepted(vec![scored("s", 70.0)], vec![posting("b1", "t", ""), posting("b2", "t", "")]);
        let ids: Vec<_> = merged.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["s", "b1", "b2"]);
    }
}
