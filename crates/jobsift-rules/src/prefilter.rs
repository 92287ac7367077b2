//! Title-only hard rejects that run before scoring.

use jobsift_core::{JobPosting, RejectedPosting, RejectionReason};

use crate::signals::{SignalCategory, SignalSet};

#[derive(Debug, Default)]
pub struct PrefilterOutcome {
    pub passed: Vec<JobPosting>,
    pub rejected: Vec<RejectedPosting>,
}

impl PrefilterOutcome {
    pub fn rejected_at(&self, stage: &str) -> usize {
        self.rejected
            .iter()
            .filter(|r| r.rejection_reason.stage() == stage)
            .count()
    }
}

/// Rejection reason for a title, or `None` when it passes.
///
/// Area terms are overridden by a strong role in the same title; seniority terms
/// are overridden by a positive-seniority term (dual-level listings).
pub fn evaluate_title(signals: &SignalSet, title: &str) -> Option<RejectionReason> {
    let area = signals.find_all(SignalCategory::AreaExclusion, title);
    if !area.is_empty() && !signals.matches(SignalCategory::StrongRole, title) {
        return Some(RejectionReason::Area(area.into_iter().collect()));
    }

    let seniority = signals.find_all(SignalCategory::SeniorityExclusion, title);
    if !seniority.is_empty() && !signals.matches(SignalCategory::PositiveSeniority, title) {
        return Some(RejectionReason::Seniority(seniority.into_iter().collect()));
    }

    None
}

pub fn prefilter(signals: &SignalSet, postings: Vec<JobPosting>) -> PrefilterOutcome {
    let mut outcome = PrefilterOutcome::default();
    for posting in postings {
        match evaluate_title(signals, &posting.title) {
            Some(reason) => {
                tracing::debug!(id = %posting.id, reason = %reason, "pre-filter reject");
                outcome.rejected.push(RejectedPosting {
                    posting,
                    rejection_reason: reason,
                });
            }
            None => outcome.passed.push(posting),
        }
    }
    outcome
}
