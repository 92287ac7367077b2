//! Weighted-evidence relevance scorer.
//!
//! A posting starts from `base` and accumulates signed contributions, each recorded
//! as a [`ScoreEntry`]. The only early exit is the no-IT-signals gate. The sum of
//! all entry deltas always equals `raw_total`, which is clamped into `[0, 100]`.

use std::collections::BTreeSet;

use jobsift_core::{JobPosting, ScoreBreakdown, ScoreCategory, ScoreEntry, ScoreTier};

use crate::config::{ScoringWeights, TierCutoffs};
use crate::signals::SignalCategory;
use crate::Ruleset;

const MAX_SCORE: f64 = 100.0;

pub fn tier_for(score: f64, cutoffs: &TierCutoffs) -> ScoreTier {
    if score >= cutoffs.excellent {
        ScoreTier::Excellent
    } else if score >= cutoffs.good {
        ScoreTier::Good
    } else if score >= cutoffs.review {
        ScoreTier::Review
    } else {
        ScoreTier::Reject
    }
}

struct Accumulator<'a> {
    weights: &'a ScoringWeights,
    total: f64,
    entries: Vec<ScoreEntry>,
}

impl<'a> Accumulator<'a> {
    fn new(weights: &'a ScoringWeights) -> Self {
        let mut acc = Self {
            weights,
            total: 0.0,
            entries: Vec::new(),
        };
        acc.apply(ScoreCategory::Base, weights.base, &BTreeSet::new());
        acc
    }

    fn apply(&mut self, category: ScoreCategory, delta: f64, evidence: &BTreeSet<String>) {
        self.total += delta;
        self.entries.push(ScoreEntry {
            category,
            delta,
            evidence: evidence
                .iter()
                .take(self.weights.evidence_sample)
                .cloned()
                .collect(),
        });
    }

    fn finish(self, fatal: bool, years_required: Option<u32>) -> ScoreBreakdown {
        let score = self.total.clamp(0.0, MAX_SCORE);
        ScoreBreakdown {
            tier: tier_for(score, &self.weights.tiers),
            entries: self.entries,
            raw_total: self.total,
            score,
            fatal,
            years_required,
        }
    }
}

fn capped(count: usize, per_signal: f64, cap: f64) -> f64 {
    (count as f64 * per_signal).min(cap)
}

/// Score a title/description pair.
pub fn score_text(ruleset: &Ruleset, title: &str, description: &str) -> ScoreBreakdown {
    let signals = ruleset.signals();
    let w = ruleset.weights();
    let full_text = format!("{title} {description}");
    let mut acc = Accumulator::new(w);

    let required = signals.find_all(SignalCategory::RequiredIt, &full_text);
    let weak = signals.find_all(SignalCategory::WeakIt, &full_text);
    let role = signals.find_all(SignalCategory::StrongRole, title);

    // The gate looks for a role anywhere; the role bonus below is title-only.
    let role_anywhere =
        !role.is_empty() || signals.matches(SignalCategory::StrongRole, description);
    if required.is_empty() && weak.is_empty() && !role_anywhere {
        acc.apply(ScoreCategory::NoItSignals, -acc.total, &BTreeSet::new());
        return acc.finish(true, None);
    }

    let tech = signals.find_all(SignalCategory::StrongTech, &full_text);
    let positive = signals.find_all(SignalCategory::PositiveSeniority, &full_text);

    if !positive.is_empty() {
        let strong_evidence = required.len() >= w.strong_evidence_min_required
            || !tech.is_empty()
            || !role.is_empty();
        if strong_evidence {
            acc.apply(
                ScoreCategory::SeniorityStrongEvidence,
                w.seniority_bonus_strong,
                &positive,
            );
        } else {
            acc.apply(
                ScoreCategory::SeniorityWeakEvidence,
                w.seniority_bonus_weak,
                &positive,
            );
        }
    }

    if !role.is_empty() {
        acc.apply(ScoreCategory::StrongRole, w.strong_role_bonus, &role);
    }

    let domain = signals.find_all(SignalCategory::ExplicitDomain, title);
    if !domain.is_empty() {
        acc.apply(ScoreCategory::ExplicitDomain, w.explicit_domain_bonus, &domain);
    }

    if !tech.is_empty() {
        let bonus = capped(tech.len(), w.strong_tech_per_signal, w.strong_tech_cap);
        acc.apply(ScoreCategory::StrongTech, bonus, &tech);
    }
    if !required.is_empty() {
        let bonus = capped(required.len(), w.it_signal_per_signal, w.it_signal_cap);
        acc.apply(ScoreCategory::ItSignals, bonus, &required);
    }
    if !weak.is_empty() {
        let bonus = capped(weak.len(), w.weak_signal_per_signal, w.weak_signal_cap);
        acc.apply(ScoreCategory::WeakSignals, bonus, &weak);
    }

    let strong_count = required.len() + tech.len();
    if strong_count > w.rich_description_threshold {
        let extra = strong_count - w.rich_description_threshold;
        let bonus = capped(extra, w.rich_description_per_signal, w.rich_description_cap);
        acc.apply(ScoreCategory::RichDescription, bonus, &BTreeSet::new());
    }

    if !positive.is_empty() && !role.is_empty() && !tech.is_empty() {
        acc.apply(ScoreCategory::Combination, w.combination_bonus, &BTreeSet::new());
    }

    if !weak.is_empty()
        && required.is_empty()
        && tech.is_empty()
        && positive.is_empty()
        && role.is_empty()
    {
        acc.apply(
            ScoreCategory::OnlyWeakSignals,
            -w.only_weak_signals_penalty,
            &weak,
        );
    }

    if strong_count < w.few_signals_min && tech.is_empty() && role.is_empty() {
        acc.apply(ScoreCategory::FewSignals, -w.few_signals_penalty, &BTreeSet::new());
    }

    let ambiguous = signals.find_all(SignalCategory::AmbiguousRole, title);
    if !ambiguous.is_empty() && tech.is_empty() && positive.is_empty() && role.is_empty() {
        acc.apply(
            ScoreCategory::AmbiguousRole,
            -w.ambiguous_role_penalty,
            &ambiguous,
        );
    }

    let mut years_required = None;
    if let Some(years) = signals.experience().max_years(description) {
        if years >= w.senior_years_threshold && positive.is_empty() {
            let evidence = BTreeSet::from([format!("{years} years")]);
            acc.apply(
                ScoreCategory::SeniorExperience,
                -w.senior_experience_penalty,
                &evidence,
            );
            years_required = Some(years);
        }
    }

    acc.finish(false, years_required)
}

pub fn score_posting(ruleset: &Ruleset, posting: &JobPosting) -> ScoreBreakdown {
    score_text(ruleset, &posting.title, &posting.description)
}

fn attach_score(ruleset: &Ruleset, posting: &mut JobPosting) {
    let breakdown = score_posting(ruleset, posting);
    posting.score = Some(breakdown.score);
    posting.score_details = Some(breakdown);
}

/// Score every posting, fanning out over `workers` scoped threads.
///
/// Each worker owns a contiguous chunk, so output order matches input order.
pub fn score_all(ruleset: &Ruleset, mut postings: Vec<JobPosting>, workers: usize) -> Vec<JobPosting> {
    let workers = workers.max(1);
    if workers == 1 || postings.len() < 2 {
        for posting in &mut postings {
            attach_score(ruleset, posting);
        }
        return postings;
    }

    let chunk_size = postings.len().div_ceil(workers);
    std::thread::scope(|scope| {
        let handles: Vec<_> = postings
            .chunks_mut(chunk_size)
            .map(|chunk| {
                scope.spawn(move || {
                    for posting in chunk {
                        attach_score(ruleset, posting);
                    }
                })
            })
            .collect();
        for handle in handles {
            if let Err(panic) = handle.join() {
                std::panic::resume_unwind(panic);
            }
        }
    });
    postings
}
