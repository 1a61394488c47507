//! Consensus scorer: pairwise agreement aggregated into per-provider scores.
//!
//! Every unordered pair of providers with non-empty records is compared once;
//! the pair's hits and comparable counts are credited to both members.
//! A provider's score is `hits / comparable` over all its pairs.
//!
//! Providers with an empty record are excluded and cannot win. A provider left
//! alone after exclusion scores 1.0 without any comparison.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::compare::ToleranceComparator;
use crate::domain::{CanonicalRecord, PairAgreement, ProviderId, ProviderScore};

/// Output of one scoring pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    pub scores: BTreeMap<ProviderId, ProviderScore>,
    pub pairs: Vec<PairAgreement>,
    /// Providers excluded for contributing an empty record.
    pub excluded: Vec<ProviderId>,
}

impl ScoreReport {
    /// True when at least two candidates were compared but no pair had a
    /// single comparable sample. Ranking then rests on completeness and
    /// priority alone.
    pub fn all_pairs_degenerate(&self) -> bool {
        !self.pairs.is_empty() && self.pairs.iter().all(PairAgreement::is_degenerate)
    }
}

/// Position of `provider` in the caller's priority order.
///
/// Unlisted providers rank after every listed one.
pub fn priority_rank(priority: &[ProviderId], provider: &ProviderId) -> usize {
    priority
        .iter()
        .position(|p| p == provider)
        .unwrap_or(priority.len())
}

pub struct ConsensusScorer<'a> {
    comparator: ToleranceComparator<'a>,
    priority: &'a [ProviderId],
}

impl<'a> ConsensusScorer<'a> {
    pub fn new(comparator: ToleranceComparator<'a>, priority: &'a [ProviderId]) -> Self {
        Self {
            comparator,
            priority,
        }
    }

    pub fn score(&self, records: &BTreeMap<ProviderId, CanonicalRecord>) -> ScoreReport {
        let keys = self.comparator.keys();

        let (candidates, excluded): (Vec<_>, Vec<_>) =
            records.iter().partition(|(_, rec)| !rec.is_empty());
        let excluded: Vec<ProviderId> = excluded.into_iter().map(|(id, _)| id.clone()).collect();
        for id in &excluded {
            tracing::debug!(provider = %id, "excluded from scoring: empty record");
        }

        let mut scores: BTreeMap<ProviderId, ProviderScore> = candidates
            .iter()
            .map(|(id, rec)| {
                (
                    (*id).clone(),
                    ProviderScore {
                        provider: (*id).clone(),
                        hits: 0,
                        comparable: 0,
                        score: 0.0,
                        completeness: rec.completeness(keys),
                        priority_rank: priority_rank(self.priority, id),
                        observations: rec.len(),
                        pairs: 0,
                    },
                )
            })
            .collect();

        if candidates.len() == 1 {
            if let Some(only) = scores.values_mut().next() {
                only.score = 1.0;
            }
            return ScoreReport {
                scores,
                pairs: Vec::new(),
                excluded,
            };
        }

        let mut pairs = Vec::with_capacity(candidates.len() * candidates.len().saturating_sub(1) / 2);
        for (i, (left, a)) in candidates.iter().enumerate() {
            for (right, b) in candidates.iter().skip(i + 1) {
                let pair = self.comparator.compare(left, a, right, b);
                for member in [*left, *right] {
                    if let Some(s) = scores.get_mut(member) {
                        s.hits += pair.hits;
                        s.comparable += pair.comparable;
                        s.pairs += 1;
                    }
                }
                pairs.push(pair);
            }
        }

        for s in scores.values_mut() {
            s.score = if s.comparable > 0 {
                s.hits as f64 / s.comparable as f64
            } else {
                0.0
            };
        }

        ScoreReport {
            scores,
            pairs,
            excluded,
        }
    }
}
