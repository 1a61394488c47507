//! Source selection: a total order over scored providers.
//!
//! Ranking is score descending, then completeness descending, then priority
//! rank ascending, then provider name. The last key makes the order total, so
//! the winner never depends on the order providers were supplied in.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::domain::{CanonicalRecord, ProviderId, ProviderScore, RequestIdentity};
use crate::error::ReconcileError;

/// The chosen provider, the full ranking, and the winning record.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub winner: ProviderId,
    pub ranking: Vec<ProviderId>,
    pub scores: BTreeMap<ProviderId, ProviderScore>,
    pub record: CanonicalRecord,
}

/// Ordering used for ranking. `Less` means `a` ranks ahead of `b`.
pub fn rank_order(a: &ProviderScore, b: &ProviderScore) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.completeness.total_cmp(&a.completeness))
        .then_with(|| a.priority_rank.cmp(&b.priority_rank))
        .then_with(|| a.provider.cmp(&b.provider))
}

/// Pick the winner among scored providers with non-empty records.
///
/// Scores for providers whose record is missing or empty are dropped from the
/// selection. Fails with [`ReconcileError::NoDataAvailable`] when nothing is
/// left.
pub fn select(
    request: &RequestIdentity,
    scores: &BTreeMap<ProviderId, ProviderScore>,
    records: &BTreeMap<ProviderId, CanonicalRecord>,
) -> Result<Selection, ReconcileError> {
    let mut candidates: Vec<&ProviderScore> = scores
        .values()
        .filter(|s| records.get(&s.provider).is_some_and(|r| !r.is_empty()))
        .collect();

    if candidates.is_empty() {
        return Err(ReconcileError::NoDataAvailable {
            request: request.to_string(),
            providers: records.len(),
        });
    }

    candidates.sort_by(|a, b| rank_order(a, b));
    let ranking: Vec<ProviderId> = candidates.iter().map(|s| s.provider.clone()).collect();
    let winner = ranking[0].clone();
    let record = records
        .get(&winner)
        .cloned()
        .ok_or_else(|| ReconcileError::NoDataAvailable {
            request: request.to_string(),
            providers: records.len(),
        })?;
    let scores = candidates
        .into_iter()
        .map(|s| (s.provider.clone(), s.clone()))
        .collect();

    tracing::debug!(
        request = %request,
        winner = %winner,
        candidates = ranking.len(),
        "source selected"
    );

    Ok(Selection {
        winner,
        ranking,
        scores,
        record,
    })
}
