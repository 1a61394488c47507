//! Consensus: compare, score, select.
//!
//! [`evaluate`] runs the pure part of a reconciliation run: normalize every
//! payload, score every provider against the others, pick the winner.
//! [`decide`] wraps the result into a [`Decision`]. Neither touches storage,
//! so the same payload snapshot always yields the same outcome.

pub mod compare;
pub mod score;
pub mod select;
pub mod tolerance;

pub use compare::ToleranceComparator;
pub use score::{priority_rank, ConsensusScorer, ScoreReport};
pub use select::{rank_order, select, Selection};
pub use tolerance::{ToleranceSpec, ToleranceTable};

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::config::EngineConfig;
use crate::data::{Normalizer, ProviderPayload};
use crate::domain::{CanonicalRecord, Decision, ProviderId, RequestIdentity};
use crate::error::ReconcileError;

/// Intermediate results of one evaluation.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub records: BTreeMap<ProviderId, CanonicalRecord>,
    pub report: ScoreReport,
    pub selection: Selection,
}

/// Normalize, score and select.
pub fn evaluate(
    config: &EngineConfig,
    request: &RequestIdentity,
    payloads: &BTreeMap<ProviderId, ProviderPayload>,
) -> Result<Evaluation, ReconcileError> {
    let normalizer = Normalizer::new(&config.aliases);
    let records: BTreeMap<ProviderId, CanonicalRecord> = payloads
        .iter()
        .map(|(id, payload)| (id.clone(), normalizer.normalize(id, payload, request)))
        .collect();

    let tolerances = &config.profile(request.kind).tolerances;
    let comparator = ToleranceComparator::new(&request.keys, tolerances, config.epsilon);
    let report = ConsensusScorer::new(comparator, &config.priority).score(&records);
    if report.all_pairs_degenerate() {
        tracing::warn!(
            request = %request,
            pairs = report.pairs.len(),
            "no provider pair had a comparable sample; ranking by completeness and priority"
        );
    }

    let selection = select(request, &report.scores, &records)?;
    Ok(Evaluation {
        records,
        report,
        selection,
    })
}

/// Evaluate and build the decision, stamped with `timestamp`.
pub fn decide(
    config: &EngineConfig,
    request: &RequestIdentity,
    payloads: BTreeMap<ProviderId, ProviderPayload>,
    timestamp: DateTime<Utc>,
) -> Result<Decision, ReconcileError> {
    let Evaluation {
        report, selection, ..
    } = evaluate(config, request, &payloads)?;
    Ok(Decision::new(
        request.clone(),
        selection,
        report.pairs,
        payloads,
        timestamp,
    ))
}
