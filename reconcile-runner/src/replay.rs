//! Audit replay: re-derive a recorded decision from its raw payload snapshot.
//!
//! A decision carries every provider's raw payload, so the outcome can be
//! checked later without re-fetching. Replay re-runs normalization, scoring and
//! selection under a given configuration and compares the result.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use reconcile_core::domain::{Decision, ProviderId, RequestFingerprint};
use reconcile_core::{evaluate, EngineConfig};

/// Outcome of replaying one decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayReport {
    pub fingerprint: RequestFingerprint,
    pub recorded_source: ProviderId,
    pub replayed_source: Option<ProviderId>,
    pub source_matches: bool,
    pub payload_matches: bool,
    pub scores_match: bool,
    /// Set when replay could not produce a decision at all.
    pub error: Option<String>,
}

impl ReplayReport {
    pub fn is_consistent(&self) -> bool {
        self.error.is_none() && self.source_matches && self.payload_matches && self.scores_match
    }
}

/// Replay one decision under `config`.
pub fn verify(decision: &Decision, config: &EngineConfig) -> ReplayReport {
    let mut report = ReplayReport {
        fingerprint: decision.fingerprint.clone(),
        recorded_source: decision.chosen_source.clone(),
        replayed_source: None,
        source_matches: false,
        payload_matches: false,
        scores_match: false,
        error: None,
    };

    match evaluate(config, &decision.request, &decision.raw_snapshot) {
        Ok(eval) => {
            report.source_matches = eval.selection.winner == decision.chosen_source;
            report.payload_matches = eval.selection.record == decision.final_payload;
            report.scores_match = eval.selection.scores == decision.scores;
            report.replayed_source = Some(eval.selection.winner);
        }
        Err(e) => report.error = Some(e.to_string()),
    }

    if !report.is_consistent() {
        tracing::warn!(
            fingerprint = %report.fingerprint,
            recorded = %report.recorded_source,
            replayed = ?report.replayed_source.as_ref().map(ProviderId::as_str),
            "replay diverges from recorded decision"
        );
    }
    report
}

/// Replay a batch of decisions in parallel, preserving order.
pub fn verify_all(decisions: &[Decision], config: &EngineConfig) -> Vec<ReplayReport> {
    decisions.par_iter().map(|d| verify(d, config)).collect()
}
