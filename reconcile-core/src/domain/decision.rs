//! Decision: the immutable outcome of one reconciliation run.
//!
//! Carries everything needed to audit or replay the run later without
//! re-fetching providers: the request, every score, every pairwise
//! agreement, the chosen dataset and the raw per-provider payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::ids::{ProviderId, RequestFingerprint};
use super::record::CanonicalRecord;
use super::request::RequestIdentity;
use super::score::{PairAgreement, ProviderScore};
use crate::consensus::select::Selection;
use crate::data::payload::ProviderPayload;

/// Current schema version for persisted decisions.
pub const SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub request: RequestIdentity,
    pub fingerprint: RequestFingerprint,
    pub timestamp: DateTime<Utc>,
    pub chosen_source: ProviderId,
    /// Candidates best-first; `ranking[0] == chosen_source`.
    pub ranking: Vec<ProviderId>,
    pub scores: BTreeMap<ProviderId, ProviderScore>,
    /// Providers that contributed an empty record and were not scored.
    pub excluded: Vec<ProviderId>,
    pub pairs: Vec<PairAgreement>,
    pub final_payload: CanonicalRecord,
    pub raw_snapshot: BTreeMap<ProviderId, ProviderPayload>,
}

impl Decision {
    pub fn new(
        request: RequestIdentity,
        selection: Selection,
        pairs: Vec<PairAgreement>,
        raw_snapshot: BTreeMap<ProviderId, ProviderPayload>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let excluded = raw_snapshot
            .keys()
            .filter(|id| !selection.scores.contains_key(*id))
            .cloned()
            .collect();
        Self {
            schema_version: SCHEMA_VERSION,
            fingerprint: request.fingerprint(),
            request,
            timestamp,
            chosen_source: selection.winner,
            ranking: selection.ranking,
            scores: selection.scores,
            excluded,
            pairs,
            final_payload: selection.record,
            raw_snapshot,
        }
    }

    /// Score entry of the chosen provider.
    pub fn chosen_score(&self) -> Option<&ProviderScore> {
        self.scores.get(&self.chosen_source)
    }

    /// Equality on everything except the timestamp.
    pub fn same_outcome(&self, other: &Decision) -> bool {
        self.request == other.request
            && self.chosen_source == other.chosen_source
            && self.ranking == other.ranking
            && self.scores == other.scores
            && self.excluded == other.excluded
            && self.pairs == other.pairs
            && self.final_payload == other.final_payload
            && self.raw_snapshot == other.raw_snapshot
    }
}
