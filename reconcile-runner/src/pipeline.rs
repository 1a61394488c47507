//! Reconciliation pipeline: fetch, normalize, score, select, record.
//!
//! Provider fetches fan out on the rayon pool. Everything after collection is
//! the pure evaluation in `reconcile_core::consensus`; the only side effect is
//! the final write to the [`DecisionRecorder`], whose failure is reported as a
//! warning on the outcome rather than failing the run.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;

use reconcile_core::data::ProviderPayload;
use reconcile_core::domain::{Decision, ProviderId, RequestIdentity};
use reconcile_core::{decide, request_span, EngineConfig, ReconcileError};

use crate::adapter::ProviderAdapter;
use crate::recorder::{DecisionRecorder, PersistenceError, PersistenceWarning};

/// Result of one run: the decision, plus a warning if it was not persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileOutcome {
    pub decision: Decision,
    pub persistence_warning: Option<PersistenceWarning>,
}

impl ReconcileOutcome {
    pub fn is_persisted(&self) -> bool {
        self.persistence_warning.is_none()
    }
}

/// Fetch from every adapter concurrently.
///
/// A failed or unavailable adapter contributes an `Empty` payload carrying the
/// reason. When two adapters share a provider id, the first one listed wins.
pub fn collect_payloads(
    adapters: &[Box<dyn ProviderAdapter>],
    request: &RequestIdentity,
) -> BTreeMap<ProviderId, ProviderPayload> {
    let fetched: Vec<(ProviderId, ProviderPayload)> = adapters
        .par_iter()
        .map(|adapter| {
            let provider = adapter.provider().clone();
            let _span = request_span!("fetch", request, provider).entered();
            if !adapter.is_available() {
                tracing::warn!("provider unavailable, skipping");
                return (provider, ProviderPayload::empty("provider unavailable"));
            }
            match adapter.fetch(request) {
                Ok(payload) => {
                    tracing::debug!(shape = payload.shape(), "payload fetched");
                    (provider, payload)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "provider fetch failed");
                    (provider, ProviderPayload::empty(e.to_string()))
                }
            }
        })
        .collect();

    let mut payloads = BTreeMap::new();
    for (provider, payload) in fetched {
        if payloads.contains_key(&provider) {
            tracing::warn!(provider = %provider, "duplicate provider id, keeping the first adapter");
            continue;
        }
        payloads.insert(provider, payload);
    }
    payloads
}

/// Reconciliation engine bound to a configuration and a recorder.
pub struct Reconciler<R: DecisionRecorder> {
    config: EngineConfig,
    recorder: R,
}

impl<R: DecisionRecorder> Reconciler<R> {
    pub fn new(config: EngineConfig, recorder: R) -> Self {
        Self { config, recorder }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn recorder(&self) -> &R {
        &self.recorder
    }

    /// Reconcile already-collected payloads.
    pub fn reconcile(
        &self,
        request: &RequestIdentity,
        payloads: BTreeMap<ProviderId, ProviderPayload>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        self.reconcile_at(request, payloads, Utc::now())
    }

    /// [`Reconciler::reconcile`] with an explicit decision timestamp.
    pub fn reconcile_at(
        &self,
        request: &RequestIdentity,
        payloads: BTreeMap<ProviderId, ProviderPayload>,
        timestamp: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let _span = request_span!("reconcile", request).entered();

        let decision = match decide(&self.config, request, payloads, timestamp) {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(error = %e, "reconciliation failed");
                return Err(e);
            }
        };

        tracing::info!(
            chosen = %decision.chosen_source,
            score = decision.chosen_score().map(|s| s.score).unwrap_or(0.0),
            candidates = decision.ranking.len(),
            excluded = decision.excluded.len(),
            "provider chosen"
        );

        let persistence_warning = match self.recorder.record(&decision) {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(error = %e, "decision not persisted");
                Some(PersistenceWarning::new(decision.fingerprint.clone(), &e))
            }
        };

        Ok(ReconcileOutcome {
            decision,
            persistence_warning,
        })
    }

    /// Fetch from every adapter, then reconcile.
    pub fn fetch_and_reconcile(
        &self,
        adapters: &[Box<dyn ProviderAdapter>],
        request: &RequestIdentity,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let payloads = collect_payloads(adapters, request);
        self.reconcile(request, payloads)
    }

    /// Most recent recorded decision for `request`.
    pub fn latest(&self, request: &RequestIdentity) -> Result<Option<Decision>, PersistenceError> {
        self.recorder.latest(request)
    }
}
