//! Property tests for scoring and selection invariants.
//!
//! Uses proptest to verify:
//! 1. Identical records score 1.0
//! 2. Tolerance boundary is inclusive
//! 3. Scores depend on payloads, not on provider names
//! 4. Running the same evaluation twice yields the same outcome

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use std::collections::BTreeMap;

use reconcile_core::config::{EngineConfig, Profile};
use reconcile_core::consensus::{
    decide, rank_order, ConsensusScorer, ToleranceComparator, ToleranceSpec, ToleranceTable,
};
use reconcile_core::data::ProviderPayload;
use reconcile_core::domain::{
    CanonicalRecord, ComparisonKey, Decision, ObservationDate, ProviderId, ProviderScore,
    RequestKind,
};

const EPS: f64 = 1e-12;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_value() -> impl Strategy<Value = f64> {
    (-1000.0..1000.0_f64).prop_map(|v| (v * 100.0).round() / 100.0)
}

fn arb_row(keys: usize) -> impl Strategy<Value = Vec<Option<f64>>> {
    prop::collection::vec(prop::option::weighted(0.8, arb_value()), keys)
}

fn arb_provider_values() -> impl Strategy<Value = Vec<Vec<Option<f64>>>> {
    prop::collection::vec(arb_row(4), 1..6)
}

const KEYS: [&str; 4] = ["rsi", "macd", "close_10_ema", "close_50_sma"];

fn snapshot_payload(values: &[Option<f64>]) -> ProviderPayload {
    let map: serde_json::Map<String, serde_json::Value> = KEYS
        .iter()
        .zip(values)
        .filter_map(|(k, v)| v.map(|x| (k.to_string(), serde_json::json!(x))))
        .collect();
    ProviderPayload::Snapshot {
        as_of: None,
        values: map.into_iter().collect(),
    }
}

fn snapshot_record(values: &[Option<f64>]) -> CanonicalRecord {
    let mut rec = CanonicalRecord::new();
    for (k, v) in KEYS.iter().zip(values) {
        rec.set(ObservationDate::Latest, (*k).into(), *v);
    }
    rec
}

fn config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.profiles.indicators = Profile::new(
        &KEYS,
        ToleranceTable::new(ToleranceSpec::new(0.5, 0.0)),
    );
    config
}

// ── 1. Identical records ─────────────────────────────────────────────

proptest! {
    /// Two providers with the same values agree on every comparable sample.
    #[test]
    fn identical_records_score_one(values in arb_row(4)) {
        prop_assume!(values.iter().any(Option::is_some));
        let keys: Vec<ComparisonKey> = KEYS.iter().map(|k| ComparisonKey::from(*k)).collect();
        let tol = ToleranceTable::default();
        let priority: Vec<ProviderId> = Vec::new();
        let scorer = ConsensusScorer::new(ToleranceComparator::new(&keys, &tol, EPS), &priority);

        let mut records = BTreeMap::new();
        records.insert(ProviderId::from("a"), snapshot_record(&values));
        records.insert(ProviderId::from("b"), snapshot_record(&values));
        let report = scorer.score(&records);

        for s in report.scores.values() {
            prop_assert!(s.comparable > 0);
            prop_assert_eq!(s.score, 1.0);
        }
    }
}

// ── 2. Inclusive boundary ────────────────────────────────────────────

proptest! {
    /// A difference of exactly `abs` is a hit.
    #[test]
    fn boundary_is_inclusive(base in arb_value(), steps in 0u32..200) {
        // Multiples of 1/64 are exact in binary, so `b - a == abs` holds exactly.
        let abs = f64::from(steps) / 64.0;
        let spec = ToleranceSpec::new(abs, 0.0);
        let a = (base * 64.0).round() / 64.0;
        let b = a + abs;
        prop_assert!(spec.within(a, b, EPS));
        prop_assert!(spec.within(b, a, EPS));
    }

    /// Passing either bound alone is enough to pass the combined spec.
    #[test]
    fn larger_bound_applies(a in arb_value(), b in arb_value(), abs in 0.0..10.0_f64, rel in 0.0..0.1_f64) {
        let combined = ToleranceSpec::new(abs, rel);
        if ToleranceSpec::new(abs, 0.0).within(a, b, EPS) || ToleranceSpec::new(0.0, rel).within(a, b, EPS) {
            prop_assert!(combined.within(a, b, EPS));
        }
    }
}

// ── 3. Order independence ────────────────────────────────────────────

proptest! {
    /// Handing the same payloads to different provider names moves each
    /// score with its payload; names only matter as the last tie-break.
    #[test]
    fn scores_follow_payloads_not_names(
        providers in arb_provider_values(),
        seed in any::<u64>(),
    ) {
        prop_assume!(providers.iter().any(|row| row.iter().any(Option::is_some)));
        let config = config();
        let request = config.request("SPY", RequestKind::Indicators, None);
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        let n = providers.len();
        let mut perm: Vec<usize> = (0..n).collect();
        for i in 0..n {
            let j = ((seed >> (i % 64)) as usize).wrapping_add(i * 7) % n;
            perm.swap(i, j);
        }

        let label = |i: usize| ProviderId::new(format!("p{i}"));
        let original: BTreeMap<ProviderId, ProviderPayload> = providers
            .iter()
            .enumerate()
            .map(|(i, row)| (label(i), snapshot_payload(row)))
            .collect();
        let relabelled: BTreeMap<ProviderId, ProviderPayload> = providers
            .iter()
            .enumerate()
            .map(|(i, row)| (label(perm[i]), snapshot_payload(row)))
            .collect();

        let d1 = decide(&config, &request, original, ts).unwrap();
        let d2 = decide(&config, &request, relabelled, ts).unwrap();

        let tally = |s: &ProviderScore| (s.hits, s.comparable, s.score, s.completeness, s.observations);
        for (i, &moved) in perm.iter().enumerate() {
            prop_assert_eq!(
                d1.scores.get(&label(i)).map(tally),
                d2.scores.get(&label(moved)).map(tally)
            );
        }

        let top = |d: &Decision| d.chosen_score().map(|s| (s.score, s.completeness));
        prop_assert_eq!(top(&d1), top(&d2));
        let runner_up = d1
            .ranking
            .get(1)
            .and_then(|p| d1.scores.get(p))
            .map(|s| (s.score, s.completeness));
        if runner_up.is_none() || runner_up != top(&d1) {
            prop_assert_eq!(&d1.final_payload, &d2.final_payload);
        }
    }

    /// The ranking comparator is a total order: antisymmetric on distinct names.
    #[test]
    fn rank_order_is_antisymmetric(
        sa in 0.0..1.0_f64, sb in 0.0..1.0_f64,
        ca in 0.0..1.0_f64, cb in 0.0..1.0_f64,
        ra in 0usize..4, rb in 0usize..4,
    ) {
        let mk = |name: &str, score: f64, completeness: f64, rank: usize| ProviderScore {
            provider: name.into(),
            hits: 0,
            comparable: 0,
            score,
            completeness,
            priority_rank: rank,
            observations: 1,
            pairs: 0,
        };
        let a = mk("a", sa, ca, ra);
        let b = mk("b", sb, cb, rb);
        prop_assert_eq!(rank_order(&a, &b), rank_order(&b, &a).reverse());
        prop_assert_ne!(rank_order(&a, &b), std::cmp::Ordering::Equal);
    }
}

// ── 4. Idempotence ───────────────────────────────────────────────────

proptest! {
    /// Same input, same decision apart from the timestamp.
    #[test]
    fn evaluation_is_idempotent(providers in arb_provider_values()) {
        prop_assume!(providers.iter().any(|row| row.iter().any(Option::is_some)));
        let config = config();
        let request = config.request("SPY", RequestKind::Indicators, None);
        let payloads: BTreeMap<ProviderId, ProviderPayload> = providers
            .iter()
            .enumerate()
            .map(|(i, row)| (ProviderId::new(format!("p{i}")), snapshot_payload(row)))
            .collect();

        let first = decide(&config, &request, payloads.clone(), Utc::now()).unwrap();
        let second = decide(&config, &request, payloads, Utc::now()).unwrap();
        prop_assert!(first.same_outcome(&second));
    }
}
