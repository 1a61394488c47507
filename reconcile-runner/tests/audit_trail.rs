//! End-to-end runs against file-backed providers and an on-disk recorder.
//!
//! Fixtures are captured provider responses for AAPL around 2024-11-19, one
//! file per provider, in each provider's own field naming.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use reconcile_core::domain::{ObservationDate, ProviderId, RequestIdentity, RequestKind, TimeWindow};
use reconcile_core::{EngineConfig, ReconcileError};
use reconcile_runner::{
    collect_payloads, verify_all, DecisionRecorder, FileAdapter, JsonlRecorder, ProviderAdapter,
    Reconciler, SyntheticAdapter,
};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn file_adapters(kind: &str) -> Vec<Box<dyn ProviderAdapter>> {
    let ext = |p: &str| if p == "yfinance" && kind == "prices" { "csv" } else { "json" };
    ["tradingview", "yfinance", "twelvedata"]
        .into_iter()
        .map(|p| {
            Box::new(FileAdapter::new(
                p,
                fixture(&format!("{p}_aapl_{kind}.{}", ext(p))),
            )) as Box<dyn ProviderAdapter>
        })
        .collect()
}

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn prices_request(config: &EngineConfig) -> RequestIdentity {
    config.request(
        "aapl",
        RequestKind::Prices,
        Some(TimeWindow::new(d(2024, 11, 18), d(2024, 11, 20))),
    )
}

// ── Indicator snapshot ──

#[test]
fn outlier_provider_loses_on_indicator_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let reconciler = Reconciler::new(EngineConfig::default(), JsonlRecorder::new(dir.path()));
    let request = reconciler
        .config()
        .request("AAPL", RequestKind::Indicators, None);

    let outcome = reconciler
        .fetch_and_reconcile(&file_adapters("indicators"), &request)
        .unwrap();
    assert!(outcome.is_persisted());

    let decision = &outcome.decision;
    // tradingview and yfinance agree on every key; twelvedata agrees on none.
    // The tie between the two goes to configured priority.
    assert_eq!(decision.chosen_source, ProviderId::from("tradingview"));
    assert_eq!(decision.ranking.last(), Some(&ProviderId::from("twelvedata")));

    let td = &decision.scores[&ProviderId::from("twelvedata")];
    assert_eq!(td.hits, 0);
    assert_eq!(td.score, 0.0);
    let tv = &decision.scores[&ProviderId::from("tradingview")];
    let yf = &decision.scores[&ProviderId::from("yfinance")];
    assert_eq!(tv.score, yf.score);
    assert_eq!(tv.completeness, 1.0);

    assert_eq!(
        decision
            .final_payload
            .value(&ObservationDate::Latest, &"rsi".into()),
        Some(53.42)
    );
}

// ── Windowed prices ──

#[test]
fn complete_provider_wins_when_everyone_agrees() {
    let dir = tempfile::tempdir().unwrap();
    let reconciler = Reconciler::new(EngineConfig::default(), JsonlRecorder::new(dir.path()));
    let request = prices_request(reconciler.config());

    let outcome = reconciler
        .fetch_and_reconcile(&file_adapters("prices"), &request)
        .unwrap();
    let decision = &outcome.decision;

    for score in decision.scores.values() {
        assert_eq!(score.score, 1.0, "{score:?}");
        assert_eq!(score.observations, 3, "window drops 2024-11-15");
    }
    // tradingview is missing the last volume, so it ranks below both complete
    // providers despite leading the priority list.
    assert!(decision.scores[&ProviderId::from("tradingview")].completeness < 1.0);
    assert_eq!(
        decision.ranking,
        vec![
            ProviderId::from("yfinance"),
            ProviderId::from("twelvedata"),
            ProviderId::from("tradingview"),
        ]
    );

    let last = ObservationDate::Date(d(2024, 11, 20));
    assert_eq!(decision.final_payload.value(&last, &"close".into()), Some(229.0));
    assert_eq!(
        decision.final_payload.value(&last, &"volume".into()),
        Some(35_169_600.0)
    );
}

// ── Latest and audit ──

#[test]
fn latest_tracks_most_recent_run_and_audit_keeps_all() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = JsonlRecorder::new(dir.path());
    let reconciler = Reconciler::new(EngineConfig::default(), recorder);
    let config = reconciler.config().clone();
    let prices = prices_request(&config);
    let indicators = config.request("AAPL", RequestKind::Indicators, None);

    let first = reconciler
        .fetch_and_reconcile(&file_adapters("prices"), &prices)
        .unwrap();
    let second = reconciler
        .fetch_and_reconcile(&file_adapters("indicators"), &indicators)
        .unwrap();
    let third = reconciler
        .fetch_and_reconcile(&file_adapters("prices"), &prices)
        .unwrap();

    let latest = reconciler.latest(&prices).unwrap().unwrap();
    assert_eq!(latest, third.decision);
    let latest = reconciler.latest(&indicators).unwrap().unwrap();
    assert_eq!(latest, second.decision);

    let audit = reconciler.recorder().read_audit().unwrap();
    assert_eq!(audit.len(), 3);
    assert_eq!(audit[0], first.decision);
    assert_eq!(audit[2], third.decision);

    // No temp files left behind.
    let leftovers: Vec<_> = std::fs::read_dir(reconciler.recorder().latest_dir())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().is_some_and(|x| x == "tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn audit_replays_consistently() {
    let dir = tempfile::tempdir().unwrap();
    let reconciler = Reconciler::new(EngineConfig::default(), JsonlRecorder::new(dir.path()));
    let config = reconciler.config().clone();

    reconciler
        .fetch_and_reconcile(&file_adapters("prices"), &prices_request(&config))
        .unwrap();
    let synthetic: Vec<Box<dyn ProviderAdapter>> = SyntheticAdapter::demo_set(11)
        .into_iter()
        .map(|a| Box::new(a) as Box<dyn ProviderAdapter>)
        .collect();
    for kind in [RequestKind::Prices, RequestKind::Indicators, RequestKind::Fundamentals] {
        reconciler
            .fetch_and_reconcile(&synthetic, &config.request("MSFT", kind, None))
            .unwrap();
    }

    let audit = JsonlRecorder::new(dir.path()).read_audit().unwrap();
    assert_eq!(audit.len(), 4);
    let reports = verify_all(&audit, &config);
    assert!(reports.iter().all(|r| r.is_consistent()), "{reports:#?}");
}

#[test]
fn malformed_audit_lines_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let reconciler = Reconciler::new(EngineConfig::default(), JsonlRecorder::new(dir.path()));
    let request = prices_request(reconciler.config());
    reconciler
        .fetch_and_reconcile(&file_adapters("prices"), &request)
        .unwrap();

    let audit_path = reconciler.recorder().audit_path();
    let mut text = std::fs::read_to_string(&audit_path).unwrap();
    text.push_str("{\"truncated\": \n");
    std::fs::write(&audit_path, text).unwrap();
    reconciler
        .fetch_and_reconcile(&file_adapters("prices"), &request)
        .unwrap();

    assert_eq!(reconciler.recorder().read_audit().unwrap().len(), 2);
}

// ── Failure paths ──

#[test]
fn no_data_leaves_the_store_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let reconciler = Reconciler::new(EngineConfig::default(), JsonlRecorder::new(dir.path()));
    let request = reconciler
        .config()
        .request("ZZZZ", RequestKind::Indicators, None);
    let missing: Vec<Box<dyn ProviderAdapter>> = ["tradingview", "yfinance"]
        .into_iter()
        .map(|p| {
            Box::new(FileAdapter::new(p, dir.path().join(format!("{p}.json"))))
                as Box<dyn ProviderAdapter>
        })
        .collect();

    let payloads = collect_payloads(&missing, &request);
    assert!(payloads.values().all(|p| p.is_no_data()));

    let err = reconciler.reconcile(&request, payloads).unwrap_err();
    assert!(matches!(err, ReconcileError::NoDataAvailable { providers: 2, .. }));
    assert!(reconciler.latest(&request).unwrap().is_none());
    assert!(!reconciler.recorder().audit_path().exists());
    assert!(!reconciler.recorder().latest_dir().exists());
}

#[test]
fn unwritable_store_yields_a_warning_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let blocked = dir.path().join("store");
    std::fs::write(&blocked, "not a directory").unwrap();

    let reconciler = Reconciler::new(EngineConfig::default(), JsonlRecorder::new(&blocked));
    let request = prices_request(reconciler.config());
    let outcome = reconciler
        .fetch_and_reconcile(&file_adapters("prices"), &request)
        .unwrap();

    assert!(!outcome.is_persisted());
    let warning = outcome.persistence_warning.as_ref().unwrap();
    assert_eq!(warning.fingerprint, request.fingerprint());
    assert_eq!(outcome.decision.chosen_source, ProviderId::from("yfinance"));
}

#[test]
fn blocked_latest_file_leaves_no_audit_entry() {
    let dir = tempfile::tempdir().unwrap();
    let reconciler = Reconciler::new(EngineConfig::default(), JsonlRecorder::new(dir.path()));
    let request = prices_request(reconciler.config());
    let target = reconciler.recorder().latest_path(&request.fingerprint());
    std::fs::create_dir_all(target.join("occupied")).unwrap();

    let outcome = reconciler
        .fetch_and_reconcile(&file_adapters("prices"), &request)
        .unwrap();

    assert!(!outcome.is_persisted());
    assert!(reconciler.recorder().read_audit().unwrap().is_empty());
    assert!(target.is_dir());
}

#[test]
fn run_after_torn_audit_tail_is_still_replayable() {
    let dir = tempfile::tempdir().unwrap();
    let reconciler = Reconciler::new(EngineConfig::default(), JsonlRecorder::new(dir.path()));
    std::fs::write(
        reconciler.recorder().audit_path(),
        "{\"schema_version\":1,\"request\":",
    )
    .unwrap();
    let request = prices_request(reconciler.config());

    let outcome = reconciler
        .fetch_and_reconcile(&file_adapters("prices"), &request)
        .unwrap();
    assert!(outcome.is_persisted());

    let audit = reconciler.recorder().read_audit().unwrap();
    assert_eq!(audit, vec![outcome.decision]);
    assert!(verify_all(&audit, reconciler.config())[0].is_consistent());
}

// ── Concurrency ──

#[test]
fn concurrent_runs_for_one_request_all_land() {
    let dir = tempfile::tempdir().unwrap();
    let reconciler = Arc::new(Reconciler::new(
        EngineConfig::default(),
        JsonlRecorder::new(dir.path()),
    ));
    let request = prices_request(reconciler.config());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let reconciler = Arc::clone(&reconciler);
            let request = request.clone();
            std::thread::spawn(move || {
                reconciler
                    .fetch_and_reconcile(&file_adapters("prices"), &request)
                    .unwrap()
            })
        })
        .collect();
    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(outcomes.iter().all(|o| o.is_persisted()));

    let audit = reconciler.recorder().read_audit().unwrap();
    assert_eq!(audit.len(), 8);
    let latest = reconciler.latest(&request).unwrap().unwrap();
    assert!(audit.contains(&latest));
    assert!(outcomes.iter().all(|o| o.decision.same_outcome(&latest)));
}
