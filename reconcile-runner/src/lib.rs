//! Reconcile Runner: provider fan-out, pipeline, decision recording, audit.
//!
//! This crate builds on `reconcile-core` to provide:
//! - Provider adapters (file-backed and seeded synthetic)
//! - Concurrent payload collection with failures folded into `Empty` payloads
//! - The `Reconciler` pipeline with non-fatal persistence warnings
//! - JSONL audit log and per-request "latest" records
//! - Audit replay and Markdown reports

pub mod adapter;
pub mod pipeline;
pub mod recorder;
pub mod replay;
pub mod report;
pub mod synthetic;

pub use adapter::{AdapterError, FileAdapter, ProviderAdapter};
pub use pipeline::{collect_payloads, ReconcileOutcome, Reconciler};
pub use recorder::{
    DecisionRecorder, JsonlRecorder, MemoryRecorder, PersistenceError, PersistenceWarning,
};
pub use replay::{verify, verify_all, ReplayReport};
pub use report::render_markdown;
pub use synthetic::{Outage, SyntheticAdapter, SyntheticProfile};
