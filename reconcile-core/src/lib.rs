//! Reconcile Core: canonical records, tolerance comparison, consensus scoring.
//!
//! Several providers answer the same logical request with slightly different
//! numbers. This crate decides which answer to trust:
//! - Normalizer: provider payloads into canonical records
//! - Tolerance comparator: pairwise agreement per key and date
//! - Consensus scorer: agreement ratio per provider across all pairs
//! - Source selector: total ranking with completeness and priority tie-breaks
//!
//! Everything here is pure. Fetching providers and persisting decisions live in
//! `reconcile-runner`.

pub mod config;
pub mod consensus;
pub mod data;
pub mod domain;
pub mod error;
pub mod logging;

pub use config::{ConfigError, EngineConfig, Profile};
pub use consensus::{decide, evaluate, Evaluation};
pub use error::ReconcileError;

// Re-exported for `request_span!`.
#[doc(hidden)]
pub use tracing;
