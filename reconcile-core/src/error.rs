//! Errors surfaced by a reconciliation run.
//!
//! Only the "nothing usable" case is an error. An unavailable provider is an
//! `Empty` payload, and a pair with nothing to compare is a degenerate
//! `PairAgreement`: both are data, not failures.

use thiserror::Error;

/// Errors from reconciliation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReconcileError {
    #[error("no data available for {request}: none of {providers} provider(s) returned a usable record")]
    NoDataAvailable { request: String, providers: usize },
}
