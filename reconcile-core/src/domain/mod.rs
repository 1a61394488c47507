//! Domain types shared by every reconciliation stage.

pub mod decision;
pub mod ids;
pub mod record;
pub mod request;
pub mod score;

pub use decision::{Decision, SCHEMA_VERSION};
pub use ids::{ComparisonKey, ProviderId, RequestFingerprint};
pub use record::{CanonicalRecord, Observation, ObservationDate};
pub use request::{RequestIdentity, RequestKind, TimeWindow};
pub use score::{KeyTally, PairAgreement, ProviderScore};
