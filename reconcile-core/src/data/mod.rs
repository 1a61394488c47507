//! Provider payloads and their normalization into canonical records.

pub mod normalize;
pub mod payload;

pub use normalize::{coerce_value, parse_date, AliasTable, Normalizer};
pub use payload::{ProviderPayload, RawRow};
