//! Raw provider payloads, as handed over by provider adapters.
//!
//! Payload shapes are loosely typed on purpose: field names are whatever the
//! provider calls them and values may be numbers, numeric strings or
//! placeholders. Only the normalizer looks inside; every later stage sees a
//! `CanonicalRecord`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One row of a tabular time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    /// `YYYY-MM-DD` or a timestamp starting with it.
    pub date: String,
    pub fields: BTreeMap<String, Value>,
}

/// What a provider adapter returned for a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderPayload {
    /// Dated rows of named values.
    TimeSeries { rows: Vec<RawRow> },
    /// A single set of named values, optionally stamped with its date.
    Snapshot {
        #[serde(default)]
        as_of: Option<String>,
        values: BTreeMap<String, Value>,
    },
    /// Delimited text with a header row and a date column.
    Csv { text: String },
    /// Explicit "no data" signal from the adapter.
    Empty {
        #[serde(default)]
        reason: Option<String>,
    },
}

impl ProviderPayload {
    pub fn empty(reason: impl Into<String>) -> Self {
        ProviderPayload::Empty {
            reason: Some(reason.into()),
        }
    }

    /// True only for the explicit `Empty` variant.
    ///
    /// Other variants may still normalize to an empty record.
    pub fn is_no_data(&self) -> bool {
        matches!(self, ProviderPayload::Empty { .. })
    }

    /// Short variant label for logs and reports.
    pub fn shape(&self) -> &'static str {
        match self {
            ProviderPayload::TimeSeries { .. } => "time_series",
            ProviderPayload::Snapshot { .. } => "snapshot",
            ProviderPayload::Csv { .. } => "csv",
            ProviderPayload::Empty { .. } => "empty",
        }
    }
}
