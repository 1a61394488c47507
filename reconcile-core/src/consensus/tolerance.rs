//! Per-key agreement tolerances.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::ComparisonKey;

/// Absolute and relative tolerance for one key.
///
/// Two values agree when `|a - b| <= max(abs, rel * max(|a|, |b|, epsilon))`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToleranceSpec {
    pub abs: f64,
    #[serde(default)]
    pub rel: f64,
}

impl ToleranceSpec {
    pub const fn new(abs: f64, rel: f64) -> Self {
        Self { abs, rel }
    }

    /// Exact match only.
    pub const fn exact() -> Self {
        Self { abs: 0.0, rel: 0.0 }
    }

    /// Inclusive agreement test. `epsilon` keeps the relative bound from
    /// collapsing when both values are zero.
    pub fn within(&self, a: f64, b: f64, epsilon: f64) -> bool {
        let scale = a.abs().max(b.abs()).max(epsilon);
        let bound = self.abs.max(self.rel * scale);
        (a - b).abs() <= bound
    }

    pub fn is_valid(&self) -> bool {
        self.abs.is_finite() && self.rel.is_finite() && self.abs >= 0.0 && self.rel >= 0.0
    }
}

impl Default for ToleranceSpec {
    fn default() -> Self {
        Self::exact()
    }
}

/// Tolerances for a key set, with a fallback for unlisted keys.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ToleranceTable {
    #[serde(default)]
    pub default: ToleranceSpec,
    #[serde(default)]
    pub per_key: BTreeMap<ComparisonKey, ToleranceSpec>,
}

impl ToleranceTable {
    pub fn new(default: ToleranceSpec) -> Self {
        Self {
            default,
            per_key: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<ComparisonKey>, spec: ToleranceSpec) -> Self {
        self.per_key.insert(key.into(), spec);
        self
    }

    pub fn get(&self, key: &ComparisonKey) -> ToleranceSpec {
        self.per_key.get(key).copied().unwrap_or(self.default)
    }
}
