//! Request identity: what was asked of every provider in one reconciliation run.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ids::{ComparisonKey, RequestFingerprint};

/// Metric family of a request.
///
/// `Prices` is a time-series request; `Indicators` and `Fundamentals` are
/// point-in-time snapshots. The families share one comparison algorithm and
/// differ only in their configured key set and tolerance table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Prices,
    Indicators,
    Fundamentals,
}

impl RequestKind {
    pub const ALL: [RequestKind; 3] = [
        RequestKind::Prices,
        RequestKind::Indicators,
        RequestKind::Fundamentals,
    ];

    /// True for requests that keep only the most recent observation.
    pub fn is_snapshot(self) -> bool {
        !matches!(self, RequestKind::Prices)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequestKind::Prices => "prices",
            RequestKind::Indicators => "indicators",
            RequestKind::Fundamentals => "fundamentals",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "prices" | "price" | "ohlcv" => Ok(RequestKind::Prices),
            "indicators" | "indicator" => Ok(RequestKind::Indicators),
            "fundamentals" | "fundamental" => Ok(RequestKind::Fundamentals),
            other => Err(format!("unknown request kind: {other}")),
        }
    }
}

/// Inclusive date window `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TimeWindow {
    /// Build a window, swapping the bounds if they are given in reverse.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self { start: end, end: start }
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// The logical request every provider answered: symbol, metric set, window.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestIdentity {
    pub symbol: String,
    pub kind: RequestKind,
    pub keys: Vec<ComparisonKey>,
    pub window: Option<TimeWindow>,
}

impl RequestIdentity {
    /// Create a request. The symbol is upper-cased and the key list is
    /// de-duplicated, keeping first occurrences.
    pub fn new(
        symbol: impl AsRef<str>,
        kind: RequestKind,
        keys: Vec<ComparisonKey>,
        window: Option<TimeWindow>,
    ) -> Self {
        let mut unique: Vec<ComparisonKey> = Vec::with_capacity(keys.len());
        for key in keys {
            if !unique.contains(&key) {
                unique.push(key);
            }
        }
        Self {
            symbol: symbol.as_ref().trim().to_uppercase(),
            kind,
            keys: unique,
            window,
        }
    }

    /// Stable identity hash, used to key the "latest" decision.
    ///
    /// Key order matters: the same keys in a different order are a different
    /// request, because the chosen payload is reported in request order.
    pub fn fingerprint(&self) -> RequestFingerprint {
        let canonical = serde_json::json!({
            "symbol": self.symbol,
            "kind": self.kind.as_str(),
            "keys": self.keys.iter().map(|k| k.as_str()).collect::<Vec<_>>(),
            "start": self.window.map(|w| w.start.to_string()),
            "end": self.window.map(|w| w.end.to_string()),
        });
        RequestFingerprint::from_bytes(canonical.to_string().as_bytes())
    }
}

impl fmt::Display for RequestIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.symbol, self.kind)?;
        if let Some(w) = self.window {
            write!(f, " {}..{}", w.start, w.end)?;
        }
        Ok(())
    }
}
