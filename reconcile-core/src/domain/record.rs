//! CanonicalRecord: one provider's normalized answer to one request.
//!
//! Invariants:
//! - at most one observation per date (enforced by the `BTreeMap` key)
//! - every value is either a finite number or explicitly absent (`None`)

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::ids::ComparisonKey;

/// Date of an observation, or the `latest` marker used by snapshot requests.
///
/// Serialized as `YYYY-MM-DD` or `latest` so it can key a JSON object.
/// Dated observations sort before `Latest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ObservationDate {
    Date(NaiveDate),
    Latest,
}

impl fmt::Display for ObservationDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObservationDate::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            ObservationDate::Latest => f.write_str("latest"),
        }
    }
}

impl FromStr for ObservationDate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("latest") {
            return Ok(ObservationDate::Latest);
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(ObservationDate::Date)
            .map_err(|e| format!("invalid observation date '{s}': {e}"))
    }
}

impl From<ObservationDate> for String {
    fn from(date: ObservationDate) -> Self {
        date.to_string()
    }
}

impl TryFrom<String> for ObservationDate {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Metric values of a single observation.
pub type Observation = BTreeMap<ComparisonKey, Option<f64>>;

/// Ordered mapping `date -> key -> value | absent`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalRecord {
    observations: BTreeMap<ObservationDate, Observation>,
}

impl CanonicalRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observation. Non-finite values are stored as absent.
    ///
    /// Returns `false` (and keeps the existing observation) if the date is
    /// already present: the first occurrence of a date wins.
    pub fn insert_observation(&mut self, date: ObservationDate, values: Observation) -> bool {
        if self.observations.contains_key(&date) {
            return false;
        }
        let sanitized = values
            .into_iter()
            .map(|(k, v)| (k, v.filter(|x| x.is_finite())))
            .collect();
        self.observations.insert(date, sanitized);
        true
    }

    /// Set a single value, creating the observation if needed.
    pub fn set(&mut self, date: ObservationDate, key: ComparisonKey, value: Option<f64>) {
        self.observations
            .entry(date)
            .or_default()
            .insert(key, value.filter(|x| x.is_finite()));
    }

    /// Value of `key` on `date`; `None` when missing or absent.
    pub fn value(&self, date: &ObservationDate, key: &ComparisonKey) -> Option<f64> {
        self.observations
            .get(date)
            .and_then(|obs| obs.get(key).copied().flatten())
    }

    pub fn observation(&self, date: &ObservationDate) -> Option<&Observation> {
        self.observations.get(date)
    }

    pub fn observations(&self) -> impl Iterator<Item = (&ObservationDate, &Observation)> {
        self.observations.iter()
    }

    pub fn dates(&self) -> impl Iterator<Item = &ObservationDate> {
        self.observations.keys()
    }

    /// Most recent observation (`Latest` sorts after every dated entry).
    pub fn latest(&self) -> Option<(&ObservationDate, &Observation)> {
        self.observations.iter().next_back()
    }

    /// Number of observations (dates).
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    /// Number of non-absent values across all observations.
    pub fn present_count(&self) -> usize {
        self.observations
            .values()
            .map(|obs| obs.values().filter(|v| v.is_some()).count())
            .sum()
    }

    /// A record is empty when it carries no non-absent value at all.
    ///
    /// Observations whose keys are all absent still count as empty: the
    /// provider contributed nothing usable.
    pub fn is_empty(&self) -> bool {
        self.present_count() == 0
    }

    /// Fraction of `keys` with a non-absent value on the most recent date.
    ///
    /// Returns 0.0 for an empty key set or an empty record.
    pub fn completeness(&self, keys: &[ComparisonKey]) -> f64 {
        if keys.is_empty() {
            return 0.0;
        }
        let Some((_, latest)) = self.latest() else {
            return 0.0;
        };
        let present = keys
            .iter()
            .filter(|k| latest.get(*k).copied().flatten().is_some())
            .count();
        present as f64 / keys.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> ObservationDate {
        ObservationDate::Date(NaiveDate::from_ymd_opt(y, m, day).unwrap())
    }

    #[test]
    fn first_observation_for_a_date_wins() {
        let mut rec = CanonicalRecord::new();
        let mut a = Observation::new();
        a.insert("close".into(), Some(100.0));
        let mut b = Observation::new();
        b.insert("close".into(), Some(101.0));

        assert!(rec.insert_observation(d(2024, 1, 2), a));
        assert!(!rec.insert_observation(d(2024, 1, 2), b));
        assert_eq!(rec.value(&d(2024, 1, 2), &"close".into()), Some(100.0));
        assert_eq!(rec.len(), 1);
    }

    #[test]
    fn non_finite_values_become_absent() {
        let mut rec = CanonicalRecord::new();
        rec.set(ObservationDate::Latest, "rsi".into(), Some(f64::NAN));
        rec.set(ObservationDate::Latest, "macd".into(), Some(f64::INFINITY));
        assert!(rec.is_empty());
        assert_eq!(rec.len(), 1);
    }

    #[test]
    fn completeness_uses_most_recent_date() {
        let keys: Vec<ComparisonKey> = vec!["open".into(), "close".into()];
        let mut rec = CanonicalRecord::new();
        rec.set(d(2024, 1, 2), "open".into(), Some(1.0));
        rec.set(d(2024, 1, 2), "close".into(), Some(1.0));
        rec.set(d(2024, 1, 3), "open".into(), Some(1.0));
        rec.set(d(2024, 1, 3), "close".into(), None);
        assert!((rec.completeness(&keys) - 0.5).abs() < 1e-12);
        assert_eq!(rec.completeness(&[]), 0.0);
        assert_eq!(CanonicalRecord::new().completeness(&keys), 0.0);
    }

    #[test]
    fn latest_marker_sorts_last() {
        assert!(d(2999, 12, 31) < ObservationDate::Latest);
    }

    #[test]
    fn serializes_dates_as_object_keys() {
        let mut rec = CanonicalRecord::new();
        rec.set(d(2024, 1, 2), "close".into(), Some(100.5));
        rec.set(d(2024, 1, 3), "close".into(), None);
        let json = serde_json::to_string(&rec).unwrap();
        assert_eq!(
            json,
            r#"{"2024-01-02":{"close":100.5},"2024-01-03":{"close":null}}"#
        );
        let back: CanonicalRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn observation_date_parsing() {
        assert_eq!("latest".parse::<ObservationDate>().unwrap(), ObservationDate::Latest);
        assert_eq!("2024-01-02".parse::<ObservationDate>().unwrap(), d(2024, 1, 2));
        assert!("01/02/2024".parse::<ObservationDate>().is_err());
    }
}
