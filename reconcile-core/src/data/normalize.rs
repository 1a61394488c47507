//! Normalizer: provider payload → `CanonicalRecord`.
//!
//! Steps:
//! 1. Map provider field names to canonical keys through alias tables
//! 2. Coerce values to finite numbers or explicit absence
//! 3. Time-series requests: keep only dates inside the window
//! 4. Snapshot requests: keep only the most recent observation, keyed `latest`
//!
//! A payload that cannot be parsed normalizes to an empty record. A provider
//! contributing nothing is an expected condition, not an error.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::payload::{ProviderPayload, RawRow};
use crate::domain::{
    CanonicalRecord, ComparisonKey, Observation, ObservationDate, ProviderId, RequestIdentity,
};

/// Provider-specific field names for canonical keys, tried in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AliasTable {
    aliases: BTreeMap<ComparisonKey, Vec<String>>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert; replaces any aliases already set for `key`.
    pub fn with<I, S>(mut self, key: impl Into<ComparisonKey>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases
            .insert(key.into(), names.into_iter().map(Into::into).collect());
        self
    }

    pub fn aliases_for(&self, key: &ComparisonKey) -> &[String] {
        self.aliases.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    /// Names every provider is assumed to possibly use.
    ///
    /// Covers the common indicator vocabulary and capitalized OHLCV headers.
    pub fn builtin() -> Self {
        Self::new()
            .with("close_50_sma", ["SMA50", "sma50", "MA50", "ma50"])
            .with("close_200_sma", ["SMA200", "sma200", "MA200", "ma200"])
            .with("close_10_ema", ["EMA10", "ema10"])
            .with("macd", ["MACD.macd", "MACD", "macd_line"])
            .with("macds", ["MACD.signal", "MACDSignal", "macd_signal", "signal"])
            .with("macdh", ["MACD.hist", "MACDHistogram", "macd_hist", "histogram"])
            .with("rsi", ["RSI", "RSI[14]", "rsi14"])
            .with("boll", ["BB.middle", "BBasis", "BOLL_MIDDLE", "BOLL", "middle_band"])
            .with("boll_ub", ["BB.upper", "BBUpper", "BOLL_UPPER", "upper_band"])
            .with("boll_lb", ["BB.lower", "BBLower", "BOLL_LOWER", "lower_band"])
            .with("atr", ["ATR", "ATR[14]"])
            .with("vwma", ["VWMA", "VWMA20"])
            .with("open", ["Open", "OPEN", "1. open", "o"])
            .with("high", ["High", "HIGH", "2. high", "h"])
            .with("low", ["Low", "LOW", "3. low", "l"])
            .with("close", ["Close", "CLOSE", "4. close", "c"])
            .with("volume", ["Volume", "VOLUME", "5. volume", "v"])
    }
}

/// Converts provider payloads into canonical records.
pub struct Normalizer<'a> {
    provider_aliases: &'a BTreeMap<ProviderId, AliasTable>,
    builtin: AliasTable,
}

impl<'a> Normalizer<'a> {
    pub fn new(provider_aliases: &'a BTreeMap<ProviderId, AliasTable>) -> Self {
        Self {
            provider_aliases,
            builtin: AliasTable::builtin(),
        }
    }

    /// Normalize one provider's payload for `request`.
    ///
    /// Never fails: unparseable payloads produce an empty record.
    pub fn normalize(
        &self,
        provider: &ProviderId,
        payload: &ProviderPayload,
        request: &RequestIdentity,
    ) -> CanonicalRecord {
        let record = match payload {
            ProviderPayload::Empty { reason } => {
                tracing::debug!(
                    provider = %provider,
                    reason = reason.as_deref().unwrap_or("unspecified"),
                    "provider reported no data"
                );
                CanonicalRecord::new()
            }
            ProviderPayload::TimeSeries { rows } => self.record_from_rows(provider, rows, request),
            ProviderPayload::Csv { text } => match parse_csv_rows(text) {
                Ok(rows) => self.record_from_rows(provider, &rows, request),
                Err(e) => {
                    tracing::warn!(provider = %provider, error = %e, "unparseable CSV payload");
                    CanonicalRecord::new()
                }
            },
            ProviderPayload::Snapshot { as_of, values } => {
                self.record_from_snapshot(provider, as_of.as_deref(), values, request)
            }
        };

        if record.is_empty() && !payload.is_no_data() {
            tracing::warn!(
                provider = %provider,
                shape = payload.shape(),
                "payload normalized to an empty record"
            );
        }
        record
    }

    fn record_from_rows(
        &self,
        provider: &ProviderId,
        rows: &[RawRow],
        request: &RequestIdentity,
    ) -> CanonicalRecord {
        let mut dated = CanonicalRecord::new();
        for row in rows {
            let Some(date) = parse_date(&row.date) else {
                tracing::debug!(provider = %provider, date = %row.date, "skipping row with bad date");
                continue;
            };
            if let Some(window) = request.window {
                if !window.contains(date) {
                    continue;
                }
            }
            let obs = self.observation(provider, &row.fields, &request.keys);
            dated.insert_observation(ObservationDate::Date(date), obs);
        }

        if !request.kind.is_snapshot() {
            return dated;
        }

        let mut latest = CanonicalRecord::new();
        if let Some((_, obs)) = dated.latest() {
            latest.insert_observation(ObservationDate::Latest, obs.clone());
        }
        latest
    }

    fn record_from_snapshot(
        &self,
        provider: &ProviderId,
        as_of: Option<&str>,
        values: &BTreeMap<String, Value>,
        request: &RequestIdentity,
    ) -> CanonicalRecord {
        let date = as_of.and_then(parse_date);
        let mut record = CanonicalRecord::new();

        if let (Some(window), Some(d)) = (request.window, date) {
            if !window.contains(d) {
                return record;
            }
        }

        let obs = self.observation(provider, values, &request.keys);
        if request.kind.is_snapshot() {
            record.insert_observation(ObservationDate::Latest, obs);
        } else if let Some(d) = date {
            record.insert_observation(ObservationDate::Date(d), obs);
        } else {
            tracing::debug!(provider = %provider, "undated snapshot cannot answer a time-series request");
        }
        record
    }

    fn observation(
        &self,
        provider: &ProviderId,
        fields: &BTreeMap<String, Value>,
        keys: &[ComparisonKey],
    ) -> Observation {
        keys.iter()
            .map(|key| {
                let value = self.resolve(provider, fields, key).and_then(coerce_value);
                (key.clone(), value)
            })
            .collect()
    }

    /// Find the field carrying `key`: canonical name, provider aliases,
    /// builtin aliases, then a case-insensitive canonical match.
    fn resolve<'v>(
        &self,
        provider: &ProviderId,
        fields: &'v BTreeMap<String, Value>,
        key: &ComparisonKey,
    ) -> Option<&'v Value> {
        if let Some(v) = fields.get(key.as_str()) {
            return Some(v);
        }
        let provider_names = self
            .provider_aliases
            .get(provider)
            .map(|t| t.aliases_for(key))
            .unwrap_or(&[]);
        for name in provider_names.iter().chain(self.builtin.aliases_for(key)) {
            if let Some(v) = fields.get(name) {
                return Some(v);
            }
        }
        fields
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key.as_str()))
            .map(|(_, v)| v)
    }
}

/// Coerce a loosely-typed value to a finite number.
///
/// Placeholders (`N/A`, `-`, `nan`, empty), booleans, nulls and non-finite
/// numbers are absent.
pub fn coerce_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|x| x.is_finite()),
        Value::String(s) => {
            let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
            match cleaned.to_lowercase().as_str() {
                "" | "n/a" | "na" | "-" | "–" | "none" | "null" | "nan" => None,
                _ => cleaned.parse::<f64>().ok().filter(|x| x.is_finite()),
            }
        }
        _ => None,
    }
}

/// Parse `YYYY-MM-DD`, or a timestamp whose first ten characters are one.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let head = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(head, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(head, "%Y/%m/%d"))
        .ok()
}

const DATE_COLUMNS: [&str; 4] = ["date", "datetime", "timestamp", "time"];

/// Parse delimited text into rows. `#` lines are comments (provider headers).
///
/// The date column is the first header named like a date, else column 0.
fn parse_csv_rows(text: &str) -> Result<Vec<RawRow>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    let date_idx = headers
        .iter()
        .position(|h| DATE_COLUMNS.iter().any(|d| h.eq_ignore_ascii_case(d)))
        .unwrap_or(0);

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let Some(date) = record.get(date_idx) else {
            continue;
        };
        let fields = headers
            .iter()
            .zip(record.iter())
            .enumerate()
            .filter(|(i, _)| *i != date_idx)
            .map(|(_, (name, cell))| (name.to_string(), Value::String(cell.to_string())))
            .collect();
        rows.push(RawRow {
            date: date.to_string(),
            fields,
        });
    }
    Ok(rows)
}
