//! Synthetic provider: deterministic seeded data for demos and tests.
//!
//! Every synthetic provider observes the same underlying "true" series for a
//! symbol (a random walk seeded from the symbol name) and then distorts it with
//! its own profile: a systematic bias, random noise, placeholder gaps and its
//! own field vocabulary. Same symbol, provider and seed, same payload.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use std::collections::BTreeMap;

use reconcile_core::data::{ProviderPayload, RawRow};
use reconcile_core::domain::{ComparisonKey, ProviderId, RequestIdentity, RequestKind};

use crate::adapter::{AdapterError, ProviderAdapter};

/// Lookback used to compute snapshot indicators.
const SNAPSHOT_HISTORY: usize = 260;
/// Rows served for a price request without a window.
const DEFAULT_PRICE_ROWS: usize = 30;

/// Simulated provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outage {
    Down,
    RateLimited,
}

/// How a synthetic provider distorts the true series.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SyntheticProfile {
    /// Relative offset applied to every value.
    pub bias: f64,
    /// Amplitude of relative per-value noise.
    pub noise: f64,
    /// Probability that a value is reported as `N/A`.
    pub missing: f64,
    /// Use vendor-style field names (`Close`, `SMA50`, `BB.upper`).
    pub vendor_names: bool,
    pub outage: Option<Outage>,
}

impl SyntheticProfile {
    pub fn accurate(noise: f64) -> Self {
        Self {
            noise,
            ..Default::default()
        }
    }

    pub fn with_bias(mut self, bias: f64) -> Self {
        self.bias = bias;
        self
    }

    pub fn with_missing(mut self, missing: f64) -> Self {
        self.missing = missing;
        self
    }

    pub fn with_vendor_names(mut self) -> Self {
        self.vendor_names = true;
        self
    }

    pub fn with_outage(mut self, outage: Outage) -> Self {
        self.outage = Some(outage);
        self
    }
}

/// Seeded synthetic provider.
#[derive(Debug, Clone)]
pub struct SyntheticAdapter {
    provider: ProviderId,
    profile: SyntheticProfile,
    seed: u64,
    anchor: NaiveDate,
}

impl SyntheticAdapter {
    pub fn new(provider: impl Into<ProviderId>, profile: SyntheticProfile, seed: u64) -> Self {
        Self {
            provider: provider.into(),
            profile,
            seed,
            anchor: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap_or(NaiveDate::MIN),
        }
    }

    /// Last date served when the request has no window.
    pub fn with_anchor(mut self, anchor: NaiveDate) -> Self {
        self.anchor = anchor;
        self
    }

    /// Two close-agreeing providers and one biased, gappy one.
    pub fn demo_set(seed: u64) -> Vec<SyntheticAdapter> {
        vec![
            SyntheticAdapter::new("tradingview", SyntheticProfile::accurate(1e-5), seed),
            SyntheticAdapter::new(
                "yfinance",
                SyntheticProfile::accurate(1.5e-5).with_vendor_names(),
                seed,
            ),
            SyntheticAdapter::new(
                "twelvedata",
                SyntheticProfile::accurate(5e-3)
                    .with_bias(0.015)
                    .with_missing(0.1),
                seed,
            ),
        ]
    }

    fn provider_rng(&self, request: &RequestIdentity) -> StdRng {
        let tag = format!(
            "{}|{}|{}|{}",
            request.symbol, self.provider, self.seed, request.kind
        );
        StdRng::from_seed(*blake3::hash(tag.as_bytes()).as_bytes())
    }

    fn distort(&self, rng: &mut StdRng, value: f64) -> Value {
        if rng.gen_bool(self.profile.missing.clamp(0.0, 1.0)) {
            return Value::String("N/A".into());
        }
        let jitter: f64 = rng.gen_range(-1.0..=1.0);
        let observed = value * (1.0 + self.profile.bias + self.profile.noise * jitter);
        serde_json::json!(observed)
    }

    fn field_name(&self, key: &ComparisonKey) -> String {
        if !self.profile.vendor_names {
            return key.to_string();
        }
        let vendor = match key.as_str() {
            "open" => "Open",
            "high" => "High",
            "low" => "Low",
            "close" => "Close",
            "volume" => "Volume",
            "close_50_sma" => "SMA50",
            "close_200_sma" => "SMA200",
            "close_10_ema" => "EMA10",
            "macd" => "MACD.macd",
            "rsi" => "RSI",
            "boll_ub" => "BB.upper",
            "boll_lb" => "BB.lower",
            other => other,
        };
        vendor.to_string()
    }

    fn observed_fields(
        &self,
        rng: &mut StdRng,
        truth: &BTreeMap<&'static str, f64>,
        keys: &[ComparisonKey],
    ) -> BTreeMap<String, Value> {
        keys.iter()
            .filter_map(|key| {
                let value = truth.get(key.as_str())?;
                Some((self.field_name(key), self.distort(rng, *value)))
            })
            .collect()
    }

    fn prices(&self, request: &RequestIdentity) -> ProviderPayload {
        let dates = match request.window {
            Some(w) => weekdays_between(w.start, w.end),
            None => weekdays_ending(self.anchor, DEFAULT_PRICE_ROWS),
        };
        let bars = truth_bars(&request.symbol, &dates);
        let mut rng = self.provider_rng(request);

        let rows = bars
            .iter()
            .map(|bar| {
                let truth = BTreeMap::from([
                    ("open", bar.open),
                    ("high", bar.high),
                    ("low", bar.low),
                    ("close", bar.close),
                    ("volume", bar.volume),
                ]);
                RawRow {
                    date: bar.date.format("%Y-%m-%d").to_string(),
                    fields: self.observed_fields(&mut rng, &truth, &request.keys),
                }
            })
            .collect();
        ProviderPayload::TimeSeries { rows }
    }

    fn snapshot(&self, request: &RequestIdentity) -> ProviderPayload {
        let end = request.window.map(|w| w.end).unwrap_or(self.anchor);
        let dates = weekdays_ending(end, SNAPSHOT_HISTORY);
        let bars = truth_bars(&request.symbol, &dates);
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();

        let truth = match request.kind {
            RequestKind::Fundamentals => truth_fundamentals(&request.symbol, &closes),
            _ => truth_indicators(&closes),
        };
        let mut rng = self.provider_rng(request);
        ProviderPayload::Snapshot {
            as_of: dates.last().map(|d| d.format("%Y-%m-%d").to_string()),
            values: self.observed_fields(&mut rng, &truth, &request.keys),
        }
    }
}

impl ProviderAdapter for SyntheticAdapter {
    fn provider(&self) -> &ProviderId {
        &self.provider
    }

    fn fetch(&self, request: &RequestIdentity) -> Result<ProviderPayload, AdapterError> {
        match self.profile.outage {
            Some(Outage::Down) => {
                return Err(AdapterError::Unreachable(format!(
                    "{} is not responding",
                    self.provider
                )))
            }
            Some(Outage::RateLimited) => {
                return Err(AdapterError::RateLimited {
                    retry_after_secs: 60,
                })
            }
            None => {}
        }

        Ok(match request.kind {
            RequestKind::Prices => self.prices(request),
            RequestKind::Indicators | RequestKind::Fundamentals => self.snapshot(request),
        })
    }
}

// ── True series ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct TruthBar {
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

fn is_weekday(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

fn weekdays_between(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut current = start;
    while current <= end {
        if is_weekday(current) {
            dates.push(current);
        }
        current += Duration::days(1);
    }
    dates
}

fn weekdays_ending(end: NaiveDate, count: usize) -> Vec<NaiveDate> {
    let mut dates = Vec::with_capacity(count);
    let mut current = end;
    while dates.len() < count {
        if is_weekday(current) {
            dates.push(current);
        }
        current -= Duration::days(1);
    }
    dates.reverse();
    dates
}

/// Random walk seeded from the symbol, so every provider sees the same truth.
fn truth_bars(symbol: &str, dates: &[NaiveDate]) -> Vec<TruthBar> {
    let seed: [u8; 32] = *blake3::hash(symbol.as_bytes()).as_bytes();
    let mut rng = StdRng::from_seed(seed);

    let mut price: f64 = rng.gen_range(20.0..400.0);
    dates
        .iter()
        .map(|&date| {
            let daily_return: f64 = rng.gen_range(-0.03..0.03);
            let open = price;
            let close = price * (1.0 + daily_return);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
            let volume = rng.gen_range(500_000..5_000_000u64) as f64;
            price = close;
            TruthBar {
                date,
                open,
                high,
                low,
                close,
                volume,
            }
        })
        .collect()
}

fn sma(closes: &[f64], n: usize) -> Option<f64> {
    if n == 0 || closes.len() < n {
        return None;
    }
    Some(closes[closes.len() - n..].iter().sum::<f64>() / n as f64)
}

fn ema(closes: &[f64], n: usize) -> Option<f64> {
    let seed = sma(&closes[..closes.len().min(n)], n)?;
    let k = 2.0 / (n as f64 + 1.0);
    Some(closes[n..].iter().fold(seed, |prev, c| c * k + prev * (1.0 - k)))
}

fn rsi(closes: &[f64], n: usize) -> Option<f64> {
    if closes.len() <= n {
        return None;
    }
    let (mut gains, mut losses) = (0.0, 0.0);
    for w in closes[closes.len() - n - 1..].windows(2) {
        let change = w[1] - w[0];
        if change >= 0.0 {
            gains += change;
        } else {
            losses -= change;
        }
    }
    if losses == 0.0 {
        return Some(100.0);
    }
    let rs = gains / losses;
    Some(100.0 - 100.0 / (1.0 + rs))
}

fn bollinger(closes: &[f64], n: usize, width: f64) -> Option<(f64, f64)> {
    let mid = sma(closes, n)?;
    let tail = &closes[closes.len() - n..];
    let var = tail.iter().map(|c| (c - mid).powi(2)).sum::<f64>() / n as f64;
    let sd = var.sqrt();
    Some((mid + width * sd, mid - width * sd))
}

fn truth_indicators(closes: &[f64]) -> BTreeMap<&'static str, f64> {
    let mut truth = BTreeMap::new();
    let mut put = |key: &'static str, value: Option<f64>| {
        if let Some(v) = value {
            truth.insert(key, v);
        }
    };
    put("close", closes.last().copied());
    put("close_50_sma", sma(closes, 50));
    put("close_200_sma", sma(closes, 200));
    put("close_10_ema", ema(closes, 10));
    put("macd", ema(closes, 12).zip(ema(closes, 26)).map(|(f, s)| f - s));
    put("rsi", rsi(closes, 14));
    let bands = bollinger(closes, 20, 2.0);
    put("boll_ub", bands.map(|b| b.0));
    put("boll_lb", bands.map(|b| b.1));
    truth
}

fn truth_fundamentals(symbol: &str, closes: &[f64]) -> BTreeMap<&'static str, f64> {
    let tag = format!("{symbol}|fundamentals");
    let mut rng = StdRng::from_seed(*blake3::hash(tag.as_bytes()).as_bytes());
    let price = closes.last().copied().unwrap_or(100.0);
    let eps: f64 = rng.gen_range(1.0..15.0);
    let shares: f64 = rng.gen_range(1e8..1e10);
    BTreeMap::from([
        ("market_cap", price * shares),
        ("pe_ratio", price / eps),
        ("eps", eps),
        ("price_to_book", rng.gen_range(1.0..20.0)),
        ("dividend_yield", rng.gen_range(0.0..0.04)),
    ])
}
