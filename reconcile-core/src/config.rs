//! Engine configuration: key sets, tolerance tables, priority and aliases.
//!
//! Passed explicitly to every stage; there is no global configuration. Loaded
//! from TOML with omitted sections filled from [`EngineConfig::default`], then
//! validated.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::consensus::score::priority_rank;
use crate::consensus::tolerance::{ToleranceSpec, ToleranceTable};
use crate::data::normalize::AliasTable;
use crate::domain::{ComparisonKey, ProviderId, RequestIdentity, RequestKind, TimeWindow};

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("epsilon must be finite and > 0, got {0}")]
    InvalidEpsilon(f64),
    #[error("profile {kind} has no comparison keys")]
    EmptyKeySet { kind: RequestKind },
    #[error("profile {kind} lists key {key} more than once")]
    DuplicateKey { kind: RequestKind, key: ComparisonKey },
    #[error("profile {kind}: tolerance for {key} must be finite and >= 0")]
    InvalidTolerance { kind: RequestKind, key: String },
    #[error("provider {0} appears more than once in the priority list")]
    DuplicatePriority(ProviderId),
}

/// Key set and tolerances for one request kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub keys: Vec<ComparisonKey>,
    #[serde(default)]
    pub tolerances: ToleranceTable,
}

impl Profile {
    pub fn new(keys: &[&str], tolerances: ToleranceTable) -> Self {
        Self {
            keys: keys.iter().map(|k| ComparisonKey::from(*k)).collect(),
            tolerances,
        }
    }

    /// Daily OHLCV bars.
    pub fn default_prices() -> Self {
        let ohlc = ToleranceSpec::new(0.01, 0.0);
        Self::new(
            &["open", "high", "low", "close", "volume"],
            ToleranceTable::new(ohlc).with("volume", ToleranceSpec::new(0.0, 0.01)),
        )
    }

    /// Technical indicator snapshot.
    pub fn default_indicators() -> Self {
        Self::new(
            &[
                "close_50_sma",
                "close_200_sma",
                "close_10_ema",
                "macd",
                "rsi",
                "boll_ub",
                "boll_lb",
            ],
            ToleranceTable::new(ToleranceSpec::exact())
                .with("rsi", ToleranceSpec::new(0.25, 0.0))
                .with("macd", ToleranceSpec::new(0.005, 0.0))
                .with("close_10_ema", ToleranceSpec::new(0.03, 6e-4))
                .with("close_50_sma", ToleranceSpec::new(0.04, 6e-4))
                .with("close_200_sma", ToleranceSpec::new(0.06, 6e-4))
                .with("boll_ub", ToleranceSpec::new(0.06, 7e-4))
                .with("boll_lb", ToleranceSpec::new(0.06, 7e-4)),
        )
    }

    /// Fundamental ratio snapshot.
    pub fn default_fundamentals() -> Self {
        Self::new(
            &[
                "market_cap",
                "pe_ratio",
                "eps",
                "price_to_book",
                "dividend_yield",
            ],
            ToleranceTable::new(ToleranceSpec::new(0.0, 0.02))
                .with("dividend_yield", ToleranceSpec::new(0.0005, 0.02)),
        )
    }
}

/// One profile per request kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profiles {
    #[serde(default = "Profile::default_prices")]
    pub prices: Profile,
    #[serde(default = "Profile::default_indicators")]
    pub indicators: Profile,
    #[serde(default = "Profile::default_fundamentals")]
    pub fundamentals: Profile,
}

impl Default for Profiles {
    fn default() -> Self {
        Self {
            prices: Profile::default_prices(),
            indicators: Profile::default_indicators(),
            fundamentals: Profile::default_fundamentals(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Floor for the relative-tolerance scale, so two zeros can agree.
    pub epsilon: f64,
    /// Tie-break order for providers; earlier wins.
    pub priority: Vec<ProviderId>,
    pub profiles: Profiles,
    /// Per-provider field names, consulted before the built-in aliases.
    pub aliases: BTreeMap<ProviderId, AliasTable>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            epsilon: 1e-12,
            priority: vec!["tradingview".into(), "yfinance".into(), "twelvedata".into()],
            profiles: Profiles::default(),
            aliases: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    /// Load and validate a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.epsilon.is_finite() || self.epsilon <= 0.0 {
            return Err(ConfigError::InvalidEpsilon(self.epsilon));
        }

        for kind in RequestKind::ALL {
            let profile = self.profile(kind);
            if profile.keys.is_empty() {
                return Err(ConfigError::EmptyKeySet { kind });
            }
            let mut seen = BTreeSet::new();
            for key in &profile.keys {
                if !seen.insert(key) {
                    return Err(ConfigError::DuplicateKey {
                        kind,
                        key: key.clone(),
                    });
                }
            }
            if !profile.tolerances.default.is_valid() {
                return Err(ConfigError::InvalidTolerance {
                    kind,
                    key: "default".into(),
                });
            }
            if let Some((key, _)) = profile
                .tolerances
                .per_key
                .iter()
                .find(|(_, spec)| !spec.is_valid())
            {
                return Err(ConfigError::InvalidTolerance {
                    kind,
                    key: key.to_string(),
                });
            }
        }

        let mut seen = BTreeSet::new();
        for provider in &self.priority {
            if !seen.insert(provider) {
                return Err(ConfigError::DuplicatePriority(provider.clone()));
            }
        }
        Ok(())
    }

    pub fn profile(&self, kind: RequestKind) -> &Profile {
        match kind {
            RequestKind::Prices => &self.profiles.prices,
            RequestKind::Indicators => &self.profiles.indicators,
            RequestKind::Fundamentals => &self.profiles.fundamentals,
        }
    }

    /// Request for `symbol` using the configured key set of `kind`.
    pub fn request(
        &self,
        symbol: impl AsRef<str>,
        kind: RequestKind,
        window: Option<TimeWindow>,
    ) -> RequestIdentity {
        RequestIdentity::new(symbol, kind, self.profile(kind).keys.clone(), window)
    }

    pub fn priority_rank(&self, provider: &ProviderId) -> usize {
        priority_rank(&self.priority, provider)
    }
}
