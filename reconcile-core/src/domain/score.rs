//! Agreement and score types produced by the consensus stages.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::ids::{ComparisonKey, ProviderId};

/// Hit/comparable counters for one key (or summed over keys).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyTally {
    pub hits: u64,
    pub comparable: u64,
}

impl KeyTally {
    /// `hits / comparable`, or 0.0 when nothing was comparable.
    pub fn ratio(&self) -> f64 {
        if self.comparable == 0 {
            0.0
        } else {
            self.hits as f64 / self.comparable as f64
        }
    }
}

/// Agreement between an unordered pair of providers.
///
/// `left < right` always holds, so a pair has a single canonical form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairAgreement {
    pub left: ProviderId,
    pub right: ProviderId,
    pub comparable: u64,
    pub hits: u64,
    pub per_key: BTreeMap<ComparisonKey, KeyTally>,
}

impl PairAgreement {
    pub fn new(a: ProviderId, b: ProviderId) -> Self {
        let (left, right) = if a <= b { (a, b) } else { (b, a) };
        Self {
            left,
            right,
            comparable: 0,
            hits: 0,
            per_key: BTreeMap::new(),
        }
    }

    /// `hits / comparable`; a pair with nothing comparable has ratio 0.0.
    pub fn ratio(&self) -> f64 {
        KeyTally {
            hits: self.hits,
            comparable: self.comparable,
        }
        .ratio()
    }

    /// Zero comparable samples: no agreement signal either way.
    pub fn is_degenerate(&self) -> bool {
        self.comparable == 0
    }

    pub fn involves(&self, provider: &ProviderId) -> bool {
        &self.left == provider || &self.right == provider
    }
}

/// Per-provider consensus score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderScore {
    pub provider: ProviderId,
    /// Within-tolerance hits summed over every pair involving this provider.
    pub hits: u64,
    /// Comparable samples summed over every pair involving this provider.
    pub comparable: u64,
    /// `hits / comparable` (0.0 if nothing comparable, 1.0 for a lone provider).
    pub score: f64,
    /// Requested keys present on the most recent date / requested keys.
    pub completeness: f64,
    /// Position in the caller's priority order; lower wins ties.
    pub priority_rank: usize,
    /// Number of dated observations in the provider's record.
    pub observations: usize,
    /// Number of pairwise comparisons the provider took part in.
    pub pairs: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_is_canonically_ordered() {
        let p = PairAgreement::new("yfinance".into(), "tradingview".into());
        assert_eq!(p.left.as_str(), "tradingview");
        assert_eq!(p.right.as_str(), "yfinance");
        assert!(p.involves(&"yfinance".into()));
        assert!(!p.involves(&"twelvedata".into()));
    }

    #[test]
    fn degenerate_pair_has_zero_ratio() {
        let p = PairAgreement::new("a".into(), "b".into());
        assert!(p.is_degenerate());
        assert_eq!(p.ratio(), 0.0);
    }

    #[test]
    fn tally_ratio() {
        let t = KeyTally { hits: 3, comparable: 4 };
        assert!((t.ratio() - 0.75).abs() < 1e-12);
    }
}
