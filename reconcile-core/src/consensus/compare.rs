//! Tolerance comparator: key-by-key, date-by-date agreement of two records.
//!
//! Only dates present in both records are compared. A date present in one
//! record only contributes nothing for either side: missing data is neither a
//! hit nor a penalty. The same holds for a key absent on either side.

use super::tolerance::ToleranceTable;
use crate::domain::{CanonicalRecord, ComparisonKey, KeyTally, PairAgreement, ProviderId};

/// Compares canonical records under a key set and tolerance table.
#[derive(Debug, Clone, Copy)]
pub struct ToleranceComparator<'a> {
    keys: &'a [ComparisonKey],
    tolerances: &'a ToleranceTable,
    epsilon: f64,
}

impl<'a> ToleranceComparator<'a> {
    pub fn new(keys: &'a [ComparisonKey], tolerances: &'a ToleranceTable, epsilon: f64) -> Self {
        Self {
            keys,
            tolerances,
            epsilon,
        }
    }

    pub fn keys(&self) -> &'a [ComparisonKey] {
        self.keys
    }

    /// Agreement of `a` (from `left`) and `b` (from `right`).
    ///
    /// The result is symmetric: swapping the arguments yields the same pair.
    pub fn compare(
        &self,
        left: &ProviderId,
        a: &CanonicalRecord,
        right: &ProviderId,
        b: &CanonicalRecord,
    ) -> PairAgreement {
        let mut pair = PairAgreement::new(left.clone(), right.clone());
        for key in self.keys {
            pair.per_key.insert(key.clone(), KeyTally::default());
        }

        for (date, obs_a) in a.observations() {
            let Some(obs_b) = b.observation(date) else {
                continue;
            };
            for key in self.keys {
                let (Some(va), Some(vb)) = (
                    obs_a.get(key).copied().flatten(),
                    obs_b.get(key).copied().flatten(),
                ) else {
                    continue;
                };
                let hit = self.tolerances.get(key).within(va, vb, self.epsilon);
                let tally = pair.per_key.entry(key.clone()).or_default();
                tally.comparable += 1;
                pair.comparable += 1;
                if hit {
                    tally.hits += 1;
                    pair.hits += 1;
                }
            }
        }

        tracing::debug!(
            left = %pair.left,
            right = %pair.right,
            hits = pair.hits,
            comparable = pair.comparable,
            "pair compared"
        );
        pair
    }
}
