// 🔀 Tier Transitions - Movement between tiers across two reference years

use crate::donor::{DonorRecord, FiscalYear};
use crate::tiers::TierTable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TierTransition {
    pub from: String,
    pub to: String,
}

impl TierTransition {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        TierTransition {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl fmt::Display for TierTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.from, self.to)
    }
}

/// The two fiscal years compared, and what to do with donors that have no
/// gift recorded in one of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionWindow {
    pub from_year: FiscalYear,
    pub to_year: FiscalYear,
    /// Skip donors with a null amount in either year instead of treating
    /// the missing year as the "No Gift" tier.
    pub skip_missing: bool,
}

impl Default for TransitionWindow {
    fn default() -> Self {
        TransitionWindow {
            from_year: FiscalYear::Fy24,
            to_year: FiscalYear::Fy25,
            skip_missing: false,
        }
    }
}

/// The transition one donor made, if their tier changed
pub fn donor_transition(
    record: &DonorRecord,
    table: &TierTable,
    window: &TransitionWindow,
) -> Option<TierTransition> {
    let from_amount = record.amount(window.from_year);
    let to_amount = record.amount(window.to_year);

    if window.skip_missing && (from_amount.is_none() || to_amount.is_none()) {
        return None;
    }

    let from = table.tier_of(from_amount);
    let to = table.tier_of(to_amount);

    if from == to {
        None
    } else {
        Some(TierTransition::new(from, to))
    }
}

/// One serialized entry of `TransitionCounts`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionCount {
    pub from: String,
    pub to: String,
    pub count: usize,
}

/// Observed transitions with their donor counts.
///
/// A transition nobody made is absent, never present with a zero count.
/// Serialized as a list of `{from, to, count}` entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<TransitionCount>", into = "Vec<TransitionCount>")]
pub struct TransitionCounts {
    counts: BTreeMap<TierTransition, usize>,
}

impl TransitionCounts {
    pub fn get(&self, from: &str, to: &str) -> Option<usize> {
        self.counts.get(&TierTransition::new(from, to)).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TierTransition, usize)> {
        self.counts.iter().map(|(t, c)| (t, *c))
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Donors that changed tier, over every transition
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    fn record(&mut self, transition: TierTransition) {
        *self.counts.entry(transition).or_insert(0) += 1;
    }
}

impl From<Vec<TransitionCount>> for TransitionCounts {
    fn from(entries: Vec<TransitionCount>) -> Self {
        let mut counts = TransitionCounts::default();
        for entry in entries.into_iter().filter(|e| e.count > 0) {
            *counts
                .counts
                .entry(TierTransition::new(entry.from, entry.to))
                .or_insert(0) += entry.count;
        }
        counts
    }
}

impl From<TransitionCounts> for Vec<TransitionCount> {
    fn from(counts: TransitionCounts) -> Self {
        counts
            .counts
            .into_iter()
            .map(|(t, count)| TransitionCount {
                from: t.from,
                to: t.to,
                count,
            })
            .collect()
    }
}

/// Count tier transitions over any set of donors (the whole store, or a
/// subset such as only the donors trending upward).
pub fn count_tier_transitions<'a, I>(donors: I, table: &TierTable, window: &TransitionWindow) -> TransitionCounts
where
    I: IntoIterator<Item = &'a DonorRecord>,
{
    let mut counts = TransitionCounts::default();
    for record in donors {
        if let Some(transition) = donor_transition(record, table, window) {
            counts.record(transition);
        }
    }
    counts
}
