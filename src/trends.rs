// 📈 Trend Classifier - Giving trajectory per donor
//
// Two independent views over one donor's amounts (oldest → newest):
//   whole history → increasing / decreasing / consistent / fluctuating / insufficient data
//   year pair     → increasing / decreasing / stopped / new (or no tag)

use crate::donor::{DonorRecord, FiscalYear, ReconciledDonors};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// CLASSIFICATIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HistoryTrend {
    Increasing,
    Decreasing,
    Consistent,
    Fluctuating,
    InsufficientData,
}

impl HistoryTrend {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryTrend::Increasing => "Increasing",
            HistoryTrend::Decreasing => "Decreasing",
            HistoryTrend::Consistent => "Consistent",
            HistoryTrend::Fluctuating => "Fluctuating",
            HistoryTrend::InsufficientData => "Insufficient Data",
        }
    }
}

impl fmt::Display for HistoryTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryTrend {
    type Err = String;

    /// Accepts the display name or the JSON name, ignoring case, spaces and `_`/`-`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .collect::<String>()
            .to_ascii_lowercase();

        match key.as_str() {
            "increasing" => Ok(HistoryTrend::Increasing),
            "decreasing" => Ok(HistoryTrend::Decreasing),
            "consistent" => Ok(HistoryTrend::Consistent),
            "fluctuating" => Ok(HistoryTrend::Fluctuating),
            "insufficientdata" => Ok(HistoryTrend::InsufficientData),
            _ => Err(format!("unknown trend: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum YearPairTrend {
    Increasing,
    Decreasing,
    Stopped,
    New,
}

impl YearPairTrend {
    pub fn as_str(&self) -> &'static str {
        match self {
            YearPairTrend::Increasing => "Increasing",
            YearPairTrend::Decreasing => "Decreasing",
            YearPairTrend::Stopped => "Stopped",
            YearPairTrend::New => "New",
        }
    }
}

impl fmt::Display for YearPairTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SETTINGS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendSettings {
    /// Percent change (absolute) below which a history is `Consistent`
    pub consistency_threshold_pct: f64,

    /// Report `Fluctuating` when the non-null amounts are neither
    /// non-decreasing nor non-increasing. Off: endpoints only.
    pub detect_fluctuation: bool,
}

impl Default for TrendSettings {
    fn default() -> Self {
        TrendSettings {
            consistency_threshold_pct: 10.0,
            detect_fluctuation: false,
        }
    }
}

// ============================================================================
// WHOLE-HISTORY TREND
// ============================================================================

fn is_mixed_direction(values: &[f64]) -> bool {
    let non_decreasing = values.windows(2).all(|w| w[1] >= w[0]);
    let non_increasing = values.windows(2).all(|w| w[1] <= w[0]);
    !non_decreasing && !non_increasing
}

/// Classify a chronological amount sequence (nulls = no gift that year).
///
/// A first amount of zero cannot anchor a percent change: the history is
/// `Increasing` when the last amount is positive, otherwise
/// `InsufficientData`.
pub fn whole_history_trend(amounts: &[Option<f64>], settings: &TrendSettings) -> HistoryTrend {
    let values: Vec<f64> = amounts.iter().flatten().copied().collect();

    if values.len() < 2 {
        return HistoryTrend::InsufficientData;
    }

    if settings.detect_fluctuation && is_mixed_direction(&values) {
        return HistoryTrend::Fluctuating;
    }

    let first = values[0];
    let last = values[values.len() - 1];

    if first == 0.0 {
        return if last > 0.0 {
            HistoryTrend::Increasing
        } else {
            HistoryTrend::InsufficientData
        };
    }

    let pct = (last - first) / first * 100.0;

    if pct.abs() < settings.consistency_threshold_pct {
        HistoryTrend::Consistent
    } else if pct > 0.0 {
        HistoryTrend::Increasing
    } else {
        HistoryTrend::Decreasing
    }
}

/// Whole-history classification of one donor, with the amounts it used
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DonorTrend {
    pub identifier: String,
    pub trend: HistoryTrend,
    /// Non-null amounts, oldest → newest
    pub amounts: Vec<f64>,
}

pub fn classify_donor(record: &DonorRecord, settings: &TrendSettings) -> DonorTrend {
    let amounts = record.chronological_amounts();
    DonorTrend {
        identifier: record.identifier().to_string(),
        trend: whole_history_trend(&amounts, settings),
        amounts: amounts.into_iter().flatten().collect(),
    }
}

/// One `DonorTrend` per donor, in identifier order
pub fn classify_all(donors: &ReconciledDonors, settings: &TrendSettings) -> Vec<DonorTrend> {
    donors.iter().map(|r| classify_donor(r, settings)).collect()
}

pub fn count_history_trends(trends: &[DonorTrend]) -> BTreeMap<HistoryTrend, usize> {
    let mut counts = BTreeMap::new();
    for t in trends {
        *counts.entry(t.trend).or_insert(0) += 1;
    }
    counts
}

/// Donors whose whole-history trend is `trend`
pub fn donors_with_trend<'a>(
    donors: &'a ReconciledDonors,
    trends: &[DonorTrend],
    trend: HistoryTrend,
) -> Vec<&'a DonorRecord> {
    trends
        .iter()
        .filter(|t| t.trend == trend)
        .filter_map(|t| donors.get(&t.identifier))
        .collect()
}

// ============================================================================
// YEAR-PAIR TREND
// ============================================================================

/// Compare one year with the year before it; nulls count as zero here.
///
/// The guards cover disjoint sign/zero cases, so at most one tag applies.
/// Both zero, or equal non-zero amounts, produce no tag.
pub fn year_pair_trend(previous: Option<f64>, current: Option<f64>) -> Option<YearPairTrend> {
    let prev = previous.unwrap_or(0.0);
    let cur = current.unwrap_or(0.0);

    if prev > 0.0 && cur == 0.0 {
        Some(YearPairTrend::Stopped)
    } else if prev == 0.0 && cur > 0.0 {
        Some(YearPairTrend::New)
    } else if cur > prev && prev > 0.0 {
        Some(YearPairTrend::Increasing)
    } else if cur < prev && cur > 0.0 {
        Some(YearPairTrend::Decreasing)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct YearPairClassification {
    pub previous: FiscalYear,
    pub current: FiscalYear,
    pub trend: Option<YearPairTrend>,
}

/// Tags for every adjacent pair of fiscal years, oldest pair first
pub fn year_pair_trends(record: &DonorRecord) -> Vec<YearPairClassification> {
    FiscalYear::adjacent_pairs()
        .map(|(previous, current)| YearPairClassification {
            previous,
            current,
            trend: year_pair_trend(record.amount(previous), record.amount(current)),
        })
        .collect()
}

/// How many donors carry each tag for `current` against the year before it.
///
/// Returns an empty map for the oldest fiscal year.
pub fn year_pair_counts(donors: &ReconciledDonors, current: FiscalYear) -> BTreeMap<YearPairTrend, usize> {
    let mut counts = BTreeMap::new();
    let previous = match current.previous() {
        Some(p) => p,
        None => return counts,
    };

    for record in donors {
        if let Some(tag) = year_pair_trend(record.amount(previous), record.amount(current)) {
            *counts.entry(tag).or_insert(0) += 1;
        }
    }
    counts
}

// ============================================================================
// TESTS
// ============================================================================
