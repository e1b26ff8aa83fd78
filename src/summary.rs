// 📊 Reporting Aggregates - Per-year totals, tier mix, donor churn, queries
// Everything here reads a finished `ReconciledDonors`; nothing mutates it.

use crate::donor::{DonorFlag, DonorRecord, FiscalYear, ReconciledDonors};
use crate::tiers::TierTable;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

// ============================================================================
// YEAR SUMMARY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearSummary {
    pub year: FiscalYear,
    /// Donors with a recorded (non-null) amount this year
    pub active_donors: usize,
    pub total_amount: f64,
    /// Active donors per tier label; tiers with no donors are omitted
    pub tier_counts: BTreeMap<String, usize>,
    /// Active this year but not the year before (0 for the oldest year)
    pub donors_gained: usize,
    /// Active the year before but not this year (0 for the oldest year)
    pub donors_lost: usize,
}

fn active_ids(donors: &ReconciledDonors, year: FiscalYear) -> BTreeSet<&str> {
    donors
        .iter()
        .filter(|r| r.amount(year).is_some())
        .map(|r| r.identifier())
        .collect()
}

pub fn year_summary(donors: &ReconciledDonors, year: FiscalYear, table: &TierTable) -> YearSummary {
    let mut tier_counts = BTreeMap::new();
    let mut total_amount = 0.0;
    let mut active_donors = 0;

    for record in donors {
        if let Some(amount) = record.amount(year) {
            active_donors += 1;
            total_amount += amount;
            *tier_counts
                .entry(table.tier_of(Some(amount)).to_string())
                .or_insert(0) += 1;
        }
    }

    let (donors_gained, donors_lost) = match year.previous() {
        Some(prev) => {
            let current = active_ids(donors, year);
            let before = active_ids(donors, prev);
            (current.difference(&before).count(), before.difference(&current).count())
        }
        None => (0, 0),
    };

    YearSummary {
        year,
        active_donors,
        total_amount,
        tier_counts,
        donors_gained,
        donors_lost,
    }
}

/// One summary per fiscal year, oldest first
pub fn yearly_summaries(donors: &ReconciledDonors, table: &TierTable) -> Vec<YearSummary> {
    FiscalYear::CHRONOLOGICAL
        .iter()
        .map(|year| year_summary(donors, *year, table))
        .collect()
}

pub fn total_for_year(donors: &ReconciledDonors, year: FiscalYear) -> f64 {
    donors.iter().filter_map(|r| r.amount(year)).sum()
}

/// Percent change of the year's total against the previous year.
///
/// `None` for the oldest year or when the previous total is zero.
pub fn year_over_year_change(donors: &ReconciledDonors, year: FiscalYear) -> Option<f64> {
    let prev = year.previous()?;
    let before = total_for_year(donors, prev);
    if before == 0.0 {
        return None;
    }
    Some((total_for_year(donors, year) - before) / before * 100.0)
}

pub fn flag_count(donors: &ReconciledDonors, flag: DonorFlag) -> usize {
    donors.iter().filter(|r| r.flag(flag)).count()
}

// ============================================================================
// QUERIES
// ============================================================================

/// Donors whose amount in `year` is at least `min` (no gift counts as 0)
pub fn donors_at_or_above(donors: &ReconciledDonors, year: FiscalYear, min: f64) -> Vec<&DonorRecord> {
    donors
        .iter()
        .filter(|r| r.amount(year).unwrap_or(0.0) >= min)
        .collect()
}

/// Donors whose amount in `year` falls in the tier named `label`
pub fn donors_in_tier<'a>(
    donors: &'a ReconciledDonors,
    year: FiscalYear,
    table: &TierTable,
    label: &str,
) -> Vec<&'a DonorRecord> {
    donors
        .iter()
        .filter(|r| table.tier_of(r.amount(year)) == label)
        .collect()
}

/// Identifiers of donors carrying `flag` whose amount in `year` is strictly
/// above `threshold`, e.g. mid-range donors who gave over $1,000 in FY25.
pub fn flagged_donors_above(
    donors: &ReconciledDonors,
    flag: DonorFlag,
    year: FiscalYear,
    threshold: f64,
) -> Vec<&str> {
    donors
        .iter()
        .filter(|r| r.flag(flag) && r.amount(year).unwrap_or(0.0) > threshold)
        .map(|r| r.identifier())
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ReconciledDonors {
        let mut a = DonorRecord::new("A").unwrap();
        a.merge_amount(FiscalYear::Fy24, Some(400.0));
        a.merge_amount(FiscalYear::Fy25, Some(1200.0));
        a.merge_flag(DonorFlag::MidRange, true);

        let mut b = DonorRecord::new("B").unwrap();
        b.merge_amount(FiscalYear::Fy24, Some(600.0));

        let mut c = DonorRecord::new("C").unwrap();
        c.merge_amount(FiscalYear::Fy25, Some(5000.0));
        c.merge_flag(DonorFlag::MajorDonorProspect, true);

        ReconciledDonors::from_records(vec![a, b, c])
    }

    #[test]
    fn test_year_summary() {
        let donors = sample();
        let summary = year_summary(&donors, FiscalYear::Fy25, &TierTable::giving_tiers());

        assert_eq!(summary.active_donors, 2);
        assert_eq!(summary.total_amount, 6200.0);
        assert_eq!(summary.tier_counts.get("$5K+"), Some(&1));
        assert_eq!(summary.tier_counts.get("$1K-$4.9K"), Some(&1));
        assert_eq!(summary.tier_counts.get("<$500"), None);
        assert_eq!(summary.donors_gained, 1);
        assert_eq!(summary.donors_lost, 1);

        println!("✅ FY25 summary: {:?}", summary);
    }

    #[test]
    fn test_yearly_summaries_cover_every_year() {
        let summaries = yearly_summaries(&sample(), &TierTable::giving_tiers());

        assert_eq!(summaries.len(), FiscalYear::COUNT);
        assert_eq!(summaries[0].year, FiscalYear::Fy20);
        assert_eq!(summaries[0].donors_gained, 0);
        assert_eq!(summaries[4].donors_gained, 2);
    }

    #[test]
    fn test_year_over_year_change() {
        let donors = sample();

        let change = year_over_year_change(&donors, FiscalYear::Fy25).unwrap();
        assert!((change - 520.0).abs() < 1e-9);
        assert_eq!(year_over_year_change(&donors, FiscalYear::Fy24), None);
        assert_eq!(year_over_year_change(&donors, FiscalYear::Fy20), None);
    }

    #[test]
    fn test_flags_and_queries() {
        let donors = sample();

        assert_eq!(flag_count(&donors, DonorFlag::MidRange), 1);
        assert_eq!(flag_count(&donors, DonorFlag::MajorDonorProspect), 1);

        assert_eq!(donors_at_or_above(&donors, FiscalYear::Fy24, 500.0).len(), 1);
        assert_eq!(
            flagged_donors_above(&donors, DonorFlag::MidRange, FiscalYear::Fy25, 1000.0),
            vec!["A"]
        );

        let table = TierTable::giving_tiers();
        let no_gift = donors_in_tier(&donors, FiscalYear::Fy25, &table, "No Gift");
        assert_eq!(no_gift.len(), 1);
        assert_eq!(no_gift[0].identifier(), "B");
    }
}
