// 🧾 Donor Model - Canonical per-donor record
// One record per identifier, fiscal-year amounts plus sticky boolean flags

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// FISCAL YEAR
// ============================================================================

/// Fixed set of fiscal years carried by every extract.
///
/// Declaration order is chronological, so `Ord` and every `BTreeMap` keyed
/// by `FiscalYear` iterate oldest → newest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FiscalYear {
    #[serde(rename = "FY20")]
    Fy20,
    #[serde(rename = "FY21")]
    Fy21,
    #[serde(rename = "FY22")]
    Fy22,
    #[serde(rename = "FY23")]
    Fy23,
    #[serde(rename = "FY24")]
    Fy24,
    #[serde(rename = "FY25")]
    Fy25,
}

impl FiscalYear {
    pub const COUNT: usize = 6;

    /// Oldest → newest
    pub const CHRONOLOGICAL: [FiscalYear; FiscalYear::COUNT] = [
        FiscalYear::Fy20,
        FiscalYear::Fy21,
        FiscalYear::Fy22,
        FiscalYear::Fy23,
        FiscalYear::Fy24,
        FiscalYear::Fy25,
    ];

    /// Newest → oldest, the order extracts and reports list years in
    pub fn newest_first() -> impl Iterator<Item = FiscalYear> {
        Self::CHRONOLOGICAL.into_iter().rev()
    }

    pub fn label(&self) -> &'static str {
        match self {
            FiscalYear::Fy20 => "FY20",
            FiscalYear::Fy21 => "FY21",
            FiscalYear::Fy22 => "FY22",
            FiscalYear::Fy23 => "FY23",
            FiscalYear::Fy24 => "FY24",
            FiscalYear::Fy25 => "FY25",
        }
    }

    /// The immediately preceding fiscal year, if it is in the set
    pub fn previous(&self) -> Option<FiscalYear> {
        let idx = Self::CHRONOLOGICAL.iter().position(|y| y == self)?;
        idx.checked_sub(1).map(|i| Self::CHRONOLOGICAL[i])
    }

    /// Adjacent (previous, current) pairs, oldest pair first
    pub fn adjacent_pairs() -> impl Iterator<Item = (FiscalYear, FiscalYear)> {
        Self::CHRONOLOGICAL
            .windows(2)
            .map(|pair| (pair[0], pair[1]))
            .collect::<Vec<_>>()
            .into_iter()
    }
}

impl fmt::Display for FiscalYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for FiscalYear {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::CHRONOLOGICAL
            .into_iter()
            .find(|y| y.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown fiscal year: {}", s))
    }
}

// ============================================================================
// DONOR FLAG
// ============================================================================

/// Boolean attributes with "ever true across any source" semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DonorFlag {
    #[serde(rename = "isMidRange")]
    MidRange,
    #[serde(rename = "isMajorDonorProspect")]
    MajorDonorProspect,
}

impl DonorFlag {
    pub const ALL: [DonorFlag; 2] = [DonorFlag::MidRange, DonorFlag::MajorDonorProspect];

    pub fn name(&self) -> &'static str {
        match self {
            DonorFlag::MidRange => "isMidRange",
            DonorFlag::MajorDonorProspect => "isMajorDonorProspect",
        }
    }
}

impl fmt::Display for DonorFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// DONOR RECORD
// ============================================================================

/// Canonical record for one donor.
///
/// Every fiscal year and every flag is always present as a key. `None`
/// means "no recorded gift that year", which is not the same as `Some(0.0)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DonorRecord {
    identifier: String,
    fiscal_years: BTreeMap<FiscalYear, Option<f64>>,
    flags: BTreeMap<DonorFlag, bool>,
}

impl DonorRecord {
    /// Fresh record with no gifts and every flag false.
    ///
    /// Returns `None` for an empty identifier.
    pub fn new(identifier: impl Into<String>) -> Option<Self> {
        let identifier = identifier.into();
        if identifier.is_empty() {
            return None;
        }

        Some(DonorRecord {
            identifier,
            fiscal_years: FiscalYear::CHRONOLOGICAL.iter().map(|y| (*y, None)).collect(),
            flags: DonorFlag::ALL.iter().map(|f| (*f, false)).collect(),
        })
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn amount(&self, year: FiscalYear) -> Option<f64> {
        self.fiscal_years.get(&year).copied().flatten()
    }

    pub fn flag(&self, flag: DonorFlag) -> bool {
        self.flags.get(&flag).copied().unwrap_or(false)
    }

    /// Amounts oldest → newest, nulls kept in place
    pub fn chronological_amounts(&self) -> Vec<Option<f64>> {
        FiscalYear::CHRONOLOGICAL
            .iter()
            .map(|y| self.amount(*y))
            .collect()
    }

    pub fn fiscal_years(&self) -> &BTreeMap<FiscalYear, Option<f64>> {
        &self.fiscal_years
    }

    pub fn flags(&self) -> &BTreeMap<DonorFlag, bool> {
        &self.flags
    }

    // ========================================================================
    // MERGE STEP (only the reconciler and stores mutate records)
    // ========================================================================

    /// Latest-non-null-wins: a `None` or invalid amount leaves the year untouched
    pub(crate) fn merge_amount(&mut self, year: FiscalYear, amount: Option<f64>) {
        if let Some(value) = amount.filter(|v| v.is_finite() && *v >= 0.0) {
            self.fiscal_years.insert(year, Some(value));
        }
    }

    /// Sticky OR: once true, a flag never goes back to false
    pub(crate) fn merge_flag(&mut self, flag: DonorFlag, value: bool) {
        let entry = self.flags.entry(flag).or_insert(false);
        *entry = *entry || value;
    }
}

// ============================================================================
// RECONCILED DONORS (immutable result)
// ============================================================================

/// Finished, read-only result of reconciliation, keyed by identifier.
///
/// Iteration is ordered by identifier, so every consumer sees donors in the
/// same order on every run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconciledDonors {
    records: BTreeMap<String, DonorRecord>,
}

impl ReconciledDonors {
    pub(crate) fn from_records(records: impl IntoIterator<Item = DonorRecord>) -> Self {
        ReconciledDonors {
            records: records
                .into_iter()
                .map(|r| (r.identifier.clone(), r))
                .collect(),
        }
    }

    pub fn get(&self, identifier: &str) -> Option<&DonorRecord> {
        self.records.get(identifier)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DonorRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// SHA-256 over every identifier, amount bit pattern and flag.
    ///
    /// Two stores with the same content always produce the same digest.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();

        for record in self.records.values() {
            hasher.update(record.identifier.as_bytes());
            hasher.update([0u8]);
            for amount in record.fiscal_years.values() {
                match amount {
                    Some(v) => {
                        hasher.update([1u8]);
                        hasher.update(v.to_le_bytes());
                    }
                    None => hasher.update([0u8]),
                }
            }
            for value in record.flags.values() {
                hasher.update([u8::from(*value)]);
            }
        }

        format!("{:x}", hasher.finalize())
    }
}

impl<'a> IntoIterator for &'a ReconciledDonors {
    type Item = &'a DonorRecord;
    type IntoIter = std::collections::btree_map::Values<'a, String, DonorRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.values()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_is_blank() {
        let record = DonorRecord::new("V1").unwrap();

        assert_eq!(record.identifier(), "V1");
        assert!(record.chronological_amounts().iter().all(|a| a.is_none()));
        assert!(!record.flag(DonorFlag::MidRange));
        assert!(!record.flag(DonorFlag::MajorDonorProspect));
    }

    #[test]
    fn test_empty_identifier_rejected() {
        assert!(DonorRecord::new("").is_none());
    }

    #[test]
    fn test_merge_amount_keeps_existing_on_null() {
        let mut record = DonorRecord::new("V1").unwrap();
        record.merge_amount(FiscalYear::Fy23, Some(100.0));
        record.merge_amount(FiscalYear::Fy23, None);
        assert_eq!(record.amount(FiscalYear::Fy23), Some(100.0));

        record.merge_amount(FiscalYear::Fy23, Some(0.0));
        assert_eq!(record.amount(FiscalYear::Fy23), Some(0.0));
    }

    #[test]
    fn test_merge_amount_rejects_negative() {
        let mut record = DonorRecord::new("V1").unwrap();
        record.merge_amount(FiscalYear::Fy21, Some(-5.0));
        record.merge_amount(FiscalYear::Fy21, Some(f64::NAN));
        assert_eq!(record.amount(FiscalYear::Fy21), None);
    }

    #[test]
    fn test_flag_is_sticky() {
        let mut record = DonorRecord::new("V1").unwrap();
        record.merge_flag(DonorFlag::MidRange, true);
        record.merge_flag(DonorFlag::MidRange, false);
        assert!(record.flag(DonorFlag::MidRange));
    }

    #[test]
    fn test_fiscal_year_ordering() {
        let newest: Vec<_> = FiscalYear::newest_first().collect();
        assert_eq!(newest.first(), Some(&FiscalYear::Fy25));
        assert_eq!(newest.last(), Some(&FiscalYear::Fy20));
        assert_eq!(FiscalYear::Fy25.previous(), Some(FiscalYear::Fy24));
        assert_eq!(FiscalYear::Fy20.previous(), None);
        assert_eq!(FiscalYear::adjacent_pairs().count(), 5);
        assert_eq!("fy22".parse::<FiscalYear>(), Ok(FiscalYear::Fy22));
    }

    #[test]
    fn test_digest_tracks_content() {
        let mut a = DonorRecord::new("V1").unwrap();
        a.merge_amount(FiscalYear::Fy25, Some(50.0));
        let b = a.clone();

        let first = ReconciledDonors::from_records(vec![a.clone()]);
        let second = ReconciledDonors::from_records(vec![b]);
        assert_eq!(first.digest(), second.digest());

        a.merge_flag(DonorFlag::MajorDonorProspect, true);
        let third = ReconciledDonors::from_records(vec![a]);
        assert_ne!(first.digest(), third.digest());
    }

    #[test]
    fn test_record_serializes_with_labels() {
        let mut record = DonorRecord::new("V9").unwrap();
        record.merge_amount(FiscalYear::Fy24, Some(250.0));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["identifier"], "V9");
        assert_eq!(json["fiscal_years"]["FY24"], 250.0);
        assert!(json["fiscal_years"]["FY25"].is_null());
        assert_eq!(json["flags"]["isMidRange"], false);
    }
}
