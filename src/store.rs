// 🗃️ Donor Store - Keyed get/upsert by identifier
// The reconciler folds rows through this trait and never touches a concrete
// collection directly.

use crate::donor::{DonorRecord, ReconciledDonors};
use anyhow::Result;
use std::collections::BTreeMap;

/// Keyed store the merge step writes through.
///
/// Implementations must return exactly what was last upserted for an
/// identifier; the reconciler relies on that to keep the fold deterministic.
pub trait DonorStore {
    fn get(&self, identifier: &str) -> Result<Option<DonorRecord>>;

    /// Insert or replace the record stored under `record.identifier()`
    fn upsert(&mut self, record: DonorRecord) -> Result<()>;

    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Freeze the current contents into an immutable result
    fn snapshot(&self) -> Result<ReconciledDonors>;
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: BTreeMap<String, DonorRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the store without cloning
    pub fn into_reconciled(self) -> ReconciledDonors {
        ReconciledDonors::from_records(self.records.into_values())
    }
}

impl DonorStore for MemoryStore {
    fn get(&self, identifier: &str) -> Result<Option<DonorRecord>> {
        Ok(self.records.get(identifier).cloned())
    }

    fn upsert(&mut self, record: DonorRecord) -> Result<()> {
        self.records.insert(record.identifier().to_string(), record);
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.records.len())
    }

    fn snapshot(&self) -> Result<ReconciledDonors> {
        Ok(ReconciledDonors::from_records(self.records.values().cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::donor::FiscalYear;

    #[test]
    fn test_memory_store_upsert_replaces() {
        let mut store = MemoryStore::new();
        assert!(store.is_empty().unwrap());

        let mut record = DonorRecord::new("V1").unwrap();
        store.upsert(record.clone()).unwrap();

        record.merge_amount(FiscalYear::Fy25, Some(10.0));
        store.upsert(record).unwrap();

        assert_eq!(store.len().unwrap(), 1);
        let stored = store.get("V1").unwrap().unwrap();
        assert_eq!(stored.amount(FiscalYear::Fy25), Some(10.0));
        assert!(store.get("v1").unwrap().is_none(), "identifiers are case-sensitive");
    }

    #[test]
    fn test_snapshot_matches_into_reconciled() {
        let mut store = MemoryStore::new();
        store.upsert(DonorRecord::new("B").unwrap()).unwrap();
        store.upsert(DonorRecord::new("A").unwrap()).unwrap();

        let snapshot = store.snapshot().unwrap();
        let ids: Vec<_> = snapshot.iter().map(|r| r.identifier().to_string()).collect();
        assert_eq!(ids, vec!["A", "B"]);
        assert_eq!(snapshot, store.into_reconciled());
    }
}
