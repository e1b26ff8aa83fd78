// ⚖️ Reconciliation Engine - Fold source extracts into one record per donor
//
// Sources are applied strictly in the order given:
//   amounts  → latest non-null value wins
//   flags    → logical OR, true is sticky
//
// A source that cannot be used is logged and skipped; the run only fails
// when nothing at all could be reconciled.

use crate::columns::{AliasRegistry, ColumnError, ColumnMap, ColumnResolver};
use crate::donor::{DonorRecord, ReconciledDonors};
use crate::source::Source;
use crate::store::{DonorStore, MemoryStore};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// SOURCE-LEVEL FAILURES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SourceError {
    /// No header matched any identifier alias
    MissingIdentifierColumn { aliases: Vec<String> },

    /// The extract has no data rows
    EmptyExtract,

    /// The caller could not read or parse the extract
    Unreadable(String),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::MissingIdentifierColumn { aliases } => write!(
                f,
                "missing required identifier column (accepted: {})",
                aliases.join(", ")
            ),
            SourceError::EmptyExtract => write!(f, "extract contains no rows"),
            SourceError::Unreadable(reason) => write!(f, "unreadable source: {}", reason),
        }
    }
}

impl std::error::Error for SourceError {}

impl From<ColumnError> for SourceError {
    fn from(err: ColumnError) -> Self {
        match err {
            ColumnError::MissingRequired { aliases, .. } => {
                SourceError::MissingIdentifierColumn { aliases }
            }
            other => SourceError::Unreadable(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source: String,
    pub error: SourceError,
}

impl SourceFailure {
    pub fn new(source: impl Into<String>, error: SourceError) -> Self {
        SourceFailure {
            source: source.into(),
            error,
        }
    }
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.error)
    }
}

// ============================================================================
// WHOLE-OPERATION FAILURE
// ============================================================================

#[derive(Debug)]
pub enum ReconcileError {
    /// Every source was attempted and the store is still empty
    NoData { failures: Vec<SourceFailure> },

    /// The backing store failed; the run was aborted
    Store(anyhow::Error),
}

impl fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileError::NoData { failures } if failures.is_empty() => {
                write!(f, "no donor data could be reconciled")
            }
            ReconcileError::NoData { failures } => {
                write!(f, "no donor data could be reconciled ({} source(s) failed: ", failures.len())?;
                let reasons: Vec<String> = failures.iter().map(|fl| fl.to_string()).collect();
                write!(f, "{})", reasons.join("; "))
            }
            ReconcileError::Store(err) => write!(f, "donor store failure: {:#}", err),
        }
    }
}

impl std::error::Error for ReconcileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReconcileError::Store(err) => Some(&**err),
            ReconcileError::NoData { .. } => None,
        }
    }
}

// ============================================================================
// RECONCILIATION REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SourceStatus {
    Applied {
        rows_applied: usize,
        /// Rows with an empty identifier
        rows_skipped: usize,
        /// Canonical fields this source does not carry
        unresolved_fields: Vec<String>,
    },
    Failed(SourceError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceOutcome {
    pub source: String,
    pub status: SourceStatus,
}

impl SourceOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self.status, SourceStatus::Applied { .. })
    }
}

/// Failed outcomes as `SourceFailure`s, in application order
pub fn collect_failures(outcomes: &[SourceOutcome]) -> Vec<SourceFailure> {
    outcomes
        .iter()
        .filter_map(|o| match &o.status {
            SourceStatus::Failed(err) => Some(SourceFailure::new(o.source.clone(), err.clone())),
            SourceStatus::Applied { .. } => None,
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub run_id: String,
    pub reconciled_at: DateTime<Utc>,
    /// One entry per attempted source, in application order
    pub sources: Vec<SourceOutcome>,
    pub donor_count: usize,
    /// SHA-256 of the reconciled store, see `ReconciledDonors::digest`
    pub digest: String,
}

impl ReconciliationReport {
    pub fn failures(&self) -> Vec<SourceFailure> {
        collect_failures(&self.sources)
    }

    /// True when at least one source was skipped
    pub fn is_partial(&self) -> bool {
        self.sources.iter().any(|o| !o.is_applied())
    }

    pub fn applied_count(&self) -> usize {
        self.sources.iter().filter(|o| o.is_applied()).count()
    }

    pub fn summary(&self) -> String {
        format!(
            "Reconciled {} donors from {}/{} sources{} (digest {})",
            self.donor_count,
            self.applied_count(),
            self.sources.len(),
            if self.is_partial() { ", partial coverage" } else { "" },
            &self.digest[..12.min(self.digest.len())]
        )
    }
}

/// Finished in-memory run: the immutable store plus its report
#[derive(Debug, Clone)]
pub struct Reconciled {
    pub donors: ReconciledDonors,
    pub report: ReconciliationReport,
}

// ============================================================================
// RECORD RECONCILER
// ============================================================================

pub struct RecordReconciler {
    resolver: ColumnResolver,
}

impl RecordReconciler {
    pub fn new(registry: AliasRegistry) -> Self {
        RecordReconciler {
            resolver: ColumnResolver::new(registry),
        }
    }

    /// Reconcile into a fresh in-memory store
    pub fn reconcile_in_memory(&self, sources: &[Source]) -> Result<Reconciled, ReconcileError> {
        let mut store = MemoryStore::new();
        let report = self.reconcile(sources, &mut store)?;
        Ok(Reconciled {
            donors: store.into_reconciled(),
            report,
        })
    }

    /// Apply `sources` to `store` in order
    pub fn reconcile<S: DonorStore>(
        &self,
        sources: &[Source],
        store: &mut S,
    ) -> Result<ReconciliationReport, ReconcileError> {
        self.reconcile_attempts(sources.iter().map(Ok), store)
    }

    /// Like `reconcile`, but accepts sources the caller already failed to
    /// load so they appear in the report alongside the rest.
    pub fn reconcile_attempts<'s, I, S>(
        &self,
        attempts: I,
        store: &mut S,
    ) -> Result<ReconciliationReport, ReconcileError>
    where
        I: IntoIterator<Item = Result<&'s Source, SourceFailure>>,
        S: DonorStore,
    {
        let mut outcomes = Vec::new();

        for attempt in attempts {
            let source = match attempt {
                Ok(source) => source,
                Err(failure) => {
                    warn!("Skipping source {}: {}", failure.source, failure.error);
                    outcomes.push(SourceOutcome {
                        source: failure.source,
                        status: SourceStatus::Failed(failure.error),
                    });
                    continue;
                }
            };

            let columns = match self.prepare(source) {
                Ok(columns) => columns,
                Err(err) => {
                    warn!("Skipping source {}: {}", source.name, err);
                    outcomes.push(SourceOutcome {
                        source: source.name.clone(),
                        status: SourceStatus::Failed(err),
                    });
                    continue;
                }
            };

            let (rows_applied, rows_skipped) = self
                .apply_rows(source, &columns, store)
                .map_err(ReconcileError::Store)?;

            if rows_skipped > 0 {
                debug!("{}: skipped {} row(s) without an identifier", source.name, rows_skipped);
            }
            info!("Applied {} row(s) from {}", rows_applied, source.name);

            outcomes.push(SourceOutcome {
                source: source.name.clone(),
                status: SourceStatus::Applied {
                    rows_applied,
                    rows_skipped,
                    unresolved_fields: columns
                        .unresolved()
                        .iter()
                        .map(|f| f.name().to_string())
                        .collect(),
                },
            });
        }

        let snapshot = store.snapshot().map_err(ReconcileError::Store)?;
        if snapshot.is_empty() {
            return Err(ReconcileError::NoData {
                failures: collect_failures(&outcomes),
            });
        }

        let report = ReconciliationReport {
            run_id: uuid::Uuid::new_v4().to_string(),
            reconciled_at: Utc::now(),
            sources: outcomes,
            donor_count: snapshot.len(),
            digest: snapshot.digest(),
        };
        info!("{}", report.summary());

        Ok(report)
    }

    /// Source-level checks: non-empty and carrying an identifier column
    fn prepare(&self, source: &Source) -> Result<ColumnMap, SourceError> {
        if source.rows.is_empty() {
            return Err(SourceError::EmptyExtract);
        }
        Ok(self.resolver.resolve_required(&source.headers)?)
    }

    /// Fold every row of one source into the store.
    ///
    /// Returns (applied, skipped) row counts.
    fn apply_rows<S: DonorStore>(
        &self,
        source: &Source,
        columns: &ColumnMap,
        store: &mut S,
    ) -> anyhow::Result<(usize, usize)> {
        let id_header = match columns.identifier() {
            Some(h) => h,
            None => return Ok((0, source.rows.len())),
        };

        let mut applied = 0;
        let mut skipped = 0;

        for row in &source.rows {
            let identifier = match row.get(id_header).and_then(|c| c.as_identifier()) {
                Some(id) => id,
                None => {
                    skipped += 1;
                    continue;
                }
            };

            let mut record = match store.get(&identifier)? {
                Some(existing) => existing,
                None => match DonorRecord::new(identifier) {
                    Some(fresh) => fresh,
                    None => {
                        skipped += 1;
                        continue;
                    }
                },
            };

            for (year, header) in columns.amount_columns() {
                record.merge_amount(year, row.get(header).and_then(|c| c.as_amount()));
            }

            for (flag, header) in columns.flag_columns() {
                let value = row.get(header).map(|c| c.is_truthy()).unwrap_or(false);
                record.merge_flag(flag, value);
            }

            store.upsert(record)?;
            applied += 1;
        }

        Ok((applied, skipped))
    }
}

impl Default for RecordReconciler {
    fn default() -> Self {
        Self::new(AliasRegistry::standard())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::donor::{DonorFlag, FiscalYear};
    use crate::source::SourceRow;

    const MID_RANGE: &str = "MidRange_1 0004999_(Public)";

    fn source(name: &str, rows: Vec<SourceRow>) -> Source {
        Source::from_rows(name, rows)
    }

    #[test]
    fn test_later_null_does_not_override() {
        let a = source(
            "A",
            vec![SourceRow::new().with("VANID", "V1").with("FY23", 100.0).with(MID_RANGE, false)],
        );
        let b = source(
            "B",
            vec![SourceRow::new().with("VANID", "V1").with("FY23", "").with(MID_RANGE, true)],
        );

        let result = RecordReconciler::default().reconcile_in_memory(&[a, b]).unwrap();
        let v1 = result.donors.get("V1").unwrap();

        assert_eq!(v1.amount(FiscalYear::Fy23), Some(100.0));
        assert!(v1.flag(DonorFlag::MidRange));
        assert!(!result.report.is_partial());

        println!("✅ {}", result.report.summary());
    }

    #[test]
    fn test_later_non_null_wins() {
        let a = source("A", vec![SourceRow::new().with("VANID", "V1").with("FY24", 100.0)]);
        let b = source("B", vec![SourceRow::new().with("VANID", "V1").with("FY24", 0.0)]);

        let result = RecordReconciler::default().reconcile_in_memory(&[a, b]).unwrap();
        assert_eq!(result.donors.get("V1").unwrap().amount(FiscalYear::Fy24), Some(0.0));
    }

    #[test]
    fn test_order_matters() {
        let a = source("A", vec![SourceRow::new().with("VANID", "V1").with("FY24", 100.0)]);
        let b = source("B", vec![SourceRow::new().with("VANID", "V1").with("FY24", 300.0)]);
        let reconciler = RecordReconciler::default();

        let ab = reconciler.reconcile_in_memory(&[a.clone(), b.clone()]).unwrap();
        let ba = reconciler.reconcile_in_memory(&[b, a]).unwrap();

        assert_eq!(ab.donors.get("V1").unwrap().amount(FiscalYear::Fy24), Some(300.0));
        assert_eq!(ba.donors.get("V1").unwrap().amount(FiscalYear::Fy24), Some(100.0));
    }

    #[test]
    fn test_true_flag_survives_false_source() {
        let a = source("A", vec![SourceRow::new().with("VANID", "V1").with(MID_RANGE, "1")]);
        let b = source("B", vec![SourceRow::new().with("VANID", "V1").with(MID_RANGE, "0")]);
        let c = source("C", vec![SourceRow::new().with("VANID", "V1").with("FY25", 5.0)]);

        let result = RecordReconciler::default().reconcile_in_memory(&[a, b, c]).unwrap();
        assert!(result.donors.get("V1").unwrap().flag(DonorFlag::MidRange));
    }

    #[test]
    fn test_rows_without_identifier_skipped() {
        let a = source(
            "A",
            vec![
                SourceRow::new().with("VANID", "").with("FY25", 10.0),
                SourceRow::new().with("VANID", "V2").with("FY25", 20.0),
            ],
        );

        let result = RecordReconciler::default().reconcile_in_memory(&[a]).unwrap();
        assert_eq!(result.donors.len(), 1);
        assert_eq!(
            result.report.sources[0].status,
            SourceStatus::Applied {
                rows_applied: 1,
                rows_skipped: 1,
                unresolved_fields: vec![
                    "FY20".to_string(),
                    "FY21".to_string(),
                    "FY22".to_string(),
                    "FY23".to_string(),
                    "FY24".to_string(),
                    "isMidRange".to_string(),
                    "isMajorDonorProspect".to_string(),
                ],
            }
        );
    }

    #[test]
    fn test_missing_identifier_column_skips_source_only() {
        let bad = source("bad", vec![SourceRow::new().with("Donor", "V1").with("FY25", 10.0)]);
        let good = source("good", vec![SourceRow::new().with("VANID", "V2").with("FY25", 20.0)]);

        let result = RecordReconciler::default().reconcile_in_memory(&[bad, good]).unwrap();

        assert_eq!(result.donors.len(), 1);
        assert!(result.donors.get("V1").is_none());
        assert!(result.report.is_partial());
        assert_eq!(result.report.failures().len(), 1);
        assert!(matches!(
            result.report.failures()[0].error,
            SourceError::MissingIdentifierColumn { .. }
        ));
    }

    #[test]
    fn test_all_sources_failing_is_no_data() {
        let empty = Source::new("empty", vec!["VANID".to_string()], vec![]);
        let bad = source("bad", vec![SourceRow::new().with("Donor", "V1")]);

        let err = RecordReconciler::default()
            .reconcile_in_memory(&[empty, bad])
            .unwrap_err();

        match err {
            ReconcileError::NoData { failures } => {
                assert_eq!(failures.len(), 2);
                assert_eq!(failures[0].error, SourceError::EmptyExtract);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_no_sources_is_no_data() {
        let err = RecordReconciler::default().reconcile_in_memory(&[]).unwrap_err();
        assert!(matches!(err, ReconcileError::NoData { ref failures } if failures.is_empty()));
        assert_eq!(err.to_string(), "no donor data could be reconciled");
    }

    #[test]
    fn test_unreadable_attempt_reported() {
        let good = source("good", vec![SourceRow::new().with("VANID", "V1").with("FY25", 1.0)]);
        let attempts = vec![
            Err(SourceFailure::new("FY20.csv", SourceError::Unreadable("not found".to_string()))),
            Ok(&good),
        ];

        let mut store = MemoryStore::new();
        let report = RecordReconciler::default()
            .reconcile_attempts(attempts, &mut store)
            .unwrap();

        assert_eq!(report.sources.len(), 2);
        assert_eq!(report.sources[0].source, "FY20.csv");
        assert!(!report.sources[0].is_applied());
        assert_eq!(report.donor_count, 1);
    }

    #[test]
    fn test_reconcile_twice_is_identical() {
        let sources = vec![
            source("A", vec![
                SourceRow::new().with("VANID", "V1").with("FY22", 50.0),
                SourceRow::new().with("VANID", "V2").with("FY22", 75.0).with(MID_RANGE, "yes"),
            ]),
            source("B", vec![
                SourceRow::new().with("VANID", "V2").with("FY23", 80.0),
                SourceRow::new().with("VANID", "V1").with("FY22", "junk"),
            ]),
        ];
        let reconciler = RecordReconciler::default();

        let first = reconciler.reconcile_in_memory(&sources).unwrap();
        let second = reconciler.reconcile_in_memory(&sources).unwrap();

        assert_eq!(first.donors, second.donors);
        assert_eq!(first.report.digest, second.report.digest);
        assert_ne!(first.report.run_id, second.report.run_id);
    }

    #[test]
    fn test_collect_failures_keeps_order() {
        let outcomes = vec![
            SourceOutcome {
                source: "a.csv".to_string(),
                status: SourceStatus::Failed(SourceError::EmptyExtract),
            },
            SourceOutcome {
                source: "b.csv".to_string(),
                status: SourceStatus::Applied {
                    rows_applied: 1,
                    rows_skipped: 0,
                    unresolved_fields: vec![],
                },
            },
            SourceOutcome {
                source: "c.csv".to_string(),
                status: SourceStatus::Failed(SourceError::Unreadable("gone".to_string())),
            },
        ];

        let failures = collect_failures(&outcomes);
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].source, "a.csv");
        assert_eq!(failures[1].source, "c.csv");
    }
}
