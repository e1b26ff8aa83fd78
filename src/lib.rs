// Donor Ledger - Core Library
// Reconciles multi-year donor extracts and classifies the result.
// Exposes all modules for use in the CLI and tests

pub mod donor;          // Donor records + fiscal years
pub mod source;         // Tabular extracts (CSV → rows)
pub mod columns;        // Header aliases → canonical fields
pub mod store;          // DonorStore trait + in-memory store
pub mod db;             // SQLite-backed store + run history
pub mod reconciliation; // Ordered merge of sources
pub mod tiers;          // Amount → tier tables
pub mod trends;         // Whole-history + year-pair trends
pub mod transitions;    // Tier movement between two years
pub mod summary;        // Per-year aggregates + donor queries
pub mod config;         // JSON engine configuration

// Re-export commonly used types
pub use donor::{DonorFlag, DonorRecord, FiscalYear, ReconciledDonors};
pub use source::{CellValue, Source, SourceRow};
pub use columns::{AliasRegistry, CanonicalField, ColumnError, ColumnMap, ColumnResolver};
pub use store::{DonorStore, MemoryStore};
pub use db::{setup_database, RunRecord, SqliteStore};
pub use reconciliation::{
    ReconcileError, Reconciled, ReconciliationReport, RecordReconciler,
    SourceError, SourceFailure, SourceOutcome, SourceStatus,
};
pub use tiers::{TierBand, TierTable, TierTableError, NO_GIFT};
pub use trends::{
    classify_all, classify_donor, count_history_trends, donors_with_trend,
    whole_history_trend, year_pair_counts, year_pair_trend, year_pair_trends,
    DonorTrend, HistoryTrend, TrendSettings, YearPairClassification, YearPairTrend,
};
pub use transitions::{count_tier_transitions, donor_transition, TierTransition, TransitionCount, TransitionCounts, TransitionWindow};
pub use summary::{
    donors_at_or_above, donors_in_tier, flag_count, flagged_donors_above,
    total_for_year, year_over_year_change, year_summary, yearly_summaries, YearSummary,
};
pub use config::EngineConfig;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
