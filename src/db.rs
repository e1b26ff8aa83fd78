// 🗄️ SQLite Store - Reconciled donors + run history on disk
// Same DonorStore contract as the in-memory store, backed by rusqlite (WAL).

use crate::donor::{DonorFlag, DonorRecord, FiscalYear, ReconciledDonors};
use crate::reconciliation::{RecordReconciler, ReconciliationReport, SourceFailure, SourceOutcome};
use crate::source::Source;
use crate::store::DonorStore;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;

// Column order for every donor SELECT / INSERT below
const DONOR_COLUMNS: &str = "identifier, fy20, fy21, fy22, fy23, fy24, fy25, is_mid_range, is_major_donor_prospect";

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS donors (
            identifier TEXT PRIMARY KEY NOT NULL,
            fy20 REAL,
            fy21 REAL,
            fy22 REAL,
            fy23 REAL,
            fy24 REAL,
            fy25 REAL,
            is_mid_range INTEGER NOT NULL DEFAULT 0,
            is_major_donor_prospect INTEGER NOT NULL DEFAULT 0,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Run history (one row per reconciliation run)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS reconciliation_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT UNIQUE NOT NULL,
            reconciled_at TEXT NOT NULL,
            donor_count INTEGER NOT NULL,
            digest TEXT NOT NULL,
            sources TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_runs_reconciled_at ON reconciliation_runs(reconciled_at)",
        [],
    )?;

    Ok(())
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<(String, Vec<Option<f64>>, bool, bool)> {
    let identifier: String = row.get(0)?;
    let mut amounts = Vec::with_capacity(FiscalYear::COUNT);
    for i in 0..FiscalYear::COUNT {
        amounts.push(row.get::<_, Option<f64>>(i + 1)?);
    }
    let mid_range: bool = row.get(7)?;
    let major: bool = row.get(8)?;
    Ok((identifier, amounts, mid_range, major))
}

fn build_record(
    (identifier, amounts, mid_range, major): (String, Vec<Option<f64>>, bool, bool),
) -> Result<DonorRecord> {
    let mut record = DonorRecord::new(identifier)
        .ok_or_else(|| anyhow!("donors table contains an empty identifier"))?;

    for (year, amount) in FiscalYear::CHRONOLOGICAL.iter().zip(amounts) {
        record.merge_amount(*year, amount);
    }
    record.merge_flag(DonorFlag::MidRange, mid_range);
    record.merge_flag(DonorFlag::MajorDonorProspect, major);

    Ok(record)
}

// ============================================================================
// SQLITE STORE
// ============================================================================

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        setup_database(&conn)?;
        Ok(SqliteStore { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Replace the stored donors with a fresh fold of `attempts` and append
    /// the run to the history.
    ///
    /// Runs in one transaction: on any error (including `NoData`) the
    /// previous donors and history are left untouched.
    pub fn reconcile_replacing<'s, I>(
        &mut self,
        reconciler: &RecordReconciler,
        attempts: I,
    ) -> Result<ReconciliationReport>
    where
        I: IntoIterator<Item = Result<&'s Source, SourceFailure>>,
    {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM donors", [])?;

        let mut staged = ConnectionStore { conn: &tx };
        let report = reconciler.reconcile_attempts(attempts, &mut staged)?;
        insert_run(&tx, &report)?;

        tx.commit()?;
        Ok(report)
    }

    /// Append a finished run to the history table
    pub fn record_run(&self, report: &ReconciliationReport) -> Result<()> {
        insert_run(&self.conn, report)
    }

    /// Run history, most recent first
    pub fn runs(&self) -> Result<Vec<RunRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, reconciled_at, donor_count, digest, sources
             FROM reconciliation_runs
             ORDER BY reconciled_at DESC, id DESC",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(run_id, reconciled_at, donor_count, digest, sources)| {
                Ok(RunRecord {
                    reconciled_at: DateTime::parse_from_rfc3339(&reconciled_at)
                        .with_context(|| format!("Bad timestamp for run {}", run_id))?
                        .with_timezone(&Utc),
                    sources: serde_json::from_str(&sources)
                        .with_context(|| format!("Bad source outcomes for run {}", run_id))?,
                    run_id,
                    donor_count: donor_count as usize,
                    digest,
                })
            })
            .collect()
    }
}

/// One row of `reconciliation_runs`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub reconciled_at: DateTime<Utc>,
    pub donor_count: usize,
    pub digest: String,
    pub sources: Vec<SourceOutcome>,
}

fn insert_run(conn: &Connection, report: &ReconciliationReport) -> Result<()> {
    let sources_json = serde_json::to_string(&report.sources)?;

    conn.execute(
        "INSERT INTO reconciliation_runs (run_id, reconciled_at, donor_count, digest, sources)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            report.run_id,
            report.reconciled_at.to_rfc3339(),
            report.donor_count as i64,
            report.digest,
            sources_json,
        ],
    )?;

    Ok(())
}

fn get_donor(conn: &Connection, identifier: &str) -> Result<Option<DonorRecord>> {
    let raw = conn
        .query_row(
            &format!("SELECT {} FROM donors WHERE identifier = ?1", DONOR_COLUMNS),
            params![identifier],
            record_from_row,
        )
        .optional()?;

    raw.map(build_record).transpose()
}

fn upsert_donor(conn: &Connection, record: &DonorRecord) -> Result<()> {
    let a = record.chronological_amounts();

    conn.execute(
        &format!(
            "INSERT INTO donors ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(identifier) DO UPDATE SET
                fy20 = excluded.fy20, fy21 = excluded.fy21, fy22 = excluded.fy22,
                fy23 = excluded.fy23, fy24 = excluded.fy24, fy25 = excluded.fy25,
                is_mid_range = excluded.is_mid_range,
                is_major_donor_prospect = excluded.is_major_donor_prospect,
                updated_at = CURRENT_TIMESTAMP",
            DONOR_COLUMNS
        ),
        params![
            record.identifier(),
            a[0],
            a[1],
            a[2],
            a[3],
            a[4],
            a[5],
            record.flag(DonorFlag::MidRange),
            record.flag(DonorFlag::MajorDonorProspect),
        ],
    )?;

    Ok(())
}

fn count_donors(conn: &Connection) -> Result<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM donors", [], |row| row.get(0))?;
    Ok(count as usize)
}

fn snapshot_donors(conn: &Connection) -> Result<ReconciledDonors> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM donors ORDER BY identifier", DONOR_COLUMNS))?;

    let raws = stmt
        .query_map([], record_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let records = raws
        .into_iter()
        .map(build_record)
        .collect::<Result<Vec<_>>>()?;

    Ok(ReconciledDonors::from_records(records))
}

impl DonorStore for SqliteStore {
    fn get(&self, identifier: &str) -> Result<Option<DonorRecord>> {
        get_donor(&self.conn, identifier)
    }

    fn upsert(&mut self, record: DonorRecord) -> Result<()> {
        upsert_donor(&self.conn, &record)
    }

    fn len(&self) -> Result<usize> {
        count_donors(&self.conn)
    }

    fn snapshot(&self) -> Result<ReconciledDonors> {
        snapshot_donors(&self.conn)
    }
}

/// Donor store over a borrowed connection, used inside an open transaction
struct ConnectionStore<'c> {
    conn: &'c Connection,
}

impl DonorStore for ConnectionStore<'_> {
    fn get(&self, identifier: &str) -> Result<Option<DonorRecord>> {
        get_donor(self.conn, identifier)
    }

    fn upsert(&mut self, record: DonorRecord) -> Result<()> {
        upsert_donor(self.conn, &record)
    }

    fn len(&self) -> Result<usize> {
        count_donors(self.conn)
    }

    fn snapshot(&self) -> Result<ReconciledDonors> {
        snapshot_donors(self.conn)
    }
}

// ============================================================================
// TESTS
// ============================================================================
