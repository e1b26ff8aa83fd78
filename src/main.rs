use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use donor_ledger::{
    classify_all, count_history_trends, count_tier_transitions, donors_with_trend, flag_count,
    flagged_donors_above, year_over_year_change, year_pair_counts, yearly_summaries, DonorFlag,
    DonorStore, EngineConfig, FiscalYear, HistoryTrend, MemoryStore, ReconciledDonors,
    ReconciliationReport, RecordReconciler, Source, SourceError, SourceFailure, SourceStatus,
    SqliteStore, TransitionCounts,
    YearPairTrend, YearSummary,
};

#[derive(Parser)]
#[command(name = "donor-ledger")]
#[command(about = "Reconcile multi-year donor extracts and classify giving trends")]
#[command(version)]
struct Cli {
    /// Engine configuration (JSON); defaults reproduce the FY20-FY25 extracts
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print results as JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge extracts in order and report per-source outcomes
    Reconcile {
        /// CSV extracts, applied in the order given
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Fold into this SQLite database and append to its run history
        #[arg(long, value_name = "PATH")]
        db: Option<PathBuf>,
    },

    /// Whole-history trend counts, plus year-pair tags for one year
    Trends {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Year whose change against the previous year is tagged
        #[arg(long, default_value = "FY25")]
        year: FiscalYear,
    },

    /// Tier-to-tier movement between the configured reference years
    Transitions {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Only count donors with this whole-history trend
        #[arg(long, value_name = "TREND")]
        only: Option<HistoryTrend>,
    },

    /// Per-year totals, tier mix, donor churn and flag counts
    Summary {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Reconciliation history stored in a database, newest first
    Runs {
        #[arg(long, value_name = "PATH")]
        db: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Reconcile { files, db } => run_reconcile(&config, &files, db.as_deref(), cli.json),
        Commands::Trends { files, year } => run_trends(&config, &files, year, cli.json),
        Commands::Transitions { files, only } => run_transitions(&config, &files, only, cli.json),
        Commands::Summary { files } => run_summary(&config, &files, cli.json),
        Commands::Runs { db } => run_history(&db, cli.json),
    }
}

// ============================================================================
// LOADING
// ============================================================================

/// Read every file; the ones that fail to load become failed sources
fn load_sources(files: &[PathBuf]) -> Vec<Result<Source, SourceFailure>> {
    files
        .iter()
        .map(|path| {
            Source::from_csv_path(path).map_err(|err| {
                SourceFailure::new(path.display().to_string(), SourceError::Unreadable(format!("{:#}", err)))
            })
        })
        .collect()
}

fn attempts(loaded: &[Result<Source, SourceFailure>]) -> impl Iterator<Item = Result<&Source, SourceFailure>> + '_ {
    loaded.iter().map(|attempt| attempt.as_ref().map_err(|failure| failure.clone()))
}

fn reconcile_into<S: DonorStore>(
    config: &EngineConfig,
    files: &[PathBuf],
    store: &mut S,
) -> Result<ReconciliationReport> {
    let loaded = load_sources(files);
    let reconciler = RecordReconciler::new(config.columns.clone());

    Ok(reconciler.reconcile_attempts(attempts(&loaded), store)?)
}

fn reconcile_files(config: &EngineConfig, files: &[PathBuf]) -> Result<ReconciledDonors> {
    let mut store = MemoryStore::new();
    reconcile_into(config, files, &mut store)?;
    Ok(store.into_reconciled())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ============================================================================
// COMMANDS
// ============================================================================

fn run_reconcile(config: &EngineConfig, files: &[PathBuf], db: Option<&Path>, json: bool) -> Result<()> {
    let report = match db {
        Some(path) => {
            let mut store = SqliteStore::open(path)?;
            let loaded = load_sources(files);
            let reconciler = RecordReconciler::new(config.columns.clone());

            let report = store
                .reconcile_replacing(&reconciler, attempts(&loaded))
                .with_context(|| format!("Reconciliation into {} rolled back", path.display()))?;
            info!("Stored {} donors in {}", report.donor_count, path.display());
            report
        }
        None => reconcile_into(config, files, &mut MemoryStore::new())?,
    };

    if json {
        return print_json(&report);
    }

    println!("🔗 Reconciliation {}", report.run_id);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for outcome in &report.sources {
        match &outcome.status {
            SourceStatus::Applied { rows_applied, rows_skipped, unresolved_fields } => {
                println!("✓ {}: {} rows applied, {} skipped", outcome.source, rows_applied, rows_skipped);
                if !unresolved_fields.is_empty() {
                    println!("    columns not present: {}", unresolved_fields.join(", "));
                }
            }
            SourceStatus::Failed(err) => {
                println!("✗ {}: {}", outcome.source, err);
            }
        }
    }
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("{}", report.summary());
    if report.is_partial() {
        println!("⚠️  Partial coverage: {} source(s) skipped", report.failures().len());
    }

    Ok(())
}

#[derive(Serialize)]
struct TrendsOutput {
    history: BTreeMap<HistoryTrend, usize>,
    year: FiscalYear,
    year_pair: BTreeMap<YearPairTrend, usize>,
}

fn run_trends(config: &EngineConfig, files: &[PathBuf], year: FiscalYear, json: bool) -> Result<()> {
    let donors = reconcile_files(config, files)?;
    let trends = classify_all(&donors, &config.trend);

    let output = TrendsOutput {
        history: count_history_trends(&trends),
        year,
        year_pair: year_pair_counts(&donors, year),
    };

    if json {
        return print_json(&output);
    }

    println!("📈 Giving trends ({} donors)", donors.len());
    for (trend, count) in &output.history {
        println!("  {:<18} {}", trend.to_string(), count);
    }
    match year.previous() {
        Some(prev) => {
            println!("\n{} vs {}", year, prev);
            for (tag, count) in &output.year_pair {
                println!("  {:<18} {}", tag.to_string(), count);
            }
        }
        None => println!("\n{} has no previous year to compare against", year),
    }

    Ok(())
}

#[derive(Serialize)]
struct TransitionsOutput {
    from_year: FiscalYear,
    to_year: FiscalYear,
    only: Option<HistoryTrend>,
    transitions: TransitionCounts,
}

fn run_transitions(config: &EngineConfig, files: &[PathBuf], only: Option<HistoryTrend>, json: bool) -> Result<()> {
    let donors = reconcile_files(config, files)?;
    let window = &config.transitions;

    let counts: TransitionCounts = match only {
        Some(trend) => {
            let trends = classify_all(&donors, &config.trend);
            let subset = donors_with_trend(&donors, &trends, trend);
            count_tier_transitions(subset, &config.transition_tiers, window)
        }
        None => count_tier_transitions(&donors, &config.transition_tiers, window),
    };

    let output = TransitionsOutput {
        from_year: window.from_year,
        to_year: window.to_year,
        only,
        transitions: counts,
    };

    if json {
        return print_json(&output);
    }

    println!("🔀 Tier transitions {} → {}", output.from_year, output.to_year);
    if let Some(trend) = only {
        println!("   ({} donors only)", trend);
    }
    if output.transitions.is_empty() {
        println!("  no donor changed tier");
    }
    for (transition, count) in output.transitions.iter() {
        println!("  {:<28} {}", transition.to_string(), count);
    }
    println!("  total: {}", output.transitions.total());

    Ok(())
}

#[derive(Serialize)]
struct SummaryOutput {
    donor_count: usize,
    years: Vec<YearSummary>,
    year_over_year_pct: BTreeMap<FiscalYear, Option<f64>>,
    flags: BTreeMap<DonorFlag, usize>,
    mid_range_over_1000: Vec<String>,
}

fn run_summary(config: &EngineConfig, files: &[PathBuf], json: bool) -> Result<()> {
    let donors = reconcile_files(config, files)?;

    let output = SummaryOutput {
        donor_count: donors.len(),
        years: yearly_summaries(&donors, &config.giving_tiers),
        year_over_year_pct: FiscalYear::CHRONOLOGICAL
            .iter()
            .map(|y| (*y, year_over_year_change(&donors, *y)))
            .collect(),
        flags: DonorFlag::ALL.iter().map(|f| (*f, flag_count(&donors, *f))).collect(),
        mid_range_over_1000: flagged_donors_above(&donors, DonorFlag::MidRange, FiscalYear::Fy25, 1000.0)
            .into_iter()
            .map(String::from)
            .collect(),
    };

    if json {
        return print_json(&output);
    }

    println!("📊 Donor summary ({} donors)", output.donor_count);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for year in &output.years {
        let yoy = output
            .year_over_year_pct
            .get(&year.year)
            .copied()
            .flatten()
            .map(|pct| format!("{:+.1}%", pct))
            .unwrap_or_else(|| "n/a".to_string());

        println!(
            "{}: {} active, ${:.2} total ({}), +{} / -{} donors",
            year.year, year.active_donors, year.total_amount, yoy, year.donors_gained, year.donors_lost
        );
        for (tier, count) in &year.tier_counts {
            println!("    {:<12} {}", tier, count);
        }
    }
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for (flag, count) in &output.flags {
        println!("{}: {}", flag, count);
    }
    println!("Mid-range donors over $1,000 in FY25: {}", output.mid_range_over_1000.len());

    Ok(())
}

fn run_history(db: &Path, json: bool) -> Result<()> {
    let store = SqliteStore::open(db)?;
    let runs = store.runs()?;

    if json {
        return print_json(&runs);
    }

    if runs.is_empty() {
        println!("No reconciliation runs recorded in {}", db.display());
    }
    for run in &runs {
        let failed = run.sources.iter().filter(|o| !o.is_applied()).count();
        println!(
            "{}  {}  {} donors  {}/{} sources  {}",
            run.reconciled_at.format("%Y-%m-%d %H:%M:%S"),
            run.run_id,
            run.donor_count,
            run.sources.len() - failed,
            run.sources.len(),
            &run.digest[..12.min(run.digest.len())]
        );
    }

    Ok(())
}
