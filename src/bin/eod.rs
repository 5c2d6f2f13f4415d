//! Standalone EOD consolidation. Normally driven by the scheduler; this
//! binary covers manual re-runs and catch-up after an outage:
//!
//!     eod [YYYY-MM-DD]
//!
//! Exit codes: 0 clean, 1 completed with errors, 130 interrupted.

use chrono::NaiveDate;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use spx_monitor::calendar::now_et;
use spx_monitor::eod::ConsolidationJob;
use spx_monitor::store::SnapshotStore;

#[tokio::main]
async fn main() {
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&log_level))
        .init();

    let trade_date = match std::env::args().nth(1) {
        Some(arg) => match NaiveDate::parse_from_str(&arg, "%Y-%m-%d") {
            Ok(d) => d,
            Err(_) => {
                eprintln!("Invalid date '{arg}', expected YYYY-MM-DD");
                std::process::exit(1);
            }
        },
        None => now_et().date_naive(),
    };

    let db_path = std::env::var("SPX_DB_PATH").unwrap_or_else(|_| "spx_options.db".to_string());
    let pool = match open_pool(&db_path).await {
        Ok(p) => p,
        Err(e) => {
            error!("Database error: {e}");
            std::process::exit(1);
        }
    };

    info!("EOD consolidation for {trade_date} (db: {db_path})");
    let job = ConsolidationJob::new(SnapshotStore::new(pool));

    tokio::select! {
        stats = job.run(trade_date) => {
            if stats.clean() {
                info!(
                    "SUCCESS: consolidated={} intraday_pruned={} daily_pruned={}",
                    stats.consolidated, stats.intraday_pruned, stats.daily_pruned
                );
                std::process::exit(0);
            }
            error!("Completed with errors: {}", stats.errors.join("; "));
            std::process::exit(1);
        }
        _ = tokio::signal::ctrl_c() => {
            error!("Interrupted");
            std::process::exit(130);
        }
    }
}

async fn open_pool(db_path: &str) -> Result<sqlx::SqlitePool, spx_monitor::error::AppError> {
    let options = sqlx::sqlite::SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .connect_with(options)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}
