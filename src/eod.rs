//! End-of-day consolidation: collapse the day's intraday ledger into daily
//! history, then prune both ledgers to their retention windows.
//!
//! Steps are independent — a consolidation failure does not block pruning.
//! Every error is captured in [`EodStats`]; a non-clean run means the day
//! should be re-run, which is safe because consolidation is idempotent.

use chrono::NaiveDate;
use tracing::{error, info};

use crate::config::{DAILY_RETENTION_DAYS, INTRADAY_RETENTION_DAYS};
use crate::store::SnapshotStore;
use crate::types::EodStats;

pub struct ConsolidationJob {
    store: SnapshotStore,
}

impl ConsolidationJob {
    pub fn new(store: SnapshotStore) -> Self {
        Self { store }
    }

    pub async fn run(&self, trade_date: NaiveDate) -> EodStats {
        info!("[EOD] starting consolidation for {trade_date}");
        let mut stats = EodStats {
            trade_date: Some(trade_date),
            ..EodStats::default()
        };

        match self.store.consolidate(trade_date).await {
            Ok(count) => {
                stats.consolidated = count;
                info!("[EOD] consolidated {count} contracts");
            }
            Err(e) => {
                error!("[EOD] consolidation failed: {e}");
                stats.errors.push(format!("consolidation failed: {e}"));
            }
        }

        match self.store.prune_intraday(INTRADAY_RETENTION_DAYS, trade_date).await {
            Ok(count) => {
                stats.intraday_pruned = count;
                info!("[EOD] pruned {count} intraday records older than {INTRADAY_RETENTION_DAYS} days");
            }
            Err(e) => {
                error!("[EOD] intraday prune failed: {e}");
                stats.errors.push(format!("intraday prune failed: {e}"));
            }
        }

        match self.store.prune_daily(DAILY_RETENTION_DAYS, trade_date).await {
            Ok(count) => {
                stats.daily_pruned = count;
                info!("[EOD] pruned {count} daily records older than {DAILY_RETENTION_DAYS} days");
            }
            Err(e) => {
                error!("[EOD] daily prune failed: {e}");
                stats.errors.push(format!("daily prune failed: {e}"));
            }
        }

        self.report(&stats).await;
        stats
    }

    /// Post-run shape report. Failures here are logged but never affect the
    /// run's outcome.
    async fn report(&self, stats: &EodStats) {
        match self.store.daily_stats().await {
            Ok(s) => {
                info!(
                    "[EOD] daily history: {} records over {} trading days",
                    s.total_records, s.trading_days
                );
                if let (Some(earliest), Some(latest)) = (s.earliest_date, s.latest_date) {
                    info!("[EOD] date range: {earliest} to {latest}");
                }
            }
            Err(e) => error!("[EOD] stats query failed: {e}"),
        }

        match self.store.database_size_bytes().await {
            Ok(bytes) => {
                info!("[EOD] database size: {:.2} MB", bytes as f64 / (1024.0 * 1024.0));
            }
            Err(e) => error!("[EOD] size query failed: {e}"),
        }

        if stats.clean() {
            info!(
                "[EOD OK] consolidated={} intraday_pruned={} daily_pruned={}",
                stats.consolidated, stats.intraday_pruned, stats.daily_pruned
            );
        } else {
            error!("[EOD] completed with errors: {}", stats.errors.join("; "));
        }
    }
}
