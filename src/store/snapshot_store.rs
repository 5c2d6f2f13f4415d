//! Persistence layer: intraday ledger, daily ledger, alert ledger.
//!
//! Single logical writer (the scheduler loop); the dashboard API reads the
//! same pool concurrently. Every multi-row write runs inside one transaction
//! so callers see each logical operation as all-or-nothing.

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::error::Result;
use crate::store::models::{AlertRow, DailyHistoryStats, DailyRow, SnapshotRow};
use crate::types::{AlertCandidate, Snapshot};

#[derive(Clone)]
pub struct SnapshotStore {
    pool: sqlx::SqlitePool,
}

impl SnapshotStore {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &sqlx::SqlitePool {
        &self.pool
    }

    // =====================================================================
    // Intraday snapshots
    // =====================================================================

    /// Upsert a poll batch. Each row's `volume_delta` is resolved against the
    /// most recent strictly-earlier snapshot for the same (ticker, date) that
    /// was committed *before* this batch — all lookups run before any row is
    /// written, so sibling batch rows never feed each other's delta.
    pub async fn ingest_batch(&self, snapshots: &mut [Snapshot]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        for snap in snapshots.iter_mut() {
            let previous: Option<i64> = sqlx::query_scalar(
                r#"
                SELECT volume_cumulative
                FROM intraday_snapshots
                WHERE ticker = ? AND captured_date = ? AND captured_at < ?
                ORDER BY captured_at DESC
                LIMIT 1
                "#,
            )
            .bind(&snap.ticker)
            .bind(snap.captured_date)
            .bind(snap.captured_at)
            .fetch_optional(&mut *tx)
            .await?
            .flatten();

            snap.volume_delta = Some(match previous {
                Some(prev) => snap.volume_cumulative - prev,
                // First poll of the day for this contract.
                None => snap.volume_cumulative,
            });
        }

        for snap in snapshots.iter() {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO intraday_snapshots (
                    captured_at, captured_date, ticker, expiration, strike, contract_type,
                    spot_price, moneyness, dte,
                    volume_cumulative, volume_delta,
                    open_interest, close_price, high_price, low_price, vwap, transactions,
                    delta, gamma, theta, vega, implied_vol,
                    market_status, timeframe
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(snap.captured_at)
            .bind(snap.captured_date)
            .bind(&snap.ticker)
            .bind(snap.expiration)
            .bind(snap.strike)
            .bind(snap.contract_type.to_string())
            .bind(snap.spot_price)
            .bind(snap.moneyness)
            .bind(snap.dte)
            .bind(snap.volume_cumulative)
            .bind(snap.volume_delta)
            .bind(snap.open_interest)
            .bind(snap.close_price)
            .bind(snap.high_price)
            .bind(snap.low_price)
            .bind(snap.vwap)
            .bind(snap.transactions)
            .bind(snap.greeks.delta)
            .bind(snap.greeks.gamma)
            .bind(snap.greeks.theta)
            .bind(snap.greeks.vega)
            .bind(snap.greeks.implied_vol)
            .bind(&snap.market_status)
            .bind(&snap.timeframe)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(snapshots.len())
    }

    /// Most recent snapshot for a contract on a date, if any.
    pub async fn latest_snapshot(
        &self,
        ticker: &str,
        date: NaiveDate,
    ) -> Result<Option<SnapshotRow>> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT * FROM intraday_snapshots
            WHERE ticker = ? AND captured_date = ?
            ORDER BY captured_at DESC
            LIMIT 1
            "#,
        )
        .bind(ticker)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// All rows written by the most recent poll, optionally filtered by
    /// expiration. The dashboard's latest-view query.
    pub async fn latest_poll_rows(
        &self,
        expiration: Option<NaiveDate>,
    ) -> Result<Vec<SnapshotRow>> {
        let rows = match expiration {
            Some(exp) => {
                sqlx::query_as::<_, SnapshotRow>(
                    r#"
                    SELECT * FROM intraday_snapshots
                    WHERE captured_at = (SELECT MAX(captured_at) FROM intraday_snapshots)
                      AND expiration = ?
                    ORDER BY strike ASC
                    "#,
                )
                .bind(exp)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, SnapshotRow>(
                    r#"
                    SELECT * FROM intraday_snapshots
                    WHERE captured_at = (SELECT MAX(captured_at) FROM intraday_snapshots)
                    ORDER BY expiration ASC, strike ASC
                    "#,
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows)
    }

    /// Delete intraday rows with a capture date strictly older than
    /// `today − keep_days`. Returns rows deleted.
    pub async fn prune_intraday(&self, keep_days: i64, today: NaiveDate) -> Result<u64> {
        let cutoff = today - Duration::days(keep_days);
        let result = sqlx::query("DELETE FROM intraday_snapshots WHERE captured_date < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // =====================================================================
    // Daily history
    // =====================================================================

    /// Collapse a day's intraday ledger into canonical daily records: for each
    /// ticker with at least one snapshot on `trade_date`, the row with the
    /// latest capture timestamp wins. Idempotent — a re-run re-derives the
    /// same rows. Returns contracts consolidated.
    pub async fn consolidate(&self, trade_date: NaiveDate) -> Result<u64> {
        let result = sqlx::query(
            r#"
            INSERT OR REPLACE INTO daily_history (
                trade_date, ticker, expiration, strike, contract_type,
                spot_close, moneyness, dte,
                volume, open_interest, close_price, high_price, low_price, vwap, transactions,
                delta, gamma, theta, vega, implied_vol
            )
            SELECT
                s.captured_date, s.ticker, s.expiration, s.strike, s.contract_type,
                s.spot_price, s.moneyness, s.dte,
                s.volume_cumulative, s.open_interest, s.close_price, s.high_price,
                s.low_price, s.vwap, s.transactions,
                s.delta, s.gamma, s.theta, s.vega, s.implied_vol
            FROM intraday_snapshots s
            INNER JOIN (
                SELECT ticker, MAX(captured_at) AS max_time
                FROM intraday_snapshots
                WHERE captured_date = ?
                GROUP BY ticker
            ) last ON s.ticker = last.ticker AND s.captured_at = last.max_time
            WHERE s.captured_date = ?
            "#,
        )
        .bind(trade_date)
        .bind(trade_date)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Baseline-construction query: daily records within a moneyness band and
    /// a DTE band over the trailing window, most recent first.
    pub async fn historical_comparables(
        &self,
        moneyness: f64,
        dte: i64,
        lookback_days: i64,
        moneyness_tolerance: f64,
        dte_tolerance: i64,
        today: NaiveDate,
    ) -> Result<Vec<DailyRow>> {
        let cutoff = today - Duration::days(lookback_days);
        let rows = sqlx::query_as::<_, DailyRow>(
            r#"
            SELECT * FROM daily_history
            WHERE moneyness BETWEEN ? AND ?
              AND dte BETWEEN ? AND ?
              AND trade_date >= ?
            ORDER BY trade_date DESC
            "#,
        )
        .bind(moneyness - moneyness_tolerance)
        .bind(moneyness + moneyness_tolerance)
        .bind(dte - dte_tolerance)
        .bind(dte + dte_tolerance)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Daily records for one exact contract over the trailing window.
    pub async fn ticker_history(
        &self,
        ticker: &str,
        lookback_days: i64,
        today: NaiveDate,
    ) -> Result<Vec<DailyRow>> {
        let cutoff = today - Duration::days(lookback_days);
        let rows = sqlx::query_as::<_, DailyRow>(
            r#"
            SELECT * FROM daily_history
            WHERE ticker = ? AND trade_date >= ?
            ORDER BY trade_date DESC
            "#,
        )
        .bind(ticker)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Trailing daily history across all contracts, for the dashboard.
    pub async fn daily_window(&self, days: i64, today: NaiveDate) -> Result<Vec<DailyRow>> {
        let cutoff = today - Duration::days(days);
        let rows = sqlx::query_as::<_, DailyRow>(
            r#"
            SELECT * FROM daily_history
            WHERE trade_date >= ?
            ORDER BY trade_date DESC, ticker ASC
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Delete daily rows with a trade date strictly older than
    /// `today − keep_days`.
    pub async fn prune_daily(&self, keep_days: i64, today: NaiveDate) -> Result<u64> {
        let cutoff = today - Duration::days(keep_days);
        let result = sqlx::query("DELETE FROM daily_history WHERE trade_date < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn daily_stats(&self) -> Result<DailyHistoryStats> {
        let stats = sqlx::query_as::<_, DailyHistoryStats>(
            r#"
            SELECT
                COUNT(*) AS total_records,
                COUNT(DISTINCT trade_date) AS trading_days,
                MIN(trade_date) AS earliest_date,
                MAX(trade_date) AS latest_date
            FROM daily_history
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(stats)
    }

    /// On-disk size of the database in bytes, via pragma so it also works for
    /// in-memory test databases.
    pub async fn database_size_bytes(&self) -> Result<i64> {
        let page_count: i64 = sqlx::query_scalar("PRAGMA page_count")
            .fetch_one(&self.pool)
            .await?;
        let page_size: i64 = sqlx::query_scalar("PRAGMA page_size")
            .fetch_one(&self.pool)
            .await?;
        Ok(page_count * page_size)
    }

    // =====================================================================
    // Baseline lookups (anomaly detection)
    // =====================================================================

    /// Intraday volume on `date` at `hour` ±1, closest hour first.
    pub async fn intraday_volume_near_hour(
        &self,
        ticker: &str,
        date: NaiveDate,
        hour: u32,
    ) -> Result<Option<i64>> {
        let hour = hour as i64;
        let hour_start = (hour - 1).max(0);
        let hour_end = (hour + 1).min(23);
        let volume: Option<Option<i64>> = sqlx::query_scalar(
            r#"
            SELECT volume_cumulative
            FROM intraday_snapshots
            WHERE ticker = ?
              AND captured_date = ?
              AND CAST(strftime('%H', captured_at) AS INTEGER) BETWEEN ? AND ?
            ORDER BY ABS(CAST(strftime('%H', captured_at) AS INTEGER) - ?) ASC
            LIMIT 1
            "#,
        )
        .bind(ticker)
        .bind(date)
        .bind(hour_start)
        .bind(hour_end)
        .bind(hour)
        .fetch_optional(&self.pool)
        .await?;
        Ok(volume.flatten())
    }

    /// Consolidated EOD volume for a contract on a date.
    pub async fn daily_volume(&self, ticker: &str, date: NaiveDate) -> Result<Option<i64>> {
        let volume: Option<Option<i64>> = sqlx::query_scalar(
            "SELECT volume FROM daily_history WHERE ticker = ? AND trade_date = ? LIMIT 1",
        )
        .bind(ticker)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;
        Ok(volume.flatten())
    }

    /// Most recent intraday volume for a contract on a date, any hour.
    pub async fn latest_intraday_volume(
        &self,
        ticker: &str,
        date: NaiveDate,
    ) -> Result<Option<i64>> {
        let volume: Option<Option<i64>> = sqlx::query_scalar(
            r#"
            SELECT volume_cumulative
            FROM intraday_snapshots
            WHERE ticker = ? AND captured_date = ?
            ORDER BY captured_at DESC
            LIMIT 1
            "#,
        )
        .bind(ticker)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;
        Ok(volume.flatten())
    }

    // =====================================================================
    // Alerts
    // =====================================================================

    pub async fn record_alert(&self, alert: &AlertCandidate) -> Result<i64> {
        let trigger_reasons = serde_json::json!({
            "flags": alert.flags,
            "comparison_source": alert.baseline_source,
            "summary": alert.summary,
        })
        .to_string();

        let result = sqlx::query(
            r#"
            INSERT INTO alerts (
                triggered_at, ticker, expiration, strike, contract_type,
                moneyness, dte,
                score, volume_current, volume_historical_avg, volume_historical_p90,
                premium_notional, trigger_reasons
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(alert.triggered_at)
        .bind(&alert.ticker)
        .bind(alert.expiration)
        .bind(alert.strike)
        .bind(alert.contract_type.to_string())
        .bind(alert.moneyness)
        .bind(alert.dte)
        .bind(alert.score())
        .bind(alert.volume_current)
        .bind(alert.volume_baseline as f64)
        .bind(Option::<f64>::None)
        .bind(alert.notional)
        .bind(trigger_reasons)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn list_alerts(
        &self,
        limit: i64,
        unacknowledged_only: bool,
    ) -> Result<Vec<AlertRow>> {
        let rows = if unacknowledged_only {
            sqlx::query_as::<_, AlertRow>(
                r#"
                SELECT * FROM alerts
                WHERE acknowledged = 0
                ORDER BY triggered_at DESC
                LIMIT ?
                "#,
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, AlertRow>(
                "SELECT * FROM alerts ORDER BY triggered_at DESC LIMIT ?",
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        };
        Ok(rows)
    }

    /// Operator acknowledgement. Returns false if the alert id does not exist.
    pub async fn acknowledge(
        &self,
        alert_id: i64,
        acknowledged_at: NaiveDateTime,
        notes: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE alerts
            SET acknowledged = 1, acknowledged_at = ?, notes = ?
            WHERE id = ?
            "#,
        )
        .bind(acknowledged_at)
        .bind(notes)
        .bind(alert_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::{ContractType, Greeks};
    use chrono::NaiveTime;
    use sqlx::sqlite::SqlitePoolOptions;

    pub(crate) async fn memory_store() -> SnapshotStore {
        // One connection — each sqlite::memory: connection is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory pool");
        sqlx::migrate!("./migrations").run(&pool).await.expect("migrations");
        SnapshotStore::new(pool)
    }

    pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub(crate) fn snap(
        ticker: &str,
        day: NaiveDate,
        hour: u32,
        minute: u32,
        volume: i64,
    ) -> Snapshot {
        Snapshot {
            ticker: ticker.to_string(),
            captured_at: day.and_time(NaiveTime::from_hms_opt(hour, minute, 0).unwrap()),
            captured_date: day,
            expiration: date(2026, 3, 20),
            strike: 5000.0,
            contract_type: ContractType::Put,
            spot_price: Some(6800.0),
            moneyness: Some(5000.0 / 6800.0),
            dte: Some(45),
            volume_cumulative: volume,
            volume_delta: None,
            open_interest: Some(1200),
            close_price: Some(4.2),
            high_price: Some(4.5),
            low_price: Some(3.9),
            vwap: Some(4.1),
            transactions: Some(37),
            greeks: Greeks::default(),
            market_status: Some("open".to_string()),
            timeframe: Some("DELAYED".to_string()),
        }
    }

    #[tokio::test]
    async fn first_poll_delta_equals_own_volume() {
        let store = memory_store().await;
        let day = date(2025, 12, 8);

        let mut batch = vec![snap("O:SPX260320P05000000", day, 10, 30, 150)];
        store.ingest_batch(&mut batch).await.unwrap();
        assert_eq!(batch[0].volume_delta, Some(150));
    }

    #[tokio::test]
    async fn subsequent_deltas_are_increments() {
        let store = memory_store().await;
        let day = date(2025, 12, 8);
        let t = "O:SPX260320P05000000";

        let mut b1 = vec![snap(t, day, 10, 30, 150)];
        store.ingest_batch(&mut b1).await.unwrap();
        let mut b2 = vec![snap(t, day, 11, 30, 240)];
        store.ingest_batch(&mut b2).await.unwrap();
        let mut b3 = vec![snap(t, day, 12, 30, 250)];
        store.ingest_batch(&mut b3).await.unwrap();

        assert_eq!(b2[0].volume_delta, Some(90));
        assert_eq!(b3[0].volume_delta, Some(10));
    }

    #[tokio::test]
    async fn deltas_ignore_sibling_batch_rows() {
        let store = memory_store().await;
        let day = date(2025, 12, 8);
        let t = "O:SPX260320P05000000";

        // Two timestamps for the same ticker in one batch: both resolve
        // against pre-batch history (none), not against each other.
        let mut batch = vec![snap(t, day, 10, 30, 100), snap(t, day, 11, 30, 180)];
        store.ingest_batch(&mut batch).await.unwrap();

        assert_eq!(batch[0].volume_delta, Some(100));
        assert_eq!(batch[1].volume_delta, Some(180));
    }

    #[tokio::test]
    async fn reingest_same_key_overwrites_in_place() {
        let store = memory_store().await;
        let day = date(2025, 12, 8);
        let t = "O:SPX260320P05000000";

        let mut b1 = vec![snap(t, day, 10, 30, 150)];
        store.ingest_batch(&mut b1).await.unwrap();
        let mut b2 = vec![snap(t, day, 10, 30, 175)];
        store.ingest_batch(&mut b2).await.unwrap();

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM intraday_snapshots WHERE ticker = ? AND captured_date = ?",
        )
        .bind(t)
        .bind(day)
        .fetch_one(store.pool())
        .await
        .unwrap();
        assert_eq!(count, 1);

        let latest = store.latest_snapshot(t, day).await.unwrap().unwrap();
        assert_eq!(latest.volume_cumulative, Some(175));
    }

    #[tokio::test]
    async fn consolidate_takes_last_snapshot_and_is_idempotent() {
        let store = memory_store().await;
        let day = date(2025, 12, 8);
        let t = "O:SPX260320P05000000";

        let mut batch = vec![snap(t, day, 10, 30, 150)];
        store.ingest_batch(&mut batch).await.unwrap();
        let mut batch = vec![snap(t, day, 15, 45, 600)];
        store.ingest_batch(&mut batch).await.unwrap();

        let first = store.consolidate(day).await.unwrap();
        assert_eq!(first, 1);

        let rows = store.daily_window(1, day).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].volume, Some(600));

        // Second run re-derives identical rows, cardinality unchanged.
        store.consolidate(day).await.unwrap();
        let rows = store.daily_window(1, day).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].volume, Some(600));
    }

    #[tokio::test]
    async fn prune_respects_calendar_cutoffs() {
        let store = memory_store().await;
        let today = date(2025, 12, 8);
        let t = "O:SPX260320P05000000";

        for days_ago in [0i64, 2, 3, 4, 10] {
            let day = today - Duration::days(days_ago);
            let mut batch = vec![snap(t, day, 10, 30, 100 + days_ago)];
            store.ingest_batch(&mut batch).await.unwrap();
            store.consolidate(day).await.unwrap();
        }

        let removed = store.prune_intraday(3, today).await.unwrap();
        assert_eq!(removed, 2); // 4 and 10 days ago; the 3-day-old row stays

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM intraday_snapshots")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(remaining, 3);

        let removed = store.prune_daily(3, today).await.unwrap();
        assert_eq!(removed, 2);
    }

    #[tokio::test]
    async fn near_hour_lookup_prefers_closest_hour() {
        let store = memory_store().await;
        let day = date(2025, 12, 8);
        let t = "O:SPX260320P05000000";

        let mut batch = vec![snap(t, day, 10, 30, 100), snap(t, day, 12, 30, 300)];
        store.ingest_batch(&mut batch).await.unwrap();

        // Hour 11: both rows are ±1 away; the query picks the closest, and on
        // a tie the first scanned — either qualifies as "same hour ±1".
        let v = store.intraday_volume_near_hour(t, day, 12).await.unwrap();
        assert_eq!(v, Some(300));

        let v = store.intraday_volume_near_hour(t, day, 9).await.unwrap();
        assert_eq!(v, Some(100));

        // Hour 15 is outside ±1 of both rows.
        let v = store.intraday_volume_near_hour(t, day, 15).await.unwrap();
        assert_eq!(v, None);
    }

    #[tokio::test]
    async fn comparables_filter_on_moneyness_and_dte_bands() {
        let store = memory_store().await;
        let today = date(2025, 12, 8);
        let t = "O:SPX260320P05000000";

        for days_ago in [1i64, 2, 3] {
            let day = today - Duration::days(days_ago);
            let mut batch = vec![snap(t, day, 15, 45, 100 * days_ago)];
            store.ingest_batch(&mut batch).await.unwrap();
            store.consolidate(day).await.unwrap();
        }

        // snap() rows sit at moneyness ~0.735, dte 45.
        let rows = store
            .historical_comparables(0.73, 45, 30, 0.02, 7, today)
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.windows(2).all(|w| w[0].trade_date >= w[1].trade_date));

        let rows = store
            .historical_comparables(0.73, 10, 30, 0.02, 7, today)
            .await
            .unwrap();
        assert!(rows.is_empty());

        let history = store.ticker_history(t, 30, today).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].volume, Some(100));
    }

    #[tokio::test]
    async fn alert_roundtrip_and_acknowledge() {
        use crate::types::{AlertCandidate, AnomalyFlag, BaselineSource};

        let store = memory_store().await;
        let day = date(2025, 12, 8);
        let candidate = AlertCandidate {
            triggered_at: day.and_hms_opt(11, 30, 0).unwrap(),
            ticker: "O:SPX260320P05000000".to_string(),
            expiration: date(2026, 3, 20),
            strike: 5000.0,
            contract_type: ContractType::Put,
            moneyness: Some(0.73),
            dte: Some(45),
            volume_current: 300,
            volume_baseline: 40,
            volume_delta: 260,
            notional: 126_000.0,
            flags: vec![AnomalyFlag::Delta, AnomalyFlag::Multiplier],
            baseline_source: BaselineSource::YesterdayHour,
            summary: "test".to_string(),
        };

        let id = store.record_alert(&candidate).await.unwrap();

        let unacked = store.list_alerts(10, true).await.unwrap();
        assert_eq!(unacked.len(), 1);
        assert_eq!(unacked[0].score, 2.0);

        let acked = store
            .acknowledge(id, day.and_hms_opt(12, 0, 0).unwrap(), Some("reviewed"))
            .await
            .unwrap();
        assert!(acked);
        assert!(store.list_alerts(10, true).await.unwrap().is_empty());
        assert_eq!(store.list_alerts(10, false).await.unwrap().len(), 1);
    }
}
