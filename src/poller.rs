//! One poll cycle: pick target expirations, discover the strike band,
//! fetch detailed snapshots in batches, store them, run detection.
//!
//! Errors come back as values inside [`PollOutcome`] — the scheduler owns
//! the retry policy, the poller just reports what happened.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Weekday};
use tracing::{info, warn};

use crate::client::MarketDataClient;
use crate::config::{
    Config, BATCH_PACING_MS, MAX_DTE, MAX_MONEYNESS, MAX_TICKERS_PER_REQUEST, MIN_DTE,
    MIN_MONEYNESS,
};
use crate::detector::AnomalyDetector;
use crate::error::Result;
use crate::store::SnapshotStore;
use crate::types::{ContractType, Greeks, PollOutcome, Snapshot};

// ---------------------------------------------------------------------------
// Expiration selection
// ---------------------------------------------------------------------------

/// Standard monthly expiration: the third Friday of the month.
pub fn third_friday(year: i32, month: u32) -> NaiveDate {
    // The first of any month always exists.
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or_default());
    let days_until_friday = (Weekday::Fri.num_days_from_monday() as i64
        - first.weekday().num_days_from_monday() as i64)
        .rem_euclid(7);
    first + Duration::days(days_until_friday + 14)
}

/// Upcoming monthly expirations on or after `start`, walking forward month by
/// month.
pub fn monthly_expirations(start: NaiveDate, months_ahead: u32) -> Vec<NaiveDate> {
    let mut expirations = Vec::new();
    let mut year = start.year();
    let mut month = start.month();

    for _ in 0..months_ahead {
        let exp = third_friday(year, month);
        if exp >= start {
            expirations.push(exp);
        }
        month += 1;
        if month > 12 {
            month = 1;
            year += 1;
        }
    }

    if expirations.len() < months_ahead as usize {
        expirations.push(third_friday(year, month));
    }

    expirations
}

/// All monthly expirations inside the DTE window, sorted by DTE ascending.
/// Falls back to the nearest future expiration when the window is empty, so
/// a poll always has something to look at.
pub fn find_target_expirations(
    reference: NaiveDate,
    min_dte: i64,
    max_dte: i64,
) -> Vec<(NaiveDate, i64)> {
    let expirations = monthly_expirations(reference, 6);

    let mut in_window = Vec::new();
    let mut nearest_future = None;

    for exp in &expirations {
        let dte = (*exp - reference).num_days();
        if (min_dte..=max_dte).contains(&dte) {
            in_window.push((*exp, dte));
        } else if dte > 0 && nearest_future.is_none() {
            nearest_future = Some((*exp, dte));
        }
    }

    if !in_window.is_empty() {
        in_window.sort_by_key(|(_, dte)| *dte);
        return in_window;
    }
    if let Some(fallback) = nearest_future {
        return vec![fallback];
    }
    expirations
        .first()
        .map(|exp| vec![(*exp, (*exp - reference).num_days())])
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Response transformation
// ---------------------------------------------------------------------------

/// Build a typed snapshot from one unified-snapshot contract object.
/// Returns None for structurally unusable entries (no ticker).
pub fn transform_snapshot(
    contract: &serde_json::Value,
    captured_at: NaiveDateTime,
    captured_date: NaiveDate,
    spot_price: f64,
) -> Option<Snapshot> {
    let details = contract.get("details");
    let session = contract.get("session");
    let greeks = contract.get("greeks");

    let ticker = contract
        .get("ticker")
        .and_then(|t| t.as_str())
        .or_else(|| details.and_then(|d| d.get("ticker")).and_then(|t| t.as_str()))?
        .to_string();

    let strike = details
        .and_then(|d| d.get("strike_price"))
        .and_then(|s| s.as_f64())
        .unwrap_or(0.0);
    let expiration = details
        .and_then(|d| d.get("expiration_date"))
        .and_then(|e| e.as_str())
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())?;

    let dte = (expiration - captured_date).num_days();
    let moneyness = if spot_price > 0.0 && strike > 0.0 {
        Some(strike / spot_price)
    } else {
        None
    };

    let contract_type = details
        .and_then(|d| d.get("contract_type"))
        .and_then(|c| c.as_str())
        .map(ContractType::parse)
        .unwrap_or(ContractType::Put);

    let session_f64 = |key: &str| session.and_then(|s| s.get(key)).and_then(|v| v.as_f64());
    let greek_f64 = |key: &str| greeks.and_then(|g| g.get(key)).and_then(|v| v.as_f64());

    Some(Snapshot {
        ticker,
        captured_at,
        captured_date,
        expiration,
        strike,
        contract_type,
        spot_price: Some(spot_price),
        moneyness,
        dte: Some(dte),
        volume_cumulative: session
            .and_then(|s| s.get("volume"))
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
            .unwrap_or(0),
        volume_delta: None,
        open_interest: contract
            .get("open_interest")
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))),
        close_price: session_f64("close"),
        high_price: session_f64("high"),
        low_price: session_f64("low"),
        vwap: session_f64("vwap"),
        transactions: session
            .and_then(|s| s.get("transactions"))
            .and_then(|v| v.as_i64()),
        greeks: Greeks {
            delta: greek_f64("delta"),
            gamma: greek_f64("gamma"),
            theta: greek_f64("theta"),
            vega: greek_f64("vega"),
            implied_vol: contract.get("implied_volatility").and_then(|v| v.as_f64()),
        },
        market_status: contract
            .get("market_status")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        timeframe: contract
            .get("timeframe")
            .and_then(|v| v.as_str())
            .map(str::to_string),
    })
}

// ---------------------------------------------------------------------------
// Poll execution
// ---------------------------------------------------------------------------

pub struct PollExecutor<C> {
    client: C,
    store: SnapshotStore,
    detector: AnomalyDetector,
    detection_enabled: bool,
    alert_storage_enabled: bool,
}

impl<C: MarketDataClient> PollExecutor<C> {
    pub fn new(client: C, store: SnapshotStore, cfg: &Config) -> Self {
        let detector = AnomalyDetector::new(store.clone());
        Self {
            client,
            store,
            detector,
            detection_enabled: cfg.detection_enabled,
            alert_storage_enabled: cfg.alert_storage_enabled,
        }
    }

    /// Spot price via a sample contract: the chain endpoint carries the
    /// underlying value only on unified snapshots, so fetch one contract and
    /// read it off.
    async fn fetch_spot_price(&self) -> std::result::Result<f64, String> {
        let chain = self
            .client
            .option_chain(None, None, None, 1)
            .await
            .map_err(|e| format!("spot discovery chain error: {e}"))?;

        let sample_ticker = chain
            .first()
            .and_then(|c| c.get("details"))
            .and_then(|d| d.get("ticker"))
            .and_then(|t| t.as_str())
            .map(str::to_string)
            .ok_or_else(|| "no contracts found for spot price discovery".to_string())?;

        let sample = self
            .client
            .unified_snapshot(&[sample_ticker])
            .await
            .map_err(|e| format!("spot discovery snapshot error: {e}"))?;

        sample
            .first()
            .and_then(|c| c.get("underlying_asset"))
            .and_then(|u| u.get("value"))
            .and_then(|v| v.as_f64())
            .ok_or_else(|| "spot price not present in sample snapshot".to_string())
    }

    /// Discover tickers for one expiration, keeping only strikes in band.
    async fn discover_expiration(
        &self,
        expiration: NaiveDate,
        min_strike: f64,
        max_strike: f64,
    ) -> std::result::Result<Vec<String>, String> {
        let chain = self
            .client
            .option_chain(Some(expiration), Some(min_strike), Some(max_strike), 250)
            .await
            .map_err(|e| format!("chain error for {expiration}: {e}"))?;

        let tickers = chain
            .iter()
            .filter_map(|contract| {
                let details = contract.get("details")?;
                let strike = details.get("strike_price")?.as_f64()?;
                let ticker = details.get("ticker")?.as_str()?;
                (min_strike <= strike && strike <= max_strike).then(|| ticker.to_string())
            })
            .collect();
        Ok(tickers)
    }

    async fn fetch_unified_batched(&self, tickers: &[String]) -> Result<Vec<serde_json::Value>> {
        let mut results = Vec::with_capacity(tickers.len());
        let chunks: Vec<_> = tickers.chunks(MAX_TICKERS_PER_REQUEST).collect();
        let batches = chunks.len();

        for (i, chunk) in chunks.into_iter().enumerate() {
            info!("[POLL] fetching batch {}/{}: {} tickers", i + 1, batches, chunk.len());
            let mut batch = self.client.unified_snapshot(chunk).await?;
            results.append(&mut batch);
            if i + 1 < batches {
                tokio::time::sleep(std::time::Duration::from_millis(BATCH_PACING_MS)).await;
            }
        }
        Ok(results)
    }

    /// Run one full poll cycle at the given capture instant (exchange-local,
    /// truncated to seconds).
    pub async fn run(&self, captured_at: NaiveDateTime) -> PollOutcome {
        let captured_date = captured_at.date();
        info!("[POLL] starting cycle at {captured_at}");

        let targets = find_target_expirations(captured_date, MIN_DTE, MAX_DTE);
        if targets.is_empty() {
            return PollOutcome::failed("no expirations found in target DTE window");
        }
        for (exp, dte) in &targets {
            info!("[POLL] target expiration {exp} ({dte} DTE)");
        }

        let spot_price = match self.fetch_spot_price().await {
            Ok(p) => p,
            Err(e) => return PollOutcome::failed(e),
        };

        let min_strike = spot_price * MIN_MONEYNESS;
        let max_strike = spot_price * MAX_MONEYNESS;
        info!(
            "[POLL] spot {spot_price:.2} | strike band {min_strike:.0}-{max_strike:.0}"
        );

        // Per-expiration discovery; a failed expiration is skipped, the poll
        // only fails outright when nothing at all was discovered.
        let mut all_tickers: Vec<String> = Vec::new();
        let mut errors: Vec<String> = Vec::new();

        for (exp, dte) in &targets {
            match self.discover_expiration(*exp, min_strike, max_strike).await {
                Ok(tickers) => {
                    info!("[POLL] {exp} ({dte} DTE): {} contracts", tickers.len());
                    all_tickers.extend(tickers);
                }
                Err(e) => {
                    warn!("[POLL] {e}");
                    errors.push(e);
                }
            }
        }

        if all_tickers.is_empty() {
            if errors.is_empty() {
                return PollOutcome::failed("no contracts found in target strike band");
            }
            return PollOutcome::failed(format!("all expirations failed: {}", errors.join("; ")));
        }

        let unified = match self.fetch_unified_batched(&all_tickers).await {
            Ok(results) => results,
            Err(e) => return PollOutcome::failed(format!("unified snapshot batch error: {e}")),
        };
        if unified.is_empty() {
            return PollOutcome::failed("unified snapshot returned no results");
        }

        let mut snapshots: Vec<Snapshot> = unified
            .iter()
            .filter_map(|c| transform_snapshot(c, captured_at, captured_date, spot_price))
            .collect();

        let stored = match self.store.ingest_batch(&mut snapshots).await {
            Ok(n) => n,
            Err(e) => return PollOutcome::failed(format!("database error: {e}")),
        };
        info!("[POLL OK] stored {stored} snapshots across {} expirations", targets.len());

        if self.detection_enabled {
            match self.detector.evaluate(&snapshots, captured_at).await {
                Ok(candidates) => {
                    if candidates.is_empty() {
                        info!("[DETECTION] no anomalies detected");
                    }
                    for candidate in &candidates {
                        warn!(
                            "[ALERT] strike {} ({}) | vol {} (+{}) | ${:.0} | {}",
                            candidate.strike,
                            candidate.expiration,
                            candidate.volume_current,
                            candidate.volume_delta,
                            candidate.notional,
                            candidate.summary,
                        );
                        if self.alert_storage_enabled {
                            if let Err(e) = self.store.record_alert(candidate).await {
                                warn!("[ALERT] failed to store alert: {e}");
                            }
                        }
                    }
                }
                Err(e) => warn!("[DETECTION] evaluation failed: {e}"),
            }
        }

        PollOutcome::ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::snapshot_store::tests::{date, memory_store};

    #[test]
    fn third_friday_known_months() {
        assert_eq!(third_friday(2025, 12), date(2025, 12, 19));
        assert_eq!(third_friday(2026, 1), date(2026, 1, 16));
        assert_eq!(third_friday(2026, 3), date(2026, 3, 20));
    }

    #[test]
    fn target_expirations_span_window_sorted_by_dte() {
        let targets = find_target_expirations(date(2025, 12, 8), MIN_DTE, MAX_DTE);
        let dates: Vec<_> = targets.iter().map(|(d, _)| *d).collect();
        assert_eq!(
            dates,
            vec![date(2025, 12, 19), date(2026, 1, 16), date(2026, 2, 20)]
        );
        assert_eq!(targets[0].1, 11);
        assert!(targets.windows(2).all(|w| w[0].1 <= w[1].1));
    }

    #[test]
    fn empty_window_falls_back_to_nearest_future() {
        // A 1..=2 DTE window on Dec 8 contains no monthly expiration, so the
        // nearest future one (Dec 19) is returned instead.
        let targets = find_target_expirations(date(2025, 12, 8), 1, 2);
        assert_eq!(targets, vec![(date(2025, 12, 19), 11)]);
    }

    #[test]
    fn transform_reads_nested_provider_fields() {
        let contract = serde_json::json!({
            "ticker": "O:SPX260320P05000000",
            "details": {
                "strike_price": 5000.0,
                "expiration_date": "2026-03-20",
                "contract_type": "put"
            },
            "session": {
                "volume": 420,
                "close": 4.2,
                "high": 4.5,
                "low": 3.9,
                "vwap": 4.1,
                "transactions": 37
            },
            "greeks": { "delta": -0.04, "gamma": 0.0001, "theta": -0.2, "vega": 0.9 },
            "implied_volatility": 0.31,
            "open_interest": 1200,
            "market_status": "open",
            "timeframe": "DELAYED"
        });

        let captured_at = date(2025, 12, 8).and_hms_opt(11, 30, 0).unwrap();
        let snap = transform_snapshot(&contract, captured_at, date(2025, 12, 8), 6800.0)
            .expect("usable contract");

        assert_eq!(snap.ticker, "O:SPX260320P05000000");
        assert_eq!(snap.dte, Some(102));
        assert_eq!(snap.volume_cumulative, 420);
        assert_eq!(snap.contract_type, ContractType::Put);
        assert!((snap.moneyness.unwrap() - 5000.0 / 6800.0).abs() < 1e-12);
        assert_eq!(snap.greeks.delta, Some(-0.04));
        assert_eq!(snap.greeks.implied_vol, Some(0.31));
        assert_eq!(snap.open_interest, Some(1200));
    }

    #[test]
    fn transform_rejects_contract_without_ticker() {
        let contract = serde_json::json!({
            "details": { "strike_price": 5000.0, "expiration_date": "2026-03-20" }
        });
        let captured_at = date(2025, 12, 8).and_hms_opt(11, 30, 0).unwrap();
        assert!(transform_snapshot(&contract, captured_at, date(2025, 12, 8), 6800.0).is_none());
    }

    /// Canned provider: one contract in the band, plus the spot sample.
    struct MockClient;

    impl MarketDataClient for MockClient {
        async fn option_chain(
            &self,
            expiration: Option<NaiveDate>,
            _strike_gte: Option<f64>,
            _strike_lte: Option<f64>,
            _limit: usize,
        ) -> crate::error::Result<Vec<serde_json::Value>> {
            // Expiration-less calls are spot discovery; filtered calls get
            // one in-band contract named after the requested expiration.
            let exp = expiration.unwrap_or_else(|| NaiveDate::from_ymd_opt(2026, 3, 20).unwrap());
            let contract = serde_json::json!({
                "details": {
                    "ticker": format!("O:SPXW{}P05000000", exp.format("%y%m%d")),
                    "strike_price": 5000.0,
                    "expiration_date": exp.format("%Y-%m-%d").to_string(),
                    "contract_type": "put"
                }
            });
            Ok(vec![contract])
        }

        async fn unified_snapshot(
            &self,
            tickers: &[String],
        ) -> crate::error::Result<Vec<serde_json::Value>> {
            Ok(tickers
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "ticker": t,
                        "details": {
                            "strike_price": 5000.0,
                            "expiration_date": "2026-03-20",
                            "contract_type": "put"
                        },
                        "session": { "volume": 420, "close": 4.2 },
                        "underlying_asset": { "value": 6800.0 }
                    })
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn poll_cycle_stores_snapshots_end_to_end() {
        let store = memory_store().await;
        let cfg = Config {
            api_key: "test".to_string(),
            api_base_url: "http://localhost".to_string(),
            log_level: "info".to_string(),
            db_path: ":memory:".to_string(),
            api_port: 0,
            poll_interval_minutes: 15,
            detection_enabled: true,
            alert_storage_enabled: false,
        };
        let executor = PollExecutor::new(MockClient, store.clone(), &cfg);

        let captured_at = date(2025, 12, 8).and_hms_opt(11, 30, 0).unwrap();
        let outcome = executor.run(captured_at).await;

        assert!(outcome.error.is_none(), "poll failed: {:?}", outcome.error);
        // One discovered contract per in-window expiration (Dec, Jan, Feb).
        assert_eq!(outcome.stored, 3);

        let latest = store
            .latest_snapshot("O:SPXW251219P05000000", date(2025, 12, 8))
            .await
            .unwrap()
            .expect("row stored");
        assert_eq!(latest.volume_cumulative, Some(420));
        assert_eq!(latest.volume_delta, Some(420));
        assert_eq!(latest.dte, Some(102));
    }
}
