//! Volume anomaly detection over a freshly ingested poll batch.
//!
//! Each contract that clears the volume and notional floors is compared
//! against yesterday's activity, found through a tiered fallback across the
//! intraday and daily ledgers. Three independent flags can fire; the alert
//! score is simply how many fired.

use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use tracing::info;

use crate::config::{thresholds, CONTRACT_MULTIPLIER};
use crate::error::Result;
use crate::store::SnapshotStore;
use crate::types::{AlertCandidate, AnomalyFlag, BaselineSource, Snapshot};

pub struct AnomalyDetector {
    store: SnapshotStore,
}

impl AnomalyDetector {
    pub fn new(store: SnapshotStore) -> Self {
        Self { store }
    }

    /// Find yesterday's comparison volume, trying sources in priority order:
    /// intraday same hour ±1, yesterday EOD, intraday any hour, then EOD two
    /// days back (covers weekends). "Yesterday" is a calendar day — on a
    /// Monday the two-days-back tier is usually the one that hits.
    pub async fn baseline_volume(
        &self,
        ticker: &str,
        current_hour: u32,
        today: NaiveDate,
    ) -> Result<(Option<i64>, BaselineSource)> {
        let yesterday = today - Duration::days(1);
        let two_days_ago = today - Duration::days(2);

        if let Some(v) = self
            .store
            .intraday_volume_near_hour(ticker, yesterday, current_hour)
            .await?
        {
            return Ok((Some(v), BaselineSource::YesterdayHour));
        }

        if let Some(v) = self.store.daily_volume(ticker, yesterday).await? {
            return Ok((Some(v), BaselineSource::YesterdayEod));
        }

        if let Some(v) = self.store.latest_intraday_volume(ticker, yesterday).await? {
            return Ok((Some(v), BaselineSource::YesterdayAny));
        }

        if let Some(v) = self.store.daily_volume(ticker, two_days_ago).await? {
            return Ok((Some(v), BaselineSource::TwoDaysAgoEod));
        }

        Ok((None, BaselineSource::NoData))
    }

    /// Evaluate one poll batch. Returns the contracts judged anomalous;
    /// persisting them is the caller's decision.
    pub async fn evaluate(
        &self,
        snapshots: &[Snapshot],
        captured_at: NaiveDateTime,
    ) -> Result<Vec<AlertCandidate>> {
        let current_hour = captured_at.hour();
        let today = captured_at.date();

        let mut candidates = Vec::new();
        let mut source_counts = [0usize; 5];
        let mut evaluated = 0usize;

        for snap in snapshots {
            let volume_today = snap.volume_cumulative;
            if volume_today < thresholds::VOLUME_FLOOR {
                continue;
            }

            let close_price = snap.close_price.unwrap_or(0.0);
            let notional = volume_today as f64 * close_price * CONTRACT_MULTIPLIER;
            if notional < thresholds::NOTIONAL_FLOOR {
                continue;
            }

            evaluated += 1;

            let (baseline, source) =
                self.baseline_volume(&snap.ticker, current_hour, today).await?;
            source_counts[source_index(source)] += 1;

            // With no comparison data the baseline is treated as zero but the
            // dormancy flag is suppressed — absence of history is not
            // evidence of dormancy.
            let volume_yesterday = baseline.unwrap_or(0);
            let has_history = source != BaselineSource::NoData;

            let volume_delta = volume_today - volume_yesterday;

            let mut flags = Vec::new();
            if volume_delta > thresholds::DELTA {
                flags.push(AnomalyFlag::Delta);
            }
            if volume_yesterday > 0 && volume_today > volume_yesterday * thresholds::MULTIPLIER {
                flags.push(AnomalyFlag::Multiplier);
            }
            if has_history && volume_yesterday == 0 && volume_today > thresholds::DORMANCY {
                flags.push(AnomalyFlag::Dormancy);
            }

            if flags.is_empty() {
                continue;
            }

            let delta_str = if volume_yesterday > 0 {
                let pct = (volume_delta as f64 / volume_yesterday as f64) * 100.0;
                format!("+{volume_delta} ({pct:.0}%)")
            } else {
                format!("+{volume_delta} (from 0)")
            };
            let flag_list = flags
                .iter()
                .map(|f| f.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            let summary = format!(
                "Vol {volume_today} vs {volume_yesterday} yesterday ({delta_str}). \
                 ${notional:.0} notional. Flags: {flag_list}"
            );

            candidates.push(AlertCandidate {
                triggered_at: captured_at,
                ticker: snap.ticker.clone(),
                expiration: snap.expiration,
                strike: snap.strike,
                contract_type: snap.contract_type,
                moneyness: snap.moneyness,
                dte: snap.dte,
                volume_current: volume_today,
                volume_baseline: volume_yesterday,
                volume_delta,
                notional,
                flags,
                baseline_source: source,
                summary,
            });
        }

        if evaluated > 0 {
            info!(
                "[COMPARISON] {} contracts evaluated | yesterday_hour={} yesterday_eod={} \
                 yesterday_any={} 2_days_ago_eod={} none={}",
                evaluated,
                source_counts[0],
                source_counts[1],
                source_counts[2],
                source_counts[3],
                source_counts[4],
            );
        }

        Ok(candidates)
    }
}

fn source_index(source: BaselineSource) -> usize {
    match source {
        BaselineSource::YesterdayHour => 0,
        BaselineSource::YesterdayEod => 1,
        BaselineSource::YesterdayAny => 2,
        BaselineSource::TwoDaysAgoEod => 3,
        BaselineSource::NoData => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::snapshot_store::tests::{date, memory_store, snap};
    use crate::types::ContractType;
    use chrono::NaiveDate;

    const TICKER: &str = "O:SPX260320P05000000";

    fn at(day: NaiveDate, hour: u32) -> NaiveDateTime {
        day.and_hms_opt(hour, 30, 0).unwrap()
    }

    /// A snapshot that clears both prefilters (volume 300, $126k notional).
    fn active_snap(day: NaiveDate, volume: i64) -> Snapshot {
        let mut s = snap(TICKER, day, 11, 30, volume);
        s.close_price = Some(4.2);
        s
    }

    #[tokio::test]
    async fn delta_and_multiplier_fire_together() {
        let store = memory_store().await;
        let yesterday = date(2025, 12, 8);
        let today = date(2025, 12, 9);

        // Yesterday closed at 40 contracts, consolidated to daily history.
        let mut batch = vec![snap(TICKER, yesterday, 15, 45, 40)];
        store.ingest_batch(&mut batch).await.unwrap();
        store.consolidate(yesterday).await.unwrap();
        store.prune_intraday(0, today).await.unwrap();

        let detector = AnomalyDetector::new(store);
        let candidates = detector
            .evaluate(&[active_snap(today, 300)], at(today, 11))
            .await
            .unwrap();

        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        // 300 − 40 = 260 > 200, and 300 > 40 × 5.
        assert_eq!(c.flags, vec![AnomalyFlag::Delta, AnomalyFlag::Multiplier]);
        assert_eq!(c.baseline_source, BaselineSource::YesterdayEod);
        assert_eq!(c.volume_delta, 260);
        assert_eq!(c.score(), 2.0);
    }

    #[tokio::test]
    async fn dormancy_requires_genuine_zero_history() {
        let store = memory_store().await;
        let yesterday = date(2025, 12, 8);
        let today = date(2025, 12, 9);

        // A real record of zero volume yesterday.
        let mut batch = vec![snap(TICKER, yesterday, 15, 45, 0)];
        store.ingest_batch(&mut batch).await.unwrap();
        store.consolidate(yesterday).await.unwrap();
        store.prune_intraday(0, today).await.unwrap();

        let detector = AnomalyDetector::new(store);
        let candidates = detector
            .evaluate(&[active_snap(today, 150)], at(today, 11))
            .await
            .unwrap();

        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].flags.contains(&AnomalyFlag::Dormancy));
        assert_eq!(candidates[0].baseline_source, BaselineSource::YesterdayEod);
    }

    #[tokio::test]
    async fn no_history_suppresses_dormancy_but_not_delta() {
        let store = memory_store().await;
        let today = date(2025, 12, 9);

        let detector = AnomalyDetector::new(store);
        let candidates = detector
            .evaluate(&[active_snap(today, 300)], at(today, 11))
            .await
            .unwrap();

        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.baseline_source, BaselineSource::NoData);
        // 300 − 0 > 200 fires; dormancy stays suppressed despite baseline 0.
        assert_eq!(c.flags, vec![AnomalyFlag::Delta]);
    }

    #[tokio::test]
    async fn intraday_hour_baseline_outranks_eod() {
        let store = memory_store().await;
        let yesterday = date(2025, 12, 8);
        let today = date(2025, 12, 9);

        // Yesterday 11:30 intraday at 50 and an EOD record at 500.
        let mut batch = vec![snap(TICKER, yesterday, 11, 30, 50)];
        store.ingest_batch(&mut batch).await.unwrap();
        let mut batch = vec![snap(TICKER, yesterday, 15, 45, 500)];
        store.ingest_batch(&mut batch).await.unwrap();
        store.consolidate(yesterday).await.unwrap();

        let detector = AnomalyDetector::new(store);
        let (volume, source) = detector
            .baseline_volume(TICKER, 11, today)
            .await
            .unwrap();
        assert_eq!(volume, Some(50));
        assert_eq!(source, BaselineSource::YesterdayHour);
    }

    #[tokio::test]
    async fn holiday_gap_falls_back_to_two_days_ago() {
        let store = memory_store().await;
        // Wednesday before Thanksgiving; Thursday is closed, Friday polls.
        let wednesday = date(2025, 11, 26);
        let friday = date(2025, 11, 28);

        let mut batch = vec![snap(TICKER, wednesday, 15, 45, 80)];
        store.ingest_batch(&mut batch).await.unwrap();
        store.consolidate(wednesday).await.unwrap();
        store.prune_intraday(0, friday).await.unwrap();

        let detector = AnomalyDetector::new(store);
        let (volume, source) = detector
            .baseline_volume(TICKER, 11, friday)
            .await
            .unwrap();
        assert_eq!(volume, Some(80));
        assert_eq!(source, BaselineSource::TwoDaysAgoEod);
    }

    #[tokio::test]
    async fn prefilters_skip_quiet_and_cheap_contracts() {
        let store = memory_store().await;
        let today = date(2025, 12, 9);
        let detector = AnomalyDetector::new(store);

        // Below the volume floor.
        let quiet = active_snap(today, 50);
        // Above the volume floor but $3k notional.
        let mut cheap = active_snap(today, 300);
        cheap.close_price = Some(0.10);

        let candidates = detector
            .evaluate(&[quiet, cheap], at(today, 11))
            .await
            .unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn contract_type_survives_candidate() {
        assert_eq!(ContractType::parse("PUT"), ContractType::Put);
        assert_eq!(ContractType::parse("call"), ContractType::Call);
    }
}
