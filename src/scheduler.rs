//! Calendar-aware control loop: polls during the session, runs EOD after the
//! close, and sleeps through weekends and holidays.
//!
//! The phase is re-derivable from the wall clock alone, so a restart at any
//! instant recovers the right behavior. Every sleep races against the
//! cancellation token — shutdown is responsive even mid-overnight-sleep.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Timelike};
use chrono_tz::Tz;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::calendar::{now_et, MarketCalendar};
use crate::client::MarketDataClient;
use crate::config::{
    Config, LOOP_ERROR_COOLDOWN_SECS, MAX_POLL_RETRIES, RETRY_DELAY_SECS,
};
use crate::eod::ConsolidationJob;
use crate::poller::PollExecutor;
use crate::store::SnapshotStore;
use crate::types::PollOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Weekend,
    Holiday,
    WaitingForOpen,
    MarketOpen,
    EodPending,
    EodRunning,
    MarketClosed,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Weekend => "WEEKEND",
            Phase::Holiday => "HOLIDAY",
            Phase::WaitingForOpen => "WAITING_FOR_OPEN",
            Phase::MarketOpen => "MARKET_OPEN",
            Phase::EodPending => "EOD_PENDING",
            Phase::EodRunning => "EOD_RUNNING",
            Phase::MarketClosed => "MARKET_CLOSED",
        };
        write!(f, "{s}")
    }
}

/// Derive the phase purely from an instant. Used at startup, after every
/// overnight sleep, and implicitly on restart recovery.
pub fn determine_phase(now: DateTime<Tz>, calendar: &MarketCalendar) -> Phase {
    let today = now.date_naive();

    if calendar.is_weekend(today) {
        return Phase::Weekend;
    }
    if calendar.is_holiday(today) {
        return Phase::Holiday;
    }

    if now < calendar.first_poll_time(today) {
        Phase::WaitingForOpen
    } else if now < calendar.market_close(today) {
        Phase::MarketOpen
    } else if now < calendar.eod_time(today) {
        Phase::EodPending
    } else {
        Phase::MarketClosed
    }
}

/// Per-day counters, reset on date rollover.
#[derive(Debug)]
pub struct DayState {
    pub date: chrono::NaiveDate,
    pub poll_count: u32,
    pub last_poll_at: Option<DateTime<Tz>>,
    pub eod_completed: bool,
}

impl DayState {
    pub fn new(date: chrono::NaiveDate) -> Self {
        Self { date, poll_count: 0, last_poll_at: None, eod_completed: false }
    }
}

pub struct Scheduler<C> {
    calendar: MarketCalendar,
    poller: PollExecutor<C>,
    eod: ConsolidationJob,
    poll_interval: Duration,
    cancel: CancellationToken,
}

impl<C: MarketDataClient> Scheduler<C> {
    pub fn new(client: C, store: SnapshotStore, cfg: &Config, cancel: CancellationToken) -> Self {
        Self {
            calendar: MarketCalendar::new(),
            poller: PollExecutor::new(client, store.clone(), cfg),
            eod: ConsolidationJob::new(store),
            poll_interval: Duration::minutes(cfg.poll_interval_minutes),
            cancel,
        }
    }

    pub async fn run(self) {
        let now = now_et();
        let today = now.date_naive();

        info!("[SCHED] scheduler starting at {} ET", now.format("%Y-%m-%d %H:%M:%S"));
        info!("[SCHED] poll interval: {} minutes", self.poll_interval.num_minutes());
        if self.calendar.is_early_close(today) {
            info!("[SCHED] today is an early close day (1:00 PM ET)");
        }
        if !self.calendar.covers(today) {
            warn!("[SCHED] holiday tables do not cover {today}; treating weekdays as trading days");
        }

        let mut phase = determine_phase(now, &self.calendar);
        info!("[SCHED] initial phase: {phase}");

        let mut day = DayState::new(today);

        while !self.cancel.is_cancelled() {
            let now = now_et();
            let today = now.date_naive();

            if day.date != today {
                info!("[SCHED] date changed: {} -> {}", day.date, today);
                day = DayState::new(today);
                if self.calendar.is_early_close(today) {
                    info!("[SCHED] today is an early close day (1:00 PM ET)");
                }
                if !self.calendar.covers(today) {
                    warn!("[SCHED] holiday tables do not cover {today}; treating weekdays as trading days");
                }
            }

            let next = match phase {
                Phase::Weekend | Phase::Holiday | Phase::MarketClosed => {
                    self.handle_off_hours(phase, now).await
                }
                Phase::WaitingForOpen => self.handle_waiting_for_open(now).await,
                Phase::MarketOpen => self.handle_market_open(now, &mut day).await,
                Phase::EodPending => self.handle_eod_pending(now).await,
                Phase::EodRunning => self.handle_eod_running(now, &mut day).await,
            };
            if next != phase {
                info!("[SCHED] phase: {phase} -> {next}");
                phase = next;
            }
        }

        info!(
            "[SCHED] shutting down: {} polls today, eod_completed={}",
            day.poll_count, day.eod_completed
        );
    }

    /// Weekend, holiday, or post-EOD evening: sleep until the next trading
    /// morning, then re-derive the phase from the clock.
    async fn handle_off_hours(&self, phase: Phase, now: DateTime<Tz>) -> Phase {
        let today = now.date_naive();
        let next_day = self.calendar.next_trading_day(today);
        let wake = self.calendar.next_wake_time(today);

        let until_wake = (wake - now).to_std().unwrap_or_default();
        if until_wake.is_zero() {
            // Should not happen on a sane clock; avoid spinning if it does.
            warn!("[SCHED] {phase} wake time {wake} is not in the future");
            self.sleep_interruptible(StdDuration::from_secs(LOOP_ERROR_COOLDOWN_SECS)).await;
            return determine_phase(now_et(), &self.calendar);
        }

        info!(
            "[SCHED] {phase}: next trading day {next_day}, sleeping {:.1}h until {} ET",
            until_wake.as_secs_f64() / 3600.0,
            wake.format("%Y-%m-%d %H:%M"),
        );
        self.sleep_interruptible(until_wake).await;
        determine_phase(now_et(), &self.calendar)
    }

    async fn handle_waiting_for_open(&self, now: DateTime<Tz>) -> Phase {
        let today = now.date_naive();
        let first_poll = self.calendar.first_poll_time(today);

        if now >= first_poll {
            info!("[SCHED] market open and data delay elapsed, starting polling");
            return Phase::MarketOpen;
        }

        let remaining = (first_poll - now).to_std().unwrap_or_default();
        info!(
            "[SCHED] waiting for market; first poll at {} ET ({} min)",
            first_poll.format("%H:%M"),
            remaining.as_secs() / 60,
        );
        self.sleep_interruptible(remaining.min(StdDuration::from_secs(60))).await;
        Phase::WaitingForOpen
    }

    async fn handle_market_open(&self, now: DateTime<Tz>, day: &mut DayState) -> Phase {
        let today = now.date_naive();
        let market_close = self.calendar.market_close(today);

        if now >= market_close {
            info!("[SCHED] market closed at {} ET", market_close.format("%H:%M"));
            return Phase::EodPending;
        }

        let due = match day.last_poll_at {
            None => true,
            Some(last) => now >= last + self.poll_interval,
        };

        if due {
            day.poll_count += 1;
            info!("[SCHED] running poll #{}", day.poll_count);

            let outcome = self.run_poll_with_retry().await;
            match outcome.error {
                None => info!("[POLL OK] stored {} contracts", outcome.stored),
                Some(e) => error!("[POLL FAILED] {e}"),
            }

            let finished = now_et();
            day.last_poll_at = Some(finished);

            let next_poll = finished + self.poll_interval;
            if next_poll < market_close {
                info!("[SCHED] next poll at {} ET", next_poll.format("%H:%M"));
            } else {
                info!(
                    "[SCHED] no more polls today; market closes at {} ET",
                    market_close.format("%H:%M")
                );
            }
        } else if let Some(last) = day.last_poll_at {
            let next_poll = last + self.poll_interval;
            let sleep_until = next_poll.min(market_close);
            if let Ok(remaining) = (sleep_until - now).to_std() {
                self.sleep_interruptible(remaining.min(StdDuration::from_secs(60))).await;
            }
        }

        Phase::MarketOpen
    }

    async fn handle_eod_pending(&self, now: DateTime<Tz>) -> Phase {
        let today = now.date_naive();
        let eod_time = self.calendar.eod_time(today);

        if now >= eod_time {
            info!("[SCHED] settle delay elapsed, starting EOD consolidation");
            return Phase::EodRunning;
        }

        let remaining = (eod_time - now).to_std().unwrap_or_default();
        info!(
            "[SCHED] EOD pending; will run at {} ET ({} min remaining)",
            eod_time.format("%H:%M"),
            remaining.as_secs() / 60,
        );
        self.sleep_interruptible(remaining.min(StdDuration::from_secs(60))).await;
        Phase::EodPending
    }

    async fn handle_eod_running(&self, now: DateTime<Tz>, day: &mut DayState) -> Phase {
        if day.eod_completed {
            return Phase::MarketClosed;
        }

        let stats = self.eod.run(now.date_naive()).await;
        if stats.clean() {
            info!(
                "[EOD OK] consolidated {} contracts, pruned {} intraday / {} daily",
                stats.consolidated, stats.intraday_pruned, stats.daily_pruned
            );
        } else {
            error!("[EOD FAILED] {}", stats.errors.join("; "));
        }

        day.eod_completed = true;
        Phase::MarketClosed
    }

    /// Poll with bounded retries. Each attempt captures a fresh timestamp;
    /// cancellation is honored at retry boundaries.
    async fn run_poll_with_retry(&self) -> PollOutcome {
        let mut last_error = String::new();

        for attempt in 1..=MAX_POLL_RETRIES {
            // Whole-second capture timestamps keep SQLite text ordering exact.
            let captured_at = now_et().naive_local().with_nanosecond(0).unwrap_or_else(|| now_et().naive_local());
            let outcome = self.poller.run(captured_at).await;

            match outcome.error {
                None => return outcome,
                Some(e) => {
                    warn!("[SCHED] poll attempt {attempt}/{MAX_POLL_RETRIES} failed: {e}");
                    last_error = e;
                }
            }

            if attempt < MAX_POLL_RETRIES {
                info!("[SCHED] retrying in {RETRY_DELAY_SECS} seconds");
                if self.sleep_interruptible(StdDuration::from_secs(RETRY_DELAY_SECS)).await {
                    return PollOutcome::failed("shutdown requested during retry wait");
                }
            }
        }

        PollOutcome::failed(format!(
            "all {MAX_POLL_RETRIES} attempts failed; last error: {last_error}"
        ))
    }

    /// Sleep racing against cancellation. Returns true when cancelled.
    async fn sleep_interruptible(&self, duration: StdDuration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => true,
            _ = tokio::time::sleep(duration) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::EXCHANGE_TZ;
    use chrono::{Datelike, NaiveDate, TimeZone};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn at(date: NaiveDate, hour: u32, minute: u32) -> DateTime<Tz> {
        EXCHANGE_TZ
            .with_ymd_and_hms(date.year(), date.month(), date.day(), hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn saturday_is_weekend_phase() {
        let cal = MarketCalendar::new();
        assert_eq!(determine_phase(at(d(2025, 12, 6), 11, 0), &cal), Phase::Weekend);
    }

    #[test]
    fn holiday_phase_on_thanksgiving() {
        let cal = MarketCalendar::new();
        assert_eq!(determine_phase(at(d(2025, 11, 27), 11, 0), &cal), Phase::Holiday);
    }

    #[test]
    fn trading_day_phases_by_time() {
        let cal = MarketCalendar::new();
        let monday = d(2025, 12, 8);

        // Before 09:45 the first poll's data delay has not elapsed.
        assert_eq!(determine_phase(at(monday, 9, 40), &cal), Phase::WaitingForOpen);
        assert_eq!(determine_phase(at(monday, 11, 0), &cal), Phase::MarketOpen);
        assert_eq!(determine_phase(at(monday, 15, 59), &cal), Phase::MarketOpen);
        // Between close and close+30min the EOD settle delay is pending.
        assert_eq!(determine_phase(at(monday, 16, 10), &cal), Phase::EodPending);
        assert_eq!(determine_phase(at(monday, 16, 45), &cal), Phase::MarketClosed);
    }

    #[test]
    fn early_close_shifts_afternoon_phases() {
        let cal = MarketCalendar::new();
        let christmas_eve = d(2025, 12, 24);

        assert_eq!(determine_phase(at(christmas_eve, 12, 59), &cal), Phase::MarketOpen);
        assert_eq!(determine_phase(at(christmas_eve, 13, 10), &cal), Phase::EodPending);
        // 14:00 on an early close day is past close + settle delay.
        assert_eq!(determine_phase(at(christmas_eve, 14, 0), &cal), Phase::MarketClosed);
    }

    struct FailingClient;

    impl crate::client::MarketDataClient for FailingClient {
        async fn option_chain(
            &self,
            _expiration: Option<NaiveDate>,
            _strike_gte: Option<f64>,
            _strike_lte: Option<f64>,
            _limit: usize,
        ) -> crate::error::Result<Vec<serde_json::Value>> {
            Err(crate::error::AppError::Upstream("provider down".to_string()))
        }

        async fn unified_snapshot(
            &self,
            _tickers: &[String],
        ) -> crate::error::Result<Vec<serde_json::Value>> {
            Err(crate::error::AppError::Upstream("provider down".to_string()))
        }
    }

    fn test_config() -> crate::config::Config {
        crate::config::Config {
            api_key: "test".to_string(),
            api_base_url: "http://localhost".to_string(),
            log_level: "info".to_string(),
            db_path: ":memory:".to_string(),
            api_port: 0,
            poll_interval_minutes: 15,
            detection_enabled: false,
            alert_storage_enabled: false,
        }
    }

    #[tokio::test]
    async fn retry_exhaustion_reports_last_error() {
        // Pause time only after the store exists: with a paused clock, sqlx's
        // pool-acquire timeout auto-advances past the blocking sqlite connect.
        let store = crate::store::snapshot_store::tests::memory_store().await;
        tokio::time::pause();
        let scheduler = Scheduler::new(FailingClient, store, &test_config(), CancellationToken::new());

        let outcome = scheduler.run_poll_with_retry().await;
        assert_eq!(outcome.stored, 0);
        let err = outcome.error.expect("all attempts failed");
        assert!(err.contains("all 3 attempts failed"), "unexpected error: {err}");
        assert!(err.contains("provider down"));
    }

    #[tokio::test]
    async fn cancellation_short_circuits_retry_wait() {
        let store = crate::store::snapshot_store::tests::memory_store().await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let scheduler = Scheduler::new(FailingClient, store, &test_config(), cancel);

        // First attempt fails, then the retry wait observes cancellation.
        let outcome = scheduler.run_poll_with_retry().await;
        assert_eq!(outcome.stored, 0);
        assert!(outcome.error.unwrap().contains("shutdown requested"));
    }

    #[test]
    fn day_state_resets_on_rollover() {
        let mut day = DayState::new(d(2025, 12, 8));
        day.poll_count = 12;
        day.last_poll_at = Some(at(d(2025, 12, 8), 15, 45));
        day.eod_completed = true;

        let today = d(2025, 12, 9);
        assert_ne!(day.date, today);
        day = DayState::new(today);

        assert_eq!(day.poll_count, 0);
        assert!(day.last_poll_at.is_none());
        assert!(!day.eod_completed);
    }
}
