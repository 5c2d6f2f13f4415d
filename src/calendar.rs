//! Market calendar for the U.S. options session — pure date/time logic.
//!
//! No I/O, no wall clock: every function takes the date or instant it judges,
//! which is what makes the scheduler's phase recomputation reproducible.
//! Holidays and early closes are explicit date sets rather than computed
//! rules, because observed-holiday shifting makes them irregular.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};
use chrono_tz::America::New_York;
use chrono_tz::Tz;

use crate::config::{EOD_DELAY_MINUTES, FIRST_POLL_DELAY_MINUTES};

/// Exchange local time zone — all session boundaries are defined in ET.
pub const EXCHANGE_TZ: Tz = New_York;

/// Regular session 09:30–16:00 ET; early-close days end at 13:00.
const OPEN_HOUR: u32 = 9;
const OPEN_MINUTE: u32 = 30;
const CLOSE_HOUR: u32 = 16;
const CLOSE_MINUTE: u32 = 0;
const EARLY_CLOSE_HOUR: u32 = 13;
const EARLY_CLOSE_MINUTE: u32 = 0;

/// Wake time on the morning of the next trading day, for overnight sleeps.
const WAKE_HOUR: u32 = 9;
const WAKE_MINUTE: u32 = 0;

/// Full market closures, as (year, month, day).
const MARKET_HOLIDAYS: &[(i32, u32, u32)] = &[
    // ── 2025 ─────────────────────────────────────────────────────────
    (2025, 1, 1),   // New Year's Day
    (2025, 1, 20),  // MLK Day
    (2025, 2, 17),  // Washington's Birthday
    (2025, 4, 18),  // Good Friday
    (2025, 5, 26),  // Memorial Day
    (2025, 6, 19),  // Juneteenth
    (2025, 7, 4),   // Independence Day
    (2025, 9, 1),   // Labor Day
    (2025, 11, 27), // Thanksgiving
    (2025, 12, 25), // Christmas
    // ── 2026 ─────────────────────────────────────────────────────────
    (2026, 1, 1),   // New Year's Day
    (2026, 1, 19),  // MLK Day
    (2026, 2, 16),  // Washington's Birthday
    (2026, 4, 3),   // Good Friday
    (2026, 5, 25),  // Memorial Day
    (2026, 6, 19),  // Juneteenth
    (2026, 7, 3),   // Independence Day (observed)
    (2026, 9, 7),   // Labor Day
    (2026, 11, 26), // Thanksgiving
    (2026, 12, 25), // Christmas
    // ── 2027 ─────────────────────────────────────────────────────────
    (2027, 1, 1),   // New Year's Day
    (2027, 1, 18),  // MLK Day
    (2027, 2, 15),  // Washington's Birthday
    (2027, 3, 26),  // Good Friday
    (2027, 5, 31),  // Memorial Day
    (2027, 6, 18),  // Juneteenth (observed)
    (2027, 7, 5),   // Independence Day (observed)
    (2027, 9, 6),   // Labor Day
    (2027, 11, 25), // Thanksgiving
    (2027, 12, 24), // Christmas (observed)
];

/// Shortened sessions (1:00 PM ET close), as (year, month, day).
const EARLY_CLOSE_DAYS: &[(i32, u32, u32)] = &[
    (2025, 7, 3),   // Day before Independence Day
    (2025, 11, 28), // Day after Thanksgiving
    (2025, 12, 24), // Christmas Eve
    (2026, 11, 27), // Day after Thanksgiving
    (2026, 12, 24), // Christmas Eve
    (2027, 11, 26), // Day after Thanksgiving
];

/// Last year the holiday/early-close tables cover. Past this the calendar
/// fails closed: no holidays, no early closes, weekends still excluded.
const TABLE_HORIZON_YEAR: i32 = 2027;

/// Current time in the exchange's local zone.
pub fn now_et() -> DateTime<Tz> {
    Utc::now().with_timezone(&EXCHANGE_TZ)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MarketCalendar;

impl MarketCalendar {
    pub fn new() -> Self {
        Self
    }

    pub fn is_weekend(&self, d: NaiveDate) -> bool {
        matches!(d.weekday(), Weekday::Sat | Weekday::Sun)
    }

    pub fn is_holiday(&self, d: NaiveDate) -> bool {
        MARKET_HOLIDAYS.contains(&(d.year(), d.month(), d.day()))
    }

    pub fn is_early_close(&self, d: NaiveDate) -> bool {
        EARLY_CLOSE_DAYS.contains(&(d.year(), d.month(), d.day()))
    }

    pub fn is_trading_day(&self, d: NaiveDate) -> bool {
        !self.is_weekend(d) && !self.is_holiday(d)
    }

    /// Whether the holiday tables still cover this date. Callers operating
    /// past the horizon should warn the operator to extend the tables.
    pub fn covers(&self, d: NaiveDate) -> bool {
        d.year() <= TABLE_HORIZON_YEAR
    }

    pub fn market_open(&self, d: NaiveDate) -> DateTime<Tz> {
        at_et(d, OPEN_HOUR, OPEN_MINUTE)
    }

    /// Session close for the date — the early-close override applies.
    pub fn market_close(&self, d: NaiveDate) -> DateTime<Tz> {
        if self.is_early_close(d) {
            at_et(d, EARLY_CLOSE_HOUR, EARLY_CLOSE_MINUTE)
        } else {
            at_et(d, CLOSE_HOUR, CLOSE_MINUTE)
        }
    }

    /// First poll of the day: open plus the provider's data-arrival delay.
    pub fn first_poll_time(&self, d: NaiveDate) -> DateTime<Tz> {
        self.market_open(d) + Duration::minutes(FIRST_POLL_DELAY_MINUTES)
    }

    /// EOD consolidation time: close plus the settle delay that lets the
    /// provider finalize session data before we snapshot it.
    pub fn eod_time(&self, d: NaiveDate) -> DateTime<Tz> {
        self.market_close(d) + Duration::minutes(EOD_DELAY_MINUTES)
    }

    /// Next trading day strictly after `d`. Bounded forward search — U.S.
    /// markets never close for more than a handful of consecutive days.
    pub fn next_trading_day(&self, d: NaiveDate) -> NaiveDate {
        let mut candidate = d + Duration::days(1);
        for _ in 0..10 {
            if self.is_trading_day(candidate) {
                return candidate;
            }
            candidate += Duration::days(1);
        }
        candidate
    }

    /// Early-morning wake instant on the next trading day after `d`.
    pub fn next_wake_time(&self, d: NaiveDate) -> DateTime<Tz> {
        at_et(self.next_trading_day(d), WAKE_HOUR, WAKE_MINUTE)
    }
}

fn at_et(d: NaiveDate, hour: u32, minute: u32) -> DateTime<Tz> {
    // Session boundaries never fall inside a DST transition (02:00–03:00),
    // so the local time is always unambiguous.
    EXCHANGE_TZ
        .with_ymd_and_hms(d.year(), d.month(), d.day(), hour, minute, 0)
        .single()
        .expect("session times do not fall in DST transitions")
}
