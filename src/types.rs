use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Contract snapshots
// ---------------------------------------------------------------------------

/// One intraday observation of an option contract, as stored in the intraday
/// ledger. Built once at the ingestion boundary from the provider's response;
/// everything downstream works with this typed record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub ticker: String,
    pub captured_at: NaiveDateTime,
    /// Trading date the poll belongs to, for grouping and consolidation.
    pub captured_date: NaiveDate,
    pub expiration: NaiveDate,
    pub strike: f64,
    pub contract_type: ContractType,

    pub spot_price: Option<f64>,
    /// strike / spot at capture.
    pub moneyness: Option<f64>,
    pub dte: Option<i64>,

    /// Cumulative session volume reported by the provider.
    pub volume_cumulative: i64,
    /// New volume since the previous poll of this contract today.
    /// Computed by the store at ingest; callers leave it None.
    pub volume_delta: Option<i64>,

    pub open_interest: Option<i64>,
    pub close_price: Option<f64>,
    pub high_price: Option<f64>,
    pub low_price: Option<f64>,
    pub vwap: Option<f64>,
    pub transactions: Option<i64>,

    pub greeks: Greeks,

    pub market_status: Option<String>,
    /// Provider data timeliness tier ("DELAYED" or "REAL-TIME").
    pub timeframe: Option<String>,
}

/// Sensitivity measures — absent for very deep OTM contracts the provider
/// declines to price.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Greeks {
    pub delta: Option<f64>,
    pub gamma: Option<f64>,
    pub theta: Option<f64>,
    pub vega: Option<f64>,
    pub implied_vol: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractType {
    Put,
    Call,
}

impl std::fmt::Display for ContractType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContractType::Put => write!(f, "put"),
            ContractType::Call => write!(f, "call"),
        }
    }
}

impl ContractType {
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("call") {
            ContractType::Call
        } else {
            ContractType::Put
        }
    }
}

// ---------------------------------------------------------------------------
// Anomaly detection
// ---------------------------------------------------------------------------

/// Which historical lookup produced the comparison volume. Kept as diagnostic
/// metadata on every alert — never used for control flow past the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineSource {
    /// Yesterday, same hour ±1, from the intraday ledger.
    YesterdayHour,
    /// Yesterday's consolidated EOD volume.
    YesterdayEod,
    /// Yesterday, most recent intraday snapshot at any hour.
    YesterdayAny,
    /// Two days ago EOD — covers weekend/holiday gaps.
    #[serde(rename = "2_days_ago_eod")]
    TwoDaysAgoEod,
    /// No history found. Baseline treated as zero, dormancy suppressed.
    #[serde(rename = "none")]
    NoData,
}

impl std::fmt::Display for BaselineSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BaselineSource::YesterdayHour => "yesterday_hour",
            BaselineSource::YesterdayEod => "yesterday_eod",
            BaselineSource::YesterdayAny => "yesterday_any",
            BaselineSource::TwoDaysAgoEod => "2_days_ago_eod",
            BaselineSource::NoData => "none",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyFlag {
    /// (current − baseline) exceeded the absolute delta threshold.
    Delta,
    /// Current exceeded baseline × the multiplier threshold (baseline > 0).
    Multiplier,
    /// Baseline was genuinely zero and current exceeded the dormancy threshold.
    Dormancy,
}

impl std::fmt::Display for AnomalyFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AnomalyFlag::Delta => "delta",
            AnomalyFlag::Multiplier => "multiplier",
            AnomalyFlag::Dormancy => "dormancy",
        };
        write!(f, "{s}")
    }
}

/// A contract the detector judged anomalous in one evaluation pass.
/// Score = number of flags that fired.
#[derive(Debug, Clone, Serialize)]
pub struct AlertCandidate {
    pub triggered_at: NaiveDateTime,
    pub ticker: String,
    pub expiration: NaiveDate,
    pub strike: f64,
    pub contract_type: ContractType,
    pub moneyness: Option<f64>,
    pub dte: Option<i64>,

    pub volume_current: i64,
    pub volume_baseline: i64,
    pub volume_delta: i64,
    pub notional: f64,

    pub flags: Vec<AnomalyFlag>,
    pub baseline_source: BaselineSource,
    pub summary: String,
}

impl AlertCandidate {
    pub fn score(&self) -> f64 {
        self.flags.len() as f64
    }
}

// ---------------------------------------------------------------------------
// Job outcomes
// ---------------------------------------------------------------------------

/// Result of one end-to-end poll cycle. Errors are values, not panics —
/// the scheduler decides whether to retry.
#[derive(Debug)]
pub struct PollOutcome {
    pub stored: usize,
    pub error: Option<String>,
}

impl PollOutcome {
    pub fn ok(stored: usize) -> Self {
        Self { stored, error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { stored: 0, error: Some(error.into()) }
    }
}

/// Aggregate result of one EOD consolidation run. A non-empty error list means
/// the day is not cleanly consolidated and should be re-run.
#[derive(Debug, Default)]
pub struct EodStats {
    pub trade_date: Option<NaiveDate>,
    pub consolidated: u64,
    pub intraday_pruned: u64,
    pub daily_pruned: u64,
    pub errors: Vec<String>,
}

impl EodStats {
    pub fn clean(&self) -> bool {
        self.errors.is_empty()
    }
}
