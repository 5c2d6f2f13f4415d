//! Database row types. Used by sqlx for typed `query_as` reads.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SnapshotRow {
    pub id: i64,
    pub captured_at: NaiveDateTime,
    pub captured_date: NaiveDate,
    pub ticker: String,
    pub expiration: NaiveDate,
    pub strike: f64,
    pub contract_type: String,
    pub spot_price: Option<f64>,
    pub moneyness: Option<f64>,
    pub dte: Option<i64>,
    pub volume_cumulative: Option<i64>,
    pub volume_delta: Option<i64>,
    pub open_interest: Option<i64>,
    pub close_price: Option<f64>,
    pub high_price: Option<f64>,
    pub low_price: Option<f64>,
    pub vwap: Option<f64>,
    pub transactions: Option<i64>,
    pub delta: Option<f64>,
    pub gamma: Option<f64>,
    pub theta: Option<f64>,
    pub vega: Option<f64>,
    pub implied_vol: Option<f64>,
    pub market_status: Option<String>,
    pub timeframe: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DailyRow {
    pub id: i64,
    pub trade_date: NaiveDate,
    pub ticker: String,
    pub expiration: NaiveDate,
    pub strike: f64,
    pub contract_type: String,
    pub spot_close: Option<f64>,
    pub moneyness: Option<f64>,
    pub dte: Option<i64>,
    pub volume: Option<i64>,
    pub open_interest: Option<i64>,
    pub close_price: Option<f64>,
    pub high_price: Option<f64>,
    pub low_price: Option<f64>,
    pub vwap: Option<f64>,
    pub transactions: Option<i64>,
    pub delta: Option<f64>,
    pub gamma: Option<f64>,
    pub theta: Option<f64>,
    pub vega: Option<f64>,
    pub implied_vol: Option<f64>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AlertRow {
    pub id: i64,
    pub triggered_at: NaiveDateTime,
    pub ticker: String,
    pub expiration: NaiveDate,
    pub strike: f64,
    pub contract_type: String,
    pub moneyness: Option<f64>,
    pub dte: Option<i64>,
    pub score: f64,
    pub volume_current: Option<i64>,
    pub volume_historical_avg: Option<f64>,
    pub volume_historical_p90: Option<f64>,
    pub premium_notional: Option<f64>,
    pub trigger_reasons: Option<String>,
    pub acknowledged: i64,
    pub acknowledged_at: Option<NaiveDateTime>,
    pub notes: Option<String>,
}

/// Aggregate shape of the daily ledger, reported at EOD and over the API.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DailyHistoryStats {
    pub total_records: i64,
    pub trading_days: i64,
    pub earliest_date: Option<NaiveDate>,
    pub latest_date: Option<NaiveDate>,
}
