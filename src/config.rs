use crate::error::{AppError, Result};

pub const POLYGON_API_URL: &str = "https://api.polygon.io";

/// Underlying index symbol for chain discovery.
pub const UNDERLYING: &str = "SPX";

/// Options contract multiplier (notional = volume × premium × 100).
pub const CONTRACT_MULTIPLIER: f64 = 100.0;

/// Polygon caps the unified snapshot endpoint at this many tickers per call.
pub const MAX_TICKERS_PER_REQUEST: usize = 250;

/// Pause between batched unified snapshot calls (the endpoint is rate-sensitive).
pub const BATCH_PACING_MS: u64 = 500;

/// Minutes after market open before the first poll — the provider serves
/// 15-minute delayed data, so polling at the bell returns nothing useful.
pub const FIRST_POLL_DELAY_MINUTES: i64 = 15;

/// Minutes after market close before EOD consolidation runs, so the provider's
/// own session finalization has settled.
pub const EOD_DELAY_MINUTES: i64 = 30;

/// Poll retry policy: attempts per cycle and delay between attempts.
pub const MAX_POLL_RETRIES: u32 = 3;
pub const RETRY_DELAY_SECS: u64 = 60;

/// Cooldown after an unexpected control-loop error before resuming.
pub const LOOP_ERROR_COOLDOWN_SECS: u64 = 60;

/// Target DTE window for monthly expirations.
pub const MIN_DTE: i64 = 3;
pub const MAX_DTE: i64 = 90;

/// Strike band as a fraction of spot: 50% OTM down to 1% OTM puts.
pub const MIN_MONEYNESS: f64 = 0.50;
pub const MAX_MONEYNESS: f64 = 0.99;

/// Retention windows (calendar days, not row counts).
pub const INTRADAY_RETENTION_DAYS: i64 = 3;
pub const DAILY_RETENTION_DAYS: i64 = 60;

/// Anomaly thresholds.
pub mod thresholds {
    /// Minimum cumulative volume before a contract is evaluated at all.
    pub const VOLUME_FLOOR: i64 = 100;
    /// Minimum notional ($) before a contract is evaluated.
    pub const NOTIONAL_FLOOR: f64 = 100_000.0;
    /// Flag if (current − baseline) exceeds this.
    pub const DELTA: i64 = 200;
    /// Flag if baseline was genuinely zero and current exceeds this.
    pub const DORMANCY: i64 = 100;
    /// Flag if current exceeds baseline × this.
    pub const MULTIPLIER: i64 = 5;
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub api_base_url: String,
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Minutes between polls during market hours (POLL_INTERVAL_MINUTES).
    pub poll_interval_minutes: i64,
    /// Master switch for anomaly detection (DETECTION_ENABLED).
    pub detection_enabled: bool,
    /// Whether detected anomalies are written to the alerts table
    /// (ALERT_STORAGE_ENABLED). Detection can run log-only.
    pub alert_storage_enabled: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("POLYGON_API_KEY")
            .or_else(|_| std::env::var("MASSIVE_API_KEY"))
            .map_err(|_| {
                AppError::Config("POLYGON_API_KEY must be set".to_string())
            })?;

        Ok(Self {
            api_key,
            api_base_url: std::env::var("POLYGON_API_URL")
                .unwrap_or_else(|_| POLYGON_API_URL.to_string()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("SPX_DB_PATH")
                .unwrap_or_else(|_| "spx_options.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            poll_interval_minutes: std::env::var("POLL_INTERVAL_MINUTES")
                .unwrap_or_else(|_| "15".to_string())
                .parse::<i64>()
                .unwrap_or(15),
            detection_enabled: parse_bool_env("DETECTION_ENABLED", true),
            alert_storage_enabled: parse_bool_env("ALERT_STORAGE_ENABLED", false),
        })
    }
}

fn parse_bool_env(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => matches!(v.trim(), "1" | "true" | "TRUE" | "yes"),
        Err(_) => default,
    }
}
