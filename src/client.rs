//! HTTP client for the options data provider.
//!
//! Two endpoints: the per-underlying chain snapshot for contract discovery
//! (no greeks) and the unified snapshot for detailed per-ticker data
//! (greeks, session volume, open interest). Responses are navigated as
//! `serde_json::Value` and turned into typed records at the poller boundary.

use std::time::Duration;

use chrono::NaiveDate;

use crate::config::Config;
use crate::error::{AppError, Result};

/// Seam between the poller and the provider. The poller only needs raw
/// contract objects; parsing stays on its side of the boundary.
pub trait MarketDataClient: Send + Sync {
    /// Chain snapshot for the underlying, optionally filtered by expiration
    /// and strike band. Sorted by strike ascending.
    fn option_chain(
        &self,
        expiration: Option<NaiveDate>,
        strike_gte: Option<f64>,
        strike_lte: Option<f64>,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<serde_json::Value>>> + Send;

    /// Unified snapshot for up to 250 explicit tickers. Callers batch.
    fn unified_snapshot(
        &self,
        tickers: &[String],
    ) -> impl std::future::Future<Output = Result<Vec<serde_json::Value>>> + Send;
}

#[derive(Debug, Clone)]
pub struct PolygonClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    underlying: String,
}

impl PolygonClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: cfg.api_base_url.clone(),
            api_key: cfg.api_key.clone(),
            underlying: crate::config::UNDERLYING.to_string(),
        })
    }

    async fn get_results(&self, url: &str, params: &[(&str, String)]) -> Result<Vec<serde_json::Value>> {
        let resp = self.http.get(url).query(params).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let body = body.get(..200).unwrap_or(body.as_str());
            return Err(AppError::Upstream(format!("{url} returned {status}: {body}")));
        }
        let data: serde_json::Value = resp.json().await?;
        Ok(data
            .get("results")
            .and_then(|r| r.as_array())
            .cloned()
            .unwrap_or_default())
    }
}

impl MarketDataClient for PolygonClient {
    async fn option_chain(
        &self,
        expiration: Option<NaiveDate>,
        strike_gte: Option<f64>,
        strike_lte: Option<f64>,
        limit: usize,
    ) -> Result<Vec<serde_json::Value>> {
        let url = format!("{}/v3/snapshot/options/{}", self.base_url, self.underlying);

        let mut params: Vec<(&str, String)> = vec![
            ("apiKey", self.api_key.clone()),
            ("contract_type", "put".to_string()),
            ("limit", limit.to_string()),
            ("order", "asc".to_string()),
            ("sort", "strike_price".to_string()),
        ];
        if let Some(exp) = expiration {
            params.push(("expiration_date", exp.format("%Y-%m-%d").to_string()));
        }
        if let Some(gte) = strike_gte {
            params.push(("strike_price.gte", gte.to_string()));
        }
        if let Some(lte) = strike_lte {
            params.push(("strike_price.lte", lte.to_string()));
        }

        self.get_results(&url, &params).await
    }

    async fn unified_snapshot(&self, tickers: &[String]) -> Result<Vec<serde_json::Value>> {
        if tickers.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v3/snapshot", self.base_url);
        let params = [
            ("apiKey", self.api_key.clone()),
            ("ticker.any_of", tickers.join(",")),
        ];
        self.get_results(&url, &params).await
    }
}
