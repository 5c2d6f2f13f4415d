//! Read-mostly dashboard API. Serves the ledgers the scheduler writes;
//! the only mutation is alert acknowledgement.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Timelike};
use serde::{Deserialize, Serialize};

use crate::calendar::{now_et, MarketCalendar};
use crate::error::AppError;
use crate::scheduler::determine_phase;
use crate::store::SnapshotStore;

#[derive(Clone)]
pub struct ApiState {
    pub store: SnapshotStore,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/snapshots/latest", get(get_latest_snapshots))
        .route("/api/history", get(get_history))
        .route("/api/contract/:ticker/history", get(get_contract_history))
        .route("/api/comparables", get(get_comparables))
        .route("/api/alerts", get(get_alerts))
        .route("/api/alerts/:id/acknowledge", post(acknowledge_alert))
        .route("/api/stats", get(get_stats))
        .route("/api/status", get(get_status))
        .route("/api/health", get(get_health))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct LatestQuery {
    pub expiration: Option<NaiveDate>,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub days: Option<i64>,
}

#[derive(Deserialize)]
pub struct AlertsQuery {
    pub limit: Option<i64>,
    pub unacknowledged: Option<bool>,
}

#[derive(Deserialize)]
pub struct ComparablesQuery {
    pub moneyness: f64,
    pub dte: i64,
    pub days: Option<i64>,
    pub moneyness_tolerance: Option<f64>,
    pub dte_tolerance: Option<i64>,
}

#[derive(Deserialize, Default)]
pub struct AcknowledgeRequest {
    pub notes: Option<String>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize, sqlx::FromRow)]
pub struct IntradayStats {
    pub total_rows: i64,
    pub poll_count: i64,
    pub unique_contracts: i64,
    pub earliest: Option<chrono::NaiveDateTime>,
    pub latest: Option<chrono::NaiveDateTime>,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub intraday: IntradayStats,
    pub daily: crate::store::models::DailyHistoryStats,
    pub alert_count: i64,
    pub db_size_mb: f64,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub phase: String,
    pub date: NaiveDate,
    pub trading_day: bool,
    pub early_close: bool,
    pub market_open: String,
    pub market_close: String,
    pub last_poll_at: Option<chrono::NaiveDateTime>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_latest_snapshots(
    State(state): State<ApiState>,
    Query(params): Query<LatestQuery>,
) -> Result<Json<Vec<crate::store::models::SnapshotRow>>, AppError> {
    let rows = state.store.latest_poll_rows(params.expiration).await?;
    Ok(Json(rows))
}

async fn get_history(
    State(state): State<ApiState>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<Vec<crate::store::models::DailyRow>>, AppError> {
    let days = params.days.unwrap_or(7).clamp(1, 365);
    let today = now_et().date_naive();
    let rows = state.store.daily_window(days, today).await?;
    Ok(Json(rows))
}

async fn get_contract_history(
    State(state): State<ApiState>,
    Path(ticker): Path<String>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<Vec<crate::store::models::DailyRow>>, AppError> {
    let days = params.days.unwrap_or(30).clamp(1, 365);
    let today = now_et().date_naive();
    let rows = state.store.ticker_history(&ticker, days, today).await?;
    Ok(Json(rows))
}

async fn get_comparables(
    State(state): State<ApiState>,
    Query(params): Query<ComparablesQuery>,
) -> Result<Json<Vec<crate::store::models::DailyRow>>, AppError> {
    let days = params.days.unwrap_or(30).clamp(1, 365);
    let moneyness_tolerance = params.moneyness_tolerance.unwrap_or(0.02);
    let dte_tolerance = params.dte_tolerance.unwrap_or(7).clamp(0, 90);
    let today = now_et().date_naive();
    let rows = state
        .store
        .historical_comparables(
            params.moneyness,
            params.dte,
            days,
            moneyness_tolerance,
            dte_tolerance,
            today,
        )
        .await?;
    Ok(Json(rows))
}

async fn get_alerts(
    State(state): State<ApiState>,
    Query(params): Query<AlertsQuery>,
) -> Result<Json<Vec<crate::store::models::AlertRow>>, AppError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    let unacknowledged_only = params.unacknowledged.unwrap_or(false);
    let rows = state.store.list_alerts(limit, unacknowledged_only).await?;
    Ok(Json(rows))
}

async fn acknowledge_alert(
    State(state): State<ApiState>,
    Path(alert_id): Path<i64>,
    body: Option<Json<AcknowledgeRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let acknowledged_at = now_et()
        .naive_local()
        .with_nanosecond(0)
        .unwrap_or_else(|| now_et().naive_local());

    let found = state
        .store
        .acknowledge(alert_id, acknowledged_at, req.notes.as_deref())
        .await?;

    if !found {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "alert not found" })),
        ));
    }
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "acknowledged": true, "id": alert_id })),
    ))
}

async fn get_stats(State(state): State<ApiState>) -> Result<Json<StatsResponse>, AppError> {
    let intraday = sqlx::query_as::<_, IntradayStats>(
        r#"
        SELECT
            COUNT(*) AS total_rows,
            COUNT(DISTINCT captured_at) AS poll_count,
            COUNT(DISTINCT ticker) AS unique_contracts,
            MIN(captured_at) AS earliest,
            MAX(captured_at) AS latest
        FROM intraday_snapshots
        "#,
    )
    .fetch_one(state.store.pool())
    .await?;

    let daily = state.store.daily_stats().await?;

    let alert_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM alerts")
        .fetch_one(state.store.pool())
        .await?;

    let size_bytes = state.store.database_size_bytes().await?;

    Ok(Json(StatsResponse {
        intraday,
        daily,
        alert_count,
        db_size_mb: (size_bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0,
    }))
}

/// Scheduler status as re-derived from the wall clock — no shared state with
/// the control loop, so it is accurate even across restarts.
async fn get_status(State(state): State<ApiState>) -> Result<Json<StatusResponse>, AppError> {
    let calendar = MarketCalendar::new();
    let now = now_et();
    let today = now.date_naive();

    let last_poll_at: Option<chrono::NaiveDateTime> =
        sqlx::query_scalar("SELECT MAX(captured_at) FROM intraday_snapshots")
            .fetch_one(state.store.pool())
            .await?;

    Ok(Json(StatusResponse {
        phase: determine_phase(now, &calendar).to_string(),
        date: today,
        trading_day: calendar.is_trading_day(today),
        early_close: calendar.is_early_close(today),
        market_open: calendar.market_open(today).format("%H:%M").to_string(),
        market_close: calendar.market_close(today).format("%H:%M").to_string(),
        last_poll_at,
    }))
}

async fn get_health(State(state): State<ApiState>) -> impl IntoResponse {
    match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(state.store.pool())
        .await
    {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "healthy", "database": "connected" })),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "status": "unhealthy", "error": e.to_string() })),
        ),
    }
}
