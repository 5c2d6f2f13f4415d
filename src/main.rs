use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use spx_monitor::api::{router, ApiState};
use spx_monitor::calendar::now_et;
use spx_monitor::client::PolygonClient;
use spx_monitor::config::Config;
use spx_monitor::error::Result;
use spx_monitor::scheduler::Scheduler;
use spx_monitor::store::SnapshotStore;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let options = sqlx::sqlite::SqliteConnectOptions::new()
        .filename(&cfg.db_path)
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .connect_with(options)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database ready at {}", cfg.db_path);

    let store = SnapshotStore::new(pool.clone());
    let client = PolygonClient::new(&cfg)?;

    info!(
        "Current time: {} ET | detection={} alert_storage={}",
        now_et().format("%Y-%m-%d %H:%M:%S"),
        cfg.detection_enabled,
        cfg.alert_storage_enabled,
    );

    // --- Shutdown wiring: Ctrl+C or SIGTERM cancels everything ---
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received (Ctrl+C or SIGTERM)");
        signal_cancel.cancel();
    });

    // --- Scheduler control loop ---
    let scheduler = Scheduler::new(client, store.clone(), &cfg, cancel.clone());
    let scheduler_handle = tokio::spawn(scheduler.run());

    // --- HTTP API server ---
    let app = router(ApiState { store });
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    let serve_cancel = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { serve_cancel.cancelled().await })
        .await?;

    if let Err(e) = scheduler_handle.await {
        error!("Scheduler task failed: {e}");
    }
    info!("Goodbye");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
