use std::sync::Arc;

use anyhow::Context;
use pylon::config::Config;
use pylon::controller::HealthController;
use pylon::db::{ConnectionPool, TcpConnection};
use pylon::http::request::Request;
use pylon::http::response::Response;
use pylon::http::router::Router;
use pylon::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    tracing::info!("Starting Pylon server...");
    let cfg = Config::load()?;

    let pool = Arc::new(ConnectionPool::<TcpConnection>::new());
    {
        let pool = pool.clone();
        let db = cfg.database.clone();
        tokio::task::spawn_blocking(move || pool.initialize(&db, db.pool_size))
            .await?
            .context("Database init failed")?;
    }
    let repair = pool.spawn_repair(cfg.database.repair_interval(), cfg.database.retry_delay())?;

    let health = HealthController::new(pool.clone(), cfg.database.acquire_timeout());
    let router = Router::new().route(
        "/api/health",
        move |req: &Request, resp: &mut Response| -> anyhow::Result<()> { health.check(req, resp) },
    );

    tokio::select! {
        res = server::listener::run(&cfg, Arc::new(router)) => {
            res?;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    // Joining may wait out a reconnect in progress.
    tokio::task::spawn_blocking(move || repair.shutdown()).await?;
    Ok(())
}
