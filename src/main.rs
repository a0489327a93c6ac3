use anyhow::{Context, Result};
use shopfloor_core::config::Config;
use shopfloor_core::http::build_router;
use shopfloor_core::kernel::jobs::{JobWorker, JobWorkerConfig};
use shopfloor_core::kernel::AppContext;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,shopfloor_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting shopfloor-core");

    let config = Config::from_env().context("failed to load configuration")?;

    tracing::info!("connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    tracing::info!("running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    let worker_id = config.worker_id.clone();
    let poll_interval = Duration::from_secs(config.poll_interval_seconds);
    let port = config.port;

    let ctx = AppContext::new(pool, AppContext::default_registry(), config);

    let shutdown = CancellationToken::new();
    let worker = Arc::new(JobWorker::new(
        ctx.clone(),
        JobWorkerConfig {
            worker_id,
            poll_interval,
        },
    ));
    let worker_shutdown = shutdown.clone();
    let dispatcher_handle = tokio::spawn(async move {
        shopfloor_core::kernel::jobs::run_worker_until_shutdown(worker, worker_shutdown).await;
    });

    let app = build_router(ctx);
    let addr = format!("0.0.0.0:{port}");
    tracing::info!(%addr, "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("failed to bind to address")?;

    let server = axum::serve(listener, app.into_make_service());

    tokio::select! {
        result = server => {
            result.context("server error")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            shutdown.cancel();
        }
    }

    dispatcher_handle.await.ok();
    Ok(())
}
