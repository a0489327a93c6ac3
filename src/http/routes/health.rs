use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::kernel::AppContext;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    database: DatabaseHealth,
    connection_pool: ConnectionPoolHealth,
    dispatcher: DispatcherHealth,
}

#[derive(Serialize)]
pub struct DatabaseHealth {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
pub struct ConnectionPoolHealth {
    size: u32,
    idle_connections: usize,
    max_connections: u32,
}

#[derive(Serialize)]
pub struct DispatcherHealth {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_poll_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seconds_since_last_poll: Option<i64>,
}

/// Liveness/readiness probe (§6): checks database connectivity and reports
/// pool utilization. Not tenant-scoped.
pub async fn health_handler(
    Extension(ctx): Extension<Arc<AppContext>>,
) -> (StatusCode, Json<HealthResponse>) {
    let db_health = match tokio::time::timeout(
        std::time::Duration::from_secs(5),
        sqlx::query("SELECT 1").execute(&ctx.db),
    )
    .await
    {
        Ok(Ok(_)) => DatabaseHealth {
            status: "ok".to_string(),
            error: None,
        },
        Ok(Err(e)) => DatabaseHealth {
            status: "error".to_string(),
            error: Some(format!("query failed: {e}")),
        },
        Err(_) => DatabaseHealth {
            status: "error".to_string(),
            error: Some("query timeout (>5s)".to_string()),
        },
    };

    let pool_health = ConnectionPoolHealth {
        size: ctx.db.size(),
        idle_connections: ctx.db.num_idle(),
        max_connections: ctx.db.options().get_max_connections(),
    };

    let heartbeat_millis = ctx.dispatcher_heartbeat.load(Ordering::Relaxed);
    let dispatcher_health = if heartbeat_millis == 0 {
        DispatcherHealth {
            status: "unknown".to_string(),
            last_poll_at: None,
            seconds_since_last_poll: None,
        }
    } else {
        let last_poll_at = DateTime::from_timestamp_millis(heartbeat_millis).unwrap_or_else(Utc::now);
        let age_seconds = (Utc::now() - last_poll_at).num_seconds().max(0);
        // Liveness threshold: a few missed poll intervals, with a floor so a
        // fast poll interval doesn't make the probe flap on GC/scheduling jitter.
        let stale_after = (ctx.config.poll_interval_seconds as i64 * 5).max(30);
        DispatcherHealth {
            status: if age_seconds <= stale_after { "alive" } else { "stalled" }.to_string(),
            last_poll_at: Some(last_poll_at),
            seconds_since_last_poll: Some(age_seconds),
        }
    };

    let is_healthy = db_health.status == "ok" && dispatcher_health.status != "stalled";
    let status_code = if is_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: if is_healthy { "healthy" } else { "unhealthy" }.to_string(),
            database: db_health,
            connection_pool: pool_health,
            dispatcher: dispatcher_health,
        }),
    )
}
