//! HTTP Surface (§2 component 11, §6): a thin axum router over the kernel.

pub mod middleware;
pub mod routes;

use std::sync::Arc;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::Method;
use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Extension, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::kernel::AppContext;
use middleware::identity_middleware;
use routes::{health, jobs, schedules};

/// Build the router described in §6. `ctx` is shared via `Extension` rather
/// than axum's typed `State`, matching the rest of this stack's preference
/// for an explicit application-context struct over framework state.
pub fn build_router(ctx: Arc<AppContext>) -> Router {
    // Any origin, matching the teacher's development CORS posture: this
    // surface is consumed by a gateway, not a browser with credentials.
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    let tenant_routes = Router::new()
        .route("/v1/jobs", post(jobs::enqueue_job).get(jobs::list_jobs))
        .route("/v1/jobs/:id", get(jobs::get_job))
        .route(
            "/v1/schedules",
            post(schedules::create_schedule_run).get(schedules::list_schedule_runs),
        )
        .route("/v1/schedules/:id", get(schedules::get_schedule_run))
        .route(
            "/v1/schedules/:id/items",
            get(schedules::list_schedule_items),
        )
        .layer(axum_middleware::from_fn(identity_middleware));

    Router::new()
        .route("/healthz", get(health::health_handler))
        .merge(tenant_routes)
        .layer(Extension(ctx))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
