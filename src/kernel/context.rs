//! Explicit application context (§9 "Global mutable state"): constructed
//! once at process start and passed by reference, replacing module-level
//! connection pools and other globals.

use std::sync::atomic::AtomicI64;
use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::kernel::jobs::JobRegistry;

pub struct AppContext {
    pub db: PgPool,
    pub job_registry: JobRegistry,
    pub config: Config,
    /// Unix millis of the dispatcher's last poll loop iteration, updated by
    /// [`JobWorker::run`](crate::kernel::jobs::JobWorker::run). Zero means the
    /// dispatcher has never polled yet. Read by the `/healthz` handler to
    /// report dispatcher liveness.
    pub dispatcher_heartbeat: Arc<AtomicI64>,
}

impl AppContext {
    pub fn new(db: PgPool, job_registry: JobRegistry, config: Config) -> Arc<Self> {
        Arc::new(Self {
            db,
            job_registry,
            config,
            dispatcher_heartbeat: Arc::new(AtomicI64::new(0)),
        })
    }

    /// Build the registry with the two in-scope handlers wired up (§2
    /// component 5). Call once at process start.
    pub fn default_registry() -> JobRegistry {
        let mut registry = JobRegistry::new();
        registry.register("ai_enrich", |ctx, org_id, job_id, payload| {
            crate::kernel::jobs::handlers::handle_ai_enrich(ctx, org_id, job_id, payload)
        });
        registry.register("schedule_run", |ctx, org_id, job_id, payload| {
            crate::kernel::jobs::handlers::handle_schedule_run(ctx, org_id, job_id, payload)
        });
        registry
    }
}
