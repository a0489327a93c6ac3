//! Job queue infrastructure: the durable, multi-tenant dispatcher described
//! in §2 and §4 of the specification.
//!
//! - [`job`] — the `jobs` relation, its typed accessor, and the claim statement.
//! - [`retry`] — the pure Retry Policy Engine.
//! - [`registry`] — the typed job-type → handler mapping.
//! - [`worker`] — the per-worker dispatch loop.
//! - [`handlers`] — the two concrete job handlers (`ai_enrich`, `schedule_run`).

pub mod handlers;
pub mod job;
pub mod registry;
pub mod retry;
pub mod worker;

pub use job::{ClaimedJob, Job, JobId, JobStatus, JobStore, OrgId};
pub use registry::JobRegistry;
pub use retry::RetryOutcome;
pub use worker::{run_worker_until_shutdown, JobWorker, JobWorkerConfig};
