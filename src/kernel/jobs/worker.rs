//! Queue Dispatcher (§4.2): a single-threaded cooperative loop per worker
//! process. One job is claimed, dispatched, and recorded per iteration;
//! horizontal scale comes from running more worker processes (§5), not from
//! concurrency within one.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::job::{is_known_job_type, ClaimedJob, JobStore};
use super::retry::{decide, decide_unknown_job_type, RetryOutcome};
use crate::audit;
use crate::common::AppError;
use crate::kernel::context::AppContext;

/// How long graceful shutdown waits for an in-flight job before returning
/// with it still `running` for the stale-lock reaper to pick up later.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

pub struct JobWorkerConfig {
    pub worker_id: String,
    pub poll_interval: Duration,
}

/// The dispatcher. One instance runs one cooperative loop; run several
/// instances (processes or tasks) against the same database for throughput.
pub struct JobWorker {
    ctx: Arc<AppContext>,
    config: JobWorkerConfig,
}

impl JobWorker {
    pub fn new(ctx: Arc<AppContext>, config: JobWorkerConfig) -> Self {
        Self { ctx, config }
    }

    /// Run until `shutdown` is cancelled. On a claim miss, sleeps
    /// `poll_interval`; on a claim hit, loops immediately (§4.2 Pacing).
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(worker_id = %self.config.worker_id, "dispatcher starting");

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            self.ctx
                .dispatcher_heartbeat
                .store(Utc::now().timestamp_millis(), Ordering::Relaxed);

            match JobStore::claim_one(&self.ctx.db, &self.config.worker_id).await {
                Ok(Some(job)) => {
                    self.dispatch(job).await;
                    // claim success: loop immediately, no sleep.
                }
                Ok(None) => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
                Err(e) => {
                    error!(error = %e, "claim failed");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
            }
        }

        info!(worker_id = %self.config.worker_id, "dispatcher stopped");
    }

    /// Dispatch + execute + record for a single claimed job.
    async fn dispatch(&self, job: ClaimedJob) {
        let job_id = job.id;
        let org_id = job.org_id;
        let job_type = job.job_type.clone();

        debug!(job_id = %job_id, org_id = %org_id, job_type = %job_type, "dispatching claimed job");
        self.record_audit(org_id, job_id, "claimed").await;

        if !is_known_job_type(&job_type) || !self.ctx.job_registry.is_registered(&job_type) {
            let outcome = decide_unknown_job_type(format!("ERR_UNKNOWN_JOB_TYPE: {job_type}"));
            warn!(job_id = %job_id, job_type = %job_type, "unknown job type, dead-lettering");
            if let Err(e) = JobStore::apply_retry_outcome(&self.ctx.db, job_id, &outcome).await {
                error!(job_id = %job_id, error = %e, "failed to record dead-letter");
            }
            self.record_audit(org_id, job_id, "dead_lettered").await;
            return;
        }

        let result = self
            .ctx
            .job_registry
            .execute(self.ctx.clone(), org_id, job_id, &job_type, job.payload.clone())
            .await;

        match result {
            Ok(()) => {
                debug!(job_id = %job_id, job_type = %job_type, "job succeeded");
                if let Err(e) = JobStore::mark_succeeded(&self.ctx.db, job_id).await {
                    error!(job_id = %job_id, error = %e, "failed to mark job succeeded");
                }
                self.record_audit(org_id, job_id, "succeeded").await;
            }
            Err(e) => {
                let error_msg = e.to_string();
                warn!(job_id = %job_id, job_type = %job_type, error = %error_msg, "job failed");

                let outcome = retry_outcome_for(&e, job.attempts, job.max_attempts, error_msg, Utc::now());
                let action = match outcome {
                    RetryOutcome::DeadLetter { .. } => "dead_lettered",
                    RetryOutcome::Requeue { .. } => "retried",
                };
                if let Err(e) = JobStore::apply_retry_outcome(&self.ctx.db, job_id, &outcome).await {
                    error!(job_id = %job_id, error = %e, "failed to record retry outcome");
                }
                self.record_audit(org_id, job_id, action).await;
            }
        }
    }

    async fn record_audit(&self, org_id: super::job::OrgId, job_id: super::job::JobId, action: &str) {
        if let Err(e) = audit::record(
            &self.ctx.db,
            org_id,
            "job",
            *job_id.as_uuid(),
            action,
            serde_json::json!({"worker_id": self.config.worker_id}),
        )
        .await
        {
            error!(job_id = %job_id, error = %e, "failed to record audit entry");
        }
    }
}

/// §7: the dispatcher inspects [`AppError::is_retryable`], not the error's
/// status code, when a handler failure downcasts to it. A non-retryable
/// `AppError` (e.g. a handler logic error) dead-letters immediately
/// regardless of attempts remaining; anything else (including non-`AppError`
/// failures) goes through the normal attempts-based backoff policy.
fn retry_outcome_for(
    error: &anyhow::Error,
    attempts: i32,
    max_attempts: i32,
    error_msg: String,
    now: chrono::DateTime<Utc>,
) -> RetryOutcome {
    match error.downcast_ref::<AppError>() {
        Some(app_err) if !app_err.is_retryable() => RetryOutcome::DeadLetter { error: error_msg },
        _ => decide(attempts, max_attempts, error_msg, now),
    }
}

/// Run the dispatcher until `shutdown` fires, then wait up to
/// [`SHUTDOWN_GRACE`] for the current iteration to settle. `run` above
/// already finishes its in-flight job before observing cancellation, so
/// this wrapper exists to bound the caller's own wait.
pub async fn run_worker_until_shutdown(worker: Arc<JobWorker>, shutdown: CancellationToken) {
    let handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { worker.run(shutdown).await }
    });
    tokio::select! {
        _ = handle => {}
        _ = tokio::time::sleep(SHUTDOWN_GRACE) => {
            warn!("dispatcher did not stop within grace period");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grace_period_is_bounded() {
        assert_eq!(SHUTDOWN_GRACE, Duration::from_secs(30));
    }

    #[test]
    fn non_retryable_app_error_dead_letters_despite_remaining_attempts() {
        let err: anyhow::Error = AppError::HandlerLogic("no technicians available".to_string()).into();
        let outcome = retry_outcome_for(&err, 1, 5, err.to_string(), Utc::now());
        assert!(matches!(outcome, RetryOutcome::DeadLetter { .. }));
    }

    #[test]
    fn retryable_app_error_follows_attempts_based_backoff() {
        let err: anyhow::Error = AppError::Database(sqlx::Error::PoolClosed).into();
        let outcome = retry_outcome_for(&err, 1, 5, err.to_string(), Utc::now());
        assert!(matches!(outcome, RetryOutcome::Requeue { .. }));
    }

    #[test]
    fn non_app_error_follows_attempts_based_backoff() {
        let err = anyhow::anyhow!("some opaque handler failure");
        let outcome = retry_outcome_for(&err, 1, 5, err.to_string(), Utc::now());
        assert!(matches!(outcome, RetryOutcome::Requeue { .. }));
    }
}
