mod common;

use shopfloor_core::kernel::jobs::job::{JobStatus, JobStore, OrgId};
use shopfloor_core::kernel::jobs::retry::{decide, RetryOutcome};

#[tokio::test]
async fn enqueue_claim_succeed_lifecycle() {
    let pool = common::pool().await;
    let org_id = OrgId::new();

    let job_id = JobStore::enqueue(&pool, org_id, "ai_enrich", serde_json::json!({}), None, 3)
        .await
        .unwrap();

    let claimed = JobStore::claim_one(&pool, "worker-a")
        .await
        .unwrap()
        .expect("job should be claimable");
    assert_eq!(claimed.id, job_id);
    assert_eq!(claimed.attempts, 1);

    JobStore::mark_succeeded(&pool, job_id).await.unwrap();

    let job = JobStore::get(&pool, org_id, job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Succeeded);
    assert!(job.locked_at.is_none());
    assert!(job.locked_by.is_none());
}

#[tokio::test]
async fn enqueue_rejects_unknown_job_type() {
    let pool = common::pool().await;
    let org_id = OrgId::new();

    let err = JobStore::enqueue(&pool, org_id, "send_email", serde_json::json!({}), None, 3)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("ERR_UNKNOWN_JOB_TYPE"));
}

#[tokio::test]
async fn cross_tenant_lookup_is_not_found_not_forbidden() {
    let pool = common::pool().await;
    let org_a = OrgId::new();
    let org_b = OrgId::new();

    let job_id = JobStore::enqueue(&pool, org_a, "ai_enrich", serde_json::json!({}), None, 3)
        .await
        .unwrap();

    let result = JobStore::get(&pool, org_b, job_id).await;
    assert!(matches!(
        result,
        Err(shopfloor_core::common::AppError::NotFound)
    ));
}

#[tokio::test]
async fn concurrent_claims_never_double_claim() {
    let pool = common::pool().await;
    let org_id = OrgId::new();

    for _ in 0..20 {
        JobStore::enqueue(&pool, org_id, "ai_enrich", serde_json::json!({}), None, 3)
            .await
            .unwrap();
    }

    let pool_a = pool.clone();
    let pool_b = pool.clone();
    let (claims_a, claims_b) = tokio::join!(
        async move {
            let mut claimed = Vec::new();
            for _ in 0..10 {
                if let Ok(Some(job)) = JobStore::claim_one(&pool_a, "worker-a").await {
                    claimed.push(job.id);
                }
            }
            claimed
        },
        async move {
            let mut claimed = Vec::new();
            for _ in 0..10 {
                if let Ok(Some(job)) = JobStore::claim_one(&pool_b, "worker-b").await {
                    claimed.push(job.id);
                }
            }
            claimed
        }
    );

    let mut all: Vec<_> = claims_a.into_iter().chain(claims_b).collect();
    let total = all.len();
    all.sort();
    all.dedup();
    assert_eq!(all.len(), total, "no job should be claimed twice");
    assert_eq!(total, 20);
}

#[tokio::test]
async fn failed_job_requeues_then_dead_letters_per_retry_policy() {
    let pool = common::pool().await;
    let org_id = OrgId::new();

    let job_id = JobStore::enqueue(
        &pool,
        org_id,
        "ai_enrich",
        serde_json::json!({}),
        None,
        2,
    )
    .await
    .unwrap();

    let claimed = JobStore::claim_one(&pool, "worker-a").await.unwrap().unwrap();
    let outcome = decide(claimed.attempts, claimed.max_attempts, "boom", chrono::Utc::now());
    assert!(matches!(outcome, RetryOutcome::Requeue { .. }));
    JobStore::apply_retry_outcome(&pool, job_id, &outcome)
        .await
        .unwrap();

    let job = JobStore::get(&pool, org_id, job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.attempts, 1);

    // Force it claimable again for the second and final attempt.
    sqlx::query("UPDATE jobs SET run_after = NOW() WHERE id = $1")
        .bind(job_id.as_uuid())
        .execute(&pool)
        .await
        .unwrap();

    let claimed = JobStore::claim_one(&pool, "worker-a").await.unwrap().unwrap();
    assert_eq!(claimed.attempts, 2);
    let outcome = decide(claimed.attempts, claimed.max_attempts, "boom again", chrono::Utc::now());
    assert!(matches!(outcome, RetryOutcome::DeadLetter { .. }));
    JobStore::apply_retry_outcome(&pool, job_id, &outcome)
        .await
        .unwrap();

    let job = JobStore::get(&pool, org_id, job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
}
