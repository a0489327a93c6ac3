//! Audit Emitter (§2 component 12): appends structured records to the
//! append-only `audit_log` relation at the state boundaries named in §4 —
//! job claimed, job completed, job dead-lettered, schedule run completed.

use anyhow::Result;
use serde_json::Value as JsonValue;
use sqlx::PgPool;

use crate::kernel::jobs::job::OrgId;

pub async fn record(
    pool: &PgPool,
    org_id: OrgId,
    entity_type: &str,
    entity_id: uuid::Uuid,
    action: &str,
    detail: JsonValue,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_log (id, org_id, entity_type, entity_id, action, detail, created_at)
        VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, NOW())
        "#,
    )
    .bind(org_id.as_uuid())
    .bind(entity_type)
    .bind(entity_id)
    .bind(action)
    .bind(detail)
    .execute(pool)
    .await?;
    Ok(())
}
