//! Handler Registry (§2 component 5, §9 "Dynamic dispatch"): a typed mapping
//! from job type to handler, built once at process start. Unknown types
//! never reach a handler lookup in the dispatcher — they short-circuit to
//! dead-letter before this registry is consulted.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value as JsonValue;

use crate::kernel::context::AppContext;

type BoxedHandler = Box<
    dyn Fn(Arc<AppContext>, super::job::OrgId, super::job::JobId, JsonValue) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>
        + Send
        + Sync,
>;

/// Maps job type string to its handler. Construct once via [`JobRegistry::new`]
/// and registrations, wrap in `Arc`, and share across workers.
#[derive(Default)]
pub struct JobRegistry {
    handlers: HashMap<&'static str, BoxedHandler>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for `job_type`. The handler receives the
    /// application context, tenant, job id, and raw JSON payload — decoding
    /// the payload into a domain type is the handler's responsibility.
    pub fn register<F, Fut>(&mut self, job_type: &'static str, handler: F)
    where
        F: Fn(Arc<AppContext>, super::job::OrgId, super::job::JobId, JsonValue) -> Fut
            + Send
            + Sync
            + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.handlers.insert(
            job_type,
            Box::new(move |ctx, org_id, job_id, payload| Box::pin(handler(ctx, org_id, job_id, payload))),
        );
    }

    pub fn is_registered(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    /// Dispatch a claimed job to its registered handler. The caller is
    /// expected to have already checked [`is_registered`](Self::is_registered);
    /// calling with an unregistered type dead-letters via the caller's retry
    /// logic, not here.
    pub async fn execute(
        &self,
        ctx: Arc<AppContext>,
        org_id: super::job::OrgId,
        job_id: super::job::JobId,
        job_type: &str,
        payload: JsonValue,
    ) -> Result<()> {
        let handler = self
            .handlers
            .get(job_type)
            .ok_or_else(|| anyhow::anyhow!("unknown job type: {job_type}"))?;
        handler(ctx, org_id, job_id, payload).await
    }
}
