//! Identity extraction middleware (§6): reads the pre-authenticated
//! `x-org-id`/`x-role` headers the upstream identity provider attaches and
//! rejects the request before it reaches a handler if `x-org-id` is absent.

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use crate::common::errors::AppError;
use crate::kernel::jobs::job::OrgId;

/// Tenant/role pair attached to every request that makes it past this layer.
#[derive(Clone, Debug)]
pub struct Identity {
    pub org_id: OrgId,
    pub role: String,
}

impl Identity {
    /// 403 unless `role` is one of `allowed`.
    pub fn require_role(&self, allowed: &[&str]) -> Result<(), AppError> {
        if allowed.contains(&self.role.as_str()) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "role {} is not permitted for this operation",
                self.role
            )))
        }
    }
}

pub async fn identity_middleware(mut request: Request, next: Next) -> Response {
    let org_id = match request
        .headers()
        .get("x-org-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<OrgId>().ok())
    {
        Some(id) => id,
        None => return AppError::Unauthenticated.into_response(),
    };
    let role = request
        .headers()
        .get("x-role")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("viewer")
        .to_string();

    debug!(org_id = %org_id, role = %role, "identity extracted");
    request.extensions_mut().insert(Identity { org_id, role });
    next.run(request).await
}
