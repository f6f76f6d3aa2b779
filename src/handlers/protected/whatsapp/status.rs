use axum::{extract::State, Extension};
use serde_json::{json, Value};

use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::StatusOutcome;
use crate::state::AppState;

/// GET /api/whatsapp/status - the tenant's account row, re-verified against the gateway
pub async fn status_get(State(state): State<AppState>, Extension(user): Extension<AuthUser>) -> ApiResult<Value> {
    let tenant_key = user.tenant_key()?;

    let body = match state.controller.get_status(tenant_key).await? {
        StatusOutcome::NotFound => json!({
            "status": "not_found",
            "message": "No WhatsApp account found"
        }),
        StatusOutcome::Account(account) => json!({ "account": account }),
    };
    Ok(ApiResponse::success(body))
}
