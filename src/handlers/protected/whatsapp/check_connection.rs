use axum::{
    extract::{Path, State},
    Extension,
};
use serde_json::{json, Value};

use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::state::AppState;

/// GET /api/whatsapp/check-connection/:instance_name - raw gateway state, no side effects
pub async fn check_connection_get(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(instance_name): Path<String>,
) -> ApiResult<Value> {
    user.tenant_key()?;
    let status = state.controller.check_connection(&instance_name).await?;
    Ok(ApiResponse::success(json!({ "status": status })))
}
