use axum::{extract::State, Extension};
use serde::Deserialize;

use crate::middleware::{ApiResponse, ApiResult, AuthUser, JsonBody};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusBody {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub instance_name: String,
}

/// POST /api/whatsapp/update-status - record a connection transition for the caller's tenant
pub async fn update_status_post(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    JsonBody(body): JsonBody<UpdateStatusBody>,
) -> ApiResult<()> {
    let tenant_key = user.tenant_key()?;
    state
        .controller
        .update_status(tenant_key, &body.status, &body.instance_name)
        .await?;
    Ok(ApiResponse::success(()))
}
