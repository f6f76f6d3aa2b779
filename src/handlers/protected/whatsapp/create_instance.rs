use axum::{extract::State, Extension};
use serde::{Deserialize, Serialize};

use crate::gateway::QrPayload;
use crate::middleware::{ApiResponse, ApiResult, AuthUser, JsonBody};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInstanceBody {
    #[serde(default)]
    pub instance_name: String,
}

#[derive(Debug, Serialize)]
pub struct CreateInstanceResponse {
    /// `null` when the gateway created the instance without a code
    pub qrcode: Option<QrPayload>,
}

/// POST /api/whatsapp/create-instance - provision (or reuse) a gateway instance and return its QR
pub async fn create_instance_post(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    JsonBody(body): JsonBody<CreateInstanceBody>,
) -> ApiResult<CreateInstanceResponse> {
    let tenant_key = user.tenant_key()?;
    let qrcode = state
        .controller
        .provision_instance(tenant_key, &body.instance_name)
        .await?;

    Ok(ApiResponse::success(CreateInstanceResponse { qrcode }))
}
