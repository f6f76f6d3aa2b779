use serde_json::{json, Value};

use crate::middleware::{ApiResponse, ApiResult};

/// POST /api/auth/logout - sessions are stateless, the client drops its token
pub async fn logout_post() -> ApiResult<Value> {
    Ok(ApiResponse::success(json!({ "message": "Session closed" })))
}
