use axum::{extract::State, Extension};
use serde_json::{json, Value};

use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::state::AppState;

/// GET /api/auth/profile - fresh user row for the token holder
pub async fn profile_get(State(state): State<AppState>, Extension(user): Extension<AuthUser>) -> ApiResult<Value> {
    let profile = state.auth.profile(&user.id).await?;
    Ok(ApiResponse::success(json!({ "user": profile })))
}
