use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::middleware::{ApiResponse, ApiResult, JsonBody};
use crate::state::AppState;
use crate::store::UserRecord;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserRecord,
}

/// POST /api/auth/login - exchange username and password for a session token
///
/// Responds `{ "success": true, "token": "...", "user": { .. } }`; the stored
/// password is never part of `user`.
pub async fn login_post(State(state): State<AppState>, JsonBody(body): JsonBody<LoginRequest>) -> ApiResult<LoginResponse> {
    let result = state.auth.login(&body.username, &body.password).await?;

    Ok(ApiResponse::success(LoginResponse {
        token: result.token,
        user: result.user,
    }))
}
