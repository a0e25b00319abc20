use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use shared_types::User;

use crate::auth::AuthClaims;
use crate::error::ApiResult;
use crate::AppState;

/// Confirms the API is running.
pub async fn root() -> Json<Value> {
    Json(json!({ "message": "Welcome to the Mission OAuth SaaS API" }))
}

pub async fn health_check() -> StatusCode {
    StatusCode::OK
}

// User handlers

/// Profile of the user the presented token belongs to.
pub async fn get_current_user(
    State(state): State<AppState>,
    AuthClaims(token): AuthClaims,
) -> ApiResult<Json<User>> {
    let user = state.auth.current_user(&token).await?;
    Ok(Json(user))
}
