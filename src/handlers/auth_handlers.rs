//! Login and session endpoints under `/api/auth`.

use super::{auth::CurrentUser, extract::ApiJson, response::ApiResponse};
use crate::{AppState, errors::AppError, models::user::User, services::auth_service::Session};
use axum::extract::State;
use serde::Deserialize;
use tracing::info;

#[derive(Deserialize, Debug)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// POST `/api/auth/login`
pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<ApiResponse<Session>, AppError> {
    let session = state.auth.login(req.username, req.password).await?;
    Ok(ApiResponse::ok(session).message("Login successful"))
}

/// GET `/api/auth/me`
pub async fn me(CurrentUser(user): CurrentUser) -> ApiResponse<User> {
    ApiResponse::ok(user)
}

/// POST `/api/auth/logout`
///
/// Tokens are stateless; the client drops its copy.
pub async fn logout(user: CurrentUser) -> ApiResponse<()> {
    info!(id = %user.id(), "user logged out");
    ApiResponse::done("Logout successful")
}

/// POST `/api/auth/refresh`
pub async fn refresh(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<ApiResponse<Session>, AppError> {
    let token = state.auth.issue(&user)?;
    Ok(ApiResponse::ok(Session { token, user }).message("Token refreshed"))
}
