//! Back-office user administration under `/api/admin-users`.

use super::{
    auth::CurrentUser,
    extract::{ApiJson, ApiPath},
    response::ApiResponse,
};
use crate::{
    AppState,
    errors::AppError,
    models::user::{Permission, User},
    services::user_service::{NewUser, UserPatch},
};
use axum::extract::State;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ChangePassword {
    pub new_password: Option<String>,
}

pub async fn list_users(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<ApiResponse<Vec<User>>, AppError> {
    user.require_permission(Permission::ManageUsers)?;
    Ok(ApiResponse::ok(state.users.list().await?))
}

pub async fn get_user(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<ApiResponse<User>, AppError> {
    user.require_permission(Permission::ManageUsers)?;
    Ok(ApiResponse::ok(state.users.get(id).await?))
}

pub async fn create_user(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(new): ApiJson<NewUser>,
) -> Result<ApiResponse<User>, AppError> {
    user.require_permission(Permission::ManageUsers)?;
    let created = state.users.create(new).await?;
    Ok(ApiResponse::created(created).message("User created successfully"))
}

pub async fn update_user(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<UserPatch>,
) -> Result<ApiResponse<User>, AppError> {
    user.require_permission(Permission::ManageUsers)?;
    let updated = state.users.update(id, patch, user.id()).await?;
    Ok(ApiResponse::ok(updated).message("User updated successfully"))
}

/// Deleting accounts is reserved for admins.
pub async fn delete_user(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<ApiResponse<()>, AppError> {
    user.require_admin()?;
    state.users.delete(id, user.id()).await?;
    Ok(ApiResponse::done("User deleted successfully"))
}

pub async fn toggle_status(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<ApiResponse<User>, AppError> {
    user.require_permission(Permission::ManageUsers)?;
    let toggled = state.users.toggle_status(id, user.id()).await?;
    let message = if toggled.is_active {
        "User activated successfully"
    } else {
        "User deactivated successfully"
    };
    Ok(ApiResponse::ok(toggled).message(message))
}

/// Admins with `manage_users` may reset anyone's password; everybody may
/// change their own.
pub async fn change_password(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<ChangePassword>,
) -> Result<ApiResponse<()>, AppError> {
    if id != user.id() {
        user.require_permission(Permission::ManageUsers)?;
    }
    let password = req.new_password.unwrap_or_default();
    state.users.change_password(id, &password).await?;
    Ok(ApiResponse::done("Password changed successfully"))
}
