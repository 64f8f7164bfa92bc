//! Site settings under `/api/settings`.

use super::{auth::CurrentUser, extract::ApiJson, response::ApiResponse};
use crate::{
    AppState,
    errors::AppError,
    models::{
        settings::{
            ContactInfoPatch, EmailSettingsUpdate, PublicSiteSettings, Singleton, SiteSettings,
            SiteSettingsPatch,
        },
        user::Permission,
    },
};
use axum::extract::State;

fn masked(settings: Singleton<SiteSettings>) -> Singleton<SiteSettings> {
    Singleton {
        document: settings.document.masked(),
        ..settings
    }
}

/// GET `/api/settings`: anonymous view.
pub async fn get_public(State(state): State<AppState>) -> Result<ApiResponse<PublicSiteSettings>, AppError> {
    let current = state.site_settings.get_current().await?;
    Ok(ApiResponse::ok(PublicSiteSettings::from(&current.document)))
}

/// GET `/api/settings/admin`
pub async fn get_admin(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<ApiResponse<Singleton<SiteSettings>>, AppError> {
    user.require_permission(Permission::SystemSettings)?;
    Ok(ApiResponse::ok(masked(state.site_settings.get_current().await?)))
}

/// PUT `/api/settings`
pub async fn update_general(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(patch): ApiJson<SiteSettingsPatch>,
) -> Result<ApiResponse<Singleton<SiteSettings>>, AppError> {
    user.require_permission(Permission::SystemSettings)?;
    let saved = state.site_settings.update_general(patch, user.id()).await?;
    Ok(ApiResponse::ok(masked(saved)).message("Settings updated successfully"))
}

/// PUT `/api/settings/contact`
pub async fn update_contact(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(patch): ApiJson<ContactInfoPatch>,
) -> Result<ApiResponse<Singleton<SiteSettings>>, AppError> {
    user.require_permission(Permission::SystemSettings)?;
    let saved = state.site_settings.update_contact(patch, user.id()).await?;
    Ok(ApiResponse::ok(masked(saved)).message("Contact information updated successfully"))
}

/// PUT `/api/settings/email`: admin only.
pub async fn update_email(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(update): ApiJson<EmailSettingsUpdate>,
) -> Result<ApiResponse<Singleton<SiteSettings>>, AppError> {
    user.require_admin()?;
    let saved = state.site_settings.update_email(update, user.id()).await?;
    Ok(ApiResponse::ok(masked(saved)).message("Email settings updated successfully"))
}

/// POST `/api/settings/reset`: admin only.
pub async fn reset(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<ApiResponse<Singleton<SiteSettings>>, AppError> {
    user.require_admin()?;
    let fresh = state.site_settings.reset(Some(user.id())).await?;
    Ok(ApiResponse::ok(masked(fresh)).message("Settings reset to defaults successfully"))
}
