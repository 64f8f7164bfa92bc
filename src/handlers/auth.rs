//! Bearer-token extractor and role/permission guards.

use crate::{
    AppState,
    errors::AppError,
    models::user::{Permission, Role, User},
    services::auth_service::AuthError,
};
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};

/// The authenticated, active user behind the request's bearer token.
///
/// ```rust,ignore
/// async fn handler(user: CurrentUser) -> impl IntoResponse {
///     format!("Hello, {}!", user.0.name)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AuthError::MissingToken)?;
        let user = state.auth.authenticate(token).await?;
        Ok(Self(user))
    }
}

impl CurrentUser {
    pub fn id(&self) -> uuid::Uuid {
        self.0.id
    }

    pub fn require_role(&self, roles: &[Role]) -> Result<(), AppError> {
        if roles.contains(&self.0.role) {
            Ok(())
        } else {
            Err(AuthError::Forbidden("Access denied. Insufficient permissions.".into()).into())
        }
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        self.require_role(&[Role::Admin])
    }

    pub fn require_permission(&self, permission: Permission) -> Result<(), AppError> {
        if self.0.has_permission(permission) {
            Ok(())
        } else {
            Err(AuthError::Forbidden(format!(
                "Access denied. Missing permission: {}",
                permission_name(permission)
            ))
            .into())
        }
    }
}

fn permission_name(permission: Permission) -> String {
    serde_json::to_value(permission)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use chrono::Utc;

    fn user(role: Role, permissions: Vec<Permission>) -> CurrentUser {
        let now = Utc::now();
        CurrentUser(User {
            id: uuid::Uuid::new_v4(),
            name: "Ana".into(),
            email: "ana@nissal.rs".into(),
            password_hash: String::new(),
            role,
            permissions,
            is_active: true,
            last_login: None,
            created_at: now,
            updated_at: now,
        })
    }

    #[test]
    fn guards_check_role_and_permissions() {
        let staff = user(Role::Staff, vec![Permission::ManageMessages]);
        assert!(staff.require_permission(Permission::ManageMessages).is_ok());
        let err = staff.require_permission(Permission::SystemSettings).unwrap_err();
        assert_eq!(err.message, "Access denied. Missing permission: system_settings");
        assert!(staff.require_role(&[Role::Admin, Role::Manager]).is_err());

        let admin = user(Role::Admin, Vec::new());
        assert!(admin.require_admin().is_ok());
        assert!(admin.require_permission(Permission::ManageUsers).is_ok());
    }

    #[test]
    fn parses_bearer_header() {
        let (parts, _) = Request::builder()
            .header(header::AUTHORIZATION, "Bearer abc.def")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(bearer_token(&parts), Some("abc.def"));

        let (parts, _) = Request::builder()
            .header(header::AUTHORIZATION, "Basic xyz")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(bearer_token(&parts), None);
    }
}
