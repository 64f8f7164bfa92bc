//! Back-office user accounts.

use super::{
    ServiceError, ServiceResult,
    auth_service::{MIN_PASSWORD_LENGTH, hash_password},
    db::is_unique_violation,
};
use crate::models::{
    settings::looks_like_email,
    user::{Permission, Role, User},
};
use chrono::Utc;
use serde::Deserialize;
use sqlx::{SqlitePool, types::Json};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

const DUPLICATE_EMAIL: &str = "User with this email already exists";

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub permissions: Option<Vec<Permission>>,
    pub is_active: Option<bool>,
}

fn check_name(name: &str, errors: &mut Vec<&'static str>) {
    if !(2..=50).contains(&name.trim().chars().count()) {
        errors.push("Name must be between 2 and 50 characters");
    }
}

fn check_email(email: &str, errors: &mut Vec<&'static str>) {
    if !looks_like_email(email.trim()) {
        errors.push("Please enter a valid email");
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn write_error(err: sqlx::Error) -> ServiceError {
    if is_unique_violation(&err) {
        ServiceError::validation(DUPLICATE_EMAIL)
    } else {
        err.into()
    }
}

#[derive(Clone)]
pub struct UserService {
    db: Arc<SqlitePool>,
}

impl UserService {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    pub async fn list(&self) -> ServiceResult<Vec<User>> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at DESC")
            .fetch_all(&*self.db)
            .await?)
    }

    pub async fn find(&self, id: Uuid) -> ServiceResult<Option<User>> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&*self.db)
            .await?)
    }

    pub async fn get(&self, id: Uuid) -> ServiceResult<User> {
        self.find(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("User not found"))
    }

    pub async fn find_by_email(&self, email: &str) -> ServiceResult<Option<User>> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(normalize_email(email))
            .fetch_optional(&*self.db)
            .await?)
    }

    pub async fn create(&self, new: NewUser) -> ServiceResult<User> {
        let mut errors = Vec::new();
        check_name(&new.name, &mut errors);
        check_email(&new.email, &mut errors);
        if new.password.chars().count() < MIN_PASSWORD_LENGTH {
            errors.push("Password must be at least 6 characters long");
        }
        if !errors.is_empty() {
            return Err(ServiceError::validation_details("Validation errors", errors));
        }
        if self.find_by_email(&new.email).await?.is_some() {
            return Err(ServiceError::validation(DUPLICATE_EMAIL));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: new.name.trim().to_string(),
            email: normalize_email(&new.email),
            password_hash: hash_password(&new.password)?,
            role: new.role,
            permissions: new.permissions,
            is_active: true,
            last_login: None,
            created_at: now,
            updated_at: now,
        };
        sqlx::query(
            "INSERT INTO users (id, name, email, password_hash, role, permissions, is_active, last_login, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role)
        .bind(Json(&user.permissions))
        .bind(user.is_active)
        .bind(user.last_login)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&*self.db)
        .await
        .map_err(write_error)?;

        info!(id = %user.id, email = %user.email, role = ?user.role, "user created");
        Ok(user)
    }

    async fn save(&self, user: &mut User) -> ServiceResult<()> {
        user.updated_at = Utc::now();
        sqlx::query(
            "UPDATE users
             SET name = ?, email = ?, password_hash = ?, role = ?, permissions = ?,
                 is_active = ?, last_login = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role)
        .bind(Json(&user.permissions))
        .bind(user.is_active)
        .bind(user.last_login)
        .bind(user.updated_at)
        .bind(user.id)
        .execute(&*self.db)
        .await
        .map_err(write_error)?;
        Ok(())
    }

    pub async fn update(&self, id: Uuid, patch: UserPatch, actor: Uuid) -> ServiceResult<User> {
        let mut errors = Vec::new();
        if let Some(name) = &patch.name {
            check_name(name, &mut errors);
        }
        if let Some(email) = &patch.email {
            check_email(email, &mut errors);
        }
        if !errors.is_empty() {
            return Err(ServiceError::validation_details("Validation errors", errors));
        }
        if id == actor && patch.is_active == Some(false) {
            return Err(ServiceError::validation("Cannot disable your own account"));
        }

        let mut user = self.get(id).await?;
        if let Some(email) = &patch.email {
            let email = normalize_email(email);
            if email != user.email && self.find_by_email(&email).await?.is_some() {
                return Err(ServiceError::validation(DUPLICATE_EMAIL));
            }
            user.email = email;
        }
        if let Some(name) = patch.name {
            user.name = name.trim().to_string();
        }
        if let Some(role) = patch.role {
            user.role = role;
        }
        if let Some(permissions) = patch.permissions {
            user.permissions = permissions;
        }
        if let Some(active) = patch.is_active {
            user.is_active = active;
        }
        self.save(&mut user).await?;
        Ok(user)
    }

    pub async fn delete(&self, id: Uuid, actor: Uuid) -> ServiceResult<()> {
        if id == actor {
            return Err(ServiceError::validation("Cannot delete your own account"));
        }
        let deleted = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(ServiceError::not_found("User not found"));
        }
        info!(%id, %actor, "user deleted");
        Ok(())
    }

    pub async fn toggle_status(&self, id: Uuid, actor: Uuid) -> ServiceResult<User> {
        if id == actor {
            return Err(ServiceError::validation("Cannot disable your own account"));
        }
        let mut user = self.get(id).await?;
        user.is_active = !user.is_active;
        self.save(&mut user).await?;
        info!(%id, active = user.is_active, "user status toggled");
        Ok(user)
    }

    pub async fn change_password(&self, id: Uuid, new_password: &str) -> ServiceResult<()> {
        if new_password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(ServiceError::validation(
                "New password must be at least 6 characters long",
            ));
        }
        let mut user = self.get(id).await?;
        user.password_hash = hash_password(new_password)?;
        self.save(&mut user).await
    }

    pub async fn record_login(&self, user: &mut User) -> ServiceResult<()> {
        user.last_login = Some(Utc::now());
        self.save(user).await
    }

    /// Create the first administrator from the command line.
    pub async fn bootstrap_admin(&self, name: &str, email: &str, password: &str) -> ServiceResult<User> {
        self.create(NewUser {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            role: Role::Admin,
            permissions: vec![
                Permission::ManageUsers,
                Permission::SystemSettings,
                Permission::ManageProducts,
                Permission::ManageProjects,
                Permission::ManageMessages,
            ],
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::db::test_pool;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Marko".into(),
            email: email.into(),
            password: "tajna123".into(),
            role: Role::Staff,
            permissions: vec![Permission::ManageMessages],
        }
    }

    #[tokio::test]
    async fn create_normalizes_and_rejects_duplicates() {
        let users = UserService::new(test_pool().await);
        let user = users.create(new_user(" Marko@Nissal.RS ")).await.unwrap();
        assert_eq!(user.email, "marko@nissal.rs");
        assert_ne!(user.password_hash, "tajna123");

        let loaded = users.get(user.id).await.unwrap();
        assert_eq!(loaded.permissions, vec![Permission::ManageMessages]);

        let err = users.create(new_user("marko@nissal.rs")).await.unwrap_err();
        assert_eq!(err.to_string(), DUPLICATE_EMAIL);

        let mut weak = new_user("x@nissal.rs");
        weak.password = "123".into();
        weak.name = "M".into();
        match users.create(weak).await.unwrap_err() {
            ServiceError::Validation { details, .. } => {
                assert_eq!(details.unwrap().as_array().unwrap().len(), 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn users_cannot_remove_or_disable_themselves() {
        let users = UserService::new(test_pool().await);
        let admin = users.bootstrap_admin("Admin", "admin@nissal.rs", "admin123").await.unwrap();
        let other = users.create(new_user("staff@nissal.rs")).await.unwrap();

        let err = users.delete(admin.id, admin.id).await.unwrap_err();
        assert_eq!(err.to_string(), "Cannot delete your own account");
        let err = users.toggle_status(admin.id, admin.id).await.unwrap_err();
        assert_eq!(err.to_string(), "Cannot disable your own account");

        let toggled = users.toggle_status(other.id, admin.id).await.unwrap();
        assert!(!toggled.is_active);

        let renamed = users
            .update(
                other.id,
                UserPatch {
                    name: Some("Marko Marković".into()),
                    role: Some(Role::Manager),
                    ..Default::default()
                },
                admin.id,
            )
            .await
            .unwrap();
        assert_eq!(renamed.role, Role::Manager);

        users.delete(other.id, admin.id).await.unwrap();
        assert!(matches!(users.get(other.id).await, Err(ServiceError::NotFound(_))));
        assert_eq!(users.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn change_password_enforces_length() {
        let users = UserService::new(test_pool().await);
        let user = users.create(new_user("a@nissal.rs")).await.unwrap();
        assert!(users.change_password(user.id, "kratk").await.is_err());
        users.change_password(user.id, "dugacka").await.unwrap();
        let reloaded = users.get(user.id).await.unwrap();
        assert_ne!(reloaded.password_hash, user.password_hash);
    }
}
