//! Back-office user accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    #[default]
    Staff,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ManageUsers,
    SystemSettings,
    ManageProducts,
    ManageProjects,
    ManageMessages,
}

/// A back-office account as stored in the `users` table.
#[derive(Serialize, Clone, FromRow, Debug)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,

    pub name: String,

    /// Always stored lowercase.
    pub email: String,

    /// Argon2 PHC string; never serialized.
    #[serde(skip_serializing)]
    pub password_hash: String,

    pub role: Role,

    /// Extra grants on top of the role. Admins implicitly hold all of them.
    #[sqlx(json)]
    pub permissions: Vec<Permission>,

    pub is_active: bool,

    pub last_login: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.role == Role::Admin || self.permissions.contains(&permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_holds_every_permission() {
        let now = Utc::now();
        let mut user = User {
            id: Uuid::new_v4(),
            name: "Ana".into(),
            email: "ana@nissal.rs".into(),
            password_hash: String::new(),
            role: Role::Staff,
            permissions: vec![Permission::ManageMessages],
            is_active: true,
            last_login: None,
            created_at: now,
            updated_at: now,
        };
        assert!(user.has_permission(Permission::ManageMessages));
        assert!(!user.has_permission(Permission::SystemSettings));

        user.role = Role::Admin;
        assert!(user.has_permission(Permission::SystemSettings));

        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["role"], "admin");
    }
}
