//! Password login and bearer-token verification.
//!
//! Passwords are stored as Argon2id PHC strings. Tokens are HS256 JWTs
//! carrying the user id, email and role; every request re-loads the user so
//! a disabled account loses access immediately.

use super::{ServiceError, ServiceResult, user_service::UserService};
use crate::models::user::{Role, User};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

pub const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Access denied. No token provided.")]
    MissingToken,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Neispravni podaci za prijavu. Molimo proverite korisničko ime i lozinku.")]
    InvalidCredentials,
    #[error("Account is deactivated")]
    Inactive,
    #[error("{0}")]
    Forbidden(String),
    #[error("failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

pub fn hash_password(password: &str) -> ServiceResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| ServiceError::PasswordHash(err.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Serialize, Debug)]
pub struct Session {
    pub token: String,
    pub user: User,
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

#[derive(Clone)]
pub struct AuthService {
    users: UserService,
    keys: Arc<Keys>,
    ttl: Duration,
}

impl AuthService {
    pub fn new(users: UserService, secret: &SecretString, ttl: Duration) -> Self {
        let secret = secret.expose_secret().as_bytes();
        Self {
            users,
            keys: Arc::new(Keys {
                encoding: EncodingKey::from_secret(secret),
                decoding: DecodingKey::from_secret(secret),
            }),
            ttl,
        }
    }

    pub fn issue(&self, user: &User) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            role: user.role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.keys.encoding).map_err(AuthError::Signing)
    }

    /// Check credentials and open a session. `username` is the account
    /// email.
    pub async fn login(&self, username: Option<String>, password: Option<String>) -> Result<Session, AuthError> {
        let (Some(username), Some(password)) = (
            username.filter(|u| !u.trim().is_empty()),
            password.filter(|p| !p.is_empty()),
        ) else {
            return Err(ServiceError::validation("Username and password are required").into());
        };

        let mut user = self
            .users
            .find_by_email(&username)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        if !verify_password(&password, &user.password_hash) {
            debug!(email = %user.email, "password mismatch");
            return Err(AuthError::InvalidCredentials);
        }
        if !user.is_active {
            return Err(AuthError::Inactive);
        }

        self.users.record_login(&mut user).await?;
        let token = self.issue(&user)?;
        info!(id = %user.id, email = %user.email, "user logged in");
        Ok(Session { token, user })
    }

    /// Resolve a bearer token to an active user.
    pub async fn authenticate(&self, token: &str) -> Result<User, AuthError> {
        let data = decode::<Claims>(token, &self.keys.decoding, &Validation::new(Algorithm::HS256))
            .map_err(|err| {
                debug!(error = %err, "token rejected");
                AuthError::InvalidToken
            })?;
        let user = self
            .users
            .find(data.claims.sub)
            .await?
            .ok_or(AuthError::InvalidToken)?;
        if !user.is_active {
            return Err(AuthError::Inactive);
        }
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{db::test_pool, user_service::NewUser};

    async fn setup() -> (AuthService, UserService, User) {
        let users = UserService::new(test_pool().await);
        let user = users
            .create(NewUser {
                name: "Jelena".into(),
                email: "jelena@nissal.rs".into(),
                password: "lozinka1".into(),
                role: Role::Manager,
                permissions: Vec::new(),
            })
            .await
            .unwrap();
        let auth = AuthService::new(users.clone(), &SecretString::from("test-secret"), Duration::hours(1));
        (auth, users, user)
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("lozinka1").unwrap();
        assert!(verify_password("lozinka1", &hash));
        assert!(!verify_password("lozinka2", &hash));
        assert!(!verify_password("lozinka1", "not-a-hash"));
    }

    #[tokio::test]
    async fn login_issues_token_that_authenticates() {
        let (auth, _, user) = setup().await;
        let session = auth
            .login(Some("JELENA@nissal.rs".into()), Some("lozinka1".into()))
            .await
            .unwrap();
        assert!(session.user.last_login.is_some());
        let resolved = auth.authenticate(&session.token).await.unwrap();
        assert_eq!(resolved.id, user.id);
    }

    #[tokio::test]
    async fn login_rejects_bad_credentials_and_inactive_users() {
        let (auth, users, user) = setup().await;
        assert!(matches!(
            auth.login(Some("jelena@nissal.rs".into()), Some("pogresna".into())).await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.login(Some("nema@nissal.rs".into()), Some("lozinka1".into())).await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.login(None, Some("lozinka1".into())).await,
            Err(AuthError::Service(ServiceError::Validation { .. }))
        ));

        let token = auth.issue(&user).unwrap();
        users.toggle_status(user.id, Uuid::new_v4()).await.unwrap();
        assert!(matches!(
            auth.login(Some("jelena@nissal.rs".into()), Some("lozinka1".into())).await,
            Err(AuthError::Inactive)
        ));
        assert!(matches!(auth.authenticate(&token).await, Err(AuthError::Inactive)));
    }

    #[tokio::test]
    async fn rejects_expired_and_foreign_tokens() {
        let (auth, _, user) = setup().await;
        let expired = AuthService {
            ttl: Duration::hours(-2),
            ..auth.clone()
        };
        let token = expired.issue(&user).unwrap();
        assert!(matches!(auth.authenticate(&token).await, Err(AuthError::InvalidToken)));

        let other = AuthService::new(
            UserService::new(test_pool().await),
            &SecretString::from("other-secret"),
            Duration::hours(1),
        );
        let token = other.issue(&user).unwrap();
        assert!(matches!(auth.authenticate(&token).await, Err(AuthError::InvalidToken)));
        assert!(matches!(auth.authenticate("garbage").await, Err(AuthError::InvalidToken)));
    }
}
