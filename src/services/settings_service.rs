//! Singleton settings store.
//!
//! Each document type lives in one row of `settings` whose primary key is
//! the constant [`SingletonDocument::KEY`]. Creation on first read is an
//! `INSERT .. ON CONFLICT DO NOTHING` followed by a read, so concurrent
//! first access converges on one row. Writes carry an optimistic revision
//! check and fail with `Conflict` when another writer got there first.

use super::{ServiceError, ServiceResult};
use crate::models::settings::{
    ContactInfoPatch, EmailSettingsUpdate, Singleton, SingletonDocument, SiteSettings,
    SiteSettingsPatch,
};
use chrono::{DateTime, Utc};
use sqlx::{SqlitePool, types::Json};
use std::{marker::PhantomData, sync::Arc};
use tracing::{info, instrument};
use uuid::Uuid;

type SingletonRow<T> = (
    Uuid,
    Json<T>,
    i64,
    Option<Uuid>,
    DateTime<Utc>,
    DateTime<Utc>,
);

pub struct SettingsStore<T> {
    db: Arc<SqlitePool>,
    _doc: PhantomData<fn() -> T>,
}

impl<T> Clone for SettingsStore<T> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            _doc: PhantomData,
        }
    }
}

impl<T: SingletonDocument> SettingsStore<T> {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self {
            db,
            _doc: PhantomData,
        }
    }

    /// Return the one stored document, creating it with defaults if absent.
    pub async fn get_current(&self) -> ServiceResult<Singleton<T>> {
        let now = Utc::now();
        let created = sqlx::query(
            "INSERT INTO settings (key, id, data, version, last_modified_by, created_at, updated_at)
             VALUES (?, ?, ?, 0, NULL, ?, ?)
             ON CONFLICT(key) DO NOTHING",
        )
        .bind(T::KEY)
        .bind(Uuid::new_v4())
        .bind(Json(T::default()))
        .bind(now)
        .bind(now)
        .execute(&*self.db)
        .await?;

        if created.rows_affected() == 1 {
            info!(key = T::KEY, "created default settings document");
        }

        self.fetch().await
    }

    async fn fetch(&self) -> ServiceResult<Singleton<T>> {
        let (id, Json(document), revision, last_modified_by, created_at, updated_at) =
            sqlx::query_as::<_, SingletonRow<T>>(
                "SELECT id, data, version, last_modified_by, created_at, updated_at
                 FROM settings WHERE key = ?",
            )
            .bind(T::KEY)
            .fetch_one(&*self.db)
            .await?;

        Ok(Singleton {
            id,
            revision,
            last_modified_by,
            created_at,
            updated_at,
            document,
        })
    }

    /// Persist `document` over `current`, provided nobody wrote in between.
    pub async fn save(
        &self,
        current: &Singleton<T>,
        document: &T,
        actor: Option<Uuid>,
    ) -> ServiceResult<Singleton<T>> {
        let result = sqlx::query(
            "UPDATE settings
             SET data = ?, version = version + 1, last_modified_by = ?, updated_at = ?
             WHERE key = ? AND id = ? AND version = ?",
        )
        .bind(Json(document))
        .bind(actor)
        .bind(Utc::now())
        .bind(T::KEY)
        .bind(current.id)
        .bind(current.revision)
        .execute(&*self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::Conflict(
                "Settings were modified concurrently; reload and try again".into(),
            ));
        }

        self.fetch().await
    }

    /// Load, mutate with `f`, and save. `f` runs before any write, so a
    /// validation error leaves the stored document untouched.
    pub async fn modify<F>(&self, actor: Option<Uuid>, f: F) -> ServiceResult<Singleton<T>>
    where
        F: FnOnce(&mut T) -> ServiceResult<()>,
    {
        let current = self.get_current().await?;
        let mut document = current.document.clone();
        f(&mut document)?;
        self.save(&current, &document, actor).await
    }

    /// Delete the stored document and recreate it with defaults stamped
    /// with `actor`. The new document has a fresh identity.
    #[instrument(skip(self), fields(key = T::KEY))]
    pub async fn reset(&self, actor: Option<Uuid>) -> ServiceResult<Singleton<T>> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM settings WHERE key = ?")
            .bind(T::KEY)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO settings (key, id, data, version, last_modified_by, created_at, updated_at)
             VALUES (?, ?, ?, 0, ?, ?, ?)",
        )
        .bind(T::KEY)
        .bind(Uuid::new_v4())
        .bind(Json(T::default()))
        .bind(actor)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!("settings reset to defaults");
        self.fetch().await
    }
}

fn invalid(errors: Vec<String>) -> ServiceError {
    ServiceError::validation_details("Validation failed", errors)
}

/// Site settings operations on top of the generic store.
impl SettingsStore<SiteSettings> {
    pub async fn update_general(
        &self,
        patch: SiteSettingsPatch,
        actor: Uuid,
    ) -> ServiceResult<Singleton<SiteSettings>> {
        patch.validate().map_err(invalid)?;
        self.modify(Some(actor), |doc| {
            patch.apply(doc);
            Ok(())
        })
        .await
    }

    pub async fn update_contact(
        &self,
        patch: ContactInfoPatch,
        actor: Uuid,
    ) -> ServiceResult<Singleton<SiteSettings>> {
        patch.validate().map_err(invalid)?;
        self.modify(Some(actor), |doc| {
            patch.apply(doc);
            Ok(())
        })
        .await
    }

    pub async fn update_email(
        &self,
        update: EmailSettingsUpdate,
        actor: Uuid,
    ) -> ServiceResult<Singleton<SiteSettings>> {
        update.validate().map_err(invalid)?;
        self.modify(Some(actor), |doc| {
            update.apply(doc);
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::settings::{AddressPatch, HomepageSettings};
    use crate::services::db::test_pool;

    #[tokio::test]
    async fn get_current_returns_same_identity() {
        let store = SettingsStore::<SiteSettings>::new(test_pool().await);
        let first = store.get_current().await.unwrap();
        let second = store.get_current().await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.document, SiteSettings::default());
    }

    #[tokio::test]
    async fn concurrent_first_access_creates_one_row() {
        let db = test_pool().await;
        let store = SettingsStore::<HomepageSettings>::new(db.clone());
        let (a, b) = tokio::join!(store.get_current(), store.get_current());
        assert_eq!(a.unwrap().id, b.unwrap().id);
        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM settings WHERE key = 'homepage'")
            .fetch_one(&*db)
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn documents_are_keyed_independently() {
        let db = test_pool().await;
        let site = SettingsStore::<SiteSettings>::new(db.clone());
        let home = SettingsStore::<HomepageSettings>::new(db);
        assert_ne!(
            site.get_current().await.unwrap().id,
            home.get_current().await.unwrap().id
        );
    }

    #[tokio::test]
    async fn update_merges_and_stamps_actor() {
        let store = SettingsStore::<SiteSettings>::new(test_pool().await);
        let actor = Uuid::new_v4();
        let patch = ContactInfoPatch {
            company_address: Some(AddressPatch {
                city: Some("Novi Sad".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let saved = store.update_contact(patch, actor).await.unwrap();
        assert_eq!(saved.last_modified_by, Some(actor));
        assert_eq!(saved.revision, 1);
        assert_eq!(saved.document.company_address.city, "Novi Sad");
        assert_eq!(saved.document.company_address.country, "Srbija");
    }

    #[tokio::test]
    async fn invalid_patch_leaves_document_unchanged() {
        let store = SettingsStore::<SiteSettings>::new(test_pool().await);
        let before = store.get_current().await.unwrap();
        let patch = SiteSettingsPatch {
            site_title: Some("x".into()),
            ..Default::default()
        };
        let err = store.update_general(patch, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation { .. }));
        let after = store.get_current().await.unwrap();
        assert_eq!(after.revision, before.revision);
        assert_eq!(after.document, before.document);
    }

    #[tokio::test]
    async fn stale_save_is_a_conflict() {
        let store = SettingsStore::<HomepageSettings>::new(test_pool().await);
        let current = store.get_current().await.unwrap();
        store
            .save(&current, &HomepageSettings::default(), None)
            .await
            .unwrap();
        let err = store
            .save(&current, &HomepageSettings::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn reset_recreates_defaults_with_new_identity() {
        let store = SettingsStore::<SiteSettings>::new(test_pool().await);
        let actor = Uuid::new_v4();
        let patch = SiteSettingsPatch {
            site_title: Some("Nissal doo".into()),
            ..Default::default()
        };
        let updated = store.update_general(patch, actor).await.unwrap();
        let reset = store.reset(Some(actor)).await.unwrap();
        assert_ne!(reset.id, updated.id);
        assert_eq!(reset.document, SiteSettings::default());
        assert_eq!(reset.last_modified_by, Some(actor));
        assert_eq!(store.get_current().await.unwrap().id, reset.id);
    }
}
