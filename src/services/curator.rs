//! Homepage featured-product curation.
//!
//! The featured set is a [`HomepageSettings`] singleton. Every mutation is
//! a load-check-save cycle through [`SettingsStore::modify`], so two admins
//! racing on the same slot end with one success and one `Conflict`.

use super::{
    ServiceError, ServiceResult, product_service::ProductService, settings_service::SettingsStore,
};
use crate::models::{
    product::Product,
    settings::{CurationError, FeaturedEntry, HomepageSettings, Singleton, order_in_range},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

/// One slot of the admin view; `product` is `None` when the referenced
/// product no longer exists.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct FeaturedSlot {
    pub product_id: Uuid,
    pub order: i64,
    pub product: Option<Product>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CurationView {
    pub featured_products: Vec<FeaturedSlot>,
    pub last_modified_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PruneReport {
    pub removed: Vec<Uuid>,
    #[serde(flatten)]
    pub view: CurationView,
}

#[derive(Clone)]
pub struct Curator {
    store: SettingsStore<HomepageSettings>,
    products: ProductService,
}

impl Curator {
    pub fn new(store: SettingsStore<HomepageSettings>, products: ProductService) -> Self {
        Self { store, products }
    }

    async fn products_by_id(&self, ids: &[Uuid]) -> ServiceResult<HashMap<Uuid, Product>> {
        Ok(self
            .products
            .find_many(ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect())
    }

    async fn view(&self, settings: Singleton<HomepageSettings>) -> ServiceResult<CurationView> {
        let entries = settings.document.sorted();
        let ids: Vec<Uuid> = entries.iter().map(|e| e.product_id).collect();
        let mut products = self.products_by_id(&ids).await?;
        Ok(CurationView {
            featured_products: entries
                .into_iter()
                .map(|e| FeaturedSlot {
                    product_id: e.product_id,
                    order: e.order,
                    product: products.remove(&e.product_id),
                })
                .collect(),
            last_modified_by: settings.last_modified_by,
            created_at: settings.created_at,
            updated_at: settings.updated_at,
        })
    }

    pub async fn admin_view(&self) -> ServiceResult<CurationView> {
        let current = self.store.get_current().await?;
        self.view(current).await
    }

    /// Featured products in slot order, skipping any that are missing,
    /// inactive or hidden.
    pub async fn resolve_for_display(&self) -> ServiceResult<Vec<Product>> {
        let entries = self.store.get_current().await?.document.sorted();
        let ids: Vec<Uuid> = entries.iter().map(|e| e.product_id).collect();
        let mut products = self.products_by_id(&ids).await?;
        Ok(entries
            .iter()
            .filter_map(|e| products.remove(&e.product_id))
            .filter(Product::is_displayable)
            .collect())
    }

    /// Replace the whole featured set.
    pub async fn set_all(&self, entries: Vec<FeaturedEntry>, actor: Uuid) -> ServiceResult<CurationView> {
        HomepageSettings::validate_entries(&entries)?;

        let ids: Vec<Uuid> = entries.iter().map(|e| e.product_id).collect();
        let found = self.products_by_id(&ids).await?;
        let invalid: Vec<Uuid> = ids
            .iter()
            .copied()
            .filter(|id| !found.get(id).is_some_and(Product::is_displayable))
            .collect();
        if !invalid.is_empty() {
            return Err(ServiceError::validation_details(
                "Some products are invalid or inactive",
                json!({ "invalidProducts": invalid }),
            ));
        }

        let saved = self
            .store
            .modify(Some(actor), |doc| {
                doc.featured_products = entries;
                Ok(())
            })
            .await?;
        info!(count = saved.document.featured_products.len(), %actor, "featured products replaced");
        self.view(saved).await
    }

    /// Feature one product. `order` defaults to the next free position
    /// by count; values outside `1..=4` are rejected before any lookup.
    pub async fn add(&self, product_id: Uuid, order: Option<i64>, actor: Uuid) -> ServiceResult<CurationView> {
        if order.is_some_and(|o| !order_in_range(o)) {
            return Err(CurationError::InvalidOrder.into());
        }

        let displayable = self
            .products_by_id(&[product_id])
            .await?
            .get(&product_id)
            .is_some_and(Product::is_displayable);
        if !displayable {
            return Err(ServiceError::not_found("Product not found or inactive"));
        }

        let saved = self
            .store
            .modify(Some(actor), |doc| {
                doc.add(product_id, order)?;
                Ok(())
            })
            .await?;
        info!(%product_id, %actor, "product featured");
        self.view(saved).await
    }

    pub async fn remove(&self, product_id: Uuid, actor: Uuid) -> ServiceResult<CurationView> {
        let saved = self
            .store
            .modify(Some(actor), |doc| {
                doc.remove(product_id)?;
                Ok(())
            })
            .await?;
        info!(%product_id, %actor, "product unfeatured");
        self.view(saved).await
    }

    pub async fn clear(&self, actor: Uuid) -> ServiceResult<CurationView> {
        let saved = self
            .store
            .modify(Some(actor), |doc| {
                doc.featured_products.clear();
                Ok(())
            })
            .await?;
        self.view(saved).await
    }

    /// Drop entries whose product is gone, inactive or hidden. Writes only
    /// when something was removed.
    pub async fn prune_stale(&self, actor: Uuid) -> ServiceResult<PruneReport> {
        let current = self.store.get_current().await?;
        let ids: Vec<Uuid> = current
            .document
            .featured_products
            .iter()
            .map(|e| e.product_id)
            .collect();
        let found = self.products_by_id(&ids).await?;
        let removed: Vec<Uuid> = ids
            .into_iter()
            .filter(|id| !found.get(id).is_some_and(Product::is_displayable))
            .collect();

        let settings = if removed.is_empty() {
            current
        } else {
            let mut document = current.document.clone();
            document
                .featured_products
                .retain(|e| !removed.contains(&e.product_id));
            let saved = self.store.save(&current, &document, Some(actor)).await?;
            info!(removed = removed.len(), %actor, "stale featured products pruned");
            saved
        };

        Ok(PruneReport {
            removed,
            view: self.view(settings).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        db::test_pool,
        media::testing::MemoryMediaStore,
        product_service::testing::draft,
    };
    use std::sync::Arc;

    async fn setup() -> (Curator, ProductService) {
        let db = test_pool().await;
        let products = ProductService::new(db.clone(), Arc::new(MemoryMediaStore::default()), "http://localhost");
        (Curator::new(SettingsStore::new(db), products.clone()), products)
    }

    async fn product(products: &ProductService, n: u32) -> Uuid {
        products
            .create(draft(&format!("NS-{n}"), &format!("Proizvod {n}")), Vec::new())
            .await
            .unwrap()
            .value
            .id
    }

    #[tokio::test]
    async fn add_assigns_next_order_and_enforces_capacity() {
        let (curator, products) = setup().await;
        let actor = Uuid::new_v4();
        let mut ids = Vec::new();
        for n in 0..5 {
            ids.push(product(&products, n).await);
        }

        for id in &ids[..4] {
            curator.add(*id, None, actor).await.unwrap();
        }
        let view = curator.admin_view().await.unwrap();
        let orders: Vec<i64> = view.featured_products.iter().map(|s| s.order).collect();
        assert_eq!(orders, vec![1, 2, 3, 4]);
        assert_eq!(view.last_modified_by, Some(actor));

        let err = curator.add(ids[4], None, actor).await.unwrap_err();
        assert_eq!(err.to_string(), "Maximum 4 featured products allowed");
        let err = curator.add(ids[0], None, actor).await.unwrap_err();
        assert_eq!(err.to_string(), "Product is already featured");
    }

    #[tokio::test]
    async fn add_checks_order_then_product() {
        let (curator, products) = setup().await;
        let actor = Uuid::new_v4();
        let a = product(&products, 1).await;
        let b = product(&products, 2).await;

        let err = curator.add(Uuid::new_v4(), Some(5), actor).await.unwrap_err();
        assert_eq!(err.to_string(), "Order must be an integer between 1 and 4");
        let err = curator.add(Uuid::new_v4(), Some(1), actor).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        curator.add(a, Some(2), actor).await.unwrap();
        let err = curator.add(b, Some(2), actor).await.unwrap_err();
        assert_eq!(err.to_string(), "Order position 2 is already taken");

        products.set_hidden(b, true).await.unwrap();
        let err = curator.add(b, Some(3), actor).await.unwrap_err();
        assert_eq!(err.to_string(), "Product not found or inactive");
    }

    #[tokio::test]
    async fn set_all_validates_before_writing() {
        let (curator, products) = setup().await;
        let actor = Uuid::new_v4();
        let a = product(&products, 1).await;
        let b = product(&products, 2).await;

        let dup = vec![
            FeaturedEntry { product_id: a, order: 1 },
            FeaturedEntry { product_id: b, order: 1 },
        ];
        let err = curator.set_all(dup, actor).await.unwrap_err();
        assert_eq!(err.to_string(), "Featured products must have unique order numbers");

        for order in [300, -1, 0] {
            let err = curator
                .set_all(vec![FeaturedEntry { product_id: a, order }], actor)
                .await
                .unwrap_err();
            assert_eq!(err.to_string(), "Order must be an integer between 1 and 4");
        }

        let missing = Uuid::new_v4();
        let err = curator
            .set_all(
                vec![
                    FeaturedEntry { product_id: a, order: 1 },
                    FeaturedEntry { product_id: missing, order: 2 },
                ],
                actor,
            )
            .await
            .unwrap_err();
        match err {
            ServiceError::Validation { message, details } => {
                assert_eq!(message, "Some products are invalid or inactive");
                assert_eq!(details.unwrap()["invalidProducts"][0], missing.to_string());
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(curator.admin_view().await.unwrap().featured_products.is_empty());

        let view = curator
            .set_all(
                vec![
                    FeaturedEntry { product_id: b, order: 3 },
                    FeaturedEntry { product_id: a, order: 1 },
                ],
                actor,
            )
            .await
            .unwrap();
        assert_eq!(view.featured_products[0].product_id, a);
        assert!(view.featured_products[1].product.is_some());
    }

    #[tokio::test]
    async fn display_skips_hidden_and_prune_removes_them() {
        let (curator, products) = setup().await;
        let actor = Uuid::new_v4();
        let a = product(&products, 1).await;
        let b = product(&products, 2).await;
        let c = product(&products, 3).await;
        curator.add(c, Some(1), actor).await.unwrap();
        curator.add(a, Some(2), actor).await.unwrap();
        curator.add(b, Some(3), actor).await.unwrap();

        products.set_hidden(a, true).await.unwrap();
        products.delete(b).await.unwrap();

        let shown: Vec<Uuid> = curator
            .resolve_for_display()
            .await
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(shown, vec![c]);
        assert_eq!(curator.admin_view().await.unwrap().featured_products.len(), 3);

        let report = curator.prune_stale(actor).await.unwrap();
        assert_eq!(report.removed, vec![a, b]);
        assert_eq!(report.view.featured_products.len(), 1);
        assert_eq!(report.view.featured_products[0].order, 1);
    }

    #[tokio::test]
    async fn remove_and_clear() {
        let (curator, products) = setup().await;
        let actor = Uuid::new_v4();
        let a = product(&products, 1).await;
        let err = curator.remove(a, actor).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        curator.add(a, None, actor).await.unwrap();
        curator.remove(a, actor).await.unwrap();
        curator.add(a, None, actor).await.unwrap();
        assert!(curator.clear(actor).await.unwrap().featured_products.is_empty());
    }
}
