//! Product catalog: public queries, admin CRUD and gallery/catalog media.
//!
//! Products are stored as one JSON document per row, plus a lowercased copy
//! (`search_doc`) that text filters match against with `json_each`/`json_tree`.
//! The visibility flags and timestamps are real columns.

use super::{
    Pagination, ServiceError, ServiceResult, SortOrder,
    db::is_unique_violation,
    like_pattern,
    media::{
        CATALOGS_FOLDER, MediaObject, MediaStore, PRODUCTS_FOLDER, UploadOptions, UploadedFile,
        delete_soft, upload_each,
    },
    non_blank, page_window, search_document,
    side_effect::{Outcome, SideEffect},
};
use crate::models::{
    localized::{Language, LocalizedText},
    media::ResourceType,
    product::{
        Availability, CatalogInfo, CatalogPdf, ColorCategory, ColorOption, GalleryImage,
        Measurement, PlastificationTypes, Price, Product, ReorderItem, SizeOption,
    },
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqlitePool, types::Json};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

const IMAGE_TRANSFORMATION: &str = "q_auto:good/f_auto";
pub const LATEST_LIMIT: u32 = 6;
pub const SEARCH_LIMIT: u32 = 20;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum ProductSort {
    #[default]
    CreatedAt,
    UpdatedAt,
    Price,
    Title,
    CatalogNumber,
}

impl ProductSort {
    fn column(self) -> &'static str {
        match self {
            ProductSort::CreatedAt => "created_at",
            ProductSort::UpdatedAt => "updated_at",
            ProductSort::Price => "json_extract(data, '$.price.amount')",
            ProductSort::Title => "json_extract(search_doc, '$.title.sr')",
            ProductSort::CatalogNumber => "catalog_number",
        }
    }
}

/// Query-string filter for the public listing. Echoed back in responses.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProductFilter {
    #[serde(skip_serializing)]
    pub page: Option<u32>,
    #[serde(skip_serializing)]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Comma separated color names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colors: Option<String>,
    /// Comma separated size names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sizes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_stock: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<ProductSort>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<SortOrder>,
}

fn csv(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(like_pattern)
        .collect()
}

#[derive(Serialize, Debug)]
pub struct ProductPage {
    pub products: Vec<Product>,
    pub pagination: Pagination,
    pub filters: ProductFilter,
}

#[derive(Serialize, Debug)]
pub struct CategoryPage {
    pub products: Vec<Product>,
    pub category: String,
    pub pagination: Pagination,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ColorSummary {
    pub name: LocalizedText,
    pub hex_code: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SizeSummary {
    pub name: LocalizedText,
    pub code: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ColorImages {
    pub images: Vec<GalleryImage>,
    pub color: Option<String>,
    pub has_color_specific_images: bool,
    pub total_images: usize,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ImageRemoval {
    pub deleted_image: GalleryImage,
    pub remaining_images: usize,
    pub product: Product,
}

fn yes() -> bool {
    true
}

/// Body of a create request.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ProductDraft {
    pub title: LocalizedText,
    #[serde(default)]
    pub description: LocalizedText,
    #[serde(default)]
    pub plastification_types: PlastificationTypes,
    #[serde(default)]
    pub measurements: Vec<Measurement>,
    pub catalog: CatalogInfo,
    #[serde(default)]
    pub colors: Vec<ColorOption>,
    #[serde(default)]
    pub sizes: Vec<SizeOption>,
    #[serde(default)]
    pub price: Price,
    #[serde(default)]
    pub availability: Availability,
    #[serde(default = "yes")]
    pub is_active: bool,
    #[serde(default)]
    pub is_hidden: bool,
}

impl ProductDraft {
    fn into_product(self, id: Uuid, now: DateTime<Utc>) -> Product {
        Product {
            id,
            title: self.title.normalized(),
            description: self.description.normalized(),
            plastification_types: self.plastification_types,
            gallery: Vec::new(),
            measurements: self.measurements,
            catalog: self.catalog,
            colors: self.colors,
            sizes: self.sizes,
            price: self.price,
            availability: self.availability,
            catalog_pdf: None,
            is_active: self.is_active,
            is_hidden: self.is_hidden,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Body of an update request. Present fields replace the stored ones;
/// the gallery and catalog PDF have their own endpoints.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProductPatch {
    pub title: Option<LocalizedText>,
    pub description: Option<LocalizedText>,
    pub plastification_types: Option<PlastificationTypes>,
    pub measurements: Option<Vec<Measurement>>,
    pub catalog: Option<CatalogInfo>,
    pub colors: Option<Vec<ColorOption>>,
    pub sizes: Option<Vec<SizeOption>>,
    pub price: Option<Price>,
    pub availability: Option<Availability>,
    pub is_active: Option<bool>,
    pub is_hidden: Option<bool>,
}

impl ProductPatch {
    fn apply(self, product: &mut Product) {
        if let Some(v) = self.title {
            product.title = v.normalized();
        }
        if let Some(v) = self.description {
            product.description = v.normalized();
        }
        if let Some(v) = self.plastification_types {
            product.plastification_types = v;
        }
        if let Some(v) = self.measurements {
            product.measurements = v;
        }
        if let Some(v) = self.catalog {
            product.catalog = v;
        }
        if let Some(v) = self.colors {
            product.colors = v;
        }
        if let Some(v) = self.sizes {
            product.sizes = v;
        }
        if let Some(v) = self.price {
            product.price = v;
        }
        if let Some(v) = self.availability {
            product.availability = v;
        }
        if let Some(v) = self.is_active {
            product.is_active = v;
        }
        if let Some(v) = self.is_hidden {
            product.is_hidden = v;
        }
    }
}

fn validate(product: &Product) -> ServiceResult<()> {
    let mut errors = Vec::new();
    if product.title.is_missing(Language::Sr) {
        errors.push("Product title (Serbian) is required".to_string());
    }
    if product.title.max_chars() > 200 {
        errors.push("Title cannot exceed 200 characters".to_string());
    }
    if product.description.is_missing(Language::Sr) {
        errors.push("Product description (Serbian) is required".to_string());
    }
    if product.description.max_chars() > 2000 {
        errors.push("Description cannot exceed 2000 characters".to_string());
    }
    if product.catalog.catalog_number.trim().is_empty() {
        errors.push("Catalog number is required".to_string());
    }
    if product.catalog.category.is_missing(Language::Sr) {
        errors.push("Catalog category (Serbian) is required".to_string());
    }
    if !(product.price.amount >= 0.0) {
        errors.push("Price cannot be negative".to_string());
    }
    if product.availability.quantity < 0 {
        errors.push("Quantity cannot be negative".to_string());
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::validation_details("Validation failed", errors))
    }
}

fn write_error(err: sqlx::Error) -> ServiceError {
    if is_unique_violation(&err) {
        ServiceError::validation("Catalog number already exists")
    } else {
        err.into()
    }
}

/// Start a query over products with the visibility scope and `filter`
/// applied. `select` is everything up to `FROM products`.
fn filtered<'a>(select: &str, include_hidden: bool, filter: &ProductFilter) -> QueryBuilder<'a, Sqlite> {
    let mut qb = QueryBuilder::new(select);
    qb.push(" FROM products WHERE is_active = 1");
    if !include_hidden {
        qb.push(" AND is_hidden = 0");
    }

    if let Some(category) = non_blank(filter.category.as_deref()) {
        qb.push(
            r" AND EXISTS (SELECT 1 FROM json_each(products.search_doc, '$.catalog.category')
                WHERE value LIKE ",
        )
        .push_bind(like_pattern(category))
        .push(r" ESCAPE '\')");
    }

    for (path, values) in [
        ("$.colors", csv(filter.colors.as_deref())),
        ("$.sizes", csv(filter.sizes.as_deref())),
    ] {
        if values.is_empty() {
            continue;
        }
        qb.push(" AND EXISTS (SELECT 1 FROM json_each(products.search_doc, '")
            .push(path)
            .push("') AS opt, json_each(opt.value, '$.name') AS n WHERE ");
        for (i, pattern) in values.into_iter().enumerate() {
            if i > 0 {
                qb.push(" OR ");
            }
            qb.push("n.value LIKE ")
                .push_bind(pattern)
                .push(r" ESCAPE '\'");
        }
        qb.push(")");
    }

    if let Some(min) = filter.min_price {
        qb.push(" AND json_extract(data, '$.price.amount') >= ")
            .push_bind(min);
    }
    if let Some(max) = filter.max_price {
        qb.push(" AND json_extract(data, '$.price.amount') <= ")
            .push_bind(max);
    }
    if filter.in_stock == Some(true) {
        qb.push(
            " AND json_extract(data, '$.availability.inStock') = 1 \
             AND json_extract(data, '$.availability.quantity') > 0",
        );
    }

    if let Some(search) = non_blank(filter.search.as_deref()) {
        let pattern = like_pattern(search);
        qb.push(" AND (EXISTS (SELECT 1 FROM json_each(products.search_doc, '$.title') WHERE value LIKE ")
            .push_bind(pattern.clone())
            .push(r" ESCAPE '\') OR EXISTS (SELECT 1 FROM json_each(products.search_doc, '$.description') WHERE value LIKE ")
            .push_bind(pattern.clone())
            .push(r" ESCAPE '\') OR json_extract(search_doc, '$.catalog.catalogNumber') LIKE ")
            .push_bind(pattern.clone())
            .push(r" ESCAPE '\' OR EXISTS (SELECT 1 FROM json_tree(products.search_doc, '$.catalog.tags') WHERE type = 'text' AND value LIKE ")
            .push_bind(pattern)
            .push(r" ESCAPE '\'))");
    }

    qb
}

#[derive(Clone)]
pub struct ProductService {
    db: Arc<SqlitePool>,
    media: Arc<dyn MediaStore>,
    public_url: String,
}

impl ProductService {
    pub fn new(db: Arc<SqlitePool>, media: Arc<dyn MediaStore>, public_url: impl Into<String>) -> Self {
        Self {
            db,
            media,
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn download_url(&self, id: Uuid) -> String {
        format!("{}/api/products/{}/catalog/download", self.public_url, id)
    }

    async fn page(
        &self,
        filter: &ProductFilter,
        include_hidden: bool,
    ) -> ServiceResult<(Vec<Product>, Pagination)> {
        let (page, limit, offset) = page_window(filter.page, filter.limit, Pagination::DEFAULT_LIMIT);

        let total: i64 = filtered("SELECT COUNT(*)", include_hidden, filter)
            .build_query_scalar()
            .fetch_one(&*self.db)
            .await?;

        let sort = filter.sort_by.unwrap_or_default();
        let order = filter.sort_order.unwrap_or_default();
        let mut qb = filtered("SELECT data", include_hidden, filter);
        qb.push(" ORDER BY ")
            .push(sort.column())
            .push(" ")
            .push(order.as_sql())
            .push(", id ")
            .push(order.as_sql())
            .push(" LIMIT ")
            .push_bind(limit as i64)
            .push(" OFFSET ")
            .push_bind(offset);
        let rows: Vec<Json<Product>> = qb.build_query_scalar().fetch_all(&*self.db).await?;

        Ok((
            rows.into_iter().map(|Json(p)| p).collect(),
            Pagination::new(page, limit, total as u64),
        ))
    }

    /// Public listing: active, not hidden, filtered and paginated.
    pub async fn list(&self, filter: ProductFilter) -> ServiceResult<ProductPage> {
        let (products, pagination) = self.page(&filter, false).await?;
        Ok(ProductPage {
            products,
            pagination,
            filters: filter,
        })
    }

    pub async fn admin_list(
        &self,
        page: Option<u32>,
        limit: Option<u32>,
        include_hidden: bool,
    ) -> ServiceResult<(Vec<Product>, Pagination)> {
        let filter = ProductFilter {
            page,
            limit,
            ..Default::default()
        };
        self.page(&filter, include_hidden).await
    }

    pub async fn by_category(
        &self,
        category: Option<String>,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> ServiceResult<CategoryPage> {
        let category = non_blank(category.as_deref())
            .ok_or_else(|| ServiceError::validation("Category is required"))?
            .to_string();
        let filter = ProductFilter {
            page,
            limit,
            category: Some(category.clone()),
            ..Default::default()
        };
        let (products, pagination) = self.page(&filter, false).await?;
        Ok(CategoryPage {
            products,
            category,
            pagination,
        })
    }

    pub async fn search(&self, term: Option<String>, limit: Option<u32>) -> ServiceResult<Vec<Product>> {
        let term = non_blank(term.as_deref())
            .ok_or_else(|| ServiceError::validation("Search term is required"))?
            .to_string();
        let filter = ProductFilter {
            page: Some(1),
            limit: Some(limit.unwrap_or(SEARCH_LIMIT)),
            search: Some(term),
            ..Default::default()
        };
        Ok(self.page(&filter, false).await?.0)
    }

    /// Newest visible products that are in stock.
    pub async fn latest(&self, limit: Option<u32>) -> ServiceResult<Vec<Product>> {
        let limit = limit.unwrap_or(LATEST_LIMIT).clamp(1, Pagination::MAX_LIMIT);
        let rows: Vec<Json<Product>> = sqlx::query_scalar(
            "SELECT data FROM products
             WHERE is_active = 1 AND is_hidden = 0
               AND json_extract(data, '$.availability.inStock') = 1
             ORDER BY created_at DESC
             LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&*self.db)
        .await?;
        Ok(rows.into_iter().map(|Json(p)| p).collect())
    }

    pub async fn categories(&self) -> ServiceResult<Vec<LocalizedText>> {
        let rows: Vec<Option<Json<LocalizedText>>> = sqlx::query_scalar(
            "SELECT DISTINCT json_extract(data, '$.catalog.category')
             FROM products WHERE is_active = 1",
        )
        .fetch_all(&*self.db)
        .await?;
        let mut categories: Vec<LocalizedText> = rows
            .into_iter()
            .flatten()
            .map(|Json(c)| c)
            .filter(|c| !c.is_missing(Language::Sr))
            .collect();
        categories.sort_by(|a, b| a.sr.cmp(&b.sr));
        categories.dedup();
        Ok(categories)
    }

    pub async fn colors(&self) -> ServiceResult<Vec<ColorSummary>> {
        let rows: Vec<(Json<LocalizedText>, String)> = sqlx::query_as(
            "SELECT DISTINCT json_extract(c.value, '$.name'), json_extract(c.value, '$.hexCode')
             FROM products, json_each(products.data, '$.colors') AS c
             WHERE products.is_active = 1",
        )
        .fetch_all(&*self.db)
        .await?;
        let mut colors: Vec<ColorSummary> = rows
            .into_iter()
            .map(|(Json(name), hex_code)| ColorSummary { name, hex_code })
            .collect();
        colors.sort_by(|a, b| a.name.sr.cmp(&b.name.sr).then(a.hex_code.cmp(&b.hex_code)));
        Ok(colors)
    }

    pub async fn sizes(&self) -> ServiceResult<Vec<SizeSummary>> {
        let rows: Vec<(Json<LocalizedText>, String)> = sqlx::query_as(
            "SELECT DISTINCT json_extract(s.value, '$.name'), json_extract(s.value, '$.code')
             FROM products, json_each(products.data, '$.sizes') AS s
             WHERE products.is_active = 1",
        )
        .fetch_all(&*self.db)
        .await?;
        let mut sizes: Vec<SizeSummary> = rows
            .into_iter()
            .map(|(Json(name), code)| SizeSummary { name, code })
            .collect();
        sizes.sort_by(|a, b| a.name.sr.cmp(&b.name.sr).then(a.code.cmp(&b.code)));
        Ok(sizes)
    }

    async fn find(&self, id: Uuid) -> ServiceResult<Option<Product>> {
        let row: Option<Json<Product>> = sqlx::query_scalar("SELECT data FROM products WHERE id = ?")
            .bind(id)
            .fetch_optional(&*self.db)
            .await?;
        Ok(row.map(|Json(p)| p))
    }

    /// Any product, regardless of visibility.
    pub async fn get(&self, id: Uuid) -> ServiceResult<Product> {
        self.find(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product not found"))
    }

    pub async fn get_visible(&self, id: Uuid) -> ServiceResult<Product> {
        self.find(id)
            .await?
            .filter(Product::is_displayable)
            .ok_or_else(|| ServiceError::not_found("Product not found"))
    }

    /// Products with the given ids, in no particular order. Unknown ids
    /// are skipped.
    pub async fn find_many(&self, ids: &[Uuid]) -> ServiceResult<Vec<Product>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT data FROM products WHERE id IN (");
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");
        let rows: Vec<Json<Product>> = qb.build_query_scalar().fetch_all(&*self.db).await?;
        Ok(rows.into_iter().map(|Json(p)| p).collect())
    }

    pub async fn all_ids(&self) -> ServiceResult<Vec<Uuid>> {
        Ok(sqlx::query_scalar("SELECT id FROM products ORDER BY created_at")
            .fetch_all(&*self.db)
            .await?)
    }

    async fn insert(&self, product: &Product) -> ServiceResult<()> {
        sqlx::query(
            "INSERT INTO products (id, catalog_number, data, search_doc, is_active, is_hidden, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(product.id)
        .bind(product.catalog.catalog_number.trim())
        .bind(Json(product))
        .bind(Json(search_document(product)?))
        .bind(product.is_active)
        .bind(product.is_hidden)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&*self.db)
        .await
        .map_err(write_error)?;
        Ok(())
    }

    /// Write the whole document back, refreshing `updated_at`.
    pub async fn persist(&self, product: &Product) -> ServiceResult<Product> {
        let mut product = product.clone();
        product.updated_at = Utc::now();
        let result = sqlx::query(
            "UPDATE products
             SET catalog_number = ?, data = ?, search_doc = ?, is_active = ?, is_hidden = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(product.catalog.catalog_number.trim())
        .bind(Json(&product))
        .bind(Json(search_document(&product)?))
        .bind(product.is_active)
        .bind(product.is_hidden)
        .bind(product.updated_at)
        .bind(product.id)
        .execute(&*self.db)
        .await
        .map_err(write_error)?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found("Product not found"));
        }
        Ok(product)
    }

    async fn ensure_catalog_number_free(&self, number: &str, except: Option<Uuid>) -> ServiceResult<()> {
        let taken: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM products WHERE catalog_number = ? AND id IS NOT ?",
        )
        .bind(number.trim())
        .bind(except)
        .fetch_one(&*self.db)
        .await?;
        if taken > 0 {
            return Err(ServiceError::validation("Catalog number already exists"));
        }
        Ok(())
    }

    async fn upload_gallery(&self, product: &Product, files: &[UploadedFile]) -> (Vec<GalleryImage>, Vec<SideEffect>) {
        let alt = product
            .title
            .get(Language::Sr)
            .unwrap_or("Product image")
            .to_string();
        let (assets, effects) =
            upload_each(&*self.media, files, PRODUCTS_FOLDER, Some(IMAGE_TRANSFORMATION)).await;
        let images = assets
            .into_iter()
            .map(|(_, asset)| GalleryImage {
                url: asset.url,
                public_id: asset.public_id,
                alt: alt.clone(),
                is_main: false,
                color_association: None,
                category_association: None,
            })
            .collect();
        (images, effects)
    }

    /// Best-effort removal of assets uploaded for a write that then failed.
    async fn discard(&self, images: &[GalleryImage]) {
        for image in images {
            delete_soft(&*self.media, &image.public_id, ResourceType::Image).await;
        }
    }

    #[instrument(skip(self, draft, images), fields(images = images.len()))]
    pub async fn create(&self, draft: ProductDraft, images: Vec<UploadedFile>) -> ServiceResult<Outcome<Product>> {
        let mut product = draft.into_product(Uuid::new_v4(), Utc::now());
        validate(&product)?;
        self.ensure_catalog_number_free(&product.catalog.catalog_number, None)
            .await?;

        let (gallery, effects) = self.upload_gallery(&product, &images).await;
        product.append_images(gallery);

        if let Err(err) = self.insert(&product).await {
            self.discard(&product.gallery).await;
            return Err(err);
        }
        info!(id = %product.id, catalog_number = %product.catalog.catalog_number, "product created");
        Ok(Outcome::with_effects(product, effects))
    }

    #[instrument(skip(self, patch, images), fields(images = images.len()))]
    pub async fn update(
        &self,
        id: Uuid,
        patch: ProductPatch,
        images: Vec<UploadedFile>,
    ) -> ServiceResult<Outcome<Product>> {
        let mut product = self.get(id).await?;
        patch.apply(&mut product);
        validate(&product)?;
        self.ensure_catalog_number_free(&product.catalog.catalog_number, Some(id))
            .await?;

        let (gallery, effects) = self.upload_gallery(&product, &images).await;
        let added = gallery.clone();
        product.append_images(gallery);

        match self.persist(&product).await {
            Ok(saved) => Ok(Outcome::with_effects(saved, effects)),
            Err(err) => {
                self.discard(&added).await;
                Err(err)
            }
        }
    }

    /// Delete remote assets (soft-fail), then the product itself.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> ServiceResult<Outcome<()>> {
        let product = self.get(id).await?;
        let mut effects = Vec::new();
        for image in product.gallery.iter().filter(|i| !i.public_id.is_empty()) {
            effects.push(delete_soft(&*self.media, &image.public_id, ResourceType::Image).await);
        }
        if let Some(pdf) = &product.catalog_pdf {
            effects.push(delete_soft(&*self.media, &pdf.public_id, ResourceType::Raw).await);
        }

        sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        info!(%id, "product deleted");
        Ok(Outcome::with_effects((), effects))
    }

    pub async fn set_hidden(&self, id: Uuid, hidden: bool) -> ServiceResult<Product> {
        let mut product = self.get(id).await?;
        product.is_hidden = hidden;
        self.persist(&product).await
    }

    /// Upload a catalog PDF, replacing any previous one. The old file is
    /// deleted only after the new one is stored.
    #[instrument(skip(self, file), fields(filename = %file.filename))]
    pub async fn upload_catalog(&self, id: Uuid, file: UploadedFile) -> ServiceResult<Outcome<CatalogPdf>> {
        if file.content_type != "application/pdf" {
            return Err(ServiceError::validation("Only PDF files are allowed"));
        }
        file.validate()?;
        let mut product = self.get(id).await?;

        let now = Utc::now();
        let options = UploadOptions::new(CATALOGS_FOLDER, ResourceType::Raw, &file)
            .public_id(format!("catalog_{}_{}", id.simple(), now.timestamp_millis()));
        let asset = self.media.upload(file.data.clone(), options).await?;

        let pdf = CatalogPdf {
            url: asset.url,
            download_url: self.download_url(id),
            public_id: asset.public_id,
            filename: file.filename,
            uploaded_at: now,
        };
        let previous = product.catalog_pdf.replace(pdf.clone());
        if let Err(err) = self.persist(&product).await {
            delete_soft(&*self.media, &pdf.public_id, ResourceType::Raw).await;
            return Err(err);
        }

        let mut effects = Vec::new();
        if let Some(old) = previous {
            effects.push(delete_soft(&*self.media, &old.public_id, ResourceType::Raw).await);
        }
        Ok(Outcome::with_effects(pdf, effects))
    }

    pub async fn delete_catalog(&self, id: Uuid) -> ServiceResult<Outcome<Product>> {
        let mut product = self.get(id).await?;
        let pdf = product
            .catalog_pdf
            .take()
            .ok_or_else(|| ServiceError::not_found("No catalog PDF found for this product"))?;
        let effect = delete_soft(&*self.media, &pdf.public_id, ResourceType::Raw).await;
        let saved = self.persist(&product).await?;
        Ok(Outcome::with_effects(saved, vec![effect]))
    }

    /// Open the catalog PDF of a visible product for streaming.
    pub async fn open_catalog(&self, id: Uuid) -> ServiceResult<(CatalogPdf, MediaObject)> {
        let not_found = || ServiceError::not_found("Catalog PDF not found");
        let pdf = self
            .find(id)
            .await?
            .filter(Product::is_displayable)
            .and_then(|p| p.catalog_pdf)
            .ok_or_else(not_found)?;
        let object = self
            .media
            .open(&pdf.public_id, ResourceType::Raw)
            .await
            .map_err(|err| match err {
                super::media::MediaError::NotFound(_) => not_found(),
                other => other.into(),
            })?;
        Ok((pdf, object))
    }

    /// Recompute stored catalog URLs from their public ids. Returns how
    /// many products carry a catalog.
    #[instrument(skip(self))]
    pub async fn refresh_pdf_urls(&self) -> ServiceResult<u64> {
        let rows: Vec<Json<Product>> = sqlx::query_scalar(
            "SELECT data FROM products WHERE json_extract(data, '$.catalogPdf.publicId') IS NOT NULL",
        )
        .fetch_all(&*self.db)
        .await?;

        let mut count = 0;
        for Json(mut product) in rows {
            let id = product.id;
            let Some(pdf) = product.catalog_pdf.as_mut() else {
                continue;
            };
            let url = self.media.url(&pdf.public_id, ResourceType::Raw);
            let download_url = self.download_url(id);
            if pdf.url != url || pdf.download_url != download_url {
                pdf.url = url;
                pdf.download_url = download_url;
                self.persist(&product).await?;
            }
            count += 1;
        }
        info!(count, "catalog PDF urls refreshed");
        Ok(count)
    }

    fn check_index(product: &Product, index: usize) -> ServiceResult<()> {
        if index >= product.gallery.len() {
            return Err(ServiceError::validation("Invalid image index"));
        }
        Ok(())
    }

    /// Tie a gallery image to one of the product's colors; an empty name
    /// clears the association.
    pub async fn associate_color(&self, id: Uuid, index: usize, color: Option<String>) -> ServiceResult<Product> {
        let mut product = self.get(id).await?;
        Self::check_index(&product, index)?;
        let color = color.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
        if let Some(name) = &color {
            if !product.has_color(name) {
                return Err(ServiceError::validation("Color not found in product colors"));
            }
        }
        product.gallery[index].color_association = color;
        self.persist(&product).await
    }

    pub async fn associate_category(
        &self,
        id: Uuid,
        index: usize,
        category: Option<ColorCategory>,
    ) -> ServiceResult<Product> {
        let mut product = self.get(id).await?;
        Self::check_index(&product, index)?;
        product.gallery[index].category_association = category;
        self.persist(&product).await
    }

    pub async fn reorder_images(&self, id: Uuid, order: Vec<ReorderItem>) -> ServiceResult<Product> {
        let mut product = self.get(id).await?;
        product.reorder_gallery(&order);
        self.persist(&product).await
    }

    pub async fn delete_image(&self, id: Uuid, index: usize) -> ServiceResult<Outcome<ImageRemoval>> {
        let mut product = self.get(id).await?;
        Self::check_index(&product, index)?;

        let mut effects = Vec::new();
        let public_id = product.gallery[index].public_id.clone();
        if !public_id.is_empty() {
            effects.push(delete_soft(&*self.media, &public_id, ResourceType::Image).await);
        }
        let Some(deleted_image) = product.remove_image(index) else {
            return Err(ServiceError::validation("Invalid image index"));
        };
        let product = self.persist(&product).await?;
        Ok(Outcome::with_effects(
            ImageRemoval {
                deleted_image,
                remaining_images: product.gallery.len(),
                product,
            },
            effects,
        ))
    }

    pub async fn images_by_color(&self, id: Uuid, color: Option<String>) -> ServiceResult<ColorImages> {
        let product = self.get(id).await?;
        let images = product
            .images_by_color(color.as_deref())
            .into_iter()
            .cloned()
            .collect();
        Ok(ColorImages {
            images,
            color,
            has_color_specific_images: product
                .gallery
                .iter()
                .any(|i| i.color_association.is_some()),
            total_images: product.gallery.len(),
        })
    }
}
