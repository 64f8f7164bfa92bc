//! Product catalog endpoints under `/api/products`.
//!
//! Public reads only ever see active, non-hidden products. Everything that
//! writes needs the `manage_products` permission.

use super::{
    auth::CurrentUser,
    extract::{ApiJson, ApiPath, ApiQuery},
    response::ApiResponse,
    upload::{MAX_PRODUCT_IMAGES, Payload},
};
use crate::{
    AppState,
    errors::AppError,
    models::{
        localized::LocalizedText,
        product::{CatalogPdf, ColorCategory, Product, ReorderItem},
        user::Permission,
    },
    services::{
        Pagination,
        media::UploadedFile,
        product_service::{
            CategoryPage, ColorImages, ColorSummary, ImageRemoval, ProductDraft, ProductFilter,
            ProductPage, ProductPatch, SizeSummary,
        },
    },
};
use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Deserialize, Debug, Default)]
pub struct LimitQuery {
    pub limit: Option<u32>,
}

#[derive(Deserialize, Debug, Default)]
pub struct SearchQuery {
    pub search: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Deserialize, Debug, Default)]
pub struct CategoryQuery {
    pub category: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct AdminListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    #[serde(default)]
    pub include_hidden: bool,
}

#[derive(Deserialize, Debug, Default)]
pub struct ColorQuery {
    pub color: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AssociateColor {
    pub image_index: usize,
    pub color_name: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AssociateCategory {
    pub image_index: usize,
    pub category: Option<ColorCategory>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ReorderImages {
    pub image_order: Vec<ReorderItem>,
}

#[derive(Serialize, Debug)]
pub struct AdminPage {
    pub products: Vec<Product>,
    pub pagination: Pagination,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PdfRefresh {
    pub updated_count: u64,
}

/// Reject any file outside the upload allow-list before touching storage.
fn check_files(files: &[UploadedFile]) -> Result<(), AppError> {
    for file in files {
        file.validate()?;
    }
    Ok(())
}

/// GET `/api/products`
pub async fn list_products(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<ProductFilter>,
) -> Result<ApiResponse<ProductPage>, AppError> {
    Ok(ApiResponse::ok(state.products.list(filter).await?))
}

/// GET `/api/products/featured`: newest in-stock products.
pub async fn latest_products(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<LimitQuery>,
) -> Result<ApiResponse<Vec<Product>>, AppError> {
    Ok(ApiResponse::ok(state.products.latest(q.limit).await?))
}

pub async fn categories(State(state): State<AppState>) -> Result<ApiResponse<Vec<LocalizedText>>, AppError> {
    Ok(ApiResponse::ok(state.products.categories().await?))
}

pub async fn colors(State(state): State<AppState>) -> Result<ApiResponse<Vec<ColorSummary>>, AppError> {
    Ok(ApiResponse::ok(state.products.colors().await?))
}

pub async fn sizes(State(state): State<AppState>) -> Result<ApiResponse<Vec<SizeSummary>>, AppError> {
    Ok(ApiResponse::ok(state.products.sizes().await?))
}

/// GET `/api/products/search?search=`
pub async fn search(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<SearchQuery>,
) -> Result<ApiResponse<Vec<Product>>, AppError> {
    Ok(ApiResponse::ok(state.products.search(q.search, q.limit).await?))
}

/// GET `/api/products/category?category=`
pub async fn by_category(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<CategoryQuery>,
) -> Result<ApiResponse<CategoryPage>, AppError> {
    Ok(ApiResponse::ok(
        state.products.by_category(q.category, q.page, q.limit).await?,
    ))
}

pub async fn get_product(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<ApiResponse<Product>, AppError> {
    Ok(ApiResponse::ok(state.products.get_visible(id).await?))
}

/// GET `/api/products/{id}/images/by-color?color=`
pub async fn images_by_color(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(q): ApiQuery<ColorQuery>,
) -> Result<ApiResponse<ColorImages>, AppError> {
    Ok(ApiResponse::ok(state.products.images_by_color(id, q.color).await?))
}

/// GET `/api/products/{id}/catalog/download`
///
/// Streams the stored PDF back as an attachment.
pub async fn download_catalog(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Response, AppError> {
    let (pdf, object) = state.products.open_catalog(id).await?;

    let mut response = Response::new(Body::from_stream(object.stream));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/pdf"));
    if let Some(size) = object.size {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    }
    headers.insert(header::CONTENT_DISPOSITION, attachment_header(&pdf.filename));
    Ok(response)
}

/// `attachment; filename="..."`, falling back to a fixed name when the
/// stored filename cannot be sent as a header.
fn attachment_header(filename: &str) -> HeaderValue {
    let safe: String = filename.chars().filter(|c| *c != '"' && *c != '\\').collect();
    HeaderValue::from_str(&format!("attachment; filename=\"{safe}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment; filename=\"catalog.pdf\""))
}

/// GET `/api/products/admin/all`
pub async fn admin_list(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiQuery(q): ApiQuery<AdminListQuery>,
) -> Result<ApiResponse<AdminPage>, AppError> {
    user.require_permission(Permission::ManageProducts)?;
    let (products, pagination) = state
        .products
        .admin_list(q.page, q.limit, q.include_hidden)
        .await?;
    Ok(ApiResponse::ok(AdminPage {
        products,
        pagination,
    }))
}

/// POST `/api/products`: JSON or multipart with `images`.
pub async fn create_product(
    State(state): State<AppState>,
    user: CurrentUser,
    mut payload: Payload,
) -> Result<ApiResponse<Product>, AppError> {
    user.require_permission(Permission::ManageProducts)?;
    let images = payload.take_files("images", MAX_PRODUCT_IMAGES)?;
    check_files(&images)?;
    let draft: ProductDraft = payload.parse()?;
    let outcome = state.products.create(draft, images).await?;
    Ok(ApiResponse::outcome(outcome)
        .status(StatusCode::CREATED)
        .message("Product created successfully"))
}

/// PUT `/api/products/{id}`: new `images` are appended to the gallery.
pub async fn update_product(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    mut payload: Payload,
) -> Result<ApiResponse<Product>, AppError> {
    user.require_permission(Permission::ManageProducts)?;
    let images = payload.take_files("images", MAX_PRODUCT_IMAGES)?;
    check_files(&images)?;
    let patch: ProductPatch = payload.parse()?;
    let outcome = state.products.update(id, patch, images).await?;
    Ok(ApiResponse::outcome(outcome).message("Product updated successfully"))
}

pub async fn delete_product(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<ApiResponse<()>, AppError> {
    user.require_permission(Permission::ManageProducts)?;
    let outcome = state.products.delete(id).await?;
    Ok(ApiResponse::done("Product deleted successfully").effects(outcome.side_effects))
}

/// POST `/api/products/{id}/catalog`: multipart with one `catalogPdf`.
pub async fn upload_catalog(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    mut payload: Payload,
) -> Result<ApiResponse<CatalogPdf>, AppError> {
    user.require_permission(Permission::ManageProducts)?;
    let file = payload
        .take_file("catalogPdf")?
        .ok_or_else(|| AppError::bad_request("No PDF file provided"))?;
    let outcome = state.products.upload_catalog(id, file).await?;
    Ok(ApiResponse::outcome(outcome).message("Catalog PDF uploaded successfully"))
}

pub async fn delete_catalog(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<ApiResponse<Product>, AppError> {
    user.require_permission(Permission::ManageProducts)?;
    let outcome = state.products.delete_catalog(id).await?;
    Ok(ApiResponse::outcome(outcome).message("Catalog PDF deleted successfully"))
}

pub async fn hide_product(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<ApiResponse<Product>, AppError> {
    user.require_permission(Permission::ManageProducts)?;
    let product = state.products.set_hidden(id, true).await?;
    Ok(ApiResponse::ok(product).message("Product hidden successfully"))
}

pub async fn show_product(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<ApiResponse<Product>, AppError> {
    user.require_permission(Permission::ManageProducts)?;
    let product = state.products.set_hidden(id, false).await?;
    Ok(ApiResponse::ok(product).message("Product shown successfully"))
}

pub async fn associate_color(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<AssociateColor>,
) -> Result<ApiResponse<Product>, AppError> {
    user.require_permission(Permission::ManageProducts)?;
    let product = state
        .products
        .associate_color(id, req.image_index, req.color_name)
        .await?;
    Ok(ApiResponse::ok(product).message("Image-color association updated successfully"))
}

pub async fn associate_category(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<AssociateCategory>,
) -> Result<ApiResponse<Product>, AppError> {
    user.require_permission(Permission::ManageProducts)?;
    let product = state
        .products
        .associate_category(id, req.image_index, req.category)
        .await?;
    Ok(ApiResponse::ok(product).message("Image-category association updated successfully"))
}

pub async fn reorder_images(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<ReorderImages>,
) -> Result<ApiResponse<Product>, AppError> {
    user.require_permission(Permission::ManageProducts)?;
    let product = state.products.reorder_images(id, req.image_order).await?;
    Ok(ApiResponse::ok(product).message("Gallery images reordered successfully"))
}

/// DELETE `/api/products/{id}/images/{index}`
pub async fn delete_image(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath((id, index)): ApiPath<(Uuid, usize)>,
) -> Result<ApiResponse<ImageRemoval>, AppError> {
    user.require_permission(Permission::ManageProducts)?;
    let outcome = state.products.delete_image(id, index).await?;
    Ok(ApiResponse::outcome(outcome).message("Image deleted successfully"))
}

/// POST `/api/products/fix-pdf-urls`
pub async fn fix_pdf_urls(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<ApiResponse<PdfRefresh>, AppError> {
    user.require_permission(Permission::ManageProducts)?;
    let updated_count = state.products.refresh_pdf_urls().await?;
    Ok(ApiResponse::ok(PdfRefresh { updated_count })
        .message(format!("Fixed PDF URLs for {updated_count} products")))
}
