//! Homepage featured-product curation under `/api/homepage-settings`.
//!
//! Reads of the public view are anonymous; every mutation needs an admin
//! or manager.

use super::{
    auth::CurrentUser,
    extract::{ApiJson, ApiPath},
    response::ApiResponse,
};
use crate::{
    AppState,
    errors::AppError,
    models::{
        product::Product,
        settings::{CurationError, FeaturedEntry},
        user::Role,
    },
    services::{
        ServiceError,
        curator::{CurationView, PruneReport},
    },
};
use axum::extract::State;
use bytes::Bytes;
use serde::Deserialize;
use uuid::Uuid;

const CURATORS: &[Role] = &[Role::Admin, Role::Manager];

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SetFeatured {
    #[serde(default)]
    pub featured_products: Vec<FeaturedEntry>,
}

#[derive(Deserialize, Debug, Default)]
pub struct AddFeatured {
    pub order: Option<i64>,
}

/// GET `/api/homepage-settings/featured-products`
pub async fn featured_products(State(state): State<AppState>) -> Result<ApiResponse<Vec<Product>>, AppError> {
    Ok(ApiResponse::ok(state.curator.resolve_for_display().await?))
}

/// GET `/api/homepage-settings/admin`
pub async fn admin_view(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<ApiResponse<CurationView>, AppError> {
    user.require_role(CURATORS)?;
    Ok(ApiResponse::ok(state.curator.admin_view().await?))
}

/// PUT `/api/homepage-settings/featured-products`
pub async fn set_featured(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(req): ApiJson<SetFeatured>,
) -> Result<ApiResponse<CurationView>, AppError> {
    user.require_role(CURATORS)?;
    let view = state.curator.set_all(req.featured_products, user.id()).await?;
    Ok(ApiResponse::ok(view).message("Featured products updated successfully"))
}

/// POST `/api/homepage-settings/featured-products/{productId}`
///
/// The body is optional; an empty body or one without `order` takes the
/// next free slot. Anything that does not parse as an integer order is a
/// validation error.
pub async fn add_featured(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(product_id): ApiPath<Uuid>,
    body: Bytes,
) -> Result<ApiResponse<CurationView>, AppError> {
    user.require_role(CURATORS)?;
    let order = requested_order(&body)?;
    let view = state.curator.add(product_id, order, user.id()).await?;
    Ok(ApiResponse::ok(view).message("Product added to featured list"))
}

fn requested_order(body: &[u8]) -> Result<Option<i64>, ServiceError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let req: AddFeatured = serde_json::from_slice(body).map_err(|_| CurationError::InvalidOrder)?;
    Ok(req.order)
}

/// DELETE `/api/homepage-settings/featured-products/{productId}`
pub async fn remove_featured(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(product_id): ApiPath<Uuid>,
) -> Result<ApiResponse<CurationView>, AppError> {
    user.require_role(CURATORS)?;
    let view = state.curator.remove(product_id, user.id()).await?;
    Ok(ApiResponse::ok(view).message("Product removed from featured list"))
}

/// DELETE `/api/homepage-settings/featured-products`
pub async fn clear_featured(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<ApiResponse<CurationView>, AppError> {
    user.require_role(CURATORS)?;
    let view = state.curator.clear(user.id()).await?;
    Ok(ApiResponse::ok(view).message("All featured products cleared"))
}

/// POST `/api/homepage-settings/featured-products/prune`
pub async fn prune_featured(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<ApiResponse<PruneReport>, AppError> {
    user.require_role(CURATORS)?;
    let report = state.curator.prune_stale(user.id()).await?;
    let message = format!("Removed {} unavailable products", report.removed.len());
    Ok(ApiResponse::ok(report).message(message))
}
