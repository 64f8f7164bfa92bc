//! On-demand translation under `/api/translations`.

use super::{
    auth::CurrentUser,
    extract::{ApiJson, ApiPath},
    response::ApiResponse,
};
use crate::{
    AppState,
    errors::AppError,
    models::{localized::Language, user::Permission},
    services::translation_service::{BatchItem, TranslationReport, target_languages},
};
use axum::extract::State;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Deserialize, Debug, Default)]
pub struct TranslateRequest {
    pub languages: Option<Vec<Language>>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<BatchItem>,
}

impl From<Vec<BatchItem>> for BatchSummary {
    fn from(results: Vec<BatchItem>) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            results,
        }
    }
}

/// An absent or unreadable body means "all target languages".
fn languages(body: Result<ApiJson<TranslateRequest>, AppError>) -> Vec<Language> {
    target_languages(body.ok().and_then(|ApiJson(req)| req.languages))
}

pub async fn translate_product(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    body: Result<ApiJson<TranslateRequest>, AppError>,
) -> Result<ApiResponse<TranslationReport>, AppError> {
    user.require_permission(Permission::ManageProducts)?;
    let report = state.translator.translate_product(id, &languages(body)).await?;
    Ok(ApiResponse::ok(report).message("Product translated successfully"))
}

pub async fn translate_project(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    body: Result<ApiJson<TranslateRequest>, AppError>,
) -> Result<ApiResponse<TranslationReport>, AppError> {
    user.require_permission(Permission::ManageProjects)?;
    let report = state.translator.translate_project(id, &languages(body)).await?;
    Ok(ApiResponse::ok(report).message("Project translated successfully"))
}

pub async fn translate_all_products(
    State(state): State<AppState>,
    user: CurrentUser,
    body: Result<ApiJson<TranslateRequest>, AppError>,
) -> Result<ApiResponse<BatchSummary>, AppError> {
    user.require_permission(Permission::ManageProducts)?;
    let results = state.translator.translate_all_products(&languages(body)).await?;
    let summary = BatchSummary::from(results);
    let message = format!("Translated {} of {} products", summary.succeeded, summary.total);
    Ok(ApiResponse::ok(summary).message(message))
}

pub async fn translate_all_projects(
    State(state): State<AppState>,
    user: CurrentUser,
    body: Result<ApiJson<TranslateRequest>, AppError>,
) -> Result<ApiResponse<BatchSummary>, AppError> {
    user.require_permission(Permission::ManageProjects)?;
    let results = state.translator.translate_all_projects(&languages(body)).await?;
    let summary = BatchSummary::from(results);
    let message = format!("Translated {} of {} projects", summary.succeeded, summary.total);
    Ok(ApiResponse::ok(summary).message(message))
}
