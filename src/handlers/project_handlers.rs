//! Reference projects under `/api/projects`.

use super::{
    auth::CurrentUser,
    extract::{ApiJson, ApiPath, ApiQuery},
    product_handlers::{CategoryQuery, LimitQuery, SearchQuery},
    response::ApiResponse,
    upload::Payload,
};
use crate::{
    AppState,
    errors::AppError,
    models::{localized::LocalizedText, project::Project, user::Permission},
    services::project_service::{
        ProjectCategoryPage, ProjectDraft, ProjectFilter, ProjectImageRemoval, ProjectPage,
        ProjectPatch,
    },
};
use axum::{extract::State, http::StatusCode};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ReorderImages {
    #[serde(default)]
    pub image_order: Vec<String>,
}

pub async fn list_projects(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<ProjectFilter>,
) -> Result<ApiResponse<ProjectPage>, AppError> {
    Ok(ApiResponse::ok(state.projects.list(filter).await?))
}

pub async fn featured_projects(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<LimitQuery>,
) -> Result<ApiResponse<Vec<Project>>, AppError> {
    Ok(ApiResponse::ok(state.projects.featured(q.limit).await?))
}

pub async fn categories(State(state): State<AppState>) -> Result<ApiResponse<Vec<LocalizedText>>, AppError> {
    Ok(ApiResponse::ok(state.projects.categories().await?))
}

pub async fn years(State(state): State<AppState>) -> Result<ApiResponse<Vec<i32>>, AppError> {
    Ok(ApiResponse::ok(state.projects.years().await?))
}

pub async fn search(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<SearchQuery>,
) -> Result<ApiResponse<Vec<Project>>, AppError> {
    Ok(ApiResponse::ok(state.projects.search(q.search, q.limit).await?))
}

pub async fn by_category(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<CategoryQuery>,
) -> Result<ApiResponse<ProjectCategoryPage>, AppError> {
    Ok(ApiResponse::ok(
        state.projects.by_category(q.category, q.page, q.limit).await?,
    ))
}

pub async fn get_project(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<ApiResponse<Project>, AppError> {
    Ok(ApiResponse::ok(state.projects.get_visible(id).await?))
}

/// POST `/api/projects`: JSON or multipart with up to 25 `images`.
pub async fn create_project(
    State(state): State<AppState>,
    user: CurrentUser,
    mut payload: Payload,
) -> Result<ApiResponse<Project>, AppError> {
    user.require_permission(Permission::ManageProjects)?;
    let images = payload.take_all("images");
    for file in &images {
        file.validate()?;
    }
    let draft: ProjectDraft = payload.parse()?;
    let outcome = state.projects.create(draft, images).await?;
    Ok(ApiResponse::outcome(outcome)
        .status(StatusCode::CREATED)
        .message("Projekat je uspešno kreiran"))
}

pub async fn update_project(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    mut payload: Payload,
) -> Result<ApiResponse<Project>, AppError> {
    user.require_permission(Permission::ManageProjects)?;
    let images = payload.take_all("images");
    for file in &images {
        file.validate()?;
    }
    let patch: ProjectPatch = payload.parse()?;
    let outcome = state.projects.update(id, patch, images).await?;
    Ok(ApiResponse::outcome(outcome).message("Projekat je uspešno ažuriran"))
}

pub async fn delete_project(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<ApiResponse<()>, AppError> {
    user.require_permission(Permission::ManageProjects)?;
    let outcome = state.projects.delete(id).await?;
    Ok(ApiResponse::done("Projekat je uspešno obrisan").effects(outcome.side_effects))
}

/// PUT `/api/projects/{id}/reorder-images`: `imageOrder` lists image URLs.
pub async fn reorder_images(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<ReorderImages>,
) -> Result<ApiResponse<Project>, AppError> {
    user.require_permission(Permission::ManageProjects)?;
    let project = state.projects.reorder_images(id, req.image_order).await?;
    Ok(ApiResponse::ok(project).message("Redosled slika je uspešno ažuriran"))
}

pub async fn delete_image(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath((id, index)): ApiPath<(Uuid, usize)>,
) -> Result<ApiResponse<ProjectImageRemoval>, AppError> {
    user.require_permission(Permission::ManageProjects)?;
    let outcome = state.projects.delete_image(id, index).await?;
    Ok(ApiResponse::outcome(outcome).message("Slika je uspešno obrisana"))
}
