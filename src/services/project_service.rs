use super::{
    Pagination, ServiceError, ServiceResult, SortOrder, like_pattern,
    media::{MediaStore, PROJECTS_FOLDER, UploadedFile, delete_soft, upload_each},
    non_blank, page_window, search_document,
    side_effect::{Outcome, SideEffect},
};
use crate::models::{
    localized::{Language, LocalizedTags, LocalizedText},
    media::ResourceType,
    project::{MAX_PROJECT_IMAGES, Project, ProjectImage},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqlitePool, types::Json};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

const IMAGE_TRANSFORMATION: &str = "q_auto:good/f_auto/c_limit,w_1920,h_1080";
pub const FEATURED_LIMIT: u32 = 6;
pub const SEARCH_LIMIT: u32 = 20;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum ProjectSort {
    #[default]
    CompletionDate,
    CreatedAt,
    Title,
}

impl ProjectSort {
    fn column(self) -> &'static str {
        match self {
            ProjectSort::CompletionDate => "completion_date",
            ProjectSort::CreatedAt => "created_at",
            ProjectSort::Title => "json_extract(search_doc, '$.title.sr')",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFilter {
    #[serde(skip_serializing)]
    pub page: Option<u32>,
    #[serde(skip_serializing)]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub featured: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<ProjectSort>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<SortOrder>,
}

#[derive(Serialize, Debug)]
pub struct ProjectPage {
    pub projects: Vec<Project>,
    pub pagination: Pagination,
    pub filters: ProjectFilter,
}

#[derive(Serialize, Debug)]
pub struct ProjectCategoryPage {
    pub projects: Vec<Project>,
    pub category: String,
    pub pagination: Pagination,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ProjectImageRemoval {
    pub deleted_image: ProjectImage,
    pub remaining_images: usize,
    pub project: Project,
}

fn yes() -> bool {
    true
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDraft {
    pub title: LocalizedText,
    #[serde(default)]
    pub description: LocalizedText,
    #[serde(default)]
    pub category: LocalizedText,
    #[serde(default)]
    pub client: LocalizedText,
    #[serde(default)]
    pub location: LocalizedText,
    #[serde(default)]
    pub completion_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: LocalizedTags,
    #[serde(default)]
    pub featured: bool,
    #[serde(default = "yes")]
    pub is_active: bool,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProjectPatch {
    pub title: Option<LocalizedText>,
    pub description: Option<LocalizedText>,
    pub category: Option<LocalizedText>,
    pub client: Option<LocalizedText>,
    pub location: Option<LocalizedText>,
    pub completion_date: Option<DateTime<Utc>>,
    pub tags: Option<LocalizedTags>,
    pub featured: Option<bool>,
    pub is_active: Option<bool>,
}

impl ProjectPatch {
    fn apply(self, project: &mut Project) {
        if let Some(v) = self.title {
            project.title = v.normalized();
        }
        if let Some(v) = self.description {
            project.description = v.normalized();
        }
        if let Some(v) = self.category {
            project.category = v.normalized();
        }
        if let Some(v) = self.client {
            project.client = v.normalized();
        }
        if let Some(v) = self.location {
            project.location = v.normalized();
        }
        if self.completion_date.is_some() {
            project.completion_date = self.completion_date;
        }
        if let Some(v) = self.tags {
            project.tags = v;
        }
        if let Some(v) = self.featured {
            project.featured = v;
        }
        if let Some(v) = self.is_active {
            project.is_active = v;
        }
    }
}

fn validate(project: &Project) -> ServiceResult<()> {
    let mut errors = Vec::new();
    if project.title.is_missing(Language::Sr) {
        errors.push("Project title (Serbian) is required");
    }
    if project.title.max_chars() > 200 {
        errors.push("Title cannot exceed 200 characters");
    }
    if project.description.max_chars() > 3000 {
        errors.push("Description cannot exceed 3000 characters");
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::validation_details("Validation failed", errors))
    }
}

fn filtered<'a>(select: &str, filter: &ProjectFilter) -> QueryBuilder<'a, Sqlite> {
    let mut qb = QueryBuilder::new(select);
    qb.push(" FROM projects WHERE is_active = 1");

    if let Some(category) = non_blank(filter.category.as_deref()) {
        qb.push(" AND EXISTS (SELECT 1 FROM json_each(projects.search_doc, '$.category') WHERE value LIKE ")
            .push_bind(like_pattern(category))
            .push(r" ESCAPE '\')");
    }
    if let Some(year) = filter.year {
        qb.push(" AND CAST(strftime('%Y', completion_date) AS INTEGER) = ")
            .push_bind(year);
    }
    if filter.featured == Some(true) {
        qb.push(" AND featured = 1");
    }
    if let Some(search) = non_blank(filter.search.as_deref()) {
        let pattern = like_pattern(search);
        qb.push(" AND (");
        for (i, path) in ["$.title", "$.description", "$.client", "$.location"]
            .into_iter()
            .enumerate()
        {
            if i > 0 {
                qb.push(" OR ");
            }
            qb.push("EXISTS (SELECT 1 FROM json_each(projects.search_doc, '")
                .push(path)
                .push("') WHERE value LIKE ")
                .push_bind(pattern.clone())
                .push(r" ESCAPE '\')");
        }
        qb.push(" OR EXISTS (SELECT 1 FROM json_tree(projects.search_doc, '$.tags') WHERE type = 'text' AND value LIKE ")
            .push_bind(pattern)
            .push(r" ESCAPE '\'))");
    }
    qb
}

#[derive(Clone)]
pub struct ProjectService {
    db: Arc<SqlitePool>,
    media: Arc<dyn MediaStore>,
}

impl ProjectService {
    pub fn new(db: Arc<SqlitePool>, media: Arc<dyn MediaStore>) -> Self {
        Self { db, media }
    }

    async fn page(&self, filter: &ProjectFilter) -> ServiceResult<(Vec<Project>, Pagination)> {
        let (page, limit, offset) = page_window(filter.page, filter.limit, Pagination::DEFAULT_LIMIT);
        let total: i64 = filtered("SELECT COUNT(*)", filter)
            .build_query_scalar()
            .fetch_one(&*self.db)
            .await?;

        let order = filter.sort_order.unwrap_or_default().as_sql();
        let mut qb = filtered("SELECT data", filter);
        qb.push(" ORDER BY ")
            .push(filter.sort_by.unwrap_or_default().column())
            .push(" ")
            .push(order)
            .push(", created_at ")
            .push(order)
            .push(" LIMIT ")
            .push_bind(limit as i64)
            .push(" OFFSET ")
            .push_bind(offset);
        let rows: Vec<Json<Project>> = qb.build_query_scalar().fetch_all(&*self.db).await?;
        Ok((
            rows.into_iter().map(|Json(p)| p).collect(),
            Pagination::new(page, limit, total as u64),
        ))
    }

    pub async fn list(&self, filter: ProjectFilter) -> ServiceResult<ProjectPage> {
        let (projects, pagination) = self.page(&filter).await?;
        Ok(ProjectPage {
            projects,
            pagination,
            filters: filter,
        })
    }

    pub async fn by_category(
        &self,
        category: Option<String>,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> ServiceResult<ProjectCategoryPage> {
        let category = non_blank(category.as_deref())
            .ok_or_else(|| ServiceError::validation("Category is required"))?
            .to_string();
        let filter = ProjectFilter {
            page,
            limit,
            category: Some(category.clone()),
            ..Default::default()
        };
        let (projects, pagination) = self.page(&filter).await?;
        Ok(ProjectCategoryPage {
            projects,
            category,
            pagination,
        })
    }

    pub async fn search(&self, term: Option<String>, limit: Option<u32>) -> ServiceResult<Vec<Project>> {
        let term = non_blank(term.as_deref())
            .ok_or_else(|| ServiceError::validation("Search term is required"))?
            .to_string();
        let filter = ProjectFilter {
            limit: Some(limit.unwrap_or(SEARCH_LIMIT)),
            search: Some(term),
            ..Default::default()
        };
        Ok(self.page(&filter).await?.0)
    }

    pub async fn featured(&self, limit: Option<u32>) -> ServiceResult<Vec<Project>> {
        let filter = ProjectFilter {
            limit: Some(limit.unwrap_or(FEATURED_LIMIT)),
            featured: Some(true),
            ..Default::default()
        };
        Ok(self.page(&filter).await?.0)
    }

    pub async fn categories(&self) -> ServiceResult<Vec<LocalizedText>> {
        let rows: Vec<Option<Json<LocalizedText>>> = sqlx::query_scalar(
            "SELECT DISTINCT json_extract(data, '$.category') FROM projects WHERE is_active = 1",
        )
        .fetch_all(&*self.db)
        .await?;
        let mut categories: Vec<LocalizedText> = rows
            .into_iter()
            .flatten()
            .map(|Json(c)| c)
            .filter(|c| Language::ALL.iter().any(|l| !c.is_missing(*l)))
            .collect();
        categories.sort_by(|a, b| a.sr.cmp(&b.sr));
        categories.dedup();
        Ok(categories)
    }

    /// Distinct completion years of active projects, newest first.
    pub async fn years(&self) -> ServiceResult<Vec<i32>> {
        Ok(sqlx::query_scalar(
            "SELECT DISTINCT CAST(strftime('%Y', completion_date) AS INTEGER) AS year
             FROM projects
             WHERE is_active = 1 AND completion_date IS NOT NULL
             ORDER BY year DESC",
        )
        .fetch_all(&*self.db)
        .await?)
    }

    async fn find(&self, id: Uuid) -> ServiceResult<Option<Project>> {
        let row: Option<Json<Project>> = sqlx::query_scalar("SELECT data FROM projects WHERE id = ?")
            .bind(id)
            .fetch_optional(&*self.db)
            .await?;
        Ok(row.map(|Json(p)| p))
    }

    pub async fn get(&self, id: Uuid) -> ServiceResult<Project> {
        self.find(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Project not found"))
    }

    pub async fn get_visible(&self, id: Uuid) -> ServiceResult<Project> {
        self.find(id)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| ServiceError::not_found("Project not found"))
    }

    pub async fn all_ids(&self) -> ServiceResult<Vec<Uuid>> {
        Ok(sqlx::query_scalar("SELECT id FROM projects ORDER BY created_at")
            .fetch_all(&*self.db)
            .await?)
    }

    async fn insert(&self, project: &Project) -> ServiceResult<()> {
        sqlx::query(
            "INSERT INTO projects (id, data, search_doc, featured, is_active, completion_date, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(project.id)
        .bind(Json(project))
        .bind(Json(search_document(project)?))
        .bind(project.featured)
        .bind(project.is_active)
        .bind(project.completion_date)
        .bind(project.created_at)
        .bind(project.updated_at)
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    pub async fn persist(&self, project: &Project) -> ServiceResult<Project> {
        let mut project = project.clone();
        project.updated_at = Utc::now();
        let result = sqlx::query(
            "UPDATE projects
             SET data = ?, search_doc = ?, featured = ?, is_active = ?, completion_date = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(Json(&project))
        .bind(Json(search_document(&project)?))
        .bind(project.featured)
        .bind(project.is_active)
        .bind(project.completion_date)
        .bind(project.updated_at)
        .bind(project.id)
        .execute(&*self.db)
        .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found("Project not found"));
        }
        Ok(project)
    }

    async fn upload_gallery(&self, project: &Project, files: &[UploadedFile]) -> (Vec<ProjectImage>, Vec<SideEffect>) {
        let (assets, effects) =
            upload_each(&*self.media, files, PROJECTS_FOLDER, Some(IMAGE_TRANSFORMATION)).await;
        let title = project.title.get(Language::Sr).map(str::to_string);
        let images = assets
            .into_iter()
            .enumerate()
            .map(|(i, (_, asset))| ProjectImage {
                url: asset.url,
                public_id: asset.public_id,
                alt: title
                    .clone()
                    .unwrap_or_else(|| format!("Project image {}", i + 1)),
                is_main: false,
                order: 0,
            })
            .collect();
        (images, effects)
    }

    #[instrument(skip(self, draft, images), fields(images = images.len()))]
    pub async fn create(&self, draft: ProjectDraft, images: Vec<UploadedFile>) -> ServiceResult<Outcome<Project>> {
        if images.len() > MAX_PROJECT_IMAGES {
            return Err(ServiceError::validation("Maksimalno 25 slika je dozvoljeno"));
        }
        let now = Utc::now();
        let mut project = Project {
            id: Uuid::new_v4(),
            title: draft.title.normalized(),
            description: draft.description.normalized(),
            category: draft.category.normalized(),
            client: draft.client.normalized(),
            location: draft.location.normalized(),
            gallery: Vec::new(),
            completion_date: draft.completion_date,
            tags: draft.tags,
            featured: draft.featured,
            is_active: draft.is_active,
            created_at: now,
            updated_at: now,
        };
        validate(&project)?;

        let (gallery, effects) = self.upload_gallery(&project, &images).await;
        project.append_images(gallery);

        let inserted = self.insert(&project).await;
        if let Err(err) = inserted {
            for image in &project.gallery {
                delete_soft(&*self.media, &image.public_id, ResourceType::Image).await;
            }
            return Err(err);
        }
        info!(id = %project.id, "project created");
        Ok(Outcome::with_effects(project, effects))
    }

    #[instrument(skip(self, patch, images), fields(images = images.len()))]
    pub async fn update(
        &self,
        id: Uuid,
        patch: ProjectPatch,
        images: Vec<UploadedFile>,
    ) -> ServiceResult<Outcome<Project>> {
        let mut project = self.get(id).await?;
        let existing = project.gallery.len();
        if existing + images.len() > MAX_PROJECT_IMAGES {
            return Err(ServiceError::validation(format!(
                "Ukupno možete imati maksimalno 25 slika. Trenutno imate {existing}, pokušavate dodati {}.",
                images.len()
            )));
        }
        patch.apply(&mut project);
        validate(&project)?;

        let (gallery, effects) = self.upload_gallery(&project, &images).await;
        project.append_images(gallery);
        let saved = self.persist(&project).await?;
        Ok(Outcome::with_effects(saved, effects))
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> ServiceResult<Outcome<()>> {
        let project = self.get(id).await?;
        let mut effects = Vec::with_capacity(project.gallery.len());
        for image in project.gallery.iter().filter(|i| !i.public_id.is_empty()) {
            effects.push(delete_soft(&*self.media, &image.public_id, ResourceType::Image).await);
        }
        sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        info!(%id, "project deleted");
        Ok(Outcome::with_effects((), effects))
    }

    pub async fn reorder_images(&self, id: Uuid, urls: Vec<String>) -> ServiceResult<Project> {
        if urls.is_empty() {
            return Err(ServiceError::validation("Invalid image order data"));
        }
        let mut project = self.get(id).await?;
        project.reorder_gallery(&urls);
        self.persist(&project).await
    }

    pub async fn delete_image(&self, id: Uuid, index: usize) -> ServiceResult<Outcome<ProjectImageRemoval>> {
        let mut project = self.get(id).await?;
        let Some(image) = project.gallery.get(index) else {
            return Err(ServiceError::validation("Invalid image index"));
        };

        let mut effects = Vec::new();
        if !image.public_id.is_empty() {
            effects.push(delete_soft(&*self.media, &image.public_id, ResourceType::Image).await);
        }
        let Some(deleted_image) = project.remove_image(index) else {
            return Err(ServiceError::validation("Invalid image index"));
        };
        let project = self.persist(&project).await?;
        Ok(Outcome::with_effects(
            ProjectImageRemoval {
                deleted_image,
                remaining_images: project.gallery.len(),
                project,
            },
            effects,
        ))
    }
}
