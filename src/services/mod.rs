//! Domain services. Each service owns one collection (or one external
//! collaborator) and returns [`ServiceResult`]; the HTTP layer converts
//! failures into `AppError`.

pub mod auth_service;
pub mod curator;
pub mod db;
pub mod mail_service;
pub mod media;
pub mod message_service;
pub mod product_service;
pub mod project_service;
pub mod settings_service;
pub mod side_effect;
pub mod translation_service;
pub mod user_service;

use crate::models::settings::CurationError;
use media::MediaError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use translation_service::CompletionError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{message}")]
    Validation {
        message: String,
        details: Option<serde_json::Value>,
    },
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    /// An optional collaborator (mail relay, LLM) is not configured.
    #[error("{0}")]
    Unavailable(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error(transparent)]
    Completion(#[from] CompletionError),
    #[error("failed to hash password: {0}")]
    PasswordHash(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            details: None,
        }
    }

    pub fn validation_details(message: impl Into<String>, details: impl Serialize) -> Self {
        Self::Validation {
            message: message.into(),
            details: serde_json::to_value(details).ok(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
}

impl From<CurationError> for ServiceError {
    fn from(err: CurationError) -> Self {
        match err {
            CurationError::NotFeatured => ServiceError::NotFound(err.to_string()),
            other => ServiceError::validation(other.to_string()),
        }
    }
}

/// Offset pagination shared by list endpoints.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u64,
}

impl Pagination {
    pub const DEFAULT_LIMIT: u32 = 12;
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        let pages = if limit == 0 {
            0
        } else {
            total.div_ceil(limit as u64)
        };
        Self {
            page,
            limit,
            total,
            pages,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Normalize `page`/`limit` query values into `(page, limit, offset)`.
pub fn page_window(page: Option<u32>, limit: Option<u32>, default_limit: u32) -> (u32, u32, i64) {
    let page = page.unwrap_or(1).max(1);
    let limit = limit
        .unwrap_or(default_limit)
        .clamp(1, Pagination::MAX_LIMIT);
    let offset = (page as i64 - 1) * limit as i64;
    (page, limit, offset)
}

/// Trimmed value, or `None` when absent or blank.
pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern and wrap in
/// wildcards. Lowercases with Unicode rules, matching [`search_document`].
pub(crate) fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.trim().to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// The document with every string value lowercased (Unicode rules).
/// Stored next to `data` as `search_doc`; text filters match against it
/// without `lower()`, which in SQLite only folds ASCII.
pub(crate) fn search_document<T: Serialize>(doc: &T) -> ServiceResult<serde_json::Value> {
    fn fold(value: &mut serde_json::Value) {
        match value {
            serde_json::Value::String(s) => *s = s.to_lowercase(),
            serde_json::Value::Array(items) => items.iter_mut().for_each(fold),
            serde_json::Value::Object(map) => map.values_mut().for_each(fold),
            _ => {}
        }
    }
    let mut value = serde_json::to_value(doc)?;
    fold(&mut value);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_window_clamps() {
        assert_eq!(page_window(None, None, 12), (1, 12, 0));
        assert_eq!(page_window(Some(0), Some(500), 12), (1, 100, 0));
        assert_eq!(page_window(Some(3), Some(10), 12), (3, 10, 20));
    }

    #[test]
    fn pagination_rounds_pages_up() {
        assert_eq!(Pagination::new(1, 12, 25).pages, 3);
        assert_eq!(Pagination::new(1, 12, 0).pages, 0);
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern(" 50%_Off "), "%50\\%\\_off%");
    }

    #[test]
    fn search_document_folds_nested_strings() {
        let doc = serde_json::json!({
            "title": {"sr": "ČELIČNI Profil", "en": null},
            "tags": {"sr": ["ŠINA", "Žica"]},
            "price": {"amount": 10.5}
        });
        let folded = search_document(&doc).unwrap();
        assert_eq!(folded["title"]["sr"], "čelični profil");
        assert_eq!(folded["tags"]["sr"][0], "šina");
        assert_eq!(folded["tags"]["sr"][1], "žica");
        assert_eq!(folded["price"]["amount"], 10.5);
        assert!(folded["title"]["en"].is_null());
        assert_eq!(like_pattern("ČeLiČ"), "%čelič%");
    }
}
