//! Serves locally stored media at `/media/{resourceType}/{*publicId}`.
//! Remote backends hand out their own URLs, so this route only answers for
//! the disk store.

use crate::{AppState, errors::AppError, models::media::ResourceType};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};

pub async fn serve_media(
    State(state): State<AppState>,
    Path((resource_type, public_id)): Path<(String, String)>,
) -> Result<Response, AppError> {
    if state.media.backend() != "disk" {
        return Err(AppError::not_found("File not found"));
    }
    let resource_type =
        ResourceType::parse(&resource_type).ok_or_else(|| AppError::not_found("File not found"))?;
    let object = state.media.open(&public_id, resource_type).await?;

    let mut response = Response::new(Body::from_stream(object.stream));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&object.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    if let Some(size) = object.size {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    }
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );
    Ok(response)
}
