//! Object storage for gallery images, catalog PDFs and contact attachments.
//!
//! Two backends implement [`MediaStore`]: a sharded local directory served
//! by this process, and Cloudinary over its signed REST API. Owners persist
//! the returned `public_id` together with the [`ResourceType`]; both are
//! needed to delete the asset or rebuild its URL.

pub mod cloudinary;
pub mod disk;

use super::side_effect::SideEffect;
use crate::models::media::ResourceType;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::{io, pin::Pin};
use thiserror::Error;

pub const PRODUCTS_FOLDER: &str = "nissal/products";
pub const PROJECTS_FOLDER: &str = "nissal/projects";
pub const ATTACHMENTS_FOLDER: &str = "nissal/attachments";
pub const CATALOGS_FOLDER: &str = "nissal/catalogs";

/// Upload size cap per file.
pub const MAX_FILE_BYTES: usize = 10 * 1024 * 1024;

/// Accepted uploads: MIME type and the extensions allowed with it.
const ALLOWED_TYPES: &[(&str, &[&str])] = &[
    ("application/pdf", &["pdf"]),
    ("application/msword", &["doc"]),
    (
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        &["docx"],
    ),
    ("image/jpeg", &["jpg", "jpeg"]),
    ("image/jpg", &["jpg", "jpeg"]),
    ("image/png", &["png"]),
    ("image/webp", &["webp"]),
    ("text/plain", &["txt"]),
];

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("invalid public id `{0}`")]
    InvalidPublicId(String),
    #[error("asset `{0}` not found")]
    NotFound(String),
    #[error("file `{filename}` rejected: {reason}")]
    Rejected { filename: String, reason: String },
    #[error("media service returned {status}: {message}")]
    Remote { status: u16, message: String },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A file received from a multipart request, fully buffered.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field: String,
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
}

impl UploadedFile {
    pub fn extension(&self) -> Option<String> {
        file_extension(&self.filename)
    }

    /// Check size and the MIME/extension pair against the allow-list.
    pub fn validate(&self) -> Result<(), MediaError> {
        let reject = |reason: &str| MediaError::Rejected {
            filename: self.filename.clone(),
            reason: reason.to_string(),
        };
        if self.data.len() > MAX_FILE_BYTES {
            return Err(reject("file exceeds the 10 MB limit"));
        }
        let ext = self.extension().ok_or_else(|| reject("missing file extension"))?;
        let allowed = ALLOWED_TYPES
            .iter()
            .any(|(mime, exts)| *mime == self.content_type && exts.contains(&ext.as_str()));
        if !allowed {
            return Err(reject(
                "only PDF, DOC, DOCX, JPG, JPEG, PNG, WEBP and TXT files are allowed",
            ));
        }
        Ok(())
    }

    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }
}

pub fn file_extension(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_ascii_lowercase())
    }
}

/// Content type to serve for a stored asset, from its extension.
pub fn content_type_for(public_id: &str) -> &'static str {
    match file_extension(public_id).as_deref() {
        Some("pdf") => "application/pdf",
        Some("doc") => "application/msword",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub folder: String,
    pub resource_type: ResourceType,
    /// Requested id within `folder`; generated when absent.
    pub public_id: Option<String>,
    /// Original filename, used for the stored extension.
    pub filename: String,
    pub content_type: String,
    /// Remote transformation hint; ignored by the disk backend.
    pub transformation: Option<String>,
}

impl UploadOptions {
    pub fn new(folder: &str, resource_type: ResourceType, file: &UploadedFile) -> Self {
        Self {
            folder: folder.to_string(),
            resource_type,
            public_id: None,
            filename: file.filename.clone(),
            content_type: file.content_type.clone(),
            transformation: None,
        }
    }

    pub fn public_id(mut self, public_id: impl Into<String>) -> Self {
        self.public_id = Some(public_id.into());
        self
    }

    pub fn transformation(mut self, transformation: impl Into<String>) -> Self {
        self.transformation = Some(transformation.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadedAsset {
    pub url: String,
    pub public_id: String,
    pub bytes: u64,
    pub resource_type: ResourceType,
    pub etag: Option<String>,
}

pub type MediaStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// An asset opened for reading.
pub struct MediaObject {
    pub content_type: String,
    pub size: Option<u64>,
    pub stream: MediaStream,
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Short backend name for logs and readiness output.
    fn backend(&self) -> &'static str;

    async fn upload(&self, data: Bytes, options: UploadOptions) -> Result<UploadedAsset, MediaError>;

    async fn delete(&self, public_id: &str, resource_type: ResourceType) -> Result<(), MediaError>;

    /// Public URL for an asset. Deterministic in its inputs.
    fn url(&self, public_id: &str, resource_type: ResourceType) -> String;

    async fn open(&self, public_id: &str, resource_type: ResourceType) -> Result<MediaObject, MediaError>;

    /// Readiness check.
    async fn check(&self) -> Result<(), MediaError>;
}

/// Upload `files` one by one. A failed upload is recorded and skipped; the
/// successful ones are returned with the file they came from.
pub async fn upload_each<'a>(
    store: &dyn MediaStore,
    files: &'a [UploadedFile],
    folder: &str,
    transformation: Option<&str>,
) -> (Vec<(&'a UploadedFile, UploadedAsset)>, Vec<SideEffect>) {
    let mut uploaded = Vec::with_capacity(files.len());
    let mut effects = Vec::new();
    for file in files {
        let action = format!("media.upload:{}", file.filename);
        let mut options = UploadOptions::new(folder, ResourceType::for_mime(&file.content_type), file);
        if let Some(t) = transformation {
            options = options.transformation(t);
        }
        match store.upload(file.data.clone(), options).await {
            Ok(asset) => {
                effects.push(SideEffect::completed(action));
                uploaded.push((file, asset));
            }
            Err(err) => effects.push(SideEffect::failed(action, err)),
        }
    }
    (uploaded, effects)
}

/// Delete one asset, recording the result instead of failing. An asset that
/// is already gone counts as deleted.
pub async fn delete_soft(store: &dyn MediaStore, public_id: &str, resource_type: ResourceType) -> SideEffect {
    let action = format!("media.delete:{public_id}");
    match store.delete(public_id, resource_type).await {
        Ok(()) | Err(MediaError::NotFound(_)) => SideEffect::completed(action),
        Err(err) => SideEffect::failed(action, err),
    }
}
