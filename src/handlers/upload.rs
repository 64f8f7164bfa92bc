//! Request bodies that may carry files.
//!
//! A `multipart/form-data` request sends its JSON body in a `data` text part
//! (or as plain text fields) next to file parts. Any other content type is
//! read as a JSON body without files.

use crate::{errors::AppError, services::media::UploadedFile};
use axum::{
    Json,
    extract::{FromRequest, Multipart, Request},
    http::header,
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

pub const MAX_PRODUCT_IMAGES: usize = 10;

#[derive(Debug, Default)]
pub struct Payload {
    pub body: Value,
    pub files: Vec<UploadedFile>,
}

impl<S> FromRequest<S> for Payload
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("multipart/form-data"));

        if is_multipart {
            let multipart = Multipart::from_request(req, state).await?;
            read_multipart(multipart).await
        } else {
            let Json(body) = Json::<Value>::from_request(req, state).await?;
            Ok(Self {
                body,
                files: Vec::new(),
            })
        }
    }
}

async fn read_multipart(mut multipart: Multipart) -> Result<Payload, AppError> {
    let mut data = None;
    let mut fields = Map::new();
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        if let Some(filename) = field.file_name().map(str::to_string) {
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let data = field.bytes().await?;
            debug!(field = %name, %filename, size = data.len(), "received file part");
            files.push(UploadedFile {
                field: name,
                filename,
                content_type,
                data,
            });
        } else if name == "data" {
            data = Some(field.text().await?);
        } else {
            let text = field.text().await?;
            fields.insert(name, Value::String(text));
        }
    }

    let body = match data {
        Some(text) => serde_json::from_str(&text)?,
        None => Value::Object(fields),
    };
    Ok(Payload { body, files })
}

impl Payload {
    /// Deserialize the JSON body.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, AppError> {
        Ok(serde_json::from_value(self.body.clone())?)
    }

    /// Take every file sent under `field`.
    pub fn take_all(&mut self, field: &str) -> Vec<UploadedFile> {
        let (taken, rest): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.files).into_iter().partition(|f| f.field == field);
        self.files = rest;
        taken
    }

    /// Take the files sent under `field`, rejecting more than `max`.
    pub fn take_files(&mut self, field: &str, max: usize) -> Result<Vec<UploadedFile>, AppError> {
        let taken = self.take_all(field);
        if taken.len() > max {
            return Err(AppError::bad_request(format!(
                "Too many files. Maximum is {max}."
            )));
        }
        Ok(taken)
    }

    /// Take the single file sent under `field`, if any.
    pub fn take_file(&mut self, field: &str) -> Result<Option<UploadedFile>, AppError> {
        Ok(self.take_files(field, 1)?.into_iter().next())
    }
}
