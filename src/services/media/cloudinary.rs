//! Cloudinary media backend over the signed upload API.
//!
//! Uploads post a base64 data URI; requests are signed with SHA-256 over
//! the alphabetically sorted parameters followed by the API secret.

use super::{MediaError, MediaObject, MediaStore, UploadOptions, UploadedAsset, content_type_for, file_extension};
use crate::models::media::ResourceType;
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::Utc;
use futures::TryStreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::{collections::BTreeMap, io, sync::Arc};
use tracing::{debug, instrument};

pub const DEFAULT_API_BASE: &str = "https://api.cloudinary.com";
pub const DEFAULT_DELIVERY_BASE: &str = "https://res.cloudinary.com";

#[derive(Clone, Debug)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: SecretString,
    pub api_base: String,
    pub delivery_base: String,
}

#[derive(Clone)]
pub struct CloudinaryMediaStore {
    inner: Arc<Inner>,
}

struct Inner {
    client: reqwest::Client,
    config: CloudinaryConfig,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
    #[serde(default)]
    bytes: u64,
    #[serde(default)]
    etag: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorMessage,
}

#[derive(Debug, Deserialize)]
struct ErrorMessage {
    message: String,
}

/// SHA-256 signature of `params` as Cloudinary expects it.
fn sign(params: &BTreeMap<&str, String>, secret: &str) -> String {
    let joined = params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

impl CloudinaryMediaStore {
    pub fn new(config: CloudinaryConfig) -> Result<Self, MediaError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            inner: Arc::new(Inner { client, config }),
        })
    }

    fn endpoint(&self, resource_type: ResourceType, action: &str) -> String {
        let cfg = &self.inner.config;
        format!(
            "{}/v1_1/{}/{}/{}",
            cfg.api_base.trim_end_matches('/'),
            cfg.cloud_name,
            resource_type,
            action
        )
    }

    /// Add `timestamp`, `api_key` and the signature to `params`.
    fn signed_form(&self, mut params: BTreeMap<&'static str, String>) -> Vec<(&'static str, String)> {
        let cfg = &self.inner.config;
        params.insert("timestamp", Utc::now().timestamp().to_string());
        let signature = sign(&params, cfg.api_secret.expose_secret());
        let mut form: Vec<(&'static str, String)> = params.into_iter().collect();
        form.push(("api_key", cfg.api_key.clone()));
        form.push(("signature", signature));
        form.push(("signature_algorithm", "sha256".into()));
        form
    }

    async fn remote_error(response: reqwest::Response) -> MediaError {
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|b| b.error.message)
            .unwrap_or(text);
        MediaError::Remote { status, message }
    }
}

#[async_trait]
impl MediaStore for CloudinaryMediaStore {
    fn backend(&self) -> &'static str {
        "cloudinary"
    }

    #[instrument(skip(self, data, options), fields(folder = %options.folder, resource_type = %options.resource_type))]
    async fn upload(&self, data: Bytes, options: UploadOptions) -> Result<UploadedAsset, MediaError> {
        let mut params = BTreeMap::new();
        params.insert("folder", options.folder.clone());
        if let Some(public_id) = &options.public_id {
            // raw assets keep their extension in the id
            let id = match (options.resource_type, file_extension(&options.filename)) {
                (ResourceType::Raw, Some(ext)) => format!("{public_id}.{ext}"),
                _ => public_id.clone(),
            };
            params.insert("public_id", id);
        }
        if let Some(t) = &options.transformation {
            params.insert("transformation", t.clone());
        }

        let mut form = self.signed_form(params);
        form.push((
            "file",
            format!(
                "data:{};base64,{}",
                options.content_type,
                general_purpose::STANDARD.encode(&data)
            ),
        ));

        let response = self
            .inner
            .client
            .post(self.endpoint(options.resource_type, "upload"))
            .form(&form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::remote_error(response).await);
        }
        let body: UploadResponse = response.json().await?;
        debug!(public_id = %body.public_id, "uploaded to cloudinary");

        Ok(UploadedAsset {
            url: body.secure_url,
            public_id: body.public_id,
            bytes: if body.bytes > 0 { body.bytes } else { data.len() as u64 },
            resource_type: options.resource_type,
            etag: body.etag,
        })
    }

    #[instrument(skip(self))]
    async fn delete(&self, public_id: &str, resource_type: ResourceType) -> Result<(), MediaError> {
        let mut params = BTreeMap::new();
        params.insert("public_id", public_id.to_string());
        let form = self.signed_form(params);

        let response = self
            .inner
            .client
            .post(self.endpoint(resource_type, "destroy"))
            .form(&form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::remote_error(response).await);
        }
        let body: DestroyResponse = response.json().await?;
        match body.result.as_str() {
            "ok" => Ok(()),
            "not found" => Err(MediaError::NotFound(public_id.to_string())),
            other => Err(MediaError::Remote {
                status: 200,
                message: other.to_string(),
            }),
        }
    }

    fn url(&self, public_id: &str, resource_type: ResourceType) -> String {
        let cfg = &self.inner.config;
        format!(
            "{}/{}/{}/upload/{}",
            cfg.delivery_base.trim_end_matches('/'),
            cfg.cloud_name,
            resource_type,
            public_id
        )
    }

    async fn open(&self, public_id: &str, resource_type: ResourceType) -> Result<MediaObject, MediaError> {
        let response = self
            .inner
            .client
            .get(self.url(public_id, resource_type))
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(MediaError::NotFound(public_id.to_string()));
        }
        if !response.status().is_success() {
            return Err(Self::remote_error(response).await);
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| content_type_for(public_id).to_string());
        let size = response.content_length();
        let stream = response.bytes_stream().map_err(io::Error::other);
        Ok(MediaObject {
            content_type,
            size,
            stream: Box::pin(stream),
        })
    }

    /// `GET /v1_1/{cloud}/ping` on the Admin API.
    async fn check(&self) -> Result<(), MediaError> {
        let cfg = &self.inner.config;
        let url = format!(
            "{}/v1_1/{}/ping",
            cfg.api_base.trim_end_matches('/'),
            cfg.cloud_name
        );
        let response = self
            .inner
            .client
            .get(url)
            .basic_auth(&cfg.api_key, Some(cfg.api_secret.expose_secret()))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::remote_error(response).await);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn store(server: &MockServer) -> CloudinaryMediaStore {
        CloudinaryMediaStore::new(CloudinaryConfig {
            cloud_name: "demo".into(),
            api_key: "key".into(),
            api_secret: SecretString::from("secret"),
            api_base: server.base_url(),
            delivery_base: DEFAULT_DELIVERY_BASE.into(),
        })
        .unwrap()
    }

    #[test]
    fn signature_is_sorted_and_salted() {
        let mut params = BTreeMap::new();
        params.insert("timestamp", "1315060510".to_string());
        params.insert("public_id", "sample".to_string());
        let mut hasher = Sha256::new();
        hasher.update(b"public_id=sample&timestamp=1315060510secret");
        assert_eq!(sign(&params, "secret"), hex::encode(hasher.finalize()));
    }

    #[test]
    fn delivery_url_is_deterministic() {
        let server = MockServer::start();
        let s = store(&server);
        assert_eq!(
            s.url("nissal/products/abc", ResourceType::Image),
            "https://res.cloudinary.com/demo/image/upload/nissal/products/abc"
        );
        assert_eq!(
            s.url("nissal/catalogs/c.pdf", ResourceType::Raw),
            "https://res.cloudinary.com/demo/raw/upload/nissal/catalogs/c.pdf"
        );
    }

    #[tokio::test]
    async fn upload_posts_signed_form() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1_1/demo/image/upload")
                .body_includes("folder=nissal%2Fproducts")
                .body_includes("api_key=key")
                .body_includes("signature_algorithm=sha256");
            then.status(200).json_body(serde_json::json!({
                "secure_url": "https://res.cloudinary.com/demo/image/upload/nissal/products/x1",
                "public_id": "nissal/products/x1",
                "bytes": 3,
                "etag": "abc"
            }));
        });

        let options = UploadOptions {
            folder: "nissal/products".into(),
            resource_type: ResourceType::Image,
            public_id: None,
            filename: "a.png".into(),
            content_type: "image/png".into(),
            transformation: None,
        };
        let asset = store(&server)
            .upload(Bytes::from_static(b"abc"), options)
            .await
            .unwrap();

        mock.assert();
        assert_eq!(asset.public_id, "nissal/products/x1");
        assert_eq!(asset.bytes, 3);
        assert_eq!(asset.etag.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn destroy_not_found_is_reported() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v1_1/demo/raw/destroy");
            then.status(200).json_body(serde_json::json!({"result": "not found"}));
        });
        let err = store(&server)
            .delete("nissal/catalogs/c.pdf", ResourceType::Raw)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::NotFound(_)));
    }

    #[tokio::test]
    async fn remote_errors_carry_message() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v1_1/demo/image/destroy");
            then.status(401)
                .json_body(serde_json::json!({"error": {"message": "Invalid Signature"}}));
        });
        let err = store(&server)
            .delete("x", ResourceType::Image)
            .await
            .unwrap_err();
        match err {
            MediaError::Remote { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Invalid Signature");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
