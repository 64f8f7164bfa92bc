//! Local-disk media backend.
//!
//! Payloads live under `base_path/{resource_type}/{shard}/{shard}/{public_id}`
//! where the shards are the first two bytes of MD5(`resource_type/public_id`).
//! Writes go to a temp file that is fsynced and renamed into place. Assets
//! are served back by `GET /media/{resource_type}/{*public_id}`.

use super::{MediaError, MediaObject, MediaStore, UploadOptions, UploadedAsset, content_type_for, file_extension};
use crate::models::media::ResourceType;
use async_trait::async_trait;
use bytes::Bytes;
use md5::Context;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;

const MAX_PUBLIC_ID_LEN: usize = 512;

#[derive(Clone, Debug)]
pub struct DiskMediaStore {
    base_path: PathBuf,
    /// Origin the `/media` route is reachable at, without trailing slash.
    public_url: String,
}

impl DiskMediaStore {
    pub fn new(base_path: impl Into<PathBuf>, public_url: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Reject ids that could escape the media root.
    fn ensure_public_id_safe(public_id: &str) -> Result<(), MediaError> {
        let invalid = || MediaError::InvalidPublicId(public_id.to_string());
        if public_id.is_empty() || public_id.len() > MAX_PUBLIC_ID_LEN {
            return Err(invalid());
        }
        if public_id.starts_with('/') || public_id.contains("..") {
            return Err(invalid());
        }
        if public_id
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(invalid());
        }
        Ok(())
    }

    fn type_root(&self, resource_type: ResourceType) -> PathBuf {
        self.base_path.join(resource_type.as_str())
    }

    fn shards(resource_type: ResourceType, public_id: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", resource_type, public_id));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn asset_path(&self, resource_type: ResourceType, public_id: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::shards(resource_type, public_id);
        let mut path = self.type_root(resource_type);
        path.push(shard_a);
        path.push(shard_b);
        path.push(public_id);
        path
    }

    fn public_id_for(options: &UploadOptions) -> String {
        let stem = options
            .public_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let folder = options.folder.trim_matches('/');
        let ext = file_extension(&options.filename)
            .map(|e| format!(".{e}"))
            .unwrap_or_default();
        if folder.is_empty() {
            format!("{stem}{ext}")
        } else {
            format!("{folder}/{stem}{ext}")
        }
    }

    /// Remove empty directories from `start` up to, not including, `stop`.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl MediaStore for DiskMediaStore {
    fn backend(&self) -> &'static str {
        "disk"
    }

    async fn upload(&self, data: Bytes, options: UploadOptions) -> Result<UploadedAsset, MediaError> {
        let public_id = Self::public_id_for(&options);
        Self::ensure_public_id_safe(&public_id)?;

        let file_path = self.asset_path(options.resource_type, &public_id);
        let parent = file_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| io::Error::other("asset path missing parent directory"))?;
        fs::create_dir_all(&parent).await?;

        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut digest = Context::new();
        digest.consume(&data);

        let written = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(&data).await?;
            file.flush().await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, &file_path).await
        }
        .await;
        if let Err(err) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(MediaError::Io(err));
        }

        debug!(public_id = %public_id, bytes = data.len(), "stored media asset");

        Ok(UploadedAsset {
            url: self.url(&public_id, options.resource_type),
            public_id,
            bytes: data.len() as u64,
            resource_type: options.resource_type,
            etag: Some(format!("{:x}", digest.compute())),
        })
    }

    /// Missing files count as already deleted.
    async fn delete(&self, public_id: &str, resource_type: ResourceType) -> Result<(), MediaError> {
        Self::ensure_public_id_safe(public_id)?;
        let file_path = self.asset_path(resource_type, public_id);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed media file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("media file {} already missing", file_path.display());
            }
            Err(err) => return Err(MediaError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            let root = self.type_root(resource_type);
            self.prune_empty_dirs(parent, &root).await;
        }
        Ok(())
    }

    fn url(&self, public_id: &str, resource_type: ResourceType) -> String {
        format!("{}/media/{}/{}", self.public_url, resource_type, public_id)
    }

    async fn open(&self, public_id: &str, resource_type: ResourceType) -> Result<MediaObject, MediaError> {
        Self::ensure_public_id_safe(public_id)?;
        let file_path = self.asset_path(resource_type, public_id);
        let file = File::open(&file_path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                MediaError::NotFound(public_id.to_string())
            } else {
                MediaError::Io(err)
            }
        })?;
        let size = file.metadata().await.ok().map(|m| m.len());
        Ok(MediaObject {
            content_type: content_type_for(public_id).to_string(),
            size,
            stream: Box::pin(ReaderStream::new(file)),
        })
    }

    /// Write, read back and delete a scratch file under the media root.
    async fn check(&self) -> Result<(), MediaError> {
        fs::create_dir_all(&self.base_path).await?;
        let scratch = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&scratch, b"readyz").await?;
        let read = fs::read(&scratch).await;
        let _ = fs::remove_file(&scratch).await;
        if read? != b"readyz" {
            return Err(MediaError::Io(io::Error::other("readiness file content mismatch")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    fn options(folder: &str, filename: &str, rt: ResourceType) -> UploadOptions {
        UploadOptions {
            folder: folder.into(),
            resource_type: rt,
            public_id: None,
            filename: filename.into(),
            content_type: "image/png".into(),
            transformation: None,
        }
    }

    #[tokio::test]
    async fn upload_open_delete_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskMediaStore::new(dir.path(), "http://localhost:5000/");

        let asset = store
            .upload(
                Bytes::from_static(b"png-bytes"),
                options("nissal/products", "door.PNG", ResourceType::Image),
            )
            .await
            .unwrap();
        assert!(asset.public_id.starts_with("nissal/products/"));
        assert!(asset.public_id.ends_with(".png"));
        assert_eq!(asset.bytes, 9);
        assert_eq!(
            asset.url,
            format!("http://localhost:5000/media/image/{}", asset.public_id)
        );
        assert_eq!(
            asset.etag.as_deref(),
            Some(format!("{:x}", md5::compute(b"png-bytes")).as_str())
        );

        let object = store.open(&asset.public_id, ResourceType::Image).await.unwrap();
        assert_eq!(object.content_type, "image/png");
        let chunks: Vec<Bytes> = object.stream.try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"png-bytes");

        store.delete(&asset.public_id, ResourceType::Image).await.unwrap();
        assert!(matches!(
            store.open(&asset.public_id, ResourceType::Image).await,
            Err(MediaError::NotFound(_))
        ));
        // shard directories are pruned back to the type root
        let mut entries = fs::read_dir(dir.path().join("image")).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn requested_public_id_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskMediaStore::new(dir.path(), "http://x");
        let opts = options("nissal/catalogs", "katalog.pdf", ResourceType::Raw)
            .public_id("catalog_1_2");
        let asset = store.upload(Bytes::from_static(b"%PDF"), opts).await.unwrap();
        assert_eq!(asset.public_id, "nissal/catalogs/catalog_1_2.pdf");
        assert_eq!(asset.resource_type, ResourceType::Raw);
    }

    #[tokio::test]
    async fn rejects_traversal_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskMediaStore::new(dir.path(), "http://x");
        assert!(matches!(
            store.open("../etc/passwd", ResourceType::Raw).await,
            Err(MediaError::InvalidPublicId(_))
        ));
        assert!(store.delete("/abs", ResourceType::Raw).await.is_err());
    }

    #[tokio::test]
    async fn deleting_missing_asset_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskMediaStore::new(dir.path(), "http://x");
        store.delete("nissal/x.png", ResourceType::Image).await.unwrap();
        store.check().await.unwrap();
    }
}
