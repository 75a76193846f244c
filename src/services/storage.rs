use anyhow::{Result, anyhow};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

/// Path-addressed object store used by the transfer engine.
///
/// Uploads go through the multipart protocol: one `create_multipart_upload`,
/// numbered `upload_part` calls (1-based), then `complete_multipart_upload`.
/// Only after completion is the object visible under `key`.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Starts a multipart upload and returns its backend upload id.
    async fn create_multipart_upload(&self, key: &str, content_type: &str) -> Result<String>;

    /// Uploads one part and returns its etag.
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<String>;

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<(i32, String)>,
    ) -> Result<()>;

    /// Discards the staged parts of an unfinished upload.
    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()>;

    /// Resolves a durable retrieval locator for a stored object.
    async fn get_download_url(&self, key: &str, expires_in_secs: u64) -> Result<String>;
}

pub struct S3StorageService {
    client: Client,
    bucket: String,
}

impl S3StorageService {
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[async_trait]
impl StorageService for S3StorageService {
    async fn create_multipart_upload(&self, key: &str, content_type: &str) -> Result<String> {
        let res = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await?;

        let upload_id = res
            .upload_id()
            .ok_or_else(|| anyhow::anyhow!("No upload ID"))?;
        Ok(upload_id.to_string())
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<String> {
        let res = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .body(ByteStream::from(data))
            .part_number(part_number)
            .send()
            .await?;

        Ok(res.e_tag().unwrap_or_default().to_string())
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<(i32, String)>,
    ) -> Result<()> {
        let completed_parts = parts
            .into_iter()
            .map(|(part_number, etag)| {
                CompletedPart::builder()
                    .e_tag(etag)
                    .part_number(part_number)
                    .build()
            })
            .collect();

        let completed_multipart_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed_multipart_upload)
            .send()
            .await?;
        Ok(())
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()> {
        let res = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await;

        if let Err(e) = res {
            tracing::error!(
                "S3 abort_multipart_upload failed: bucket={}, key={}, error={:?}",
                self.bucket,
                key,
                e
            );
            return Err(e.into());
        }
        Ok(())
    }

    async fn get_download_url(&self, key: &str, expires_in_secs: u64) -> Result<String> {
        let presigning = PresigningConfig::expires_in(Duration::from_secs(expires_in_secs))?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await?;
        Ok(request.uri().to_string())
    }
}

struct PendingUpload {
    key: String,
    parts: HashMap<i32, Bytes>,
}

/// Process-local object store for development runs without MinIO.
///
/// Objects and pending uploads live only as long as the process.
pub struct InMemoryStorageService {
    bucket: String,
    objects: Mutex<HashMap<String, Bytes>>,
    pending: Mutex<HashMap<String, PendingUpload>>,
}

impl InMemoryStorageService {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the stored bytes of a completed object.
    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.objects.lock().ok()?.get(key).cloned()
    }

    pub fn object_keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of multipart uploads created but neither completed nor aborted.
    pub fn pending_uploads(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or_default()
    }
}

#[async_trait]
impl StorageService for InMemoryStorageService {
    async fn create_multipart_upload(&self, key: &str, _content_type: &str) -> Result<String> {
        let upload_id = Uuid::new_v4().to_string();
        self.pending
            .lock()
            .map_err(|_| anyhow!("Storage lock poisoned"))?
            .insert(
                upload_id.clone(),
                PendingUpload {
                    key: key.to_string(),
                    parts: HashMap::new(),
                },
            );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<String> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|_| anyhow!("Storage lock poisoned"))?;
        let upload = pending
            .get_mut(upload_id)
            .filter(|u| u.key == key)
            .ok_or_else(|| anyhow!("No such upload: {}", upload_id))?;

        upload.parts.insert(part_number, data);
        Ok(format!("{}-{}", upload_id, part_number))
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<(i32, String)>,
    ) -> Result<()> {
        let upload = self
            .pending
            .lock()
            .map_err(|_| anyhow!("Storage lock poisoned"))?
            .remove(upload_id)
            .filter(|u| u.key == key)
            .ok_or_else(|| anyhow!("No such upload: {}", upload_id))?;

        let mut body = Vec::new();
        for (part_number, _etag) in parts {
            let part = upload
                .parts
                .get(&part_number)
                .ok_or_else(|| anyhow!("Missing part {} for {}", part_number, key))?;
            body.extend_from_slice(part);
        }

        self.objects
            .lock()
            .map_err(|_| anyhow!("Storage lock poisoned"))?
            .insert(key.to_string(), Bytes::from(body));
        Ok(())
    }

    async fn abort_multipart_upload(&self, _key: &str, upload_id: &str) -> Result<()> {
        self.pending
            .lock()
            .map_err(|_| anyhow!("Storage lock poisoned"))?
            .remove(upload_id);
        Ok(())
    }

    async fn get_download_url(&self, key: &str, _expires_in_secs: u64) -> Result<String> {
        let objects = self
            .objects
            .lock()
            .map_err(|_| anyhow!("Storage lock poisoned"))?;
        if !objects.contains_key(key) {
            return Err(anyhow!("Object not found: {}", key));
        }
        Ok(format!("memory://{}/{}", self.bucket, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_multipart_roundtrip() {
        let storage = InMemoryStorageService::new("uploads");
        let upload_id = storage
            .create_multipart_upload("pdfs/1_a.pdf", "application/pdf")
            .await
            .unwrap();

        // Parts may arrive out of order; completion order decides the layout
        let e2 = storage
            .upload_part("pdfs/1_a.pdf", &upload_id, 2, Bytes::from_static(b"world"))
            .await
            .unwrap();
        let e1 = storage
            .upload_part("pdfs/1_a.pdf", &upload_id, 1, Bytes::from_static(b"hello "))
            .await
            .unwrap();

        assert!(storage.get_download_url("pdfs/1_a.pdf", 60).await.is_err());

        storage
            .complete_multipart_upload("pdfs/1_a.pdf", &upload_id, vec![(1, e1), (2, e2)])
            .await
            .unwrap();

        assert_eq!(
            storage.object("pdfs/1_a.pdf").unwrap(),
            Bytes::from_static(b"hello world")
        );
        assert_eq!(storage.pending_uploads(), 0);
        assert_eq!(
            storage.get_download_url("pdfs/1_a.pdf", 60).await.unwrap(),
            "memory://uploads/pdfs/1_a.pdf"
        );
    }

    #[tokio::test]
    async fn test_in_memory_abort_discards_parts() {
        let storage = InMemoryStorageService::new("uploads");
        let upload_id = storage
            .create_multipart_upload("pdfs/2_b.pdf", "application/pdf")
            .await
            .unwrap();
        storage
            .upload_part("pdfs/2_b.pdf", &upload_id, 1, Bytes::from_static(b"partial"))
            .await
            .unwrap();
        assert_eq!(storage.pending_uploads(), 1);

        storage
            .abort_multipart_upload("pdfs/2_b.pdf", &upload_id)
            .await
            .unwrap();

        assert_eq!(storage.pending_uploads(), 0);
        assert!(storage.object("pdfs/2_b.pdf").is_none());
        assert!(
            storage
                .upload_part("pdfs/2_b.pdf", &upload_id, 2, Bytes::new())
                .await
                .is_err()
        );
    }
}
