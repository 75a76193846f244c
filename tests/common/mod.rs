#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use mirage_upload::config::UploadConfig;
use mirage_upload::models::RawFile;
use mirage_upload::services::coordinator::{CoordinatorHandle, UploadCoordinator};
use mirage_upload::services::session::UploadSession;
use mirage_upload::services::storage::{InMemoryStorageService, StorageService};
use mirage_upload::services::transfer::TransferEngine;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

pub const MIB: usize = 1024 * 1024;

/// In-memory storage that counts calls and fails on demand.
pub struct FlakyStorage {
    pub inner: InMemoryStorageService,
    calls: AtomicUsize,
    parts_to_fail: AtomicUsize,
    fail_locator: AtomicBool,
    part_delay: Duration,
}

impl FlakyStorage {
    pub fn new() -> Self {
        Self::with_part_delay(Duration::ZERO)
    }

    pub fn with_part_delay(part_delay: Duration) -> Self {
        Self {
            inner: InMemoryStorageService::new("uploads"),
            calls: AtomicUsize::new(0),
            parts_to_fail: AtomicUsize::new(0),
            fail_locator: AtomicBool::new(false),
            part_delay,
        }
    }

    /// Number of backend round trips made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The next `count` part uploads fail.
    pub fn fail_next_parts(&self, count: usize) {
        self.parts_to_fail.store(count, Ordering::SeqCst);
    }

    pub fn fail_locator(&self, fail: bool) {
        self.fail_locator.store(fail, Ordering::SeqCst);
    }

    fn record(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl StorageService for FlakyStorage {
    async fn create_multipart_upload(
        &self,
        key: &str,
        content_type: &str,
    ) -> anyhow::Result<String> {
        self.record();
        self.inner.create_multipart_upload(key, content_type).await
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> anyhow::Result<String> {
        self.record();
        if !self.part_delay.is_zero() {
            tokio::time::sleep(self.part_delay).await;
        }
        let should_fail = self
            .parts_to_fail
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(anyhow::anyhow!("connection reset by peer"));
        }
        self.inner.upload_part(key, upload_id, part_number, data).await
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<(i32, String)>,
    ) -> anyhow::Result<()> {
        self.record();
        self.inner
            .complete_multipart_upload(key, upload_id, parts)
            .await
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> anyhow::Result<()> {
        self.record();
        self.inner.abort_multipart_upload(key, upload_id).await
    }

    async fn get_download_url(&self, key: &str, expires_in_secs: u64) -> anyhow::Result<String> {
        self.record();
        if self.fail_locator.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("presign failed"));
        }
        self.inner.get_download_url(key, expires_in_secs).await
    }
}

pub fn test_config() -> UploadConfig {
    UploadConfig {
        chunk_size: 256 * 1024,
        ..UploadConfig::development()
    }
}

/// Spawns a coordinator over `storage`. Keep the returned sender alive for
/// as long as the pipeline should run.
pub fn start_pipeline(
    storage: Arc<dyn StorageService>,
    config: &UploadConfig,
) -> (CoordinatorHandle, watch::Sender<bool>) {
    let engine = TransferEngine::new(storage, config);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (coordinator, handle) = UploadCoordinator::new(engine, config, shutdown_rx);
    tokio::spawn(coordinator.run());
    (handle, shutdown_tx)
}

pub fn pdf(name: &str, size: usize) -> (RawFile, Bytes) {
    (
        RawFile::new(name, size as u64, "application/pdf"),
        Bytes::from(vec![0x25u8; size]),
    )
}

/// Waits until session `id` is on display in a terminal state.
pub async fn wait_for_terminal(handle: &CoordinatorHandle, id: Uuid) -> UploadSession {
    let mut sessions = handle.subscribe_session();
    let session = tokio::time::timeout(
        Duration::from_secs(30),
        sessions.wait_for(|s| {
            s.as_ref()
                .map(|s| s.id == id && s.state.is_terminal())
                .unwrap_or(false)
        }),
    )
    .await
    .expect("timed out waiting for terminal state")
    .expect("coordinator stopped");
    session.clone().unwrap()
}

pub async fn wait_for_documents(handle: &CoordinatorHandle, count: usize) {
    let mut documents = handle.subscribe_documents();
    tokio::time::timeout(
        Duration::from_secs(30),
        documents.wait_for(|d| d.len() >= count),
    )
    .await
    .expect("timed out waiting for documents")
    .expect("coordinator stopped");
}
