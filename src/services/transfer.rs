use crate::config::UploadConfig;
use crate::models::{RawFile, TransferProgress};
use crate::services::storage::StorageService;
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{Instrument, error, info, warn};

/// Terminal failure of one transfer attempt. Never retried by the engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferFailure {
    /// Network or backend error while moving bytes
    #[error("Transfer failed: {0}")]
    Transfer(String),

    /// Bytes are stored, but no retrieval locator could be resolved
    #[error("Locator resolution failed: {0}")]
    LocatorResolution(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    Progress(TransferProgress),
    Succeeded { locator: String },
    Failed(TransferFailure),
}

impl TransferEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransferEvent::Progress(_))
    }
}

/// Observer side of a running transfer.
///
/// Yields zero or more progress events followed by exactly one terminal
/// event; the stream ends after the terminal event.
pub struct TransferHandle {
    storage_path: String,
    events: mpsc::UnboundedReceiver<TransferEvent>,
}

impl TransferHandle {
    pub fn storage_path(&self) -> &str {
        &self.storage_path
    }

    pub async fn next_event(&mut self) -> Option<TransferEvent> {
        self.events.recv().await
    }

    /// Drains the stream until the terminal event and returns every event.
    pub async fn collect_events(mut self) -> Vec<TransferEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event().await {
            events.push(event);
        }
        events
    }
}

/// Sending half owned by the transfer task. The terminal methods take `self`,
/// so nothing can follow a terminal event.
struct EventEmitter {
    tx: mpsc::UnboundedSender<TransferEvent>,
    last_sent: u64,
}

impl EventEmitter {
    fn progress(&mut self, progress: TransferProgress) {
        debug_assert!(progress.bytes_sent >= self.last_sent);
        self.last_sent = progress.bytes_sent;
        // The observer may have gone away; the transfer still runs to completion
        let _ = self.tx.send(TransferEvent::Progress(progress));
    }

    fn finish(self, outcome: Result<String, TransferFailure>) {
        let event = match outcome {
            Ok(locator) => TransferEvent::Succeeded { locator },
            Err(failure) => TransferEvent::Failed(failure),
        };
        let _ = self.tx.send(event);
    }
}

/// Object key for a new upload: `{prefix}/{epoch_millis}_{name}`.
///
/// Unique at human interaction rates, not a cryptographic guarantee.
pub fn destination_path(prefix: &str, file_name: &str, epoch_millis: i64) -> String {
    format!("{}/{}_{}", prefix, epoch_millis, file_name)
}

/// Splits a payload into multipart chunks. An empty payload still yields one
/// (empty) part, since a multipart upload cannot complete with zero parts.
fn split_chunks(bytes: &Bytes, chunk_size: usize) -> Vec<Bytes> {
    if bytes.is_empty() {
        return vec![Bytes::new()];
    }
    (0..bytes.len())
        .step_by(chunk_size)
        .map(|start| bytes.slice(start..(start + chunk_size).min(bytes.len())))
        .collect()
}

#[derive(Clone)]
pub struct TransferEngine {
    storage: Arc<dyn StorageService>,
    storage_prefix: String,
    chunk_size: usize,
    locator_ttl_secs: u64,
    abort_failed_uploads: bool,
}

impl TransferEngine {
    pub fn new(storage: Arc<dyn StorageService>, config: &UploadConfig) -> Self {
        Self {
            storage,
            storage_prefix: config.storage_prefix.clone(),
            chunk_size: config.chunk_size.max(1),
            locator_ttl_secs: config.locator_ttl_secs,
            abort_failed_uploads: config.abort_failed_uploads,
        }
    }

    /// Starts an upload in the background and returns its handle immediately.
    ///
    /// Must be called from within a Tokio runtime. There is no cancellation:
    /// once started, the transfer runs until its terminal event.
    pub fn begin_transfer(&self, file: RawFile, bytes: Bytes) -> TransferHandle {
        let storage_path = destination_path(
            &self.storage_prefix,
            &file.name,
            Utc::now().timestamp_millis(),
        );
        let (tx, rx) = mpsc::unbounded_channel();
        let emitter = EventEmitter { tx, last_sent: 0 };

        let engine = self.clone();
        let path = storage_path.clone();
        let span = tracing::info_span!("transfer", storage_path = %storage_path);
        tokio::spawn(
            async move {
                engine.run(file, bytes, path, emitter).await;
            }
            .instrument(span),
        );

        TransferHandle {
            storage_path,
            events: rx,
        }
    }

    async fn run(&self, file: RawFile, bytes: Bytes, path: String, mut emitter: EventEmitter) {
        info!("📤 Uploading '{}' ({} bytes)", file.name, bytes.len());
        let outcome = self.upload(&file, bytes, &path, &mut emitter).await;

        match &outcome {
            Ok(_) => info!("✅ Upload of '{}' is durable", file.name),
            Err(TransferFailure::LocatorResolution(e)) => warn!(
                "⚠️ Object {} is stored but has no locator, leaving it orphaned: {}",
                path, e
            ),
            Err(TransferFailure::Transfer(e)) => error!("❌ Upload of '{}' failed: {}", file.name, e),
        }

        emitter.finish(outcome);
    }

    async fn upload(
        &self,
        file: &RawFile,
        bytes: Bytes,
        path: &str,
        emitter: &mut EventEmitter,
    ) -> Result<String, TransferFailure> {
        let bytes_total = bytes.len() as u64;

        let upload_id = self
            .storage
            .create_multipart_upload(path, &file.declared_media_type)
            .await
            .map_err(|e| TransferFailure::Transfer(e.to_string()))?;

        let mut parts = Vec::new();
        let mut bytes_sent = 0u64;

        for (index, chunk) in split_chunks(&bytes, self.chunk_size).into_iter().enumerate() {
            let part_number = index as i32 + 1;
            let chunk_len = chunk.len() as u64;

            match self
                .storage
                .upload_part(path, &upload_id, part_number, chunk)
                .await
            {
                Ok(etag) => {
                    bytes_sent += chunk_len;
                    parts.push((part_number, etag));
                    emitter.progress(TransferProgress::new(bytes_sent, bytes_total));
                }
                Err(e) => {
                    self.release(path, &upload_id).await;
                    return Err(TransferFailure::Transfer(format!(
                        "part {} rejected: {}",
                        part_number, e
                    )));
                }
            }
        }

        if let Err(e) = self
            .storage
            .complete_multipart_upload(path, &upload_id, parts)
            .await
        {
            self.release(path, &upload_id).await;
            return Err(TransferFailure::Transfer(e.to_string()));
        }

        self.storage
            .get_download_url(path, self.locator_ttl_secs)
            .await
            .map_err(|e| TransferFailure::LocatorResolution(e.to_string()))
    }

    /// Best-effort abort of staged parts. Never touches a completed object.
    async fn release(&self, path: &str, upload_id: &str) {
        if !self.abort_failed_uploads {
            return;
        }
        if let Err(e) = self.storage.abort_multipart_upload(path, upload_id).await {
            warn!("Could not abort multipart upload for {}: {}", path, e);
        }
    }
}
