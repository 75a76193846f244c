use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// File metadata handed over by the UI when a document is chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RawFile {
    pub name: String,
    pub byte_size: u64,
    pub declared_media_type: String,
}

impl RawFile {
    pub fn new(
        name: impl Into<String>,
        byte_size: u64,
        declared_media_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            byte_size,
            declared_media_type: declared_media_type.into(),
        }
    }
}

/// Snapshot of an in-flight transfer, recomputed on every acknowledged chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TransferProgress {
    pub bytes_sent: u64,
    pub bytes_total: u64,
    /// `round(100 * bytes_sent / bytes_total)`, 100 for an empty file
    pub percent: u8,
}

impl TransferProgress {
    pub fn new(bytes_sent: u64, bytes_total: u64) -> Self {
        let bytes_sent = bytes_sent.min(bytes_total);
        let percent = if bytes_total == 0 {
            100
        } else {
            // Round half up without going through floats
            let scaled = bytes_sent as u128 * 100;
            let total = bytes_total as u128;
            ((scaled + total / 2) / total) as u8
        };

        Self {
            bytes_sent,
            bytes_total,
            percent,
        }
    }
}

/// Stable description of a durably stored document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ContentDescriptor {
    pub display_name: String,
    pub byte_size: u64,
    /// Opaque retrieval URI resolved after the bytes were stored
    pub locator: String,
    pub storage_path: String,
    pub completed_at: DateTime<Utc>,
}

impl ContentDescriptor {
    /// Size in MiB with two decimals, as shown in the document list.
    pub fn size_mib(&self) -> String {
        format!("{:.2}", self.byte_size as f64 / 1024.0 / 1024.0)
    }
}
