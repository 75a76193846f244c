use std::env;
use tracing::warn;

/// Smallest part S3 accepts for all but the last part of a multipart upload
pub const MIN_CHUNK_SIZE: usize = 5 * 1024 * 1024;

/// Longest lifetime a SigV4 presigned URL may have (7 days)
pub const MAX_LOCATOR_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Configuration for the document transfer pipeline
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Maximum document size in bytes (default: 10 MiB)
    pub max_file_size: u64,

    /// The only declared media type accepted (default: "application/pdf")
    pub accepted_media_type: String,

    /// Multipart chunk size in bytes (default: 5 MiB, the S3 minimum part size)
    pub chunk_size: usize,

    /// Object key prefix for uploaded documents (default: "pdfs")
    pub storage_prefix: String,

    /// Seconds a successful upload keeps its status displayed (default: 3)
    pub status_clear_secs: u64,

    /// Lifetime of the presigned retrieval locator in seconds (default: 7 days)
    pub locator_ttl_secs: u64,

    /// Abort the pending multipart upload when a part fails (default: true)
    pub abort_failed_uploads: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024, // 10 MiB
            accepted_media_type: mime::APPLICATION_PDF.to_string(),
            chunk_size: MIN_CHUNK_SIZE,
            storage_prefix: "pdfs".to_string(),
            status_clear_secs: 3,
            locator_ttl_secs: MAX_LOCATOR_TTL_SECS,
            abort_failed_uploads: true,
        }
    }
}

impl UploadConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        let config = Self {
            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            accepted_media_type: env::var("ACCEPTED_MEDIA_TYPE")
                .unwrap_or(default.accepted_media_type),

            chunk_size: env::var("CHUNK_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.chunk_size),

            storage_prefix: env::var("STORAGE_PREFIX")
                .map(|v| v.trim_matches('/').to_string())
                .unwrap_or(default.storage_prefix),

            status_clear_secs: env::var("STATUS_CLEAR_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.status_clear_secs),

            locator_ttl_secs: env::var("LOCATOR_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.locator_ttl_secs),

            abort_failed_uploads: env::var("ABORT_FAILED_UPLOADS")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(default.abort_failed_uploads),
        };

        config.clamped_to_store_limits()
    }

    /// Pulls the chunk size and locator lifetime back inside what S3 accepts.
    pub fn clamped_to_store_limits(mut self) -> Self {
        if self.chunk_size < MIN_CHUNK_SIZE {
            warn!(
                "⚠️ CHUNK_SIZE {} is below the S3 minimum part size, using {}",
                self.chunk_size, MIN_CHUNK_SIZE
            );
            self.chunk_size = MIN_CHUNK_SIZE;
        }
        if self.locator_ttl_secs == 0 || self.locator_ttl_secs > MAX_LOCATOR_TTL_SECS {
            warn!(
                "⚠️ LOCATOR_TTL_SECS {} is outside 1..={}, using {}",
                self.locator_ttl_secs, MAX_LOCATOR_TTL_SECS, MAX_LOCATOR_TTL_SECS
            );
            self.locator_ttl_secs = MAX_LOCATOR_TTL_SECS;
        }
        self
    }

    /// Create config for development and tests (small chunks so progress is visible)
    pub fn development() -> Self {
        Self {
            chunk_size: 512 * 1024,
            ..Self::default()
        }
    }
}
