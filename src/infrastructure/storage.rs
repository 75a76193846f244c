use crate::services::storage::{InMemoryStorageService, S3StorageService, StorageService};
use anyhow::{Context, Result};
use aws_sdk_s3::config::Region;
use std::env;
use std::sync::Arc;
use tracing::info;

/// Builds the storage backend selected by `STORAGE_BACKEND` ("s3" or "memory").
pub async fn setup_storage() -> Result<Arc<dyn StorageService>> {
    let backend = env::var("STORAGE_BACKEND").unwrap_or_else(|_| "s3".to_string());

    match backend.to_lowercase().as_str() {
        "memory" => {
            info!("🧠 In-memory storage (documents are lost on restart)");
            Ok(Arc::new(InMemoryStorageService::new("uploads")))
        }
        "s3" => Ok(Arc::new(setup_s3().await?)),
        other => anyhow::bail!("Unknown STORAGE_BACKEND '{}', expected 's3' or 'memory'", other),
    }
}

async fn setup_s3() -> Result<S3StorageService> {
    let endpoint_url = env::var("MINIO_ENDPOINT").context("MINIO_ENDPOINT must be set")?;
    let access_key = env::var("MINIO_ACCESS_KEY").context("MINIO_ACCESS_KEY must be set")?;
    let secret_key = env::var("MINIO_SECRET_KEY").context("MINIO_SECRET_KEY must be set")?;
    let bucket = env::var("MINIO_BUCKET").context("MINIO_BUCKET must be set")?;

    info!("☁️  S3 Storage: {} (Bucket: {})", endpoint_url, bucket);

    let aws_config = aws_config::from_env()
        .endpoint_url(&endpoint_url)
        .region(Region::new("us-east-1"))
        .credentials_provider(aws_sdk_s3::config::Credentials::new(
            access_key, secret_key, None, None, "static",
        ))
        .load()
        .await;

    let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
        .force_path_style(true)
        .build();

    let s3_client = aws_sdk_s3::Client::from_conf(s3_config);

    // Ensure bucket exists
    match s3_client.head_bucket().bucket(&bucket).send().await {
        Ok(_) => info!("✅ Bucket '{}' is ready", bucket),
        Err(_) => {
            info!("🪣 Bucket '{}' not found, creating...", bucket);
            if let Err(e) = s3_client.create_bucket().bucket(&bucket).send().await {
                tracing::error!("❌ Failed to create bucket '{}': {}", bucket, e);
            } else {
                info!("✅ Bucket '{}' created successfully", bucket);
            }
        }
    }

    Ok(S3StorageService::new(s3_client, bucket))
}
