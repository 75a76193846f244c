use crate::config::UploadConfig;
use crate::models::RawFile;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone)]
pub struct ValidationRules {
    pub accepted_media_type: String,
    pub max_file_size: u64,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self::from_config(&UploadConfig::default())
    }
}

impl ValidationRules {
    pub fn from_config(config: &UploadConfig) -> Self {
        Self {
            accepted_media_type: config.accepted_media_type.clone(),
            max_file_size: config.max_file_size,
        }
    }
}

/// Why a file was refused before any network activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub enum RejectionReason {
    WrongMediaType,
    TooLarge,
}

impl RejectionReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectionReason::WrongMediaType => "INVALID_MIME_TYPE",
            RejectionReason::TooLarge => "FILE_TOO_LARGE",
        }
    }

    /// User-facing status text
    pub fn message(&self, rules: &ValidationRules) -> String {
        match self {
            RejectionReason::WrongMediaType => "Please upload only PDF files".to_string(),
            RejectionReason::TooLarge => format!(
                "File size must be less than {}MB",
                rules.max_file_size / 1024 / 1024
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationResult {
    Accepted,
    Rejected(RejectionReason),
}

impl ValidationResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationResult::Accepted)
    }
}

/// Validates declared media type against the single accepted type.
/// This is a declared-type check only; the bytes are never sniffed.
pub fn validate_mime_type(
    declared_media_type: &str,
    rules: &ValidationRules,
) -> Result<(), RejectionReason> {
    if declared_media_type == rules.accepted_media_type {
        Ok(())
    } else {
        Err(RejectionReason::WrongMediaType)
    }
}

/// Validates file size against maximum limit (the limit itself is allowed)
pub fn validate_file_size(size: u64, max_size: u64) -> Result<(), RejectionReason> {
    if size > max_size {
        return Err(RejectionReason::TooLarge);
    }
    Ok(())
}

/// Pre-flight check run before a transfer is started. Media type is checked first.
pub fn validate(file: &RawFile, rules: &ValidationRules) -> ValidationResult {
    let checked = validate_mime_type(&file.declared_media_type, rules)
        .and_then(|_| validate_file_size(file.byte_size, rules.max_file_size));

    match checked {
        Ok(()) => ValidationResult::Accepted,
        Err(reason) => {
            tracing::debug!(
                "Rejected '{}' ({} bytes, {}): {}",
                file.name,
                file.byte_size,
                file.declared_media_type,
                reason.code()
            );
            ValidationResult::Rejected(reason)
        }
    }
}
