use crate::models::TransferProgress;
use crate::services::transfer::{TransferEvent, TransferFailure};
use crate::utils::validation::{RejectionReason, ValidationResult, ValidationRules};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

pub const UPLOADING_MESSAGE: &str = "Uploading...";
pub const SUCCESS_MESSAGE: &str = "Upload successful!";
pub const FAILURE_MESSAGE: &str = "Upload failed. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub enum FailureReason {
    WrongMediaType,
    TooLarge,
    TransferError,
    LocatorResolutionError,
}

impl From<RejectionReason> for FailureReason {
    fn from(reason: RejectionReason) -> Self {
        match reason {
            RejectionReason::WrongMediaType => FailureReason::WrongMediaType,
            RejectionReason::TooLarge => FailureReason::TooLarge,
        }
    }
}

impl From<&TransferFailure> for FailureReason {
    fn from(failure: &TransferFailure) -> Self {
        match failure {
            TransferFailure::Transfer(_) => FailureReason::TransferError,
            TransferFailure::LocatorResolution(_) => FailureReason::LocatorResolutionError,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub enum SessionState {
    Idle,
    Validating,
    Transferring,
    Succeeded,
    Failed(FailureReason),
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Succeeded | SessionState::Failed(_))
    }
}

/// What was fed into the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionInput {
    Submit,
    Accepted,
    Rejected,
    Progress,
    Succeeded,
    Failed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Invalid transition: {input:?} while {from:?}")]
    InvalidTransition {
        from: SessionState,
        input: SessionInput,
    },
}

/// One upload attempt. Terminal states accept no further input; a new
/// submission gets a new session.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct UploadSession {
    pub id: Uuid,
    pub file_name: Option<String>,
    pub state: SessionState,
    pub progress: Option<TransferProgress>,
    pub status_message: Option<String>,
    #[serde(skip)]
    history: Vec<SessionState>,
}

impl Default for UploadSession {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            file_name: None,
            state: SessionState::Idle,
            progress: None,
            status_message: None,
            history: vec![SessionState::Idle],
        }
    }

    /// Every state visited so far, starting with `Idle`.
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    fn enter(&mut self, state: SessionState) {
        self.state = state;
        self.history.push(state);
    }

    fn invalid(&self, input: SessionInput) -> SessionError {
        SessionError::InvalidTransition {
            from: self.state,
            input,
        }
    }

    /// `Idle --submit--> Validating`
    pub fn submit(&mut self, file_name: &str) -> Result<(), SessionError> {
        if self.state != SessionState::Idle {
            return Err(self.invalid(SessionInput::Submit));
        }
        self.file_name = Some(file_name.to_string());
        self.enter(SessionState::Validating);
        Ok(())
    }

    /// `Validating --Accepted--> Transferring` or `Validating --Rejected--> Failed`
    pub fn apply_validation(
        &mut self,
        result: ValidationResult,
        rules: &ValidationRules,
    ) -> Result<(), SessionError> {
        if self.state != SessionState::Validating {
            let input = match result {
                ValidationResult::Accepted => SessionInput::Accepted,
                ValidationResult::Rejected(_) => SessionInput::Rejected,
            };
            return Err(self.invalid(input));
        }

        match result {
            ValidationResult::Accepted => {
                self.status_message = Some(UPLOADING_MESSAGE.to_string());
                self.enter(SessionState::Transferring);
            }
            ValidationResult::Rejected(reason) => {
                self.status_message = Some(reason.message(rules));
                self.enter(SessionState::Failed(reason.into()));
            }
        }
        Ok(())
    }

    /// Feeds one transfer event into a `Transferring` session.
    pub fn apply_event(&mut self, event: &TransferEvent) -> Result<(), SessionError> {
        if self.state != SessionState::Transferring {
            let input = match event {
                TransferEvent::Progress(_) => SessionInput::Progress,
                TransferEvent::Succeeded { .. } => SessionInput::Succeeded,
                TransferEvent::Failed(_) => SessionInput::Failed,
            };
            return Err(self.invalid(input));
        }

        match event {
            TransferEvent::Progress(progress) => {
                self.progress = Some(*progress);
            }
            TransferEvent::Succeeded { .. } => {
                self.status_message = Some(SUCCESS_MESSAGE.to_string());
                self.enter(SessionState::Succeeded);
            }
            TransferEvent::Failed(failure) => {
                self.status_message = Some(FAILURE_MESSAGE.to_string());
                self.enter(SessionState::Failed(failure.into()));
            }
        }
        Ok(())
    }

    /// Drops the displayed status of a finished successful upload.
    pub fn clear_status(&mut self) {
        if self.state == SessionState::Succeeded {
            self.status_message = None;
            self.progress = None;
        }
    }

    pub fn percent(&self) -> u8 {
        self.progress.map(|p| p.percent).unwrap_or(0)
    }
}
