//! Terminal outcomes of a failed generation.

use serde::Serialize;
use storyreel_core::error::CoreError;
use storyreel_core::failure::FailureKind;

/// Why a generation did not produce a video.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("Vendor rejected the credential")]
    AuthInvalid,

    #[error("Vendor rate limit reached")]
    RateLimited,

    /// The vendor's own wording, unmodified.
    #[error("Content moderation: {0}")]
    ContentModeration(String),

    #[error("Vendor reported success without a result URL")]
    ResultMissing,

    #[error("Vendor task {0} not found")]
    TaskNotFound(String),

    #[error("Task did not finish after {attempts} poll attempts")]
    Timeout { attempts: u32 },

    #[error("Generation cancelled")]
    Cancelled,

    #[error("Vendor error: {0}")]
    VendorError(String),

    #[error("No vendor credentials configured")]
    NoCredentials,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// What the user can do about a failed generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UserAction {
    RevisePrompt,
    CheckCredentials,
    FixRequest,
    Retry,
}

impl GenerationError {
    pub fn user_action(&self) -> UserAction {
        match self {
            GenerationError::ContentModeration(_) => UserAction::RevisePrompt,
            GenerationError::AuthInvalid | GenerationError::NoCredentials => {
                UserAction::CheckCredentials
            }
            GenerationError::InvalidRequest(_) => UserAction::FixRequest,
            GenerationError::RateLimited
            | GenerationError::ResultMissing
            | GenerationError::TaskNotFound(_)
            | GenerationError::Timeout { .. }
            | GenerationError::Cancelled
            | GenerationError::VendorError(_)
            | GenerationError::Conflict(_)
            | GenerationError::Internal(_) => UserAction::Retry,
        }
    }
}

impl From<FailureKind> for GenerationError {
    fn from(kind: FailureKind) -> Self {
        match kind {
            FailureKind::AuthInvalid => GenerationError::AuthInvalid,
            FailureKind::RateLimited => GenerationError::RateLimited,
            FailureKind::ContentModeration { message } => GenerationError::ContentModeration(message),
            FailureKind::VendorError { message } => GenerationError::VendorError(message),
        }
    }
}

impl From<CoreError> for GenerationError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound { .. } | CoreError::Validation(_) => {
                GenerationError::InvalidRequest(err.to_string())
            }
            CoreError::Conflict(msg) => GenerationError::Conflict(msg),
            CoreError::Internal(msg) => GenerationError::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moderation_asks_for_prompt_revision() {
        let err = GenerationError::from(FailureKind::ContentModeration {
            message: "output may contain sensitive information".into(),
        });
        assert_eq!(err.user_action(), UserAction::RevisePrompt);
        assert_eq!(
            err.to_string(),
            "Content moderation: output may contain sensitive information"
        );
    }

    #[test]
    fn credential_failures_point_at_credentials() {
        assert_eq!(GenerationError::AuthInvalid.user_action(), UserAction::CheckCredentials);
        assert_eq!(GenerationError::NoCredentials.user_action(), UserAction::CheckCredentials);
    }

    #[test]
    fn core_errors_map_by_kind() {
        let err = GenerationError::from(CoreError::Conflict("already generating".into()));
        assert_eq!(err, GenerationError::Conflict("already generating".into()));

        let err = GenerationError::from(CoreError::Validation("prompt must not be empty".into()));
        assert_eq!(err.user_action(), UserAction::FixRequest);
    }
}
