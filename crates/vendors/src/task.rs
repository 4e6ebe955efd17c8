//! Vendor-side task records.
//!
//! A [`VendorTask`] is created when a submission returns a task id and is
//! updated by the poller after every status query. Once it leaves
//! [`TaskState::Pending`] it is not updated again.

use chrono::Utc;
use serde::Serialize;
use storyreel_core::protocol::ProtocolVariant;
use storyreel_core::types::Timestamp;

use crate::error::GenerationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Submitted and not yet finished.
    Pending,
    /// Finished with a video URL.
    Succeeded,
    /// Failed, timed out or cancelled. The cause is in [`VendorTask::error`].
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskState::Pending)
    }
}

/// A submitted vendor job, as tracked by the poller.
#[derive(Debug, Clone)]
pub struct VendorTask {
    /// Id assigned by the vendor on submission.
    pub task_id: String,
    /// Wire protocol used for submission and status queries.
    pub variant: ProtocolVariant,
    pub submitted_at: Timestamp,
    pub state: TaskState,
    /// Estimated completion, 0-100. Never decreases.
    pub progress: u8,
    /// Set on success.
    pub video_url: Option<String>,
    /// Set on failure.
    pub error: Option<GenerationError>,
}

impl VendorTask {
    pub fn new(task_id: impl Into<String>, variant: ProtocolVariant) -> Self {
        Self {
            task_id: task_id.into(),
            variant,
            submitted_at: Utc::now(),
            state: TaskState::Pending,
            progress: 0,
            video_url: None,
            error: None,
        }
    }

    pub(crate) fn advance_progress(&mut self, estimate: u8) {
        self.progress = self.progress.max(estimate.min(100));
    }

    pub(crate) fn succeed(&mut self, video_url: String) {
        self.state = TaskState::Succeeded;
        self.progress = 100;
        self.video_url = Some(video_url);
    }

    pub(crate) fn fail(&mut self, error: GenerationError) {
        self.state = TaskState::Failed;
        self.error = Some(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_never_decreases() {
        let mut task = VendorTask::new("t1", ProtocolVariant::Wan);
        task.advance_progress(40);
        task.advance_progress(25);
        assert_eq!(task.progress, 40);
        task.advance_progress(250);
        assert_eq!(task.progress, 100);
    }

    #[test]
    fn success_completes_progress() {
        let mut task = VendorTask::new("t1", ProtocolVariant::Volc);
        task.advance_progress(60);
        task.succeed("https://v/1.mp4".into());
        assert_eq!(task.state, TaskState::Succeeded);
        assert!(task.state.is_terminal());
        assert_eq!(task.progress, 100);
        assert_eq!(task.video_url.as_deref(), Some("https://v/1.mp4"));
        assert_eq!(task.error, None);
    }

    #[test]
    fn failure_keeps_cause_and_progress() {
        let mut task = VendorTask::new("t1", ProtocolVariant::Kling);
        task.advance_progress(30);
        task.fail(GenerationError::Cancelled);
        assert_eq!(task.state, TaskState::Failed);
        assert_eq!(task.progress, 30);
        assert_eq!(task.error, Some(GenerationError::Cancelled));
        assert_eq!(task.video_url, None);
    }
}
