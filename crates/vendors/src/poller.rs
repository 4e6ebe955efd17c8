//! Status polling for submitted vendor tasks.
//!
//! [`TaskPoller`] is a small state machine: [`TaskPoller::observe`] folds one
//! status query outcome into the current [`PollState`] without doing any
//! I/O, and [`TaskPoller::run`] drives it against a [`VideoVendor`] on a
//! fixed interval until a terminal state is reached or the
//! [`CancellationToken`] fires.

use std::time::Duration;

use storyreel_core::credentials::Credential;
use storyreel_core::failure::classify_message;
use tokio_util::sync::CancellationToken;

use crate::api::{VendorApiError, VideoVendor};
use crate::error::GenerationError;
use crate::response::{parse_task_status, TaskStatus};
use crate::task::VendorTask;

/// Progress reported while a task is still pending never exceeds this.
pub const MAX_PENDING_PROGRESS: u8 = 95;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay before each status query.
    pub interval: Duration,
    /// Queries made before giving up with a timeout.
    pub max_attempts: u32,
    /// Consecutive "not found" answers tolerated before the task is
    /// declared lost. Vendors can lag between accepting a task and
    /// exposing it on the status endpoint.
    pub not_found_grace: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 180,
            not_found_grace: 3,
        }
    }
}

/// Estimated progress after `attempt` of `max_attempts` queries.
///
/// Rises quickly at first and flattens towards
/// [`MAX_PENDING_PROGRESS`]; vendors rarely report real progress.
pub fn estimate_progress(attempt: u32, max_attempts: u32) -> u8 {
    if max_attempts == 0 {
        return 0;
    }
    let fraction = f64::from(attempt.min(max_attempts)) / f64::from(max_attempts);
    let estimate = f64::from(MAX_PENDING_PROGRESS) * (1.0 - (-4.0 * fraction).exp());
    estimate.floor() as u8
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    Pending { attempt: u32 },
    Succeeded { video_url: String },
    Failed(GenerationError),
    TimedOut { attempts: u32 },
    Cancelled,
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollState::Pending { .. })
    }
}

/// A successfully finished task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    pub task_id: String,
    pub video_url: String,
    pub attempts: u32,
}

enum Verdict {
    Pending,
    Succeeded(String),
    Failed(GenerationError),
}

pub struct TaskPoller {
    task: VendorTask,
    config: PollConfig,
    attempt: u32,
    not_found_streak: u32,
    state: PollState,
}

impl TaskPoller {
    pub fn new(task: VendorTask, config: PollConfig) -> Self {
        Self {
            task,
            config,
            attempt: 0,
            not_found_streak: 0,
            state: PollState::Pending { attempt: 0 },
        }
    }

    pub fn state(&self) -> &PollState {
        &self.state
    }

    pub fn task(&self) -> &VendorTask {
        &self.task
    }

    /// Fold one status query outcome into the state.
    ///
    /// Terminal states are sticky: further outcomes are ignored.
    pub fn observe(&mut self, outcome: Result<serde_json::Value, VendorApiError>) -> &PollState {
        if self.state.is_terminal() {
            return &self.state;
        }
        self.attempt += 1;

        let verdict = match outcome {
            Ok(body) => self.judge_status(parse_task_status(self.task.variant, &body)),
            Err(err) => self.judge_error(err),
        };

        self.state = match verdict {
            Verdict::Pending if self.attempt >= self.config.max_attempts => PollState::TimedOut {
                attempts: self.attempt,
            },
            Verdict::Pending => PollState::Pending {
                attempt: self.attempt,
            },
            Verdict::Succeeded(video_url) => PollState::Succeeded { video_url },
            Verdict::Failed(err) => PollState::Failed(err),
        };
        self.sync_task();
        &self.state
    }

    /// Stop polling. A no-op once terminal.
    pub fn cancel(&mut self) {
        if !self.state.is_terminal() {
            self.state = PollState::Cancelled;
            self.sync_task();
        }
    }

    /// Poll until the task reaches a terminal state or `cancel` fires.
    ///
    /// `on_progress` is called after every query with the task's current
    /// progress estimate. An in-flight query is allowed to finish, but a
    /// cancellation observed afterwards wins over its result.
    pub async fn run<V>(
        mut self,
        vendor: &V,
        credential: &Credential,
        cancel: &CancellationToken,
        on_progress: &(dyn Fn(u8) + Send + Sync),
    ) -> Result<TaskResult, GenerationError>
    where
        V: VideoVendor + ?Sized,
    {
        while !self.state.is_terminal() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.cancel();
                    break;
                }
                _ = tokio::time::sleep(self.config.interval) => {}
            }

            let outcome = vendor
                .query(self.task.variant, &self.task.task_id, credential)
                .await;
            if cancel.is_cancelled() {
                self.cancel();
                break;
            }

            self.observe(outcome);
            on_progress(self.task.progress);
            tracing::debug!(
                task_id = %self.task.task_id,
                variant = %self.task.variant,
                attempt = self.attempt,
                progress = self.task.progress,
                "Polled vendor task",
            );
        }

        match &self.state {
            PollState::Succeeded { .. } => tracing::info!(
                task_id = %self.task.task_id,
                attempts = self.attempt,
                "Vendor task succeeded",
            ),
            state => tracing::warn!(
                task_id = %self.task.task_id,
                attempts = self.attempt,
                ?state,
                "Vendor task did not succeed",
            ),
        }
        self.into_result()
    }

    pub fn into_result(self) -> Result<TaskResult, GenerationError> {
        match self.state {
            PollState::Succeeded { video_url } => Ok(TaskResult {
                task_id: self.task.task_id,
                video_url,
                attempts: self.attempt,
            }),
            PollState::Failed(err) => Err(err),
            PollState::TimedOut { attempts } => Err(GenerationError::Timeout { attempts }),
            PollState::Cancelled => Err(GenerationError::Cancelled),
            PollState::Pending { .. } => Err(GenerationError::Internal(
                "poller stopped before the task finished".to_string(),
            )),
        }
    }

    // ---- private helpers ----

    fn judge_status(&mut self, status: TaskStatus) -> Verdict {
        if status != TaskStatus::NotFound {
            self.not_found_streak = 0;
        }
        match status {
            TaskStatus::Pending { .. } => Verdict::Pending,
            TaskStatus::Succeeded {
                video_url: Some(url),
            } => Verdict::Succeeded(url),
            TaskStatus::Succeeded { video_url: None } => Verdict::Failed(GenerationError::ResultMissing),
            TaskStatus::Failed { message } => Verdict::Failed(classify_message(&message).into()),
            TaskStatus::NotFound => self.judge_not_found(),
        }
    }

    fn judge_error(&mut self, err: VendorApiError) -> Verdict {
        match err.status() {
            Some(404) => return self.judge_not_found(),
            Some(401 | 403) => {
                self.not_found_streak = 0;
                return Verdict::Failed(GenerationError::AuthInvalid);
            }
            _ => {}
        }
        self.not_found_streak = 0;

        let transient = match &err {
            VendorApiError::Request(_) => true,
            VendorApiError::Api { status, .. } => *status == 429 || *status >= 500,
            VendorApiError::MissingTaskId { .. } | VendorApiError::InvalidUrl(_) => false,
        };
        if transient {
            tracing::warn!(
                task_id = %self.task.task_id,
                attempt = self.attempt,
                error = %err,
                "Transient error while polling vendor task",
            );
            Verdict::Pending
        } else {
            Verdict::Failed(err.failure_kind().into())
        }
    }

    fn judge_not_found(&mut self) -> Verdict {
        self.not_found_streak += 1;
        if self.not_found_streak > self.config.not_found_grace {
            Verdict::Failed(GenerationError::TaskNotFound(self.task.task_id.clone()))
        } else {
            Verdict::Pending
        }
    }

    fn sync_task(&mut self) {
        match &self.state {
            PollState::Pending { attempt } => {
                let estimate = estimate_progress(*attempt, self.config.max_attempts);
                self.task.advance_progress(estimate);
            }
            PollState::Succeeded { video_url } => self.task.succeed(video_url.clone()),
            PollState::Failed(err) => self.task.fail(err.clone()),
            PollState::TimedOut { attempts } => {
                self.task.fail(GenerationError::Timeout { attempts: *attempts })
            }
            PollState::Cancelled => self.task.fail(GenerationError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use serde_json::json;
    use storyreel_core::protocol::ProtocolVariant;

    use super::*;
    use crate::builders::VendorPayload;
    use crate::task::TaskState;

    fn poller(variant: ProtocolVariant, config: PollConfig) -> TaskPoller {
        TaskPoller::new(VendorTask::new("task-1", variant), config)
    }

    fn fast_config(max_attempts: u32) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(1),
            max_attempts,
            not_found_grace: 3,
        }
    }

    fn api_error(status: u16, body: &str) -> VendorApiError {
        VendorApiError::Api {
            status,
            body: body.to_string(),
        }
    }

    /// Replays scripted query outcomes, then reports pending forever.
    struct ScriptedVendor {
        script: Mutex<VecDeque<Result<serde_json::Value, VendorApiError>>>,
        queries: AtomicU32,
        cancel_after: Option<(u32, CancellationToken)>,
    }

    impl ScriptedVendor {
        fn new(script: Vec<Result<serde_json::Value, VendorApiError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                queries: AtomicU32::new(0),
                cancel_after: None,
            }
        }
    }

    #[async_trait]
    impl VideoVendor for ScriptedVendor {
        async fn submit(
            &self,
            _variant: ProtocolVariant,
            _payload: &VendorPayload,
            _credential: &Credential,
        ) -> Result<String, VendorApiError> {
            Ok("task-1".into())
        }

        async fn query(
            &self,
            _variant: ProtocolVariant,
            _task_id: &str,
            _credential: &Credential,
        ) -> Result<serde_json::Value, VendorApiError> {
            let n = self.queries.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((after, token)) = &self.cancel_after {
                if n == *after {
                    token.cancel();
                }
            }
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(json!({"status": "running"})))
        }
    }

    fn credential() -> Credential {
        Credential::new("main", "sk-test")
    }

    // -- estimate_progress --

    #[test]
    fn progress_estimate_is_monotonic_and_capped() {
        let mut last = 0;
        for attempt in 0..=200 {
            let p = estimate_progress(attempt, 180);
            assert!(p >= last);
            assert!(p <= MAX_PENDING_PROGRESS);
            last = p;
        }
        assert_eq!(estimate_progress(0, 180), 0);
        assert_eq!(estimate_progress(5, 0), 0);
    }

    // -- observe --

    #[test]
    fn success_is_terminal_and_sticky() {
        let mut p = poller(ProtocolVariant::Unified, PollConfig::default());
        p.observe(Ok(json!({"status": "queued"})));
        assert_eq!(p.state(), &PollState::Pending { attempt: 1 });

        p.observe(Ok(json!({"status": "completed", "video_url": "https://v/1.mp4"})));
        assert_eq!(
            p.state(),
            &PollState::Succeeded {
                video_url: "https://v/1.mp4".into()
            }
        );
        assert_eq!(p.task().progress, 100);
        assert_eq!(p.task().state, TaskState::Succeeded);

        p.observe(Ok(json!({"status": "failed"})));
        assert_matches!(p.state(), PollState::Succeeded { .. });
    }

    #[test]
    fn success_without_url_is_result_missing() {
        let mut p = poller(ProtocolVariant::Volc, PollConfig::default());
        p.observe(Ok(json!({"status": "succeeded", "content": {}})));
        assert_eq!(p.state(), &PollState::Failed(GenerationError::ResultMissing));
        assert_eq!(p.task().state, TaskState::Failed);
    }

    #[test]
    fn moderation_failure_keeps_vendor_wording() {
        let mut p = poller(ProtocolVariant::Wan, PollConfig::default());
        p.observe(Ok(json!({"output": {"task_status": "FAILED", "message": "Output data may contain inappropriate content."}})));
        assert_eq!(
            p.state(),
            &PollState::Failed(GenerationError::ContentModeration(
                "Output data may contain inappropriate content.".into()
            ))
        );
    }

    #[test]
    fn not_found_is_tolerated_within_grace() {
        let mut p = poller(ProtocolVariant::Wan, PollConfig::default());
        for _ in 0..3 {
            p.observe(Ok(json!({"output": {"task_status": "UNKNOWN"}})));
            assert_matches!(p.state(), PollState::Pending { .. });
        }
        p.observe(Err(api_error(404, "")));
        assert_eq!(
            p.state(),
            &PollState::Failed(GenerationError::TaskNotFound("task-1".into()))
        );
    }

    #[test]
    fn error_body_without_status_fails_on_first_attempt() {
        let mut p = poller(ProtocolVariant::Volc, fast_config(5));
        p.observe(Ok(json!({"error": {"code": "InternalServiceError", "message": "generation crashed"}})));
        assert_eq!(
            p.state(),
            &PollState::Failed(GenerationError::VendorError("generation crashed".into()))
        );
        assert_eq!(p.task().state, TaskState::Failed);

        let mut p = poller(ProtocolVariant::Unified, fast_config(5));
        p.observe(Ok(json!({"error": "content_sensitive"})));
        assert_eq!(
            p.state(),
            &PollState::Failed(GenerationError::ContentModeration("content_sensitive".into()))
        );
        assert_eq!(
            p.into_result(),
            Err(GenerationError::ContentModeration("content_sensitive".into()))
        );
    }

    #[test]
    fn kling_unknown_task_gets_not_found_grace() {
        let body = json!({"code": 1201, "message": "task not exist", "data": null});
        let mut p = poller(ProtocolVariant::Kling, PollConfig::default());
        for attempt in 1..=3 {
            p.observe(Ok(body.clone()));
            assert_eq!(p.state(), &PollState::Pending { attempt });
        }
        p.observe(Ok(body));
        assert_eq!(
            p.state(),
            &PollState::Failed(GenerationError::TaskNotFound("task-1".into()))
        );
    }

    #[test]
    fn not_found_streak_resets_on_progress() {
        let mut p = poller(ProtocolVariant::Wan, PollConfig::default());
        for _ in 0..3 {
            p.observe(Err(api_error(404, "")));
        }
        p.observe(Ok(json!({"output": {"task_status": "RUNNING"}})));
        for _ in 0..3 {
            p.observe(Err(api_error(404, "")));
        }
        assert_matches!(p.state(), PollState::Pending { attempt: 7 });
    }

    #[test]
    fn transient_errors_keep_polling() {
        let mut p = poller(ProtocolVariant::Kling, PollConfig::default());
        p.observe(Err(api_error(502, "Bad Gateway")));
        p.observe(Err(api_error(429, "slow down")));
        assert_matches!(p.state(), PollState::Pending { attempt: 2 });
    }

    #[test]
    fn auth_error_while_polling_is_terminal() {
        let mut p = poller(ProtocolVariant::Kling, PollConfig::default());
        p.observe(Err(api_error(401, "")));
        assert_eq!(p.state(), &PollState::Failed(GenerationError::AuthInvalid));
    }

    #[test]
    fn pending_at_max_attempts_times_out() {
        let mut p = poller(ProtocolVariant::Unified, fast_config(3));
        p.observe(Ok(json!({"status": "running"})));
        p.observe(Ok(json!({"status": "running"})));
        p.observe(Ok(json!({"status": "running"})));
        assert_eq!(p.state(), &PollState::TimedOut { attempts: 3 });
        assert_eq!(p.into_result(), Err(GenerationError::Timeout { attempts: 3 }));
    }

    #[test]
    fn cancel_is_ignored_once_terminal() {
        let mut p = poller(ProtocolVariant::Unified, PollConfig::default());
        p.observe(Ok(json!({"status": "done", "url": "https://v/x.mp4"})));
        p.cancel();
        assert!(p.into_result().is_ok());
    }

    // -- run --

    #[tokio::test]
    async fn run_stops_at_first_terminal_status() {
        let vendor = ScriptedVendor::new(vec![
            Ok(json!({"status": "queued"})),
            Ok(json!({"status": "in_progress"})),
            Ok(json!({"status": "completed", "result_url": "https://v/ok.mp4"})),
            Ok(json!({"status": "failed"})),
        ]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let result = poller(ProtocolVariant::Unified, fast_config(10))
            .run(&vendor, &credential(), &CancellationToken::new(), &move |p| {
                sink.lock().unwrap().push(p)
            })
            .await
            .unwrap();

        assert_eq!(result.video_url, "https://v/ok.mp4");
        assert_eq!(result.attempts, 3);
        assert_eq!(vendor.queries.load(Ordering::SeqCst), 3);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*seen.last().unwrap(), 100);
    }

    #[tokio::test]
    async fn run_times_out_after_max_attempts() {
        let vendor = ScriptedVendor::new(vec![]);
        let result = poller(ProtocolVariant::Unified, fast_config(4))
            .run(&vendor, &credential(), &CancellationToken::new(), &|_| {})
            .await;

        assert_eq!(result, Err(GenerationError::Timeout { attempts: 4 }));
        assert_eq!(vendor.queries.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn run_returns_cancelled_before_first_query() {
        let vendor = ScriptedVendor::new(vec![]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = poller(ProtocolVariant::Volc, PollConfig::default())
            .run(&vendor, &credential(), &cancel, &|_| {})
            .await;

        assert_eq!(result, Err(GenerationError::Cancelled));
        assert_eq!(vendor.queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancellation_during_query_wins_over_success() {
        let cancel = CancellationToken::new();
        let mut vendor = ScriptedVendor::new(vec![
            Ok(json!({"status": "running"})),
            Ok(json!({"status": "succeeded", "content": {"video_url": "https://v/late.mp4"}})),
        ]);
        vendor.cancel_after = Some((2, cancel.clone()));

        let result = poller(ProtocolVariant::Volc, fast_config(10))
            .run(&vendor, &credential(), &cancel, &|_| {})
            .await;

        assert_eq!(result, Err(GenerationError::Cancelled));
        assert_eq!(vendor.queries.load(Ordering::SeqCst), 2);
    }
}
