//! Group dispatch: submission with credential rotation, polling, and
//! status bookkeeping in the [`GroupStore`].
//!
//! Each call to [`Dispatcher::dispatch`] is independent; many groups may be
//! dispatched concurrently through one dispatcher. The only state shared
//! between them is the credential cursor, which the pool advances
//! atomically.

use std::sync::Arc;

use storyreel_core::credentials::{Credential, CredentialPool};
use storyreel_core::generation::GenerationRequest;
use storyreel_core::group_store::GroupStore;
use storyreel_core::protocol::{detect_format, ModelRegistry, ProtocolVariant};
use storyreel_core::types::GroupId;
use storyreel_vendors::api::{VendorApi, VendorApiError, VideoVendor};
use storyreel_vendors::builders::{builder_for, VendorPayload};
use storyreel_vendors::error::GenerationError;
use storyreel_vendors::poller::{PollConfig, TaskPoller, TaskResult};
use storyreel_vendors::task::VendorTask;
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;

pub struct Dispatcher {
    vendor: Arc<dyn VideoVendor>,
    credentials: Arc<CredentialPool>,
    registry: ModelRegistry,
    poll: PollConfig,
}

impl Dispatcher {
    pub fn new(
        vendor: Arc<dyn VideoVendor>,
        credentials: Arc<CredentialPool>,
        registry: ModelRegistry,
        poll: PollConfig,
    ) -> Self {
        Self {
            vendor,
            credentials,
            registry,
            poll,
        }
    }

    /// Build a dispatcher talking HTTP to the configured vendor endpoints.
    pub fn from_config(config: &PipelineConfig, registry: ModelRegistry) -> Result<Self, VendorApiError> {
        let api = VendorApi::new(config.endpoints.clone(), config.request_timeout)?;
        Ok(Self::new(
            Arc::new(api),
            Arc::new(CredentialPool::new(config.credentials.clone())),
            registry,
            config.poll.clone(),
        ))
    }

    pub fn credentials(&self) -> &CredentialPool {
        &self.credentials
    }

    /// Generate a video for one group.
    ///
    /// Requests that fail validation, an empty credential pool, and groups
    /// that are already generating or calibrating are rejected without
    /// touching the group. Once the group has entered `Generating`, every
    /// outcome (including cancellation) is recorded on it before returning.
    pub async fn dispatch(
        &self,
        store: &GroupStore,
        group_id: GroupId,
        model: &str,
        request: &GenerationRequest,
        on_progress: &(dyn Fn(u8) + Send + Sync),
        cancel: &CancellationToken,
    ) -> Result<TaskResult, GenerationError> {
        request.validate()?;
        if self.credentials.is_empty() {
            return Err(GenerationError::NoCredentials);
        }
        store.begin_generation(group_id, &request.prompt)?;

        let outcome = self
            .submit_and_poll(group_id, model, request, on_progress, cancel)
            .await;

        let recorded = match &outcome {
            Ok(result) => {
                tracing::info!(%group_id, task_id = %result.task_id, "Group generation completed");
                store.complete_generation(group_id, &result.video_url)
            }
            Err(err) => {
                tracing::warn!(%group_id, error = %err, "Group generation failed");
                store.fail_generation(group_id, &err.to_string())
            }
        };
        if let Err(e) = recorded {
            tracing::error!(%group_id, error = %e, "Failed to record generation outcome");
        }

        outcome
    }

    /// Submit `payload`, rotating through the credential pool.
    ///
    /// Starts at the pool cursor and tries each credential at most once.
    /// Only auth and rate-limit rejections move on to the next credential;
    /// any other failure is returned immediately. When every credential
    /// has been rejected, the last rejection is returned.
    pub async fn submit_with_rotation(
        &self,
        group_id: GroupId,
        variant: ProtocolVariant,
        payload: &VendorPayload,
        cancel: &CancellationToken,
    ) -> Result<(String, &Credential), GenerationError> {
        let (mut slot, _) = self
            .credentials
            .snapshot()
            .ok_or(GenerationError::NoCredentials)?;
        let mut last_rejection = GenerationError::NoCredentials;

        for _ in 0..self.credentials.len() {
            if cancel.is_cancelled() {
                return Err(GenerationError::Cancelled);
            }
            let credential = self
                .credentials
                .get(slot)
                .ok_or(GenerationError::NoCredentials)?;

            match self.vendor.submit(variant, payload, credential).await {
                Ok(task_id) => {
                    tracing::info!(
                        %group_id,
                        %variant,
                        %task_id,
                        credential = %credential.label,
                        "Submitted vendor task",
                    );
                    return Ok((task_id, credential));
                }
                Err(err) => {
                    let kind = err.failure_kind();
                    if !kind.should_rotate() {
                        tracing::warn!(
                            %group_id,
                            %variant,
                            credential = %credential.label,
                            error = %err,
                            "Vendor rejected submission",
                        );
                        return Err(kind.into());
                    }

                    tracing::warn!(
                        %group_id,
                        %variant,
                        credential = %credential.label,
                        ?kind,
                        "Credential rejected; trying the next one",
                    );
                    last_rejection = kind.into();
                    self.credentials.rotate_from(slot);
                    slot = (slot + 1) % self.credentials.len();
                }
            }
        }

        Err(last_rejection)
    }

    // ---- private helpers ----

    async fn submit_and_poll(
        &self,
        group_id: GroupId,
        model: &str,
        request: &GenerationRequest,
        on_progress: &(dyn Fn(u8) + Send + Sync),
        cancel: &CancellationToken,
    ) -> Result<TaskResult, GenerationError> {
        if cancel.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }

        let variant = detect_format(model, &self.registry);
        let payload = builder_for(variant).build(model, request);
        tracing::debug!(%group_id, model, %variant, path = %payload.path, "Built vendor payload");

        let (task_id, credential) = self
            .submit_with_rotation(group_id, variant, &payload, cancel)
            .await?;

        TaskPoller::new(VendorTask::new(task_id, variant), self.poll.clone())
            .run(self.vendor.as_ref(), credential, cancel, on_progress)
            .await
    }
}
