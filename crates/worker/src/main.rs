mod manifest;

use anyhow::Context;
use serde::Serialize;
use storyreel_core::group_store::GroupStore;
use storyreel_core::shot_group::GenerationStatus;
use storyreel_core::types::GroupId;
use storyreel_pipeline::{group_shots, Dispatcher, PipelineConfig};
use storyreel_vendors::error::UserAction;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::manifest::{DispatchPlan, Manifest};

/// Per-group line of the dispatch summary.
#[derive(Debug, Serialize)]
struct GroupOutcome {
    group_id: GroupId,
    name: String,
    status: GenerationStatus,
    video_url: Option<String>,
    error: Option<String>,
    action: Option<UserAction>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "storyreel_worker=debug,storyreel_pipeline=debug,storyreel_vendors=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let path = std::env::args()
        .nth(1)
        .context("usage: storyreel-worker <manifest.json>")?;
    let raw = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("failed to read manifest {path}"))?;
    let manifest: Manifest =
        serde_json::from_str(&raw).with_context(|| format!("failed to parse manifest {path}"))?;
    manifest.grouping.validate()?;

    let groups = group_shots(&manifest.shots, &manifest.grouping);
    for group in groups.iter().filter(|g| g.duration_is_clamped()) {
        tracing::warn!(
            group_id = %group.id,
            name = %group.name,
            raw_secs = group.raw_duration_secs,
            displayed_secs = group.total_duration_secs,
            "Group duration clamped for display",
        );
    }
    println!("{}", serde_json::to_string_pretty(&groups)?);

    let Some(plan) = manifest.dispatch else {
        return Ok(());
    };

    let config = PipelineConfig::from_env()?;
    if config.credentials.is_empty() {
        tracing::warn!("VENDOR_API_KEYS is not set; skipping dispatch");
        return Ok(());
    }
    let dispatcher = Dispatcher::from_config(&config, plan.registry.clone())?;
    let store = GroupStore::new(groups);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received; cancelling in-flight generations");
                cancel.cancel();
            }
        }
    });

    let outcomes = dispatch_all(&dispatcher, &store, &plan, &cancel).await;
    println!("{}", serde_json::to_string_pretty(&outcomes)?);
    Ok(())
}

/// Dispatch every prompted group concurrently and summarize the results.
async fn dispatch_all(
    dispatcher: &Dispatcher,
    store: &GroupStore,
    plan: &DispatchPlan,
    cancel: &CancellationToken,
) -> Vec<GroupOutcome> {
    let jobs: Vec<_> = store
        .snapshot()
        .into_iter()
        .filter_map(|group| plan.request_for(&group).map(|request| (group, request)))
        .collect();
    tracing::info!(groups = jobs.len(), model = %plan.model, "Dispatching groups");

    let runs = jobs.iter().map(|(group, request)| async move {
        let group_id = group.id;
        let on_progress = move |progress: u8| {
            tracing::debug!(%group_id, progress, "Generation progress");
        };
        let result = dispatcher
            .dispatch(store, group_id, &plan.model, request, &on_progress, cancel)
            .await;

        let status = store
            .get(group_id)
            .map(|g| g.status)
            .unwrap_or(GenerationStatus::Failed);
        match result {
            Ok(done) => GroupOutcome {
                group_id,
                name: group.name.clone(),
                status,
                video_url: Some(done.video_url),
                error: None,
                action: None,
            },
            Err(err) => GroupOutcome {
                group_id,
                name: group.name.clone(),
                status,
                video_url: None,
                error: Some(err.to_string()),
                action: Some(err.user_action()),
            },
        }
    });

    futures::future::join_all(runs).await
}
