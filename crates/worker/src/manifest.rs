//! Input manifest for a worker run.

use std::collections::BTreeMap;

use serde::Deserialize;
use storyreel_core::generation::{AspectRatio, GenerationRequest, Resolution};
use storyreel_core::grouping::GroupingConfig;
use storyreel_core::protocol::ModelRegistry;
use storyreel_core::shot::Shot;
use storyreel_core::shot_group::ShotGroup;

#[derive(Debug, Deserialize)]
pub struct Manifest {
    pub shots: Vec<Shot>,
    #[serde(default)]
    pub grouping: GroupingConfig,
    #[serde(default)]
    pub dispatch: Option<DispatchPlan>,
}

/// Which groups to generate, and how.
#[derive(Debug, Deserialize)]
pub struct DispatchPlan {
    pub model: String,
    #[serde(default)]
    pub aspect_ratio: AspectRatio,
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default)]
    pub generate_audio: bool,
    /// Capability tags per model id, when the catalog provides them.
    #[serde(default)]
    pub registry: ModelRegistry,
    /// Prompt per group index. Groups without a prompt are not generated.
    #[serde(default)]
    pub prompts: BTreeMap<usize, String>,
}

impl DispatchPlan {
    /// The request for `group`, or `None` when it has no prompt.
    ///
    /// A finished calibration's prompt takes precedence over the manifest.
    pub fn request_for(&self, group: &ShotGroup) -> Option<GenerationRequest> {
        let prompt = self.prompts.get(&group.index)?;
        let mut request = GenerationRequest::for_group(group, group.effective_prompt(prompt));
        request.aspect_ratio = self.aspect_ratio;
        request.resolution = self.resolution;
        request.negative_prompt = self.negative_prompt.clone();
        request.generate_audio = self.generate_audio;
        Some(request)
    }
}
