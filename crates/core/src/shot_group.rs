//! Shot groups: the unit submitted to a vendor as one generation job.

use serde::{Deserialize, Serialize};

use crate::assets::GroupAssets;
use crate::types::{GroupId, ShotId};

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

/// Lifecycle of a group's video generation.
///
/// `Idle -> Generating -> Completed | Failed`. Terminal states may start a
/// new generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    #[default]
    Idle,
    Generating,
    Completed,
    Failed,
}

impl GenerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationStatus::Idle => "idle",
            GenerationStatus::Generating => "generating",
            GenerationStatus::Completed => "completed",
            GenerationStatus::Failed => "failed",
        }
    }

    /// States from which a new generation may begin.
    pub fn can_start(&self) -> bool {
        !matches!(self, GenerationStatus::Generating)
    }
}

/// Lifecycle of a group's prompt calibration.
///
/// `Idle -> Calibrating -> Done | Failed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationStatus {
    #[default]
    Idle,
    Calibrating,
    Done,
    Failed,
}

impl CalibrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalibrationStatus::Idle => "idle",
            CalibrationStatus::Calibrating => "calibrating",
            CalibrationStatus::Done => "done",
            CalibrationStatus::Failed => "failed",
        }
    }
}

// ---------------------------------------------------------------------------
// Calibration
// ---------------------------------------------------------------------------

/// Output of the prompt calibrator for a group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    #[serde(default)]
    pub narrative_arc: String,
    /// One directive per boundary between consecutive shots.
    #[serde(default)]
    pub transitions: Vec<String>,
    #[serde(default)]
    pub audio_design: String,
    #[serde(default)]
    pub calibrated_prompt: String,
    #[serde(default)]
    pub status: CalibrationStatus,
}

// ---------------------------------------------------------------------------
// ShotGroup
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShotGroup {
    pub id: GroupId,
    /// 0-based position of the group in the grouping result.
    pub index: usize,
    pub name: String,
    pub shot_ids: Vec<ShotId>,
    /// Display duration, clamped to the vendor range.
    pub total_duration_secs: f64,
    /// Literal sum of the shots' effective durations.
    pub raw_duration_secs: f64,
    #[serde(default)]
    pub assets: GroupAssets,
    #[serde(default)]
    pub status: GenerationStatus,
    #[serde(default)]
    pub last_prompt: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    /// Human-readable reason for the last failed generation.
    #[serde(default)]
    pub failure: Option<String>,
    #[serde(default)]
    pub calibration: Option<Calibration>,
}

impl ShotGroup {
    pub fn new(index: usize, shot_ids: Vec<ShotId>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            index,
            name: String::new(),
            shot_ids,
            total_duration_secs: 0.0,
            raw_duration_secs: 0.0,
            assets: GroupAssets::default(),
            status: GenerationStatus::Idle,
            last_prompt: None,
            video_url: None,
            failure: None,
            calibration: None,
        }
    }

    pub fn shot_count(&self) -> usize {
        self.shot_ids.len()
    }

    /// True when the displayed duration differs from the literal sum because
    /// of the display clamp.
    pub fn duration_is_clamped(&self) -> bool {
        (self.total_duration_secs - self.raw_duration_secs).abs() > f64::EPSILON
    }

    pub fn calibration_status(&self) -> CalibrationStatus {
        self.calibration
            .as_ref()
            .map(|c| c.status)
            .unwrap_or_default()
    }

    /// The calibrated prompt when calibration finished, otherwise `fallback`.
    pub fn effective_prompt<'a>(&'a self, fallback: &'a str) -> &'a str {
        match &self.calibration {
            Some(c) if c.status == CalibrationStatus::Done && !c.calibrated_prompt.is_empty() => {
                &c.calibrated_prompt
            }
            _ => fallback,
        }
    }
}
