//! The logical, vendor-independent generation request.
//!
//! A [`GenerationRequest`] is built fresh for every submission and handed
//! to a request builder by reference; builders never modify it.

use serde::{Deserialize, Serialize};

use crate::assets::{AssetPurpose, MAX_AUDIO_REFS, MAX_IMAGE_REFS, MAX_TOTAL_REFS, MAX_VIDEO_REFS};
use crate::error::CoreError;
use crate::shot_group::ShotGroup;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const MIN_DURATION_SECS: u32 = 1;
pub const MAX_DURATION_SECS: u32 = 15;
pub const DEFAULT_DURATION_SECS: u32 = 5;

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "4:3")]
    Classic,
    #[serde(rename = "3:4")]
    ClassicPortrait,
    #[serde(rename = "21:9")]
    Ultrawide,
}

impl AspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
            AspectRatio::Square => "1:1",
            AspectRatio::Classic => "4:3",
            AspectRatio::ClassicPortrait => "3:4",
            AspectRatio::Ultrawide => "21:9",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "480p")]
    P480,
    #[default]
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::P480 => "480p",
            Resolution::P720 => "720p",
            Resolution::P1080 => "1080p",
        }
    }

    /// Length of the short edge in pixels.
    pub fn short_edge(&self) -> u32 {
        match self {
            Resolution::P480 => 480,
            Resolution::P720 => 720,
            Resolution::P1080 => 1080,
        }
    }

    /// Pixel size `(width, height)` for the given aspect ratio, rounded to
    /// even values as encoders require.
    pub fn dimensions(&self, aspect: AspectRatio) -> (u32, u32) {
        let short = self.short_edge();
        let (w, h) = match aspect {
            AspectRatio::Landscape => (16, 9),
            AspectRatio::Portrait => (9, 16),
            AspectRatio::Square => (1, 1),
            AspectRatio::Classic => (4, 3),
            AspectRatio::ClassicPortrait => (3, 4),
            AspectRatio::Ultrawide => (21, 9),
        };
        let long = |num: u32, den: u32| (short * num / den + 1) & !1;
        if w >= h {
            (long(w, h), short)
        } else {
            (short, long(h, w))
        }
    }
}

/// Role of an image within a generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageRole {
    FirstFrame,
    LastFrame,
    /// A subject / style reference with no frame position.
    Reference,
}

impl ImageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageRole::FirstFrame => "first_frame",
            ImageRole::LastFrame => "last_frame",
            ImageRole::Reference => "reference_image",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleImage {
    pub url: String,
    pub role: ImageRole,
}

// ---------------------------------------------------------------------------
// GenerationRequest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default)]
    pub aspect_ratio: AspectRatio,
    #[serde(default)]
    pub resolution: Resolution,
    pub duration_secs: u32,
    /// Ordered image references.
    #[serde(default)]
    pub images: Vec<RoleImage>,
    #[serde(default)]
    pub video_refs: Vec<String>,
    #[serde(default)]
    pub audio_refs: Vec<String>,
    /// Ask the vendor to synthesize a soundtrack.
    #[serde(default)]
    pub generate_audio: bool,
    /// Ask the vendor to keep the camera static.
    #[serde(default)]
    pub camera_fixed: bool,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: None,
            aspect_ratio: AspectRatio::default(),
            resolution: Resolution::default(),
            duration_secs: DEFAULT_DURATION_SECS,
            images: Vec::new(),
            video_refs: Vec::new(),
            audio_refs: Vec::new(),
            generate_audio: false,
            camera_fixed: false,
        }
    }

    /// Build a request from a group's hosted reference assets.
    ///
    /// The duration follows the group's displayed (clamped) total. Assets
    /// that only exist locally are skipped; hosting them is the caller's job.
    pub fn for_group(group: &ShotGroup, prompt: impl Into<String>) -> Self {
        let mut request = Self::new(prompt);
        request.duration_secs = (group.total_duration_secs.round() as u32)
            .clamp(MIN_DURATION_SECS, MAX_DURATION_SECS);

        let mut skipped = 0usize;
        for asset in &group.assets.images {
            match asset.locator.remote_url() {
                Some(url) => request.images.push(RoleImage {
                    url: url.to_string(),
                    role: match asset.purpose {
                        AssetPurpose::FirstFrame => ImageRole::FirstFrame,
                        AssetPurpose::LastFrame => ImageRole::LastFrame,
                        _ => ImageRole::Reference,
                    },
                }),
                None => skipped += 1,
            }
        }
        for asset in &group.assets.videos {
            match asset.locator.remote_url() {
                Some(url) => request.video_refs.push(url.to_string()),
                None => skipped += 1,
            }
        }
        for asset in &group.assets.audios {
            match asset.locator.remote_url() {
                Some(url) => request.audio_refs.push(url.to_string()),
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            tracing::warn!(
                group_id = %group.id,
                skipped,
                "Skipped reference assets without a hosted URL",
            );
        }
        request
    }

    /// The first image tagged with `role`.
    pub fn image_with_role(&self, role: ImageRole) -> Option<&RoleImage> {
        self.images.iter().find(|img| img.role == role)
    }

    pub fn reference_count(&self) -> usize {
        self.images.len() + self.video_refs.len() + self.audio_refs.len()
    }

    /// Check the request before anything is sent to a vendor.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.prompt.trim().is_empty() {
            return Err(CoreError::Validation("prompt must not be empty".to_string()));
        }
        if !(MIN_DURATION_SECS..=MAX_DURATION_SECS).contains(&self.duration_secs) {
            return Err(CoreError::Validation(format!(
                "duration must be between {MIN_DURATION_SECS} and {MAX_DURATION_SECS} seconds, got {}",
                self.duration_secs
            )));
        }
        for role in [ImageRole::FirstFrame, ImageRole::LastFrame] {
            let count = self.images.iter().filter(|img| img.role == role).count();
            if count > 1 {
                return Err(CoreError::Validation(format!(
                    "at most one {} image is allowed, got {count}",
                    role.as_str()
                )));
            }
        }
        let limits = [
            ("image", self.images.len(), MAX_IMAGE_REFS),
            ("video", self.video_refs.len(), MAX_VIDEO_REFS),
            ("audio", self.audio_refs.len(), MAX_AUDIO_REFS),
            ("total", self.reference_count(), MAX_TOTAL_REFS),
        ];
        for (what, count, limit) in limits {
            if count > limit {
                return Err(CoreError::Validation(format!(
                    "{count} {what} references exceed the limit of {limit}"
                )));
            }
        }
        Ok(())
    }
}
