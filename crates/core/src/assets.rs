//! Auxiliary reference assets attached to a shot group.
//!
//! Vendor quotas are enforced here, at insertion time, so an oversized
//! reference set is rejected before anything is submitted.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Quotas
// ---------------------------------------------------------------------------

/// Maximum number of image references per group.
pub const MAX_IMAGE_REFS: usize = 9;

/// Maximum number of video references per group.
pub const MAX_VIDEO_REFS: usize = 3;

/// Maximum number of audio references per group.
pub const MAX_AUDIO_REFS: usize = 3;

/// Maximum number of references of any kind per group.
pub const MAX_TOTAL_REFS: usize = 12;

/// Longest video or audio clip accepted as a reference, in seconds.
pub const MAX_CLIP_DURATION_SECS: f64 = 15.0;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Image,
    Video,
    Audio,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Image => "image",
            AssetKind::Video => "video",
            AssetKind::Audio => "audio",
        }
    }

    /// Per-kind reference quota.
    pub fn quota(&self) -> usize {
        match self {
            AssetKind::Image => MAX_IMAGE_REFS,
            AssetKind::Video => MAX_VIDEO_REFS,
            AssetKind::Audio => MAX_AUDIO_REFS,
        }
    }

    /// Video and audio references are bounded in length.
    pub fn is_time_bounded(&self) -> bool {
        matches!(self, AssetKind::Video | AssetKind::Audio)
    }
}

/// What a reference is meant to steer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssetPurpose {
    IdentityAnchor,
    SceneReference,
    FirstFrame,
    LastFrame,
    CameraReplicate,
    MotionReference,
    Bgm,
    VoiceReference,
    Other,
}

/// Where the referenced bytes live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AssetLocator {
    /// A file on the local machine; must be hosted before a vendor can use it.
    Local(PathBuf),
    /// A URL a vendor can fetch directly.
    Http(String),
}

impl AssetLocator {
    /// The URL to hand to a vendor, if the asset is already hosted.
    pub fn remote_url(&self) -> Option<&str> {
        match self {
            AssetLocator::Http(url) => Some(url),
            AssetLocator::Local(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRef {
    pub id: String,
    pub kind: AssetKind,
    pub purpose: AssetPurpose,
    pub locator: AssetLocator,
    #[serde(default)]
    pub size_bytes: Option<u64>,
    /// Measured length for video and audio references.
    #[serde(default)]
    pub duration_secs: Option<f64>,
}

// ---------------------------------------------------------------------------
// GroupAssets
// ---------------------------------------------------------------------------

/// The reference assets attached to one group, partitioned by kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupAssets {
    #[serde(default)]
    pub images: Vec<AssetRef>,
    #[serde(default)]
    pub videos: Vec<AssetRef>,
    #[serde(default)]
    pub audios: Vec<AssetRef>,
}

impl GroupAssets {
    pub fn total(&self) -> usize {
        self.images.len() + self.videos.len() + self.audios.len()
    }

    pub fn of_kind(&self, kind: AssetKind) -> &[AssetRef] {
        match kind {
            AssetKind::Image => &self.images,
            AssetKind::Video => &self.videos,
            AssetKind::Audio => &self.audios,
        }
    }

    fn of_kind_mut(&mut self, kind: AssetKind) -> &mut Vec<AssetRef> {
        match kind {
            AssetKind::Image => &mut self.images,
            AssetKind::Video => &mut self.videos,
            AssetKind::Audio => &mut self.audios,
        }
    }

    /// Attach a reference, rejecting it if any quota would be exceeded.
    ///
    /// On error the set is left unchanged.
    pub fn add(&mut self, asset: AssetRef) -> Result<(), CoreError> {
        validate_clip_duration(&asset)?;

        let kind = asset.kind;
        if self.of_kind(kind).len() >= kind.quota() {
            return Err(CoreError::Validation(format!(
                "at most {} {} references are allowed per group",
                kind.quota(),
                kind.as_str()
            )));
        }
        if self.total() >= MAX_TOTAL_REFS {
            return Err(CoreError::Validation(format!(
                "at most {MAX_TOTAL_REFS} references are allowed per group"
            )));
        }
        if self.iter().any(|a| a.id == asset.id) {
            return Err(CoreError::Conflict(format!(
                "asset '{}' is already attached",
                asset.id
            )));
        }

        self.of_kind_mut(kind).push(asset);
        Ok(())
    }

    /// Detach a reference by id. Returns the removed asset, if present.
    pub fn remove(&mut self, asset_id: &str) -> Option<AssetRef> {
        for kind in [AssetKind::Image, AssetKind::Video, AssetKind::Audio] {
            let list = self.of_kind_mut(kind);
            if let Some(pos) = list.iter().position(|a| a.id == asset_id) {
                return Some(list.remove(pos));
            }
        }
        None
    }

    pub fn iter(&self) -> impl Iterator<Item = &AssetRef> {
        self.images
            .iter()
            .chain(self.videos.iter())
            .chain(self.audios.iter())
    }

    /// Re-check every quota. Used on sets that were deserialized rather
    /// than built through [`add`](Self::add).
    pub fn validate(&self) -> Result<(), CoreError> {
        for kind in [AssetKind::Image, AssetKind::Video, AssetKind::Audio] {
            let count = self.of_kind(kind).len();
            if count > kind.quota() {
                return Err(CoreError::Validation(format!(
                    "{count} {} references exceed the limit of {}",
                    kind.as_str(),
                    kind.quota()
                )));
            }
        }
        if self.total() > MAX_TOTAL_REFS {
            return Err(CoreError::Validation(format!(
                "{} references exceed the limit of {MAX_TOTAL_REFS}",
                self.total()
            )));
        }
        self.iter().try_for_each(validate_clip_duration)
    }
}

/// Video and audio references must carry a measured duration within
/// [`MAX_CLIP_DURATION_SECS`].
pub fn validate_clip_duration(asset: &AssetRef) -> Result<(), CoreError> {
    if !asset.kind.is_time_bounded() {
        return Ok(());
    }
    match asset.duration_secs {
        None => Err(CoreError::Validation(format!(
            "{} reference '{}' has no measured duration",
            asset.kind.as_str(),
            asset.id
        ))),
        Some(d) if !d.is_finite() || d <= 0.0 => Err(CoreError::Validation(format!(
            "{} reference '{}' has an invalid duration {d}",
            asset.kind.as_str(),
            asset.id
        ))),
        Some(d) if d > MAX_CLIP_DURATION_SECS => Err(CoreError::Validation(format!(
            "{} reference '{}' is {d:.1}s, longer than {MAX_CLIP_DURATION_SECS}s",
            asset.kind.as_str(),
            asset.id
        ))),
        Some(_) => Ok(()),
    }
}
