//! Model id → vendor wire-protocol routing.
//!
//! Capability tags from the model registry are parsed into a closed
//! [`CapabilityTag`] enum, so the tag → variant table is an exhaustive
//! match rather than a string lookup. Models that resolve to nothing fall
//! back to [`ProtocolVariant::Unified`]: an unknown model still gets a
//! generation attempt through the most general protocol.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ProtocolVariant
// ---------------------------------------------------------------------------

/// Supported vendor wire formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolVariant {
    /// OpenAI-style relay: `/v1/video/create` + `/v1/video/query`.
    #[default]
    Unified,
    /// Content-block task API (`content[]` with text directives).
    Volc,
    /// Async job API (`input` / `parameters`, `X-DashScope-Async`).
    Wan,
    /// Task-by-mode API (`text2video` / `image2video`).
    Kling,
}

impl ProtocolVariant {
    pub const ALL: [ProtocolVariant; 4] = [
        ProtocolVariant::Unified,
        ProtocolVariant::Volc,
        ProtocolVariant::Wan,
        ProtocolVariant::Kling,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolVariant::Unified => "unified",
            ProtocolVariant::Volc => "volc",
            ProtocolVariant::Wan => "wan",
            ProtocolVariant::Kling => "kling",
        }
    }
}

impl fmt::Display for ProtocolVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// CapabilityTag
// ---------------------------------------------------------------------------

/// Endpoint capability advertised for a model by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CapabilityTag {
    OpenAiVideo,
    VolcengineVideo,
    DashscopeVideo,
    KlingVideo,
    /// A tag this build does not know about.
    Unknown(String),
}

impl CapabilityTag {
    /// Parse a registry tag. Matching is case-insensitive and treats `-`
    /// and `_` alike.
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "openai_video" | "unified" | "unified_video" | "video_create" => {
                CapabilityTag::OpenAiVideo
            }
            "volc" | "volcengine" | "volcengine_video" | "doubao_video" | "seedance" => {
                CapabilityTag::VolcengineVideo
            }
            "wan" | "dashscope" | "dashscope_video" | "aliyun_video" | "wanx" => {
                CapabilityTag::DashscopeVideo
            }
            "kling" | "kling_video" | "klingai" => CapabilityTag::KlingVideo,
            _ => CapabilityTag::Unknown(raw.to_string()),
        }
    }

    /// The wire protocol this tag implies, if any.
    pub fn variant(&self) -> Option<ProtocolVariant> {
        match self {
            CapabilityTag::OpenAiVideo => Some(ProtocolVariant::Unified),
            CapabilityTag::VolcengineVideo => Some(ProtocolVariant::Volc),
            CapabilityTag::DashscopeVideo => Some(ProtocolVariant::Wan),
            CapabilityTag::KlingVideo => Some(ProtocolVariant::Kling),
            CapabilityTag::Unknown(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// ModelRegistry
// ---------------------------------------------------------------------------

/// Capability metadata supplied by the caller's model catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelRegistry {
    endpoints: HashMap<String, Vec<String>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the capability tags advertised for `model_id`, in order.
    pub fn insert<I, S>(&mut self, model_id: impl Into<String>, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.endpoints
            .insert(model_id.into(), tags.into_iter().map(Into::into).collect());
    }

    pub fn tags(&self, model_id: &str) -> Option<&[String]> {
        self.endpoints.get(model_id).map(Vec::as_slice)
    }
}

// ---------------------------------------------------------------------------
// detect_format
// ---------------------------------------------------------------------------

/// Model-name fragments checked when the registry has nothing usable.
/// Earlier entries win.
const NAME_FRAGMENTS: &[(&str, ProtocolVariant)] = &[
    ("seedance", ProtocolVariant::Volc),
    ("doubao", ProtocolVariant::Volc),
    ("volc", ProtocolVariant::Volc),
    ("kling", ProtocolVariant::Kling),
    ("wanx", ProtocolVariant::Wan),
    ("wan2", ProtocolVariant::Wan),
    ("wan-", ProtocolVariant::Wan),
    ("dashscope", ProtocolVariant::Wan),
];

/// Pick the wire protocol for `model_id`.
///
/// 1. The first registry tag that maps to a variant.
/// 2. A known vendor fragment in the lower-cased model id.
/// 3. [`ProtocolVariant::Unified`].
pub fn detect_format(model_id: &str, registry: &ModelRegistry) -> ProtocolVariant {
    if let Some(variant) = registry
        .tags(model_id)
        .into_iter()
        .flatten()
        .find_map(|tag| CapabilityTag::parse(tag).variant())
    {
        return variant;
    }

    let lowered = model_id.to_ascii_lowercase();
    if let Some((_, variant)) = NAME_FRAGMENTS
        .iter()
        .find(|(fragment, _)| lowered.contains(*fragment))
    {
        return *variant;
    }

    tracing::debug!(model_id, "No protocol match for model; using unified");
    ProtocolVariant::Unified
}
