//! Per-vendor request builders.
//!
//! Each builder translates a [`GenerationRequest`] into the JSON body and
//! endpoint path of one wire protocol. Builders are pure: the same request
//! always yields the same payload, and features a vendor cannot express
//! are dropped rather than rejected.

mod kling;
mod unified;
mod volc;
mod wan;

pub use kling::KlingBuilder;
pub use unified::UnifiedBuilder;
pub use volc::VolcBuilder;
pub use wan::WanBuilder;

use storyreel_core::generation::{GenerationRequest, ImageRole, RoleImage};
use storyreel_core::protocol::ProtocolVariant;

/// A vendor-specific submission.
#[derive(Debug, Clone, PartialEq)]
pub struct VendorPayload {
    /// Path appended to the vendor base URL.
    pub path: String,
    pub body: serde_json::Value,
    /// Send `X-DashScope-Async: enable` with the submission.
    pub async_header: bool,
}

pub trait RequestBuilder: Send + Sync {
    fn variant(&self) -> ProtocolVariant;

    fn build(&self, model: &str, request: &GenerationRequest) -> VendorPayload;

    /// Where the status of a submitted task is queried.
    fn status_endpoint(&self) -> StatusEndpoint;
}

/// How a task id is attached to the status endpoint. The id is encoded
/// when the URL is built, never spliced in as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEndpoint {
    /// The id is the final path segment under `path`.
    Segment(&'static str),
    /// The id is the `param` query parameter of `path`.
    Query {
        path: &'static str,
        param: &'static str,
    },
}

/// The builder for `variant`.
pub fn builder_for(variant: ProtocolVariant) -> &'static dyn RequestBuilder {
    match variant {
        ProtocolVariant::Unified => &UnifiedBuilder,
        ProtocolVariant::Volc => &VolcBuilder,
        ProtocolVariant::Wan => &WanBuilder,
        ProtocolVariant::Kling => &KlingBuilder,
    }
}

/// The image a single-image vendor should animate from: the first-frame
/// image if present, otherwise the first image of any role.
fn primary_image(request: &GenerationRequest) -> Option<&RoleImage> {
    request
        .image_with_role(ImageRole::FirstFrame)
        .or_else(|| request.images.first())
}

fn non_empty(text: Option<&String>) -> Option<&str> {
    text.map(|s| s.trim()).filter(|s| !s.is_empty())
}
