use serde_json::json;
use storyreel_core::generation::{GenerationRequest, ImageRole};
use storyreel_core::protocol::ProtocolVariant;

use super::{RequestBuilder, StatusEndpoint, VendorPayload};

/// OpenAI-style relay protocol.
///
/// Roles collapse into a flat `images` list ordered first frame, references,
/// last frame. Negative prompts and video/audio references are not
/// expressible and are dropped.
pub struct UnifiedBuilder;

impl RequestBuilder for UnifiedBuilder {
    fn variant(&self) -> ProtocolVariant {
        ProtocolVariant::Unified
    }

    fn build(&self, model: &str, request: &GenerationRequest) -> VendorPayload {
        let rank = |role: ImageRole| match role {
            ImageRole::FirstFrame => 0,
            ImageRole::Reference => 1,
            ImageRole::LastFrame => 2,
        };
        let mut images: Vec<_> = request.images.iter().collect();
        images.sort_by_key(|img| rank(img.role));
        let images: Vec<&str> = images.iter().map(|img| img.url.as_str()).collect();

        let (width, height) = request.resolution.dimensions(request.aspect_ratio);

        VendorPayload {
            path: "/v1/video/create".to_string(),
            body: json!({
                "model": model,
                "prompt": request.prompt,
                "aspect_ratio": request.aspect_ratio.as_str(),
                "size": format!("{width}x{height}"),
                "duration": request.duration_secs,
                "images": images,
            }),
            async_header: false,
        }
    }

    fn status_endpoint(&self) -> StatusEndpoint {
        StatusEndpoint::Query {
            path: "/v1/video/query",
            param: "id",
        }
    }
}
