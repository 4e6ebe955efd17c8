use serde_json::{json, Value};
use storyreel_core::generation::{GenerationRequest, ImageRole, Resolution};
use storyreel_core::protocol::ProtocolVariant;

use super::{non_empty, primary_image, RequestBuilder, StatusEndpoint, VendorPayload};

/// Task-by-mode protocol: `text2video` without images, `image2video` with.
///
/// Only 5 and 10 second clips exist; the duration is snapped to the nearer
/// one. Resolution maps onto the `std` / `pro` quality mode. Video and
/// audio references are dropped.
pub struct KlingBuilder;

impl KlingBuilder {
    fn duration(secs: u32) -> &'static str {
        if secs <= 7 {
            "5"
        } else {
            "10"
        }
    }

    fn mode(resolution: Resolution) -> &'static str {
        match resolution {
            Resolution::P1080 => "pro",
            Resolution::P480 | Resolution::P720 => "std",
        }
    }
}

impl RequestBuilder for KlingBuilder {
    fn variant(&self) -> ProtocolVariant {
        ProtocolVariant::Kling
    }

    fn build(&self, model: &str, request: &GenerationRequest) -> VendorPayload {
        let mut body = json!({
            "model_name": model,
            "prompt": request.prompt,
            "aspect_ratio": request.aspect_ratio.as_str(),
            "duration": Self::duration(request.duration_secs),
            "mode": Self::mode(request.resolution),
        });
        if let Some(negative) = non_empty(request.negative_prompt.as_ref()) {
            body["negative_prompt"] = Value::from(negative);
        }

        let image = primary_image(request);
        if let Some(image) = image {
            body["image"] = Value::from(image.url.as_str());
        }
        if let Some(tail) = request.image_with_role(ImageRole::LastFrame) {
            if image.map(|img| img.url.as_str()) != Some(tail.url.as_str()) {
                body["image_tail"] = Value::from(tail.url.as_str());
            }
        }

        let path = if image.is_some() {
            "/v1/videos/image2video"
        } else {
            "/v1/videos/text2video"
        };

        VendorPayload {
            path: path.to_string(),
            body,
            async_header: false,
        }
    }

    fn status_endpoint(&self) -> StatusEndpoint {
        StatusEndpoint::Segment("/v1/videos/generations")
    }
}

#[cfg(test)]
mod tests {
    use storyreel_core::generation::RoleImage;

    use super::*;

    #[test]
    fn text_only_routes_to_text2video() {
        let mut request = GenerationRequest::new("city lights");
        request.duration_secs = 12;
        request.resolution = Resolution::P1080;
        request.audio_refs.push("https://cdn/a.mp3".into());

        let payload = KlingBuilder.build("kling-v2-master", &request);

        assert_eq!(payload.path, "/v1/videos/text2video");
        assert_eq!(
            payload.body,
            json!({
                "model_name": "kling-v2-master",
                "prompt": "city lights",
                "aspect_ratio": "16:9",
                "duration": "10",
                "mode": "pro",
            })
        );
    }

    #[test]
    fn frames_map_to_image_and_tail() {
        let mut request = GenerationRequest::new("door opens");
        request.negative_prompt = Some("distortion".into());
        request.images.push(RoleImage {
            url: "https://cdn/end.png".into(),
            role: ImageRole::LastFrame,
        });
        request.images.push(RoleImage {
            url: "https://cdn/start.png".into(),
            role: ImageRole::FirstFrame,
        });

        let payload = KlingBuilder.build("kling-v1-6", &request);

        assert_eq!(payload.path, "/v1/videos/image2video");
        assert_eq!(payload.body["image"], "https://cdn/start.png");
        assert_eq!(payload.body["image_tail"], "https://cdn/end.png");
        assert_eq!(payload.body["negative_prompt"], "distortion");
        assert_eq!(payload.body["duration"], "5");
        assert_eq!(payload.body["mode"], "std");
    }

    #[test]
    fn lone_last_frame_is_not_duplicated_as_tail() {
        let mut request = GenerationRequest::new("p");
        request.images.push(RoleImage {
            url: "https://cdn/end.png".into(),
            role: ImageRole::LastFrame,
        });

        let body = KlingBuilder.build("kling", &request).body;
        assert_eq!(body["image"], "https://cdn/end.png");
        assert!(body.get("image_tail").is_none());
    }
}
