use serde_json::{json, Map, Value};
use storyreel_core::generation::GenerationRequest;
use storyreel_core::protocol::ProtocolVariant;

use super::{non_empty, primary_image, RequestBuilder, StatusEndpoint, VendorPayload};

/// Async job protocol with an `input` / `parameters` split.
///
/// Accepts one driving image and one audio track. Additional images,
/// video references and the fixed-camera flag are dropped.
pub struct WanBuilder;

impl RequestBuilder for WanBuilder {
    fn variant(&self) -> ProtocolVariant {
        ProtocolVariant::Wan
    }

    fn build(&self, model: &str, request: &GenerationRequest) -> VendorPayload {
        let mut input = Map::new();
        input.insert("prompt".into(), Value::from(request.prompt.as_str()));
        if let Some(negative) = non_empty(request.negative_prompt.as_ref()) {
            input.insert("negative_prompt".into(), Value::from(negative));
        }
        let image = primary_image(request);
        if let Some(image) = image {
            input.insert("img_url".into(), Value::from(image.url.as_str()));
        }
        if let Some(audio) = request.audio_refs.first() {
            input.insert("audio_url".into(), Value::from(audio.as_str()));
        }

        let mut parameters = Map::new();
        parameters.insert(
            "resolution".into(),
            Value::from(request.resolution.as_str().to_ascii_uppercase()),
        );
        parameters.insert("duration".into(), Value::from(request.duration_secs));
        parameters.insert("audio".into(), Value::from(request.generate_audio));
        // Image-to-video inherits the frame shape from the image.
        if image.is_none() {
            let (width, height) = request.resolution.dimensions(request.aspect_ratio);
            parameters.insert("size".into(), Value::from(format!("{width}*{height}")));
        }

        VendorPayload {
            path: "/api/v1/services/aigc/video-generation/video-synthesis".to_string(),
            body: json!({
                "model": model,
                "input": input,
                "parameters": parameters,
            }),
            async_header: true,
        }
    }

    fn status_endpoint(&self) -> StatusEndpoint {
        StatusEndpoint::Segment("/api/v1/tasks")
    }
}

#[cfg(test)]
mod tests {
    use storyreel_core::generation::{ImageRole, RoleImage};

    use super::*;

    #[test]
    fn text_to_video_sets_size_and_async_header() {
        let mut request = GenerationRequest::new("a fox in snow");
        request.negative_prompt = Some("  ".into());

        let payload = WanBuilder.build("wan2.5-t2v-preview", &request);

        assert!(payload.async_header);
        assert_eq!(
            payload.path,
            "/api/v1/services/aigc/video-generation/video-synthesis"
        );
        assert_eq!(
            payload.body,
            json!({
                "model": "wan2.5-t2v-preview",
                "input": { "prompt": "a fox in snow" },
                "parameters": {
                    "resolution": "720P",
                    "duration": 5,
                    "audio": false,
                    "size": "1280*720",
                },
            })
        );
    }

    #[test]
    fn image_to_video_uses_single_image_and_audio() {
        let mut request = GenerationRequest::new("p");
        request.negative_prompt = Some("watermark".into());
        request.images.push(RoleImage {
            url: "https://cdn/ref.png".into(),
            role: ImageRole::Reference,
        });
        request.images.push(RoleImage {
            url: "https://cdn/first.png".into(),
            role: ImageRole::FirstFrame,
        });
        request.video_refs.push("https://cdn/motion.mp4".into());
        request.audio_refs.push("https://cdn/voice.mp3".into());
        request.audio_refs.push("https://cdn/bgm.mp3".into());

        let body = WanBuilder.build("wan2.5-i2v-preview", &request).body;

        assert_eq!(body["input"]["img_url"], "https://cdn/first.png");
        assert_eq!(body["input"]["audio_url"], "https://cdn/voice.mp3");
        assert_eq!(body["input"]["negative_prompt"], "watermark");
        assert!(body["parameters"].get("size").is_none());
        assert!(!body.to_string().contains("motion.mp4"));
    }

    #[test]
    fn status_is_task_resource() {
        assert_eq!(WanBuilder.status_endpoint(), StatusEndpoint::Segment("/api/v1/tasks"));
    }
}
