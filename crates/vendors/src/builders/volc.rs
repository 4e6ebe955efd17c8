use serde_json::{json, Value};
use storyreel_core::generation::GenerationRequest;
use storyreel_core::protocol::ProtocolVariant;

use super::{RequestBuilder, StatusEndpoint, VendorPayload};

/// Content-block task protocol.
///
/// Generation parameters travel as `--flag value` directives appended to
/// the text block. Images keep their roles; negative prompts are dropped.
pub struct VolcBuilder;

impl VolcBuilder {
    fn directives(request: &GenerationRequest) -> String {
        format!(
            "--rs {} --rt {} --dur {} --cf {}",
            request.resolution.as_str(),
            request.aspect_ratio.as_str(),
            request.duration_secs,
            request.camera_fixed,
        )
    }
}

impl RequestBuilder for VolcBuilder {
    fn variant(&self) -> ProtocolVariant {
        ProtocolVariant::Volc
    }

    fn build(&self, model: &str, request: &GenerationRequest) -> VendorPayload {
        let mut content: Vec<Value> = Vec::with_capacity(1 + request.reference_count());
        content.push(json!({
            "type": "text",
            "text": format!("{} {}", request.prompt.trim(), Self::directives(request)),
        }));
        for image in &request.images {
            content.push(json!({
                "type": "image_url",
                "image_url": { "url": image.url },
                "role": image.role.as_str(),
            }));
        }
        for url in &request.video_refs {
            content.push(json!({
                "type": "video_url",
                "video_url": { "url": url },
                "role": "reference_video",
            }));
        }
        for url in &request.audio_refs {
            content.push(json!({
                "type": "audio_url",
                "audio_url": { "url": url },
                "role": "reference_audio",
            }));
        }

        VendorPayload {
            path: "/api/v3/contents/generations/tasks".to_string(),
            body: json!({
                "model": model,
                "content": content,
                "generate_audio": request.generate_audio,
            }),
            async_header: false,
        }
    }

    fn status_endpoint(&self) -> StatusEndpoint {
        StatusEndpoint::Segment("/api/v3/contents/generations/tasks")
    }
}

#[cfg(test)]
mod tests {
    use storyreel_core::generation::{ImageRole, Resolution, RoleImage};

    use super::*;

    #[test]
    fn text_block_carries_directives() {
        let mut request = GenerationRequest::new("rain on a tin roof ");
        request.resolution = Resolution::P1080;
        request.duration_secs = 8;
        request.camera_fixed = true;

        let payload = VolcBuilder.build("doubao-seedance-1-0-pro", &request);

        assert_eq!(payload.path, "/api/v3/contents/generations/tasks");
        assert_eq!(
            payload.body["content"][0],
            json!({
                "type": "text",
                "text": "rain on a tin roof --rs 1080p --rt 16:9 --dur 8 --cf true",
            })
        );
        assert_eq!(payload.body["model"], "doubao-seedance-1-0-pro");
    }

    #[test]
    fn references_become_role_tagged_blocks() {
        let mut request = GenerationRequest::new("p");
        request.negative_prompt = Some("text overlays".into());
        request.generate_audio = true;
        request.images.push(RoleImage {
            url: "https://cdn/f.png".into(),
            role: ImageRole::FirstFrame,
        });
        request.images.push(RoleImage {
            url: "https://cdn/r.png".into(),
            role: ImageRole::Reference,
        });
        request.video_refs.push("https://cdn/cam.mp4".into());
        request.audio_refs.push("https://cdn/bgm.mp3".into());

        let body = VolcBuilder.build("seedance", &request).body;
        let content = body["content"].as_array().unwrap();

        assert_eq!(content.len(), 5);
        assert_eq!(content[1]["role"], "first_frame");
        assert_eq!(content[1]["image_url"]["url"], "https://cdn/f.png");
        assert_eq!(content[2]["role"], "reference_image");
        assert_eq!(content[3]["type"], "video_url");
        assert_eq!(content[3]["role"], "reference_video");
        assert_eq!(content[4]["audio_url"]["url"], "https://cdn/bgm.mp3");
        assert_eq!(body["generate_audio"], true);
        assert!(!body.to_string().contains("text overlays"));
    }

    #[test]
    fn status_is_task_resource() {
        assert_eq!(
            VolcBuilder.status_endpoint(),
            StatusEndpoint::Segment("/api/v3/contents/generations/tasks")
        );
    }
}
