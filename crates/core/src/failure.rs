//! Classification of vendor failures.
//!
//! Every submission or poll error is classified before anything decides to
//! retry: credential problems rotate to the next key, moderation verdicts
//! are terminal and surfaced verbatim, everything else is a vendor error.

use serde::Serialize;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Case-insensitive fragments that mark a refusal as content moderation.
pub const MODERATION_KEYWORDS: &[&str] = &[
    "moderation",
    "policy",
    "sensitive",
    "blocked",
    "prohibited",
    "refused",
    "violat",
    "inappropriate",
    "审核",
    "违规",
    "敏感",
    "违禁",
    "拒绝",
];

/// Longest raw body quoted back in an error message.
pub const MAX_ERROR_MESSAGE_LEN: usize = 500;

// ---------------------------------------------------------------------------
// FailureKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    AuthInvalid,
    RateLimited,
    ContentModeration { message: String },
    VendorError { message: String },
}

impl FailureKind {
    /// Whether the submission should be retried with the next credential.
    pub fn should_rotate(&self) -> bool {
        matches!(self, FailureKind::AuthInvalid | FailureKind::RateLimited)
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Classify an HTTP failure from its status code and raw response body.
pub fn classify(status: u16, body: &str) -> FailureKind {
    match status {
        401 | 403 => FailureKind::AuthInvalid,
        429 => FailureKind::RateLimited,
        _ => {
            let message = extract_error_message(body)
                .unwrap_or_else(|| format!("vendor error {status}"));
            if is_moderation(body) || is_moderation(&message) {
                FailureKind::ContentModeration { message }
            } else {
                FailureKind::VendorError { message }
            }
        }
    }
}

/// Classify a failure the vendor reported inside an otherwise successful
/// response (e.g. a task that finished in a `failed` state).
pub fn classify_message(message: &str) -> FailureKind {
    if is_moderation(message) {
        FailureKind::ContentModeration {
            message: message.to_string(),
        }
    } else {
        FailureKind::VendorError {
            message: message.to_string(),
        }
    }
}

/// Whether `text` contains any moderation keyword.
pub fn is_moderation(text: &str) -> bool {
    let lowered = text.to_lowercase();
    MODERATION_KEYWORDS.iter().any(|kw| lowered.contains(kw))
}

/// Pull a human-readable message out of a vendor error body.
///
/// Known JSON shapes are tried in order; otherwise the trimmed raw body is
/// used (truncated to [`MAX_ERROR_MESSAGE_LEN`] characters). Returns `None`
/// for an empty body.
pub fn extract_error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(json) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(message) = message_from_json(&json) {
            return Some(message);
        }
    }

    Some(truncate(trimmed))
}

fn message_from_json(json: &serde_json::Value) -> Option<String> {
    const POINTERS: &[&str] = &[
        "/error/message",
        "/error/code",
        "/error",
        "/message",
        "/msg",
        "/output/message",
        "/data/task_status_msg",
    ];

    POINTERS
        .iter()
        .filter_map(|p| json.pointer(p))
        .find_map(|v| match v {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(truncate(s.trim())),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

fn truncate(s: &str) -> String {
    if s.chars().count() <= MAX_ERROR_MESSAGE_LEN {
        s.to_string()
    } else {
        let cut: String = s.chars().take(MAX_ERROR_MESSAGE_LEN).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    // -- status codes --

    #[test]
    fn auth_statuses_are_auth_invalid_regardless_of_body() {
        for body in ["", "{}", r#"{"error":"content_sensitive"}"#, "garbage"] {
            assert_eq!(classify(401, body), FailureKind::AuthInvalid);
            assert_eq!(classify(403, body), FailureKind::AuthInvalid);
        }
    }

    #[test]
    fn too_many_requests_is_rate_limited() {
        assert_eq!(classify(429, "policy blocked"), FailureKind::RateLimited);
        assert!(classify(429, "").should_rotate());
    }

    // -- moderation --

    #[test]
    fn sensitive_error_string_is_moderation() {
        assert_matches!(
            classify(200, r#"{"error":"content_sensitive"}"#),
            FailureKind::ContentModeration { .. }
        );
    }

    #[test]
    fn nested_moderation_message_is_surfaced_verbatim() {
        let body = r#"{"error":{"code":"OutputVideoSensitiveContentDetected","message":"The output video may contain sensitive information."}}"#;
        assert_eq!(
            classify(400, body),
            FailureKind::ContentModeration {
                message: "The output video may contain sensitive information.".to_string()
            }
        );
    }

    #[test]
    fn localized_keywords_match() {
        assert_matches!(
            classify(400, r#"{"message":"输入内容审核未通过"}"#),
            FailureKind::ContentModeration { .. }
        );
        assert_matches!(classify_message("提示词包含违规内容"), FailureKind::ContentModeration { .. });
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        assert_matches!(classify_message("Request BLOCKED by Safety"), FailureKind::ContentModeration { .. });
        assert!(!classify(400, "Blocked").should_rotate());
    }

    // -- vendor errors --

    #[test]
    fn plain_failure_is_vendor_error_with_message() {
        assert_eq!(
            classify(500, r#"{"code":"InternalError","message":"upstream timeout"}"#),
            FailureKind::VendorError {
                message: "upstream timeout".to_string()
            }
        );
    }

    #[test]
    fn empty_body_gets_generic_message() {
        assert_eq!(
            classify(502, "  "),
            FailureKind::VendorError {
                message: "vendor error 502".to_string()
            }
        );
    }

    #[test]
    fn non_json_body_is_quoted() {
        assert_eq!(
            classify(500, "Bad Gateway"),
            FailureKind::VendorError {
                message: "Bad Gateway".to_string()
            }
        );
    }

    // -- extract_error_message --

    #[test]
    fn extraction_follows_known_shapes() {
        assert_eq!(
            extract_error_message(r#"{"output":{"task_status":"FAILED","message":"bad image"}}"#).as_deref(),
            Some("bad image")
        );
        assert_eq!(
            extract_error_message(r#"{"data":{"task_status_msg":"image too small"}}"#).as_deref(),
            Some("image too small")
        );
        assert_eq!(extract_error_message(r#"{"error":{"code":1102}}"#).as_deref(), Some("1102"));
        assert_eq!(extract_error_message(""), None);
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(MAX_ERROR_MESSAGE_LEN * 2);
        let message = extract_error_message(&body).unwrap();
        assert_eq!(message.chars().count(), MAX_ERROR_MESSAGE_LEN + 1);
    }
}
