//! Parsing of vendor submission and status responses.

use serde_json::Value;
use storyreel_core::protocol::ProtocolVariant;

/// Status of a vendor task as reported by one status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    /// Queued or running. Carries the vendor's raw status string.
    Pending { raw: String },
    /// Finished. The URL is `None` when the vendor omitted it.
    Succeeded { video_url: Option<String> },
    Failed { message: String },
    /// The vendor does not (yet) know the task id.
    NotFound,
}

/// Extract the task id from a submission response.
pub fn extract_task_id(variant: ProtocolVariant, body: &Value) -> Option<String> {
    let pointers: &[&str] = match variant {
        ProtocolVariant::Unified => &["/id", "/task_id", "/data/id"],
        ProtocolVariant::Volc => &["/id"],
        ProtocolVariant::Wan => &["/output/task_id"],
        ProtocolVariant::Kling => &["/data/task_id"],
    };
    first_string(body, pointers)
}

/// Interpret a status response.
pub fn parse_task_status(variant: ProtocolVariant, body: &Value) -> TaskStatus {
    match variant {
        ProtocolVariant::Unified => parse_unified(body),
        ProtocolVariant::Volc => parse_volc(body),
        ProtocolVariant::Wan => parse_wan(body),
        ProtocolVariant::Kling => parse_kling(body),
    }
}

// ---------------------------------------------------------------------------
// Per-variant parsers
// ---------------------------------------------------------------------------

fn parse_unified(body: &Value) -> TaskStatus {
    let raw = first_string(body, &["/status", "/data/status"]).unwrap_or_default();
    match raw.to_ascii_lowercase().as_str() {
        "completed" | "succeeded" | "success" | "done" => TaskStatus::Succeeded {
            video_url: first_string(
                body,
                &["/video_url", "/result_url", "/url", "/data/video_url", "/data/url"],
            ),
        },
        "failed" | "error" | "cancelled" | "canceled" | "expired" => TaskStatus::Failed {
            message: failure_message(body, &["/error/message", "/error", "/message", "/fail_reason"], &raw),
        },
        "not_found" => TaskStatus::NotFound,
        _ => error_field(body).map_or(TaskStatus::Pending { raw }, |message| TaskStatus::Failed { message }),
    }
}

fn parse_volc(body: &Value) -> TaskStatus {
    let raw = first_string(body, &["/status"]).unwrap_or_default();
    match raw.as_str() {
        "succeeded" => TaskStatus::Succeeded {
            video_url: first_string(body, &["/content/video_url"]),
        },
        "failed" | "cancelled" | "expired" => TaskStatus::Failed {
            message: failure_message(body, &["/error/message", "/error/code"], &raw),
        },
        _ => error_field(body).map_or(TaskStatus::Pending { raw }, |message| TaskStatus::Failed { message }),
    }
}

fn parse_wan(body: &Value) -> TaskStatus {
    let raw = first_string(body, &["/output/task_status"]).unwrap_or_default();
    match raw.as_str() {
        "SUCCEEDED" => TaskStatus::Succeeded {
            video_url: first_string(body, &["/output/video_url", "/output/url"]),
        },
        "FAILED" | "CANCELED" => TaskStatus::Failed {
            message: failure_message(body, &["/output/message", "/message", "/output/code", "/code"], &raw),
        },
        "UNKNOWN" => TaskStatus::NotFound,
        _ => TaskStatus::Pending { raw },
    }
}

fn parse_kling(body: &Value) -> TaskStatus {
    // Business errors arrive as HTTP 200 with a non-zero code and no data.
    let code = body.get("code").and_then(Value::as_i64).unwrap_or(0);
    if code != 0 && body.get("data").map_or(true, Value::is_null) {
        let message = failure_message(body, &["/message"], "error");
        if is_not_found_message(&message) {
            return TaskStatus::NotFound;
        }
        return TaskStatus::Failed { message };
    }

    let raw = first_string(body, &["/data/task_status"]).unwrap_or_default();
    match raw.as_str() {
        "succeed" => TaskStatus::Succeeded {
            video_url: first_string(body, &["/data/task_result/videos/0/url"]),
        },
        "failed" => TaskStatus::Failed {
            message: failure_message(body, &["/data/task_status_msg", "/message"], &raw),
        },
        _ => TaskStatus::Pending { raw },
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// First non-empty string (or number, rendered) at any of `pointers`.
fn first_string(body: &Value, pointers: &[&str]) -> Option<String> {
    pointers
        .iter()
        .filter_map(|p| body.pointer(p))
        .find_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

/// Message from a top-level `error` field, which some vendors return with
/// HTTP 200 and no terminal status. `null`, `""` and `{}` do not count.
fn error_field(body: &Value) -> Option<String> {
    match body.get("error")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Object(fields) if !fields.is_empty() => Some(
            first_string(body, &["/error/message", "/error/code", "/error/type"])
                .unwrap_or_else(|| "vendor reported an error".to_string()),
        ),
        _ => None,
    }
}

/// Whether a business error means the task id is not (yet) known.
fn is_not_found_message(message: &str) -> bool {
    let lowered = message.to_lowercase();
    ["not exist", "not found", "不存在"]
        .iter()
        .any(|fragment| lowered.contains(fragment))
}

fn failure_message(body: &Value, pointers: &[&str], status: &str) -> String {
    first_string(body, pointers).unwrap_or_else(|| format!("task ended with status '{status}'"))
}
