//! Error sanitization
//!
//! Everything a hook handler or external caller sees goes through here:
//! the envelope carries a stable code and a message stripped of file
//! paths, stack frames, module paths and secret-looking fields. The
//! original error is logged on the internal channel and never exposed.

use serde::{Deserialize, Serialize};

/// Wire-facing error shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
}

impl ErrorEnvelope {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

const SECRET_MARKERS: &[&str] = &["password", "secret", "token", "api_key", "apikey", "credential"];

/// Sanitize an internal error into the wire envelope, logging the original
pub fn sanitize(code: &str, error: &dyn std::fmt::Display) -> ErrorEnvelope {
    let raw = error.to_string();
    tracing::debug!(code, error = %raw, "sanitizing internal error");
    ErrorEnvelope::new(code, sanitize_message(&raw))
}

/// Strip paths, stack frames and secrets from a message
pub fn sanitize_message(raw: &str) -> String {
    // Stack frames live on their own lines; keep only the first line.
    let first_line = raw.lines().next().unwrap_or_default();

    let mut out: Vec<String> = Vec::new();
    for token in first_line.split(' ') {
        if token.is_empty() {
            continue;
        }
        if is_secret_assignment(token) {
            let key = token.split(['=', ':']).next().unwrap_or(token);
            out.push(format!("{}=[redacted]", key));
            continue;
        }
        if looks_like_path(token) {
            out.push("[path]".to_string());
            continue;
        }
        if token.contains("::") {
            // Module or function path from an internal frame.
            out.push("[internal]".to_string());
            continue;
        }
        out.push(token.to_string());
    }
    out.join(" ")
}

fn looks_like_path(token: &str) -> bool {
    let trimmed = token.trim_matches(|c: char| "\"'():,".contains(c));
    (trimmed.contains('/') && !trimmed.starts_with("http://") && !trimmed.starts_with("https://")
        && !trimmed.starts_with('<'))
        || trimmed.contains('\\')
        || trimmed.ends_with(".rs")
}

fn is_secret_assignment(token: &str) -> bool {
    let lower = token.to_lowercase();
    SECRET_MARKERS
        .iter()
        .any(|marker| lower.starts_with(marker) && (lower.contains('=') || lower.contains(':')))
}
