//! Request gateway: the single async boundary to the remote reasoning service.
//!
//! Every failure mode collapses into [`GatewayError`]. The controller renders
//! all of them the same way but logs [`GatewayError::kind`] so they can still
//! be told apart in diagnostics.

pub mod gemini;

use async_trait::async_trait;
use scorpion_core::types::{GatewayReply, ImagePayload, Message};

pub use gemini::GeminiGateway;

/// Input of one gateway call.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    /// The prompt text as recorded in the user message.
    pub text: String,
    /// History snapshot, taken after the user message was appended.
    pub history: Vec<Message>,
    /// Image sent with the prompt, if any.
    pub attachment: Option<ImagePayload>,
}

/// Why a gateway call failed.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("network failure: {0}")]
    Network(String),
    #[error("remote returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed reply: {0}")]
    Malformed(String),
    #[error("gateway misconfigured: {0}")]
    Config(String),
}

impl GatewayError {
    /// Stable, low-cardinality label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Network(_) => "network",
            GatewayError::Status { .. } => "status",
            GatewayError::Malformed(_) => "malformed",
            GatewayError::Config(_) => "config",
        }
    }
}

/// Boundary abstraction over the remote reasoning service.
///
/// Implementations settle exactly once per call: a reply or an error.
#[async_trait]
pub trait RequestGateway: Send + Sync {
    async fn solve(&self, request: GatewayRequest) -> Result<GatewayReply, GatewayError>;
}

/// Validate an untyped reply payload.
///
/// The payload must be a JSON object; unknown roles and wrongly typed fields
/// are rejected rather than coerced.
pub fn parse_reply(value: serde_json::Value) -> Result<GatewayReply, GatewayError> {
    if !value.is_object() {
        return Err(GatewayError::Malformed(format!(
            "expected a JSON object, got {}",
            json_type_name(&value)
        )));
    }
    serde_json::from_value(value).map_err(|e| GatewayError::Malformed(e.to_string()))
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scorpion_core::types::Role;
    use serde_json::json;

    #[test]
    fn test_error_kinds() {
        assert_eq!(GatewayError::Network("x".into()).kind(), "network");
        assert_eq!(
            GatewayError::Status {
                status: 500,
                body: String::new()
            }
            .kind(),
            "status"
        );
        assert_eq!(GatewayError::Malformed("x".into()).kind(), "malformed");
        assert_eq!(GatewayError::Config("x".into()).kind(), "config");
    }

    #[test]
    fn test_status_error_display() {
        let err = GatewayError::Status {
            status: 503,
            body: "UNAVAILABLE".to_string(),
        };
        assert_eq!(err.to_string(), "remote returned status 503: UNAVAILABLE");
    }

    #[test]
    fn test_parse_reply_full() {
        let reply = parse_reply(json!({
            "role": "model",
            "text": "Run cargo clean",
            "groundingUrls": [{"web": {"uri": "https://a.dev", "title": "A"}}, {}],
            "sources": [{"title": "Cargo.toml", "snippet": "[package]", "relevance": 0.7}]
        }))
        .unwrap();
        assert_eq!(reply.role, Some(Role::Model));
        assert_eq!(reply.text.as_deref(), Some("Run cargo clean"));
        let grounding = reply.grounding_urls.unwrap();
        assert_eq!(grounding.len(), 2);
        assert!(grounding[1].web.is_none());
        assert_eq!(reply.sources.unwrap()[0].relevance, 0.7);
    }

    #[test]
    fn test_parse_reply_empty_object() {
        let reply = parse_reply(json!({})).unwrap();
        assert_eq!(reply, GatewayReply::default());
    }

    #[test]
    fn test_parse_reply_rejects_non_object() {
        let err = parse_reply(json!("just text")).unwrap_err();
        assert!(matches!(err, GatewayError::Malformed(_)));
        assert!(err.to_string().contains("a string"));
    }

    #[test]
    fn test_parse_reply_rejects_unknown_role() {
        let err = parse_reply(json!({"role": "assistant", "text": "hi"})).unwrap_err();
        assert_eq!(err.kind(), "malformed");
    }

    #[test]
    fn test_parse_reply_rejects_wrong_types() {
        assert!(parse_reply(json!({"text": 42})).is_err());
        assert!(parse_reply(json!({"sources": [{"title": "t", "snippet": "s"}]})).is_err());
        assert!(parse_reply(json!({"groundingUrls": "https://a.dev"})).is_err());
    }
}
