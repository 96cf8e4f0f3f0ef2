use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

/// Text recorded for a user message that carries only an image.
pub const IMAGE_PLACEHOLDER_TEXT: &str = "[IMAGE_PAYLOAD_ATTACHED]";

/// Text recorded when the gateway replies without any text.
pub const PROTOCOL_ERROR_TEXT: &str = "PROTOCOL_ERROR: FAILED TO BROADCAST.";

/// Text recorded when the gateway call fails. The underlying error is only logged.
pub const UPLINK_FAILURE_TEXT: &str = "PULSE_CRITICAL: Uplink severed. Network anomaly detected.";

// =============================================================================
// Enums
// =============================================================================

/// Author of a message in the conversation history.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    #[default]
    Model,
    System,
}

impl Role {
    /// Wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "model" => Ok(Role::Model),
            "system" => Ok(Role::System),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

// =============================================================================
// Payloads
// =============================================================================

/// A binary image attached to a message.
///
/// `data` travels as standard base64 on the wire.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePayload {
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    #[serde(rename = "mimeType", alias = "media_type")]
    pub media_type: String,
}

impl ImagePayload {
    pub fn new(data: Vec<u8>, media_type: impl Into<String>) -> Self {
        Self {
            data,
            media_type: media_type.into(),
        }
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Base64 encoding of the payload bytes.
    pub fn to_base64(&self) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }
}

// Image bytes are noise in logs.
impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePayload")
            .field("media_type", &self.media_type)
            .field("len", &self.data.len())
            .finish()
    }
}

/// A web page the model cited while grounding its answer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebReference {
    pub uri: String,
    pub title: String,
}

/// One grounding citation. `web` is absent for non-web grounding sources.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingChunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web: Option<WebReference>,
}

/// A ranked snippet retrieved from local project context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RagSource {
    pub title: String,
    pub snippet: String,
    pub relevance: f64,
}

// =============================================================================
// Message
// =============================================================================

/// A single entry in the conversation history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub text: String,
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImagePayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grounding_urls: Option<Vec<GroundingChunk>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<RagSource>>,
}

impl Message {
    /// Build a user message. Empty text with an image falls back to
    /// [`IMAGE_PLACEHOLDER_TEXT`].
    pub fn user(text: String, image: Option<ImagePayload>, timestamp: Timestamp) -> Self {
        let text = if text.is_empty() && image.is_some() {
            IMAGE_PLACEHOLDER_TEXT.to_string()
        } else {
            text
        };
        Self {
            id: Uuid::new_v4(),
            role: Role::User,
            text,
            timestamp,
            image,
            grounding_urls: None,
            sources: None,
        }
    }

    /// Build the history entry for a gateway reply.
    pub fn from_reply(reply: GatewayReply, timestamp: Timestamp) -> Self {
        let text = reply
            .text
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| PROTOCOL_ERROR_TEXT.to_string());
        Self {
            id: Uuid::new_v4(),
            role: reply.role.unwrap_or(Role::Model),
            text,
            timestamp,
            image: None,
            grounding_urls: reply.grounding_urls,
            sources: reply.sources,
        }
    }

    /// Build the fixed placeholder recorded after a failed gateway call.
    pub fn uplink_failure(timestamp: Timestamp) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::Model,
            text: UPLINK_FAILURE_TEXT.to_string(),
            timestamp,
            image: None,
            grounding_urls: None,
            sources: None,
        }
    }
}

// =============================================================================
// Gateway reply
// =============================================================================

/// Structured success payload of the request gateway.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayReply {
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub grounding_urls: Option<Vec<GroundingChunk>>,
    #[serde(default)]
    pub sources: Option<Vec<RagSource>>,
}

impl GatewayReply {
    /// Reply carrying only text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.trim())
            .map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================
