//! Error types for the conversational interface.

use scorpion_core::error::ScorpionError;

/// Errors from the chat engine.
///
/// Guard rejections (busy, empty input) are not errors; see
/// [`crate::controller::Rejection`].
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("attachment rejected: {0}")]
    InvalidAttachment(String),
    #[error("attachment of {size} bytes exceeds the {limit} byte limit")]
    AttachmentTooLarge { size: usize, limit: usize },
    #[error("speech recognition is not supported on this platform")]
    VoiceUnsupported,
    #[error("voice error: {0}")]
    VoiceError(String),
    #[error("bridge error: {0}")]
    BridgeError(String),
    #[error("gateway error: {0}")]
    GatewayError(String),
}

impl From<ScorpionError> for ChatError {
    fn from(err: ScorpionError) -> Self {
        match err {
            ScorpionError::Voice(msg) => ChatError::VoiceError(msg),
            ScorpionError::Bridge(msg) => ChatError::BridgeError(msg),
            other => ChatError::GatewayError(other.to_string()),
        }
    }
}

impl From<ChatError> for ScorpionError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::VoiceUnsupported | ChatError::VoiceError(_) => {
                ScorpionError::Voice(err.to_string())
            }
            ChatError::BridgeError(msg) => ScorpionError::Bridge(msg),
            ChatError::GatewayError(msg) => ScorpionError::Gateway(msg),
            ChatError::AttachmentTooLarge { size, limit } => {
                ScorpionError::PayloadTooLarge { size, limit }
            }
            ChatError::InvalidAttachment(_) => ScorpionError::Chat(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_error_display() {
        let err = ChatError::InvalidAttachment("not an image".to_string());
        assert_eq!(err.to_string(), "attachment rejected: not an image");

        let err = ChatError::AttachmentTooLarge {
            size: 2048,
            limit: 1024,
        };
        assert_eq!(
            err.to_string(),
            "attachment of 2048 bytes exceeds the 1024 byte limit"
        );

        let err = ChatError::VoiceUnsupported;
        assert_eq!(
            err.to_string(),
            "speech recognition is not supported on this platform"
        );

        let err = ChatError::VoiceError("microphone unavailable".to_string());
        assert_eq!(err.to_string(), "voice error: microphone unavailable");

        let err = ChatError::BridgeError("channel closed".to_string());
        assert_eq!(err.to_string(), "bridge error: channel closed");

        let err = ChatError::GatewayError("no api key".to_string());
        assert_eq!(err.to_string(), "gateway error: no api key");
    }

    #[test]
    fn test_chat_error_from_scorpion_error() {
        let err: ChatError = ScorpionError::Voice("busy device".to_string()).into();
        assert!(matches!(err, ChatError::VoiceError(_)));

        let err: ChatError = ScorpionError::Bridge("closed".to_string()).into();
        assert!(matches!(err, ChatError::BridgeError(_)));

        let err: ChatError = ScorpionError::Config("missing key".to_string()).into();
        assert!(matches!(err, ChatError::GatewayError(_)));
        assert!(err.to_string().contains("missing key"));
    }

    #[test]
    fn test_scorpion_error_from_chat_error() {
        let err: ScorpionError = ChatError::AttachmentTooLarge { size: 9, limit: 4 }.into();
        assert!(matches!(
            err,
            ScorpionError::PayloadTooLarge { size: 9, limit: 4 }
        ));

        let err: ScorpionError = ChatError::VoiceUnsupported.into();
        assert!(matches!(err, ScorpionError::Voice(_)));

        let err: ScorpionError = ChatError::InvalidAttachment("empty".to_string()).into();
        assert!(matches!(err, ScorpionError::Chat(_)));
    }

    #[test]
    fn test_errors_implement_debug() {
        let dbg = format!("{:?}", ChatError::VoiceUnsupported);
        assert!(dbg.contains("VoiceUnsupported"));
    }
}
