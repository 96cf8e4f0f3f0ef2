use serde::{Deserialize, Serialize};

use crate::types::Message;

/// Voice capture commands forwarded to a front-end hosted recognizer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum VoiceCommand {
    /// Begin a single recognition session with these settings.
    Start {
        language: String,
        interim_results: bool,
        /// Keep listening after the first final result.
        continuous: bool,
    },
    Stop,
}

/// Everything an observer of a conversation can see change.
///
/// Events are emitted by the conversation controller after each state
/// change and consumed by the SSE stream (for real-time UI updates).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
#[non_exhaustive]
pub enum ConversationEvent {
    /// A message was appended to the history.
    MessageAppended { message: Message },

    /// The single in-flight request started or settled.
    BusyChanged { busy: bool },

    /// The transcription adapter started or stopped listening.
    ListeningChanged { listening: bool },

    /// The pending input text was replaced (typing or transcription).
    InputChanged { text: String },

    /// A pending attachment was set (`true`) or cleared (`false`).
    AttachmentChanged { attached: bool },

    /// A transient, user-facing notice. Never recorded in history.
    Notice { text: String },

    /// The front-end recognizer should start or stop capturing.
    VoiceControl { command: VoiceCommand },
}

impl ConversationEvent {
    /// Returns a short event name for logging and SSE.
    pub fn event_name(&self) -> &'static str {
        match self {
            ConversationEvent::MessageAppended { .. } => "message_appended",
            ConversationEvent::BusyChanged { .. } => "busy_changed",
            ConversationEvent::ListeningChanged { .. } => "listening_changed",
            ConversationEvent::InputChanged { .. } => "input_changed",
            ConversationEvent::AttachmentChanged { .. } => "attachment_changed",
            ConversationEvent::Notice { .. } => "notice",
            ConversationEvent::VoiceControl { .. } => "voice_control",
        }
    }
}
