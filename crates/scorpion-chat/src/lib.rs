//! Conversation engine for Scorpion.
//!
//! Owns the message history and the single in-flight request guard, and
//! connects the event sources that feed it: typed input, speech
//! transcription, the host bridge and quick actions.

pub mod attachment;
pub mod bridge;
pub mod controller;
pub mod error;
pub mod gateway;
pub mod quick_actions;
pub mod voice;

pub use attachment::AttachmentStore;
pub use bridge::{
    BridgeEnvelope, BridgeOutcome, EmbeddingContext, HostBridgeHandle, HostBridgeListener,
    HostMessage,
};
pub use controller::{
    ConversationController, ConversationSnapshot, PendingExchange, Rejection, SubmitOutcome,
};
pub use error::ChatError;
pub use gateway::{parse_reply, GatewayError, GatewayRequest, GeminiGateway, RequestGateway};
pub use quick_actions::{index_files, QuickAction};
pub use voice::{
    Capability, RemoteRecognizer, SpeechRecognizer, StartOutcome, TranscriptionAdapter,
    TranscriptionEvent, VoiceState,
};
