//! Application state shared across all route handlers.
//!
//! AppState holds handles to the conversation and its event sources.
//! It is passed to handlers via axum's State extractor.

use std::sync::Arc;
use std::time::Instant;

use scorpion_chat::{ConversationController, HostBridgeHandle, TranscriptionAdapter};
use scorpion_core::config::ScorpionConfig;

/// Shared application state.
///
/// All fields are cheap to clone across handler tasks.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration (read-only after startup).
    pub config: Arc<ScorpionConfig>,
    /// The single conversation served by this process.
    pub controller: ConversationController,
    /// Speech transcription adapter feeding the pending input.
    pub voice: Arc<TranscriptionAdapter>,
    /// Sending side of the host bridge listener.
    pub bridge: HostBridgeHandle,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: ScorpionConfig,
        controller: ConversationController,
        voice: TranscriptionAdapter,
        bridge: HostBridgeHandle,
    ) -> Self {
        Self {
            config: Arc::new(config),
            controller,
            voice: Arc::new(voice),
            bridge,
            start_time: Instant::now(),
        }
    }
}
