//! Transcription adapter: turns speech recognizer events into pending input.
//!
//! The adapter owns the listening lifecycle:
//! - Idle -> Listening (start)
//! - Listening -> Idle (stop, recognizer ended, recognizer error)
//!
//! While listening, every partial result replaces the controller's pending
//! text with the cumulative transcript. Recognition never submits on its own.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use scorpion_core::events::{ConversationEvent, VoiceCommand};

use crate::controller::ConversationController;
use crate::error::ChatError;

/// Notice posted when voice input is requested without a recognizer.
pub const UNSUPPORTED_NOTICE: &str = "Speech recognition is not supported on this platform.";

/// Backend that performs the actual speech recognition.
pub trait SpeechRecognizer: Send + Sync {
    fn start(&self) -> Result<(), ChatError>;
    fn stop(&self) -> Result<(), ChatError>;
}

/// Recognizer whose engine lives in the front-end.
///
/// Start and stop are forwarded as [`ConversationEvent::VoiceControl`]
/// events; transcripts come back as [`TranscriptionEvent`]s.
#[derive(Debug, Clone)]
pub struct RemoteRecognizer {
    controller: ConversationController,
    language: String,
    interim_results: bool,
    continuous: bool,
}

impl RemoteRecognizer {
    /// One-shot recognition in `language` with interim results.
    pub fn new(controller: ConversationController, language: impl Into<String>) -> Self {
        Self {
            controller,
            language: language.into(),
            interim_results: true,
            continuous: false,
        }
    }

    pub fn with_interim_results(mut self, enabled: bool) -> Self {
        self.interim_results = enabled;
        self
    }

    pub fn with_continuous(mut self, enabled: bool) -> Self {
        self.continuous = enabled;
        self
    }

    fn send(&self, command: VoiceCommand) {
        tracing::debug!(?command, "Forwarding voice command");
        self.controller
            .publish(ConversationEvent::VoiceControl { command });
    }
}

impl SpeechRecognizer for RemoteRecognizer {
    fn start(&self) -> Result<(), ChatError> {
        self.send(VoiceCommand::Start {
            language: self.language.clone(),
            interim_results: self.interim_results,
            continuous: self.continuous,
        });
        Ok(())
    }

    fn stop(&self) -> Result<(), ChatError> {
        self.send(VoiceCommand::Stop);
        Ok(())
    }
}

/// Whether speech input can be offered at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Available,
    Unavailable,
}

/// Event delivered by a recognizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "text", rename_all = "snake_case")]
pub enum TranscriptionEvent {
    /// Cumulative transcript so far.
    Partial(String),
    /// Recognition finished.
    Ended,
    /// Recognition failed.
    Error(String),
}

/// Listening state of the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceState {
    Idle,
    Listening,
}

impl fmt::Display for VoiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoiceState::Idle => write!(f, "Idle"),
            VoiceState::Listening => write!(f, "Listening"),
        }
    }
}

impl VoiceState {
    pub fn can_transition_to(&self, target: VoiceState) -> bool {
        matches!(
            (self, target),
            (VoiceState::Idle, VoiceState::Listening) | (VoiceState::Listening, VoiceState::Idle)
        )
    }
}

/// Result of a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOutcome {
    Started,
    AlreadyListening,
    Unsupported,
    /// The recognizer refused to start. A notice was posted.
    Failed,
}

pub struct TranscriptionAdapter {
    controller: ConversationController,
    recognizer: Option<Arc<dyn SpeechRecognizer>>,
    state: Mutex<VoiceState>,
}

impl fmt::Debug for TranscriptionAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranscriptionAdapter")
            .field("capability", &self.capability())
            .field("state", &self.state())
            .finish()
    }
}

impl TranscriptionAdapter {
    /// Create an adapter. `None` means no recognizer exists on this platform.
    pub fn new(
        controller: ConversationController,
        recognizer: Option<Arc<dyn SpeechRecognizer>>,
    ) -> Self {
        if recognizer.is_none() {
            tracing::info!("No speech recognizer available, voice input disabled");
        }
        Self {
            controller,
            recognizer,
            state: Mutex::new(VoiceState::Idle),
        }
    }

    pub fn capability(&self) -> Capability {
        if self.recognizer.is_some() {
            Capability::Available
        } else {
            Capability::Unavailable
        }
    }

    pub fn state(&self) -> VoiceState {
        *self.lock_state()
    }

    pub fn is_listening(&self) -> bool {
        self.state() == VoiceState::Listening
    }

    pub fn start(&self) -> StartOutcome {
        let Some(recognizer) = &self.recognizer else {
            self.controller.notify(UNSUPPORTED_NOTICE);
            return StartOutcome::Unsupported;
        };
        // The state lock spans the check, the recognizer call and the
        // transition so concurrent starts reach the recognizer once.
        let mut state = self.lock_state();
        if *state == VoiceState::Listening {
            return StartOutcome::AlreadyListening;
        }
        if let Err(e) = recognizer.start() {
            drop(state);
            tracing::warn!(error = %e, "Speech recognizer failed to start");
            self.controller.notify(format!("Voice input failed: {}", e));
            return StartOutcome::Failed;
        }
        self.apply(&mut state, VoiceState::Listening);
        StartOutcome::Started
    }

    /// Stop listening. Returns whether the adapter was listening.
    pub fn stop(&self) -> bool {
        let mut state = self.lock_state();
        if *state != VoiceState::Listening {
            return false;
        }
        if let Some(recognizer) = &self.recognizer {
            if let Err(e) = recognizer.stop() {
                tracing::warn!(error = %e, "Speech recognizer failed to stop cleanly");
            }
        }
        self.apply(&mut state, VoiceState::Idle);
        true
    }

    /// Start when idle, stop when listening. Returns the resulting state.
    pub fn toggle(&self) -> VoiceState {
        if self.is_listening() {
            self.stop();
        } else {
            self.start();
        }
        self.state()
    }

    /// Apply one recognizer event. Events while idle are ignored.
    pub fn handle_event(&self, event: TranscriptionEvent) {
        if !self.is_listening() {
            tracing::trace!(?event, "Transcription event ignored while idle");
            return;
        }
        match event {
            TranscriptionEvent::Partial(transcript) => {
                self.controller.update_pending_text(transcript);
            }
            TranscriptionEvent::Ended => {
                self.transition(VoiceState::Idle);
            }
            TranscriptionEvent::Error(reason) => {
                tracing::warn!(reason = %reason, "Speech recognition error");
                self.transition(VoiceState::Idle);
                self.controller
                    .notify(format!("Voice input error: {}", reason));
            }
        }
    }

    /// Pump recognizer events until the sender side closes.
    pub async fn run(&self, mut rx: mpsc::Receiver<TranscriptionEvent>) {
        while let Some(event) = rx.recv().await {
            self.handle_event(event);
        }
        tracing::debug!("Transcription event channel closed");
    }

    fn lock_state(&self) -> MutexGuard<'_, VoiceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, target: VoiceState) {
        let mut state = self.lock_state();
        self.apply(&mut state, target);
    }

    /// Move to `target` and mirror it on the controller. The caller holds
    /// the state lock, so mirrors arrive in transition order.
    fn apply(&self, state: &mut VoiceState, target: VoiceState) {
        if !state.can_transition_to(target) {
            tracing::debug!(from = %*state, to = %target, "Voice transition skipped");
            return;
        }
        *state = target;
        tracing::debug!(state = %target, "Voice state changed");
        self.controller
            .set_listening(target == VoiceState::Listening);
    }
}

// =============================================================================
// Tests
// =============================================================================
