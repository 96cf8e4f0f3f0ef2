//! Host bridge: captures pushed by an embedding host become submissions.
//!
//! A host (an editor extension, a terminal wrapper) posts messages shaped
//! like `{"type": "TERMINAL_ERROR_PAYLOAD", "data": "..."}`. Each capture is
//! prefixed and submitted through the controller's normal send path, so it
//! obeys the same busy guard as typed input.

use std::collections::VecDeque;
use std::io::IsTerminal;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::controller::{ConversationController, Rejection};
use crate::error::ChatError;

/// Message type tag of a terminal capture.
pub const TERMINAL_CAPTURE_TYPE: &str = "TERMINAL_ERROR_PAYLOAD";

/// Environment variables whose presence means a host is embedding us.
const HOST_ENV_VARS: &[&str] = &["SCORPION_HOST", "VSCODE_PID"];

// =============================================================================
// Embedding context
// =============================================================================

/// Whether the process runs inside a host that can push captures.
///
/// Only changes the input placeholder text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingContext {
    Embedded,
    Standalone,
}

impl EmbeddingContext {
    /// Detect the context from stdin and the environment.
    pub fn probe() -> Self {
        let host_env = HOST_ENV_VARS
            .iter()
            .any(|var| std::env::var_os(var).is_some());
        let piped = !std::io::stdin().is_terminal();
        Self::from_signals(host_env, piped)
    }

    fn from_signals(host_env: bool, stdin_piped: bool) -> Self {
        if host_env || stdin_piped {
            EmbeddingContext::Embedded
        } else {
            EmbeddingContext::Standalone
        }
    }

    pub fn is_embedded(&self) -> bool {
        matches!(self, EmbeddingContext::Embedded)
    }

    pub fn placeholder_text(&self) -> &'static str {
        match self {
            EmbeddingContext::Embedded => "Uplink active. Awaiting terminal pulse...",
            EmbeddingContext::Standalone => "Enter command or paste diagnostic logs...",
        }
    }
}

// =============================================================================
// Host messages
// =============================================================================

/// A message from the host that the bridge acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostMessage {
    /// Raw terminal output to diagnose.
    TerminalCapture(String),
}

impl HostMessage {
    /// Interpret a posted payload. Anything unrecognized yields `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let kind = value.get("type").and_then(Value::as_str);
        match kind {
            Some(TERMINAL_CAPTURE_TYPE) => match value.get("data") {
                Some(Value::String(data)) => Some(HostMessage::TerminalCapture(data.clone())),
                _ => {
                    tracing::debug!("Terminal capture without string data ignored");
                    None
                }
            },
            other => {
                tracing::debug!(message_type = ?other, "Unrecognized host message ignored");
                None
            }
        }
    }
}

/// What the bridge did with one host message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeOutcome {
    /// Submitted; a reply is on its way.
    Accepted,
    /// Held until the in-flight request settles.
    Queued,
    /// Dropped because a request was in flight.
    Dropped,
    /// Not a message the bridge understands.
    Ignored,
}

impl BridgeOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, BridgeOutcome::Accepted | BridgeOutcome::Queued)
    }
}

/// One delivery to the listener, optionally waiting for its outcome.
#[derive(Debug)]
pub struct BridgeEnvelope {
    pub message: Value,
    pub reply: Option<oneshot::Sender<BridgeOutcome>>,
}

/// Sending side of the host bridge.
#[derive(Debug, Clone)]
pub struct HostBridgeHandle {
    tx: mpsc::Sender<BridgeEnvelope>,
}

impl HostBridgeHandle {
    pub fn new(tx: mpsc::Sender<BridgeEnvelope>) -> Self {
        Self { tx }
    }

    /// Deliver a message and wait for the listener's verdict.
    pub async fn deliver(&self, message: Value) -> Result<BridgeOutcome, ChatError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(BridgeEnvelope {
                message,
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| ChatError::BridgeError("listener is not running".to_string()))?;
        reply_rx
            .await
            .map_err(|_| ChatError::BridgeError("listener dropped the message".to_string()))
    }

    /// Deliver a message without waiting.
    pub async fn post(&self, message: Value) -> Result<(), ChatError> {
        self.tx
            .send(BridgeEnvelope {
                message,
                reply: None,
            })
            .await
            .map_err(|_| ChatError::BridgeError("listener is not running".to_string()))
    }
}

// =============================================================================
// Listener
// =============================================================================

/// Turns host captures into submissions.
#[derive(Debug)]
pub struct HostBridgeListener {
    controller: ConversationController,
    prefix: String,
    backlog_capacity: usize,
    backlog: VecDeque<String>,
}

impl HostBridgeListener {
    /// `backlog_capacity == 0` drops captures that arrive while busy.
    pub fn new(
        controller: ConversationController,
        prefix: impl Into<String>,
        backlog_capacity: usize,
    ) -> Self {
        Self {
            controller,
            prefix: prefix.into(),
            backlog_capacity,
            backlog: VecDeque::with_capacity(backlog_capacity),
        }
    }

    /// Create a listener with its channel.
    pub fn channel(
        controller: ConversationController,
        prefix: impl Into<String>,
        backlog_capacity: usize,
        buffer: usize,
    ) -> (Self, HostBridgeHandle, mpsc::Receiver<BridgeEnvelope>) {
        let (tx, rx) = mpsc::channel(buffer);
        (
            Self::new(controller, prefix, backlog_capacity),
            HostBridgeHandle::new(tx),
            rx,
        )
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// Process deliveries until every sender is gone.
    pub async fn run(mut self, mut rx: mpsc::Receiver<BridgeEnvelope>) {
        let mut busy_rx = self.controller.subscribe_busy();
        tracing::info!(
            backlog_capacity = self.backlog_capacity,
            "Host bridge listener started"
        );

        loop {
            tokio::select! {
                envelope = rx.recv() => {
                    let Some(envelope) = envelope else { break };
                    let outcome = self.handle_message(&envelope.message);
                    if let Some(reply) = envelope.reply {
                        let _ = reply.send(outcome);
                    }
                }
                changed = busy_rx.changed(), if !self.backlog.is_empty() => {
                    if changed.is_err() {
                        break;
                    }
                    let busy = *busy_rx.borrow_and_update();
                    if !busy {
                        self.drain_backlog();
                    }
                }
            }
        }

        tracing::info!(
            unsent = self.backlog.len(),
            "Host bridge listener stopped"
        );
    }

    /// Handle one host message. Must be called within a tokio runtime.
    pub fn handle_message(&mut self, value: &Value) -> BridgeOutcome {
        match HostMessage::from_value(value) {
            Some(HostMessage::TerminalCapture(data)) => self.handle_capture(data),
            None => BridgeOutcome::Ignored,
        }
    }

    fn handle_capture(&mut self, data: String) -> BridgeOutcome {
        tracing::info!(bytes = data.len(), "Terminal capture received");
        // A queued capture goes first so arrival order is kept.
        if !self.backlog.is_empty() {
            self.drain_backlog();
            if !self.backlog.is_empty() || self.controller.is_busy() {
                return self.hold(data);
            }
        }
        match self.submit(&data) {
            Ok(()) => BridgeOutcome::Accepted,
            Err(Rejection::Busy) => self.hold(data),
            // The prefix keeps the text non-empty, so this is unreachable
            // unless the prefix is blank.
            Err(Rejection::Empty) => BridgeOutcome::Ignored,
        }
    }

    fn submit(&self, data: &str) -> Result<(), Rejection> {
        let text = format!("{}{}", self.prefix, data);
        self.controller.submit_detached(Some(text)).map(|_| ())
    }

    fn hold(&mut self, data: String) -> BridgeOutcome {
        if self.backlog_capacity == 0 {
            tracing::debug!("Terminal capture dropped: a request is already in flight");
            return BridgeOutcome::Dropped;
        }
        if self.backlog.len() >= self.backlog_capacity {
            self.backlog.pop_front();
            tracing::warn!("Capture backlog full, oldest capture evicted");
        }
        self.backlog.push_back(data);
        tracing::debug!(queued = self.backlog.len(), "Terminal capture queued");
        BridgeOutcome::Queued
    }

    fn drain_backlog(&mut self) {
        if let Some(data) = self.backlog.pop_front() {
            match self.submit(&data) {
                Ok(()) => tracing::debug!(remaining = self.backlog.len(), "Queued capture submitted"),
                Err(Rejection::Busy) => self.backlog.push_front(data),
                Err(Rejection::Empty) => {}
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
