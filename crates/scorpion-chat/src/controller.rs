//! Conversation controller: owns the message history and the send protocol.
//!
//! Every event source (typed input, transcription, host bridge, quick
//! actions) goes through one [`ConversationController`]. A submission is
//! split in two phases:
//!
//! 1. [`ConversationController::try_accept`] runs synchronously under the
//!    state lock: guard checks, user message append, pending input clear and
//!    busy flag set happen as one unit.
//! 2. [`PendingExchange::settle`] awaits the gateway and appends the model
//!    message. Busy is cleared by a drop guard, so it resets on every path.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

use scorpion_core::events::ConversationEvent;
use scorpion_core::types::{ImagePayload, Message, Timestamp};

use crate::attachment::AttachmentStore;
use crate::bridge::EmbeddingContext;
use crate::error::ChatError;
use crate::gateway::{GatewayRequest, RequestGateway};

/// Capacity of the conversation event broadcast channel.
const EVENT_CAPACITY: usize = 256;

/// Why a submission was not accepted. Expected control flow, not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    /// A request is already in flight.
    Busy,
    /// Neither text nor an attachment was available to send.
    Empty,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::Busy => "busy",
            Rejection::Empty => "empty",
        }
    }
}

/// Result of a full submit round trip.
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// The submission was accepted and has settled.
    Completed {
        user_message_id: Uuid,
        reply: Message,
    },
    /// The submission was dropped by a guard.
    Rejected(Rejection),
}

/// Read-only view of the controller state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    pub busy: bool,
    pub listening: bool,
    pub pending_text: String,
    pub has_attachment: bool,
    pub attachment_media_type: Option<String>,
    pub message_count: usize,
    pub indexed_files: u64,
    pub embedded: bool,
    pub placeholder: String,
}

struct ConversationState {
    history: Vec<Message>,
    pending_text: String,
    attachment: AttachmentStore,
    busy: bool,
    listening: bool,
    indexed_files: u64,
    last_timestamp: Timestamp,
}

impl ConversationState {
    /// Wall-clock milliseconds, clamped so history timestamps never decrease.
    fn next_timestamp(&mut self) -> Timestamp {
        let now = Utc::now().timestamp_millis().max(self.last_timestamp);
        self.last_timestamp = now;
        now
    }
}

struct Shared {
    state: Mutex<ConversationState>,
    gateway: Arc<dyn RequestGateway>,
    events: broadcast::Sender<ConversationEvent>,
    busy_tx: watch::Sender<bool>,
    embedding: EmbeddingContext,
}

/// Handle to a single conversation. Cloning shares the same conversation.
#[derive(Clone)]
pub struct ConversationController {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ConversationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("ConversationController")
            .field("messages", &state.history.len())
            .field("busy", &state.busy)
            .field("listening", &state.listening)
            .field("embedding", &self.shared.embedding)
            .finish()
    }
}

impl ConversationController {
    /// Create a controller that sends through `gateway`.
    pub fn new(
        gateway: Arc<dyn RequestGateway>,
        embedding: EmbeddingContext,
        max_attachment_bytes: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (busy_tx, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ConversationState {
                    history: Vec::new(),
                    pending_text: String::new(),
                    attachment: AttachmentStore::new(max_attachment_bytes),
                    busy: false,
                    listening: false,
                    indexed_files: 0,
                    last_timestamp: 0,
                }),
                gateway,
                events,
                busy_tx,
                embedding,
            }),
        }
    }

    // -- Send protocol --

    /// Submit `override_text`, or the pending input when `None`, and wait for
    /// the reply.
    pub async fn submit(&self, override_text: Option<String>) -> SubmitOutcome {
        match self.try_accept(override_text) {
            Ok(exchange) => {
                let user_message_id = exchange.user_message_id();
                let reply = exchange.settle().await;
                SubmitOutcome::Completed {
                    user_message_id,
                    reply,
                }
            }
            Err(rejection) => SubmitOutcome::Rejected(rejection),
        }
    }

    /// Accept a submission and settle it on a background task.
    ///
    /// Returns the id of the appended user message. Must be called from
    /// within a tokio runtime.
    pub fn submit_detached(&self, override_text: Option<String>) -> Result<Uuid, Rejection> {
        let exchange = self.try_accept(override_text)?;
        let id = exchange.user_message_id();
        tokio::spawn(async move {
            exchange.settle().await;
        });
        Ok(id)
    }

    /// Run the synchronous accept phase of a submission.
    ///
    /// On success the user message is in the history, the pending text and
    /// attachment are cleared and busy is set, all under one lock. The
    /// returned exchange must be settled (or dropped) to release busy.
    pub fn try_accept(&self, override_text: Option<String>) -> Result<PendingExchange, Rejection> {
        let mut state = self.lock();

        if state.busy {
            tracing::debug!("Submit ignored: a request is already in flight");
            return Err(Rejection::Busy);
        }

        let text = override_text
            .as_deref()
            .unwrap_or(&state.pending_text)
            .trim()
            .to_string();

        if text.is_empty() && !state.attachment.is_pending() {
            tracing::debug!("Submit ignored: nothing to send");
            return Err(Rejection::Empty);
        }

        let attachment = state.attachment.take();
        let had_pending_text = !state.pending_text.is_empty();
        state.pending_text.clear();
        let timestamp = state.next_timestamp();
        let user_message = Message::user(text, attachment.clone(), timestamp);
        let user_message_id = user_message.id;
        state.history.push(user_message.clone());
        state.busy = true;
        let history = state.history.clone();

        // Published under the lock so watchers and subscribers see busy
        // flips in the order the state made them.
        self.shared.busy_tx.send_replace(true);
        self.emit(ConversationEvent::MessageAppended {
            message: user_message.clone(),
        });
        if had_pending_text {
            self.emit(ConversationEvent::InputChanged {
                text: String::new(),
            });
        }
        if attachment.is_some() {
            self.emit(ConversationEvent::AttachmentChanged { attached: false });
        }
        self.emit(ConversationEvent::BusyChanged { busy: true });
        drop(state);

        tracing::info!(
            message_id = %user_message_id,
            text_len = user_message.text.len(),
            has_attachment = attachment.is_some(),
            "Submission accepted"
        );

        Ok(PendingExchange {
            request: GatewayRequest {
                text: user_message.text,
                history,
                attachment,
            },
            user_message_id,
            guard: BusyGuard {
                controller: self.clone(),
                settled: false,
            },
        })
    }

    // -- Pending input --

    /// Replace the pending input text. Allowed while busy.
    pub fn update_pending_text(&self, text: impl Into<String>) {
        let text = text.into();
        {
            let mut state = self.lock();
            if state.pending_text == text {
                return;
            }
            state.pending_text = text.clone();
        }
        self.emit(ConversationEvent::InputChanged { text });
    }

    /// Set the pending attachment, replacing any already pending.
    pub fn attach(&self, data: Vec<u8>, media_type: impl Into<String>) -> Result<(), ChatError> {
        let payload = ImagePayload::new(data, media_type);
        let media_type = payload.media_type.clone();
        let size = payload.len();
        let replaced = self.lock().attachment.set(payload)?;
        tracing::debug!(
            media_type = %media_type,
            size,
            replaced = replaced.is_some(),
            "Attachment pending"
        );
        self.emit(ConversationEvent::AttachmentChanged { attached: true });
        Ok(())
    }

    /// Drop the pending attachment, if any.
    pub fn clear_attachment(&self) {
        let cleared = self.lock().attachment.clear();
        if cleared {
            self.emit(ConversationEvent::AttachmentChanged { attached: false });
        }
    }

    // -- Mirrors and notices --

    /// Mirror the transcription adapter's listening state.
    pub fn set_listening(&self, listening: bool) {
        {
            let mut state = self.lock();
            if state.listening == listening {
                return;
            }
            state.listening = listening;
        }
        self.emit(ConversationEvent::ListeningChanged { listening });
    }

    /// Publish a transient notice. Never recorded in history.
    pub fn notify(&self, text: impl Into<String>) {
        self.emit(ConversationEvent::Notice { text: text.into() });
    }

    /// Publish an event that does not change conversation state.
    pub fn publish(&self, event: ConversationEvent) {
        self.emit(event);
    }

    /// Add to the indexed-file counter and return the new total.
    pub fn record_indexed_files(&self, count: u64) -> u64 {
        let mut state = self.lock();
        state.indexed_files = state.indexed_files.saturating_add(count);
        state.indexed_files
    }

    // -- Accessors --

    pub fn history(&self) -> Vec<Message> {
        self.lock().history.clone()
    }

    pub fn message_count(&self) -> usize {
        self.lock().history.len()
    }

    pub fn is_busy(&self) -> bool {
        self.lock().busy
    }

    pub fn is_listening(&self) -> bool {
        self.lock().listening
    }

    pub fn pending_text(&self) -> String {
        self.lock().pending_text.clone()
    }

    pub fn pending_attachment(&self) -> Option<ImagePayload> {
        self.lock().attachment.peek().cloned()
    }

    pub fn indexed_files(&self) -> u64 {
        self.lock().indexed_files
    }

    pub fn embedding(&self) -> EmbeddingContext {
        self.shared.embedding
    }

    pub fn placeholder_text(&self) -> &'static str {
        self.shared.embedding.placeholder_text()
    }

    /// Consistent view of the whole state for observers.
    pub fn snapshot(&self) -> ConversationSnapshot {
        let state = self.lock();
        ConversationSnapshot {
            busy: state.busy,
            listening: state.listening,
            pending_text: state.pending_text.clone(),
            has_attachment: state.attachment.is_pending(),
            attachment_media_type: state.attachment.peek().map(|a| a.media_type.clone()),
            message_count: state.history.len(),
            indexed_files: state.indexed_files,
            embedded: self.shared.embedding.is_embedded(),
            placeholder: self.shared.embedding.placeholder_text().to_string(),
        }
    }

    /// Subscribe to conversation events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.shared.events.subscribe()
    }

    /// Watch the busy flag.
    pub fn subscribe_busy(&self) -> watch::Receiver<bool> {
        self.shared.busy_tx.subscribe()
    }

    // -- Private helpers --

    fn lock(&self) -> MutexGuard<'_, ConversationState> {
        // The state stays consistent across every critical section, so a
        // poisoned lock is still safe to reuse.
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: ConversationEvent) {
        // No subscribers is fine.
        let _ = self.shared.events.send(event);
    }

    fn append_model_message(&self, build: impl FnOnce(Timestamp) -> Message) -> Message {
        let mut state = self.lock();
        let timestamp = state.next_timestamp();
        let message = build(timestamp);
        state.history.push(message.clone());
        self.emit(ConversationEvent::MessageAppended {
            message: message.clone(),
        });
        message
    }

    fn release_busy(&self) {
        let mut state = self.lock();
        state.busy = false;
        self.shared.busy_tx.send_replace(false);
        self.emit(ConversationEvent::BusyChanged { busy: false });
    }
}

/// An accepted submission whose gateway call has not settled yet.
pub struct PendingExchange {
    request: GatewayRequest,
    user_message_id: Uuid,
    guard: BusyGuard,
}

impl std::fmt::Debug for PendingExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingExchange")
            .field("user_message_id", &self.user_message_id)
            .field("history_len", &self.request.history.len())
            .finish()
    }
}

impl PendingExchange {
    pub fn user_message_id(&self) -> Uuid {
        self.user_message_id
    }

    /// The request that will be sent to the gateway.
    pub fn request(&self) -> &GatewayRequest {
        &self.request
    }

    /// Call the gateway and append the model message.
    ///
    /// Returns the appended model message. Busy is released afterwards.
    pub async fn settle(self) -> Message {
        let PendingExchange {
            request,
            user_message_id,
            mut guard,
        } = self;
        let controller = guard.controller.clone();
        let started = Instant::now();

        let result = controller.shared.gateway.solve(request).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let reply = match result {
            Ok(reply) => {
                tracing::info!(
                    message_id = %user_message_id,
                    elapsed_ms,
                    grounded = reply.grounding_urls.as_ref().map(Vec::len).unwrap_or(0),
                    "Gateway replied"
                );
                controller.append_model_message(|ts| Message::from_reply(reply, ts))
            }
            Err(e) => {
                tracing::error!(
                    message_id = %user_message_id,
                    kind = e.kind(),
                    error = %e,
                    elapsed_ms,
                    "Gateway call failed"
                );
                controller.append_model_message(Message::uplink_failure)
            }
        };

        guard.settled = true;
        drop(guard);
        reply
    }
}

/// Releases the busy flag when an exchange ends, however it ends.
///
/// An exchange dropped before settling (panic, aborted task) still gets its
/// model message, so every accepted submission stays paired.
struct BusyGuard {
    controller: ConversationController,
    settled: bool,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!("Exchange dropped before the gateway settled");
            self.controller
                .append_model_message(Message::uplink_failure);
        }
        self.controller.release_busy();
    }
}

// =============================================================================
// Tests
// =============================================================================
