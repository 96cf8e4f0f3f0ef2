//! Route handler functions for all API endpoints.
//!
//! Each handler extracts its body or path parameters via axum extractors,
//! drives the conversation controller, and returns JSON responses. Replies
//! from the gateway are never returned inline; they arrive on `/stream`.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use scorpion_chat::{
    index_files, BridgeOutcome, Capability, ConversationSnapshot, QuickAction, Rejection,
    StartOutcome, TranscriptionEvent, VoiceState,
};
use scorpion_core::types::Message;

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Request types
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct SubmitRequest {
    /// Text to send instead of the pending input.
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InputRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct AttachmentRequest {
    /// Base64-encoded image bytes.
    pub data: String,
    #[serde(alias = "mimeType")]
    pub media_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceEventKind {
    Partial,
    Ended,
    Error,
}

#[derive(Debug, Deserialize)]
pub struct VoiceEventRequest {
    pub kind: VoiceEventKind,
    pub transcript: Option<String>,
    pub error: Option<String>,
}

impl VoiceEventRequest {
    fn into_event(self) -> Result<TranscriptionEvent, ApiError> {
        match self.kind {
            VoiceEventKind::Partial => self
                .transcript
                .map(TranscriptionEvent::Partial)
                .ok_or_else(|| {
                    ApiError::BadRequest("partial events require a transcript".to_string())
                }),
            VoiceEventKind::Ended => Ok(TranscriptionEvent::Ended),
            VoiceEventKind::Error => Ok(TranscriptionEvent::Error(
                self.error.unwrap_or_else(|| "unknown".to_string()),
            )),
        }
    }
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub message_count: usize,
    pub busy: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StateResponse {
    #[serde(flatten)]
    pub conversation: ConversationSnapshot,
    pub voice_capability: Capability,
    pub voice_state: VoiceState,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<Rejection>,
}

impl SubmitResponse {
    fn from_result(result: Result<Uuid, Rejection>) -> (StatusCode, Json<Self>) {
        match result {
            Ok(id) => (
                StatusCode::ACCEPTED,
                Json(Self {
                    status: "accepted".to_string(),
                    message_id: Some(id),
                    reason: None,
                }),
            ),
            Err(rejection) => (
                StatusCode::OK,
                Json(Self {
                    status: "ignored".to_string(),
                    message_id: None,
                    reason: Some(rejection),
                }),
            ),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InputResponse {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AttachmentResponse {
    pub attached: bool,
    pub media_type: String,
    pub size: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VoiceResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<StartOutcome>,
    pub state: VoiceState,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BridgeResponse {
    pub accepted: bool,
    pub outcome: BridgeOutcome,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IndexResponse {
    pub indexed_files: u64,
    #[serde(flatten)]
    pub submission: SubmitResponse,
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /health - health check.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        message_count: state.controller.message_count(),
        busy: state.controller.is_busy(),
    })
}

/// GET /state - conversation and voice state.
pub async fn get_state(State(state): State<AppState>) -> Json<StateResponse> {
    Json(StateResponse {
        conversation: state.controller.snapshot(),
        voice_capability: state.voice.capability(),
        voice_state: state.voice.state(),
    })
}

/// GET /messages - full history in order.
pub async fn list_messages(State(state): State<AppState>) -> Json<MessagesResponse> {
    Json(MessagesResponse {
        messages: state.controller.history(),
    })
}

/// POST /messages - submit the pending input or an override text.
pub async fn submit_message(
    State(state): State<AppState>,
    Json(req): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    if let Some(text) = &req.text {
        check_length(text, state.config.chat.max_message_chars)?;
    }
    Ok(SubmitResponse::from_result(
        state.controller.submit_detached(req.text),
    ))
}

/// PUT /input - replace the pending input text.
pub async fn update_input(
    State(state): State<AppState>,
    Json(req): Json<InputRequest>,
) -> Result<Json<InputResponse>, ApiError> {
    check_length(&req.text, state.config.chat.max_message_chars)?;
    state.controller.update_pending_text(req.text.clone());
    Ok(Json(InputResponse { text: req.text }))
}

/// PUT /attachment - set the pending image.
pub async fn put_attachment(
    State(state): State<AppState>,
    Json(req): Json<AttachmentRequest>,
) -> Result<Json<AttachmentResponse>, ApiError> {
    let data = base64::engine::general_purpose::STANDARD
        .decode(req.data.trim())
        .map_err(|e| ApiError::BadRequest(format!("attachment data is not base64: {}", e)))?;
    let size = data.len();
    state.controller.attach(data, req.media_type.clone())?;
    Ok(Json(AttachmentResponse {
        attached: true,
        media_type: req.media_type,
        size,
    }))
}

/// DELETE /attachment - drop the pending image.
pub async fn delete_attachment(State(state): State<AppState>) -> StatusCode {
    state.controller.clear_attachment();
    StatusCode::NO_CONTENT
}

/// POST /voice/start
pub async fn voice_start(State(state): State<AppState>) -> Json<VoiceResponse> {
    let outcome = state.voice.start();
    Json(VoiceResponse {
        outcome: Some(outcome),
        state: state.voice.state(),
    })
}

/// POST /voice/stop
pub async fn voice_stop(State(state): State<AppState>) -> Json<VoiceResponse> {
    state.voice.stop();
    Json(VoiceResponse {
        outcome: None,
        state: state.voice.state(),
    })
}

/// POST /voice/toggle
pub async fn voice_toggle(State(state): State<AppState>) -> Json<VoiceResponse> {
    Json(VoiceResponse {
        outcome: None,
        state: state.voice.toggle(),
    })
}

/// POST /voice/events - results from a front-end recognizer.
pub async fn voice_event(
    State(state): State<AppState>,
    Json(req): Json<VoiceEventRequest>,
) -> Result<Json<VoiceResponse>, ApiError> {
    let event = req.into_event()?;
    state.voice.handle_event(event);
    Ok(Json(VoiceResponse {
        outcome: None,
        state: state.voice.state(),
    }))
}

/// POST /bridge - relay a raw host message.
pub async fn bridge_message(
    State(state): State<AppState>,
    Json(message): Json<Value>,
) -> Result<(StatusCode, Json<BridgeResponse>), ApiError> {
    let outcome = state.bridge.deliver(message).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(BridgeResponse {
            accepted: outcome.is_accepted(),
            outcome,
        }),
    ))
}

/// POST /quick-actions/{action}
pub async fn quick_action(
    State(state): State<AppState>,
    Path(action): Path<String>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let action: QuickAction = action.parse().map_err(ApiError::NotFound)?;
    Ok(SubmitResponse::from_result(action.trigger(&state.controller)))
}

/// POST /index - credit an indexing run and announce it.
pub async fn index(State(state): State<AppState>) -> (StatusCode, Json<IndexResponse>) {
    let (indexed_files, result) = index_files(&state.controller);
    let (status, Json(submission)) = SubmitResponse::from_result(result);
    (
        status,
        Json(IndexResponse {
            indexed_files,
            submission,
        }),
    )
}

/// GET /stream - SSE event stream.
pub async fn stream(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>> + Send> {
    let rx = state.controller.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(event) => {
            let data = serde_json::to_string(&event).unwrap_or_default();
            Some(Ok(Event::default().event(event.event_name()).data(data)))
        }
        Err(e) => {
            tracing::warn!(error = %e, "SSE subscriber lagged");
            None
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

fn check_length(text: &str, limit: usize) -> Result<(), ApiError> {
    let size = text.chars().count();
    if size > limit {
        return Err(ApiError::PayloadTooLarge { size, limit });
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
