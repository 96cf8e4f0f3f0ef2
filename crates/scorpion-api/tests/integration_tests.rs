//! Integration tests for the Scorpion API.
//!
//! Every route is exercised through the full router with a mock gateway.
//! Each test builds its own state, controller and bridge listener.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tokio::sync::Notify;
use tower::ServiceExt;

use scorpion_api::create_router;
use scorpion_api::state::AppState;
use scorpion_chat::{
    ConversationController, EmbeddingContext, GatewayError, GatewayRequest, HostBridgeListener,
    RemoteRecognizer, RequestGateway, TranscriptionAdapter,
};
use scorpion_core::config::ScorpionConfig;
use scorpion_core::types::{GatewayReply, UPLINK_FAILURE_TEXT};

// =============================================================================
// Helpers
// =============================================================================

/// Echoes the prompt back, optionally waiting for a release first.
struct MockGateway {
    gate: Option<Notify>,
    fail: bool,
    calls: AtomicUsize,
}

impl MockGateway {
    fn echo() -> Arc<Self> {
        Arc::new(Self {
            gate: None,
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    fn gated() -> Arc<Self> {
        Arc::new(Self {
            gate: Some(Notify::new()),
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            gate: None,
            fail: true,
            calls: AtomicUsize::new(0),
        })
    }

    fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }
}

#[async_trait]
impl RequestGateway for MockGateway {
    async fn solve(&self, request: GatewayRequest) -> Result<GatewayReply, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail {
            return Err(GatewayError::Status {
                status: 429,
                body: "RESOURCE_EXHAUSTED quota for key AIza-secret".to_string(),
            });
        }
        Ok(GatewayReply::text(format!("ack: {}", request.text)))
    }
}

fn make_state(gateway: Arc<MockGateway>) -> AppState {
    make_state_with(gateway, ScorpionConfig::default())
}

/// Must run inside a tokio runtime; the bridge listener is spawned.
fn make_state_with(gateway: Arc<MockGateway>, config: ScorpionConfig) -> AppState {
    let controller = ConversationController::new(
        gateway,
        EmbeddingContext::Standalone,
        config.chat.max_attachment_bytes,
    );
    let recognizer = RemoteRecognizer::new(controller.clone(), config.voice.language.clone());
    let voice = TranscriptionAdapter::new(controller.clone(), Some(Arc::new(recognizer)));
    let (listener, bridge, rx) = HostBridgeListener::channel(
        controller.clone(),
        config.bridge.capture_prefix.clone(),
        config.bridge.backlog_capacity,
        16,
    );
    tokio::spawn(listener.run(rx));
    AppState::new(config, controller, voice, bridge)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::post(uri).body(Body::empty()).unwrap()
}

fn send_json(method: &str, uri: &str, json: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn wait_idle(state: &AppState) {
    let mut busy = state.controller.subscribe_busy();
    tokio::time::timeout(Duration::from_secs(5), busy.wait_for(|b| !*b))
        .await
        .expect("request never settled")
        .unwrap();
}

// =============================================================================
// Health and state
// =============================================================================

#[tokio::test]
async fn test_health() {
    let state = make_state(MockGateway::echo());
    let resp = create_router(state).oneshot(get("/health")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["message_count"], 0);
    assert_eq!(json["busy"], false);
}

#[tokio::test]
async fn test_state_reports_placeholder_and_voice() {
    let state = make_state(MockGateway::echo());
    let resp = create_router(state).oneshot(get("/state")).await.unwrap();

    let json = body_json(resp).await;
    assert_eq!(json["busy"], false);
    assert_eq!(json["embedded"], false);
    assert_eq!(json["placeholder"], "Enter command or paste diagnostic logs...");
    assert_eq!(json["voice_capability"], "available");
    assert_eq!(json["voice_state"], "idle");
}

// =============================================================================
// Messages
// =============================================================================

#[tokio::test]
async fn test_submit_and_read_history() {
    let state = make_state(MockGateway::echo());
    let app = create_router(state.clone());

    let resp = app
        .clone()
        .oneshot(send_json("POST", "/messages", json!({"text": "Hello"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let json = body_json(resp).await;
    assert_eq!(json["status"], "accepted");
    assert!(json["message_id"].is_string());

    wait_idle(&state).await;

    let resp = app.oneshot(get("/messages")).await.unwrap();
    let json = body_json(resp).await;
    let messages = json["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[0]["text"], "Hello");
    assert_eq!(messages[1]["role"], "model");
    assert_eq!(messages[1]["text"], "ack: Hello");
}

#[tokio::test]
async fn test_empty_submit_is_ignored() {
    let gateway = MockGateway::echo();
    let state = make_state(gateway.clone());
    let resp = create_router(state.clone())
        .oneshot(send_json("POST", "/messages", json!({"text": "   "})))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["status"], "ignored");
    assert_eq!(json["reason"], "empty");
    assert_eq!(state.controller.message_count(), 0);
    assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_submit_while_busy_is_ignored() {
    let gateway = MockGateway::gated();
    let state = make_state(gateway.clone());
    let app = create_router(state.clone());

    let resp = app
        .clone()
        .oneshot(send_json("POST", "/messages", json!({"text": "A"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let resp = app
        .oneshot(send_json("POST", "/messages", json!({"text": "B"})))
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["status"], "ignored");
    assert_eq!(json["reason"], "busy");

    gateway.release();
    wait_idle(&state).await;

    let texts: Vec<_> = state
        .controller
        .history()
        .into_iter()
        .map(|m| m.text)
        .collect();
    assert_eq!(texts, vec!["A", "ack: A"]);
    assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_submit_uses_pending_input() {
    let state = make_state(MockGateway::echo());
    let app = create_router(state.clone());

    let resp = app
        .clone()
        .oneshot(send_json("PUT", "/input", json!({"text": "why is port 3040 taken"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .oneshot(send_json("POST", "/messages", json!({})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    wait_idle(&state).await;

    assert_eq!(state.controller.history()[0].text, "why is port 3040 taken");
    assert_eq!(state.controller.pending_text(), "");
}

#[tokio::test]
async fn test_message_over_limit_rejected() {
    let mut config = ScorpionConfig::default();
    config.chat.max_message_chars = 10;
    let state = make_state_with(MockGateway::echo(), config);

    let resp = create_router(state.clone())
        .oneshot(send_json(
            "POST",
            "/messages",
            json!({"text": "this is far too long"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let json = body_json(resp).await;
    assert_eq!(json["error"], "payload_too_large");
    assert_eq!(state.controller.message_count(), 0);
}

#[tokio::test]
async fn test_gateway_failure_does_not_leak_details() {
    let state = make_state(MockGateway::failing());
    let app = create_router(state.clone());

    app.clone()
        .oneshot(send_json("POST", "/messages", json!({"text": "Hello"})))
        .await
        .unwrap();
    wait_idle(&state).await;

    let resp = app.oneshot(get("/messages")).await.unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["messages"][1]["role"], "model");
    assert_eq!(json["messages"][1]["text"], UPLINK_FAILURE_TEXT);
    assert!(!json.to_string().contains("AIza-secret"));
}

// =============================================================================
// Attachments
// =============================================================================

#[tokio::test]
async fn test_attachment_lifecycle() {
    let state = make_state(MockGateway::echo());
    let app = create_router(state.clone());

    // "iVBORw==" decodes to the first four PNG signature bytes.
    let resp = app
        .clone()
        .oneshot(send_json(
            "PUT",
            "/attachment",
            json!({"data": "iVBORw==", "media_type": "image/png"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["attached"], true);
    assert_eq!(json["size"], 4);
    assert!(state.controller.pending_attachment().is_some());

    let resp = app
        .clone()
        .oneshot(
            Request::delete("/attachment")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(state.controller.pending_attachment().is_none());
}

#[tokio::test]
async fn test_image_only_submit() {
    let state = make_state(MockGateway::echo());
    let app = create_router(state.clone());

    app.clone()
        .oneshot(send_json(
            "PUT",
            "/attachment",
            json!({"data": "iVBORw==", "mimeType": "image/png"}),
        ))
        .await
        .unwrap();
    let resp = app
        .oneshot(send_json("POST", "/messages", json!({})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    wait_idle(&state).await;

    let history = state.controller.history();
    assert_eq!(history[0].text, "[IMAGE_PAYLOAD_ATTACHED]");
    assert!(history[0].image.is_some());
    assert!(state.controller.pending_attachment().is_none());
}

#[tokio::test]
async fn test_attachment_validation() {
    let state = make_state(MockGateway::echo());
    let app = create_router(state);

    let resp = app
        .clone()
        .oneshot(send_json(
            "PUT",
            "/attachment",
            json!({"data": "not base64!!", "media_type": "image/png"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .oneshot(send_json(
            "PUT",
            "/attachment",
            json!({"data": "JVBERg==", "media_type": "application/pdf"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

// =============================================================================
// Voice
// =============================================================================

#[tokio::test]
async fn test_voice_flow_fills_pending_input() {
    let state = make_state(MockGateway::echo());
    let app = create_router(state.clone());

    let resp = app.clone().oneshot(post_empty("/voice/start")).await.unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["outcome"], "started");
    assert_eq!(json["state"], "listening");

    let resp = app
        .clone()
        .oneshot(send_json(
            "POST",
            "/voice/events",
            json!({"kind": "partial", "transcript": "restart the"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    app.clone()
        .oneshot(send_json(
            "POST",
            "/voice/events",
            json!({"kind": "partial", "transcript": "restart the daemon"}),
        ))
        .await
        .unwrap();
    assert_eq!(state.controller.pending_text(), "restart the daemon");
    assert_eq!(state.controller.message_count(), 0);

    let resp = app.oneshot(post_empty("/voice/stop")).await.unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["state"], "idle");
    assert!(!state.controller.is_listening());
}

#[tokio::test]
async fn test_voice_toggle_and_error_event() {
    let state = make_state(MockGateway::echo());
    let app = create_router(state.clone());

    let resp = app.clone().oneshot(post_empty("/voice/toggle")).await.unwrap();
    assert_eq!(body_json(resp).await["state"], "listening");

    let resp = app
        .clone()
        .oneshot(send_json(
            "POST",
            "/voice/events",
            json!({"kind": "error", "error": "not-allowed"}),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["state"], "idle");

    let resp = app
        .oneshot(send_json("POST", "/voice/events", json!({"kind": "partial"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// Host bridge
// =============================================================================

#[tokio::test]
async fn test_bridge_capture_submits_prefixed_text() {
    let state = make_state(MockGateway::echo());
    let app = create_router(state.clone());

    let resp = app
        .oneshot(send_json(
            "POST",
            "/bridge",
            json!({"type": "TERMINAL_ERROR_PAYLOAD", "data": "ModuleNotFoundError: requests"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let json = body_json(resp).await;
    assert_eq!(json["accepted"], true);
    assert_eq!(json["outcome"], "accepted");

    wait_idle(&state).await;
    let history = state.controller.history();
    assert_eq!(history.len(), 2);
    assert!(history[0]
        .text
        .starts_with("[TERMINAL_PULSE_CAPTURE] Analyzying terminal pulse:"));
    assert!(history[0].text.ends_with("ModuleNotFoundError: requests"));
}

#[tokio::test]
async fn test_bridge_capture_dropped_while_busy() {
    let gateway = MockGateway::gated();
    let state = make_state(gateway.clone());
    let app = create_router(state.clone());

    app.clone()
        .oneshot(send_json("POST", "/messages", json!({"text": "typed"})))
        .await
        .unwrap();

    let resp = app
        .oneshot(send_json(
            "POST",
            "/bridge",
            json!({"type": "TERMINAL_ERROR_PAYLOAD", "data": "panic"}),
        ))
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["accepted"], false);
    assert_eq!(json["outcome"], "dropped");

    gateway.release();
    wait_idle(&state).await;
    assert_eq!(state.controller.message_count(), 2);
}

#[tokio::test]
async fn test_bridge_ignores_unknown_messages() {
    let state = make_state(MockGateway::echo());
    let resp = create_router(state.clone())
        .oneshot(send_json("POST", "/bridge", json!({"type": "RESIZE", "cols": 80})))
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["outcome"], "ignored");
    assert_eq!(state.controller.message_count(), 0);
}

// =============================================================================
// Quick actions and indexing
// =============================================================================

#[tokio::test]
async fn test_quick_action_submits_prompt() {
    let state = make_state(MockGateway::echo());
    let resp = create_router(state.clone())
        .oneshot(post_empty("/quick-actions/configure-llm-nodes"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    wait_idle(&state).await;
    assert_eq!(
        state.controller.history()[0].text,
        "Initiate Qwen & Ollama Configuration Wizard."
    );
}

#[tokio::test]
async fn test_unknown_quick_action_is_not_found() {
    let state = make_state(MockGateway::echo());
    let resp = create_router(state)
        .oneshot(post_empty("/quick-actions/self-destruct"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(resp).await["error"], "not_found");
}

#[tokio::test]
async fn test_index_counts_files() {
    let state = make_state(MockGateway::echo());
    let resp = create_router(state.clone())
        .oneshot(post_empty("/index"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let json = body_json(resp).await;
    assert_eq!(json["indexed_files"], 5);
    assert_eq!(json["status"], "accepted");
    wait_idle(&state).await;
    assert_eq!(state.controller.indexed_files(), 5);
}

// =============================================================================
// Streaming
// =============================================================================

#[tokio::test]
async fn test_stream_is_event_stream() {
    let state = make_state(MockGateway::echo());
    let resp = create_router(state).oneshot(get("/stream")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let content_type = resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/event-stream"));
}
