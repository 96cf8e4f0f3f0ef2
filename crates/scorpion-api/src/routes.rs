//! Router setup with all API routes and middleware.
//!
//! Configures the axum Router with CORS, tracing, compression,
//! and all endpoint handlers.

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use scorpion_core::error::ScorpionError;

use crate::handlers;
use crate::state::AppState;

/// Room for base64 overhead and the JSON envelope around an attachment.
const ENVELOPE_OVERHEAD: usize = 64 * 1024;

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    // Allow localhost origins on the configured port and the dev server port.
    let port = state.config.general.port;
    let dev_port = port.saturating_add(1);
    let origins: Vec<HeaderValue> = [port, dev_port]
        .iter()
        .flat_map(|p| [format!("http://127.0.0.1:{}", p), format!("http://localhost:{}", p)])
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    // Base64 inflates by 4/3.
    let body_limit = state.config.chat.max_attachment_bytes / 3 * 4 + ENVELOPE_OVERHEAD;

    let conversation_routes = Router::new()
        .route("/state", get(handlers::get_state))
        .route(
            "/messages",
            get(handlers::list_messages).post(handlers::submit_message),
        )
        .route("/input", put(handlers::update_input))
        .route(
            "/attachment",
            put(handlers::put_attachment).delete(handlers::delete_attachment),
        )
        .route("/quick-actions/{action}", post(handlers::quick_action))
        .route("/index", post(handlers::index));

    let voice_routes = Router::new()
        .route("/voice/start", post(handlers::voice_start))
        .route("/voice/stop", post(handlers::voice_stop))
        .route("/voice/toggle", post(handlers::voice_toggle))
        .route("/voice/events", post(handlers::voice_event));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/bridge", post(handlers::bridge_message))
        .route("/stream", get(handlers::stream))
        .merge(conversation_routes)
        .merge(voice_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server on the configured address.
///
/// Binds to 127.0.0.1 (localhost only) on the port from config.
pub async fn start_server(state: AppState) -> Result<(), ScorpionError> {
    let addr = format!("127.0.0.1:{}", state.config.general.port);
    let router = create_router(state);

    tracing::info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ScorpionError::Api(format!("Failed to bind: {}", e)))?;

    axum::serve(listener, router)
        .await
        .map_err(|e| ScorpionError::Api(format!("Server error: {}", e)))?;

    Ok(())
}
