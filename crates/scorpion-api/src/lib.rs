//! Scorpion API crate - axum HTTP server, route handlers, SSE streaming.
//!
//! Exposes the conversation controller to a front-end: submitting prompts,
//! editing pending input and attachments, driving voice capture, relaying
//! host bridge messages, and streaming every conversation event.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
