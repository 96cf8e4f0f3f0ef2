//! Scorpion application binary - composition root.
//!
//! Ties together all Scorpion crates into a single executable:
//! 1. Parse CLI flags and load configuration from TOML
//! 2. Build the request gateway and the conversation controller
//! 3. Wire the transcription adapter and the host bridge listener
//! 4. Optionally pump host messages from stdin (JSON lines)
//! 5. Start the axum REST API server

mod cli;
mod stdio;

use std::sync::Arc;

use clap::Parser;

use scorpion_api::state::AppState;
use scorpion_api::start_server;
use scorpion_chat::{
    ConversationController, EmbeddingContext, GeminiGateway, HostBridgeListener,
    RemoteRecognizer, SpeechRecognizer, TranscriptionAdapter,
};
use scorpion_core::config::ScorpionConfig;

use crate::cli::CliArgs;

/// Host messages buffered between the transports and the listener.
const BRIDGE_BUFFER: usize = 32;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config. Loaded before tracing so the configured level applies; the
    // outcome is logged once the subscriber is up.
    let config_file = args.resolve_config_path();
    let loaded = if config_file.exists() {
        Some(ScorpionConfig::load(&config_file))
    } else {
        None
    };
    let mut config = match &loaded {
        Some(Ok(config)) => config.clone(),
        _ => ScorpionConfig::default(),
    };
    args.apply(&mut config);

    // Tracing, on stderr so stdout stays free for the stdio bridge.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .init();

    tracing::info!("Starting Scorpion v{}", env!("CARGO_PKG_VERSION"));
    match loaded {
        Some(Ok(_)) => tracing::info!(path = %config_file.display(), "Configuration loaded"),
        Some(Err(e)) => tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Failed to load config, using defaults"
        ),
        None => tracing::info!(path = %config_file.display(), "No config file, using defaults"),
    }
    config.validate()?;

    // Embedding context.
    let embedding = match args.forced_embedding() {
        Some(true) => EmbeddingContext::Embedded,
        Some(false) => EmbeddingContext::Standalone,
        None => EmbeddingContext::probe(),
    };
    tracing::info!(?embedding, "Embedding context resolved");

    // Gateway and controller.
    let gateway = GeminiGateway::from_config(&config.gateway)?;
    tracing::info!(model = %config.gateway.model, "Request gateway ready");
    let controller = ConversationController::new(
        Arc::new(gateway),
        embedding,
        config.chat.max_attachment_bytes,
    );

    // Voice.
    let recognizer: Option<Arc<dyn SpeechRecognizer>> = if config.voice.enabled {
        Some(Arc::new(
            RemoteRecognizer::new(controller.clone(), config.voice.language.clone())
                .with_interim_results(config.voice.interim_results),
        ))
    } else {
        None
    };
    let voice = TranscriptionAdapter::new(controller.clone(), recognizer);

    // === Background tasks ===

    // Host bridge listener.
    let (listener, bridge, bridge_rx) = HostBridgeListener::channel(
        controller.clone(),
        config.bridge.capture_prefix.clone(),
        config.bridge.backlog_capacity,
        BRIDGE_BUFFER,
    );
    tokio::spawn(listener.run(bridge_rx));

    // Stdio transport.
    if config.bridge.stdio {
        let stdio_bridge = bridge.clone();
        tokio::spawn(async move {
            let reader = tokio::io::BufReader::new(tokio::io::stdin());
            if let Err(e) = stdio::pump(reader, tokio::io::stdout(), stdio_bridge).await {
                tracing::error!(error = %e, "Stdio bridge failed");
            }
        });
        tracing::info!("Stdio host bridge enabled");
    }

    // === API server ===

    let port = config.general.port;
    let state = AppState::new(config, controller, voice, bridge);
    if let Err(e) = start_server(state).await {
        tracing::error!(port, error = %e, "API server stopped - is another instance running?");
        tracing::error!("Try: SCORPION_PORT={} cargo run -p scorpion-app", port.saturating_add(1));
        return Err(e.into());
    }

    Ok(())
}
