pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::ScorpionConfig;
pub use error::{Result, ScorpionError};
pub use events::{ConversationEvent, VoiceCommand};
pub use types::*;
