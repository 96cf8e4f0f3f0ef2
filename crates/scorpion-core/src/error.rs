use thiserror::Error;

/// Top-level error type for the Scorpion system.
///
/// Subsystem crates define their own error types and implement
/// `From<SubsystemError> for ScorpionError` where the `?` operator has to
/// cross a crate boundary.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ScorpionError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Chat error: {0}")]
    Chat(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Voice error: {0}")]
    Voice(String),

    #[error("Bridge error: {0}")]
    Bridge(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Payload too large: {size} bytes exceeds {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },
}

impl From<toml::de::Error> for ScorpionError {
    fn from(err: toml::de::Error) -> Self {
        ScorpionError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for ScorpionError {
    fn from(err: toml::ser::Error) -> Self {
        ScorpionError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for ScorpionError {
    fn from(err: serde_json::Error) -> Self {
        ScorpionError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Scorpion operations.
pub type Result<T> = std::result::Result<T, ScorpionError>;
