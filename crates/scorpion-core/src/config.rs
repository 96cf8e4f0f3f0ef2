use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, ScorpionError};

/// Prefix prepended to terminal text injected by an embedding host.
pub const DEFAULT_CAPTURE_PREFIX: &str =
    "[TERMINAL_PULSE_CAPTURE] Analyzying terminal pulse:\n\n";

/// Top-level configuration for the Scorpion application.
///
/// Loaded from `~/.scorpion/config.toml` by default. Each section corresponds
/// to one component of the conversation pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScorpionConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
}

impl ScorpionConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ScorpionConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.chat.max_message_chars == 0 {
            return Err(ScorpionError::Config(
                "chat.max_message_chars must be greater than 0".to_string(),
            ));
        }
        if self.chat.max_attachment_bytes == 0 {
            return Err(ScorpionError::Config(
                "chat.max_attachment_bytes must be greater than 0".to_string(),
            ));
        }
        if self.gateway.model.trim().is_empty() {
            return Err(ScorpionError::Config(
                "gateway.model must not be empty".to_string(),
            ));
        }
        if !self.gateway.base_url.starts_with("http://")
            && !self.gateway.base_url.starts_with("https://")
        {
            return Err(ScorpionError::Config(format!(
                "gateway.base_url must be an http(s) URL, got '{}'",
                self.gateway.base_url
            )));
        }
        if self.bridge.capture_prefix.trim().is_empty() {
            return Err(ScorpionError::Config(
                "bridge.capture_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// API server port (0 means "use the built-in default").
    pub port: u16,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            port: 3040,
        }
    }
}

/// Conversation limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Maximum characters accepted for a single submitted message.
    pub max_message_chars: usize,
    /// Maximum size of a pending attachment in bytes.
    pub max_attachment_bytes: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_message_chars: 100_000,
            max_attachment_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Remote reasoning service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Base URL of the model endpoint collection.
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// System instruction sent with every request.
    pub system_instruction: String,
    /// Let the model ground answers with web search.
    pub search_grounding: bool,
    /// HTTP client timeout in seconds (0 disables it).
    pub request_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta/models".to_string(),
            model: "gemini-2.5-flash".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            system_instruction: "You are Black Scorpion, a senior diagnostics engineer. \
                Given an error report, log excerpt or screenshot, identify the root cause \
                and reply with a concise, step-by-step fix."
                .to_string(),
            search_grounding: true,
            request_timeout_secs: 120,
        }
    }
}

/// Voice input settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Whether a speech recognizer is offered at all.
    pub enabled: bool,
    /// BCP 47 language tag passed to the recognizer.
    pub language: String,
    /// Ask the recognizer for interim (partial) results.
    pub interim_results: bool,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            language: "en-US".to_string(),
            interim_results: true,
        }
    }
}

/// Host bridge settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Text prepended to every terminal capture before it is submitted.
    pub capture_prefix: String,
    /// Captures held while a request is in flight. 0 drops them instead.
    pub backlog_capacity: usize,
    /// Read host messages as JSON lines from stdin.
    pub stdio: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            capture_prefix: DEFAULT_CAPTURE_PREFIX.to_string(),
            backlog_capacity: 0,
            stdio: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = ScorpionConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.port, 3040);
        assert_eq!(config.gateway.model, "gemini-2.5-flash");
        assert_eq!(config.gateway.api_key_env, "GEMINI_API_KEY");
        assert!(config.voice.enabled);
        assert_eq!(config.voice.language, "en-US");
        assert_eq!(config.bridge.backlog_capacity, 0);
        assert_eq!(config.bridge.capture_prefix, DEFAULT_CAPTURE_PREFIX);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
[general]
log_level = "debug"
port = 4000

[gateway]
model = "gemini-2.5-pro"
search_grounding = false

[bridge]
backlog_capacity = 4
stdio = true
"#;
        let file = create_temp_config(content);
        let config = ScorpionConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.general.port, 4000);
        assert_eq!(config.gateway.model, "gemini-2.5-pro");
        assert!(!config.gateway.search_grounding);
        assert_eq!(config.bridge.backlog_capacity, 4);
        assert!(config.bridge.stdio);
        // Untouched fields keep their defaults.
        assert_eq!(config.gateway.api_key_env, "GEMINI_API_KEY");
        assert_eq!(config.chat.max_attachment_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let file = create_temp_config("");
        let config = ScorpionConfig::load(file.path()).unwrap();
        assert_eq!(config.general.port, 3040);
        assert_eq!(config.voice.language, "en-US");
    }

    #[test]
    fn test_load_invalid_toml() {
        let file = create_temp_config("[general\nport = ");
        let err = ScorpionConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ScorpionError::Config(_)));
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let file = create_temp_config("[gateway]\nbase_url = \"ftp://example.com\"\n");
        let err = ScorpionConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = ScorpionConfig::load_or_default(Path::new("/nonexistent/config.toml"));
        assert_eq!(config.general.log_level, "info");
    }

    #[test]
    fn test_save_creates_parent_dirs_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = ScorpionConfig::default();
        config.bridge.backlog_capacity = 2;
        config.save(&path).unwrap();

        let reloaded = ScorpionConfig::load(&path).unwrap();
        assert_eq!(reloaded.bridge.backlog_capacity, 2);
        assert_eq!(reloaded.bridge.capture_prefix, DEFAULT_CAPTURE_PREFIX);
        assert_eq!(reloaded.gateway.base_url, config.gateway.base_url);
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = ScorpionConfig::default();
        config.chat.max_message_chars = 0;
        assert!(config.validate().is_err());

        let mut config = ScorpionConfig::default();
        config.chat.max_attachment_bytes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_blank_model_and_prefix() {
        let mut config = ScorpionConfig::default();
        config.gateway.model = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = ScorpionConfig::default();
        config.bridge.capture_prefix = String::new();
        assert!(config.validate().is_err());
    }
}
