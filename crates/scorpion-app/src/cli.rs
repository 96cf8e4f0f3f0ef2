//! CLI argument definitions for the Scorpion application.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

use scorpion_core::config::ScorpionConfig;

/// Black Scorpion - a diagnostic conversation console with a host bridge.
#[derive(Parser, Debug)]
#[command(name = "scorpion", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// API server port.
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Treat the process as embedded in a host, whatever the probe says.
    #[arg(long = "embedded", conflicts_with = "standalone")]
    pub embedded: bool,

    /// Treat the process as standalone, whatever the probe says.
    #[arg(long = "standalone")]
    pub standalone: bool,

    /// Read host messages as JSON lines from stdin.
    #[arg(long = "stdio")]
    pub stdio: bool,

    /// Queue up to N host captures while a request is in flight.
    #[arg(long = "backlog")]
    pub backlog: Option<usize>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > SCORPION_CONFIG env var > ~/.scorpion/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("SCORPION_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the API server port.
    ///
    /// Priority: --port flag > SCORPION_PORT env var > config file value > 3040.
    pub fn resolve_port(&self, config_port: u16) -> u16 {
        if let Some(p) = self.port {
            return p;
        }
        if let Ok(val) = std::env::var("SCORPION_PORT") {
            if let Ok(p) = val.parse::<u16>() {
                return p;
            }
        }
        if config_port != 0 {
            return config_port;
        }
        3040
    }

    /// Forced embedding context, if any flag was given.
    pub fn forced_embedding(&self) -> Option<bool> {
        if self.embedded {
            Some(true)
        } else if self.standalone {
            Some(false)
        } else {
            None
        }
    }

    /// Fold CLI overrides into the loaded configuration.
    pub fn apply(&self, config: &mut ScorpionConfig) {
        config.general.port = self.resolve_port(config.general.port);
        if let Some(ref level) = self.log_level {
            config.general.log_level = level.clone();
        }
        if self.stdio {
            config.bridge.stdio = true;
        }
        if let Some(backlog) = self.backlog {
            config.bridge.backlog_capacity = backlog;
        }
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".scorpion").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".scorpion").join("config.toml");
    }
    PathBuf::from("config.toml")
}
