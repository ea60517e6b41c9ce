use mediaforge_av::{FormatPresets, QuirkTable};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default identity for outgoing requests, also handed to ffmpeg.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    /// Overrides and additions to the built-in quirk table
    #[serde(default)]
    pub quirks: QuirkTable,

    /// Overrides and additions to the built-in format presets
    #[serde(default)]
    pub presets: FormatPresets,
}

impl Config {
    /// Built-in quirks with this config's overrides applied
    pub fn quirk_table(&self) -> QuirkTable {
        QuirkTable::builtin().merged(self.quirks.clone())
    }

    /// Built-in presets with this config's overrides applied
    pub fn format_presets(&self) -> FormatPresets {
        FormatPresets::builtin().merged(self.presets.clone())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// API key required to register streams (used with Authorization: Bearer header)
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    9000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamConfig {
    /// User agent for origin fetches and ffmpeg inputs
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum redirects followed by origin fetches
    #[serde(default = "default_redirect_limit")]
    pub redirect_limit: usize,

    /// Seconds between SIGTERM and SIGKILL when stopping ffmpeg
    #[serde(default = "default_kill_grace_secs")]
    pub kill_grace_secs: u64,

    /// Seconds a registered stream stays valid
    #[serde(default = "default_lifespan_secs")]
    pub lifespan_secs: u64,

    /// Allow a registered stream to be fetched more than once
    #[serde(default)]
    pub reusable: bool,

    /// nice value for ffmpeg (falls back to PROCESSING_PRIORITY)
    #[serde(default)]
    pub processing_priority: Option<i32>,
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}
fn default_redirect_limit() -> usize {
    16
}
fn default_kill_grace_secs() -> u64 {
    5
}
fn default_lifespan_secs() -> u64 {
    90
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            redirect_limit: default_redirect_limit(),
            kill_grace_secs: default_kill_grace_secs(),
            lifespan_secs: default_lifespan_secs(),
            reusable: false,
            processing_priority: None,
        }
    }
}

impl StreamConfig {
    pub fn kill_grace(&self) -> Duration {
        Duration::from_secs(self.kill_grace_secs)
    }

    pub fn lifespan(&self) -> Duration {
        Duration::from_secs(self.lifespan_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolsConfig {
    /// Explicit ffmpeg binary; looked up on PATH when unset
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.stream.redirect_limit, 16);
        assert_eq!(config.stream.kill_grace(), Duration::from_secs(5));
        assert_eq!(config.stream.user_agent, DEFAULT_USER_AGENT);
        assert!(config.quirks.services.is_empty());
    }

    #[test]
    fn test_partial_sections_use_defaults() {
        let config: Config = toml::from_str(
            r#"
            [stream]
            reusable = true

            [quirks.services.example]
            non_seekable = true
            "#,
        )
        .unwrap();
        assert!(config.stream.reusable);
        assert_eq!(config.stream.lifespan_secs, 90);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(config.quirks.service("example").unwrap().non_seekable);
    }
}
