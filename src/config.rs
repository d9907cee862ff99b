//! Client configuration
//!
//! Loaded once at startup from the platform config directory and saved
//! back when the consumer changes something (typically the key mapping).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::constants;
use crate::error::{Error, Result};
use crate::input::{Button, KeyMapping};

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub audio: AudioConfig,
    pub video: VideoConfig,
    /// Physical key name → button
    pub keys: HashMap<String, Button>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Control/fallback WebSocket endpoint
    pub ws_url: String,
    /// STUN servers offered during peer negotiation
    pub stun_servers: Vec<String>,
    /// Timeout for server round-trips (create, save-state, ...)
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Jitter buffer ceiling in milliseconds
    pub jitter_ceiling_ms: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            ws_url: constants::DEFAULT_WS_URL.to_string(),
            stun_servers: vec![constants::DEFAULT_STUN_URL.to_string()],
            request_timeout_ms: 10_000,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            jitter_ceiling_ms: constants::DEFAULT_JITTER_CEILING_MS,
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: constants::CANVAS_WIDTH,
            height: constants::CANVAS_HEIGHT,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            audio: AudioConfig::default(),
            video: VideoConfig::default(),
            keys: KeyMapping::defaults().as_map().clone(),
        }
    }
}

impl AppConfig {
    /// Platform config file location, if one can be determined.
    pub fn config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "emustream")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from the config file, falling back to defaults on a missing or
    /// unreadable file.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        match std::fs::read_to_string(&path) {
            Ok(text) => match toml::from_str(&text) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "bad config file, using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Persist to the config file.
    pub fn save(&self) -> Result<()> {
        let path =
            Self::config_path().ok_or_else(|| Error::Config("no config directory".to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(&path, text)?;
        Ok(())
    }

    /// Build the key mapping this config describes.
    pub fn key_mapping(&self) -> KeyMapping {
        KeyMapping::new(self.keys.clone())
    }

    /// Make this config's key mapping the process-wide one.
    pub fn install_key_mapping(&self) {
        crate::input::install_mapping(self.key_mapping());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.audio.jitter_ceiling_ms, 80);
        assert_eq!(config.video.width, 240);
        assert_eq!(config.video.height, 160);
        assert!(!config.network.stun_servers.is_empty());
        assert_eq!(config.key_mapping().lookup("x"), Some(Button::A));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = AppConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let back: AppConfig = toml::from_str(&text).unwrap();

        assert_eq!(back.network.ws_url, config.network.ws_url);
        assert_eq!(back.keys, config.keys);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [network]
            ws_url = "ws://example.test/stream"
            "#,
        )
        .unwrap();

        assert_eq!(config.network.ws_url, "ws://example.test/stream");
        assert_eq!(config.network.request_timeout_ms, 10_000);
        assert_eq!(config.audio.jitter_ceiling_ms, 80);
    }
}
