//! Configuration management for Cardsmith.
//!
//! Handles loading and saving configuration from TOML files.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::credentials::{DEFAULT_API_KEY_VARS, SERVICE_NAME};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Image generation service settings
    pub gateway: GatewayConfig,

    /// API key handling
    pub credentials: CredentialsConfig,

    /// Where generated cards are written
    pub output: OutputConfig,
}

/// Image generation service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Base URL of the Gemini API
    pub endpoint: String,

    /// Image model used for generation and edits
    pub model: String,

    /// Lightweight model used to test API keys
    pub validation_model: String,

    /// HTTP timeout for a single call, in seconds
    pub timeout_secs: u64,

    /// Environment variables consulted for an ambient API key, in order
    pub api_key_env: Vec<String>,
}

/// API key handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Keychain service name for the persisted key
    pub service: String,

    /// Whether to use the OS keychain; when false keys live only in memory
    pub use_keyring: bool,
}

/// Output settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for generated cards (defaults to the current directory)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns defaults when no config file exists.
    pub fn load() -> anyhow::Result<Self> {
        if let Some(path) = Self::config_path() {
            if path.exists() {
                tracing::debug!(path = %path.display(), "Loading config");
                return Self::load_from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> anyhow::Result<()> {
        let path =
            Self::config_path().ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        self.save_to_file(&path)
    }

    /// Save configuration to a specific file.
    pub fn save_to_file(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the configuration directory.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("cardsmith"))
    }

    /// Get the default config file path.
    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.toml"))
    }

    /// Directory generated cards are written to.
    pub fn output_dir(&self) -> PathBuf {
        self.output.directory.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-3-pro-image-preview".to_string(),
            validation_model: "gemini-2.5-flash".to_string(),
            timeout_secs: 120,
            api_key_env: DEFAULT_API_KEY_VARS.iter().map(|v| (*v).to_string()).collect(),
        }
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self { service: SERVICE_NAME.to_string(), use_keyring: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.gateway.model, "gemini-3-pro-image-preview");
        assert_eq!(config.gateway.timeout_secs, 120);
        assert_eq!(config.credentials.service, "cardsmith");
        assert!(config.credentials.use_keyring);
        assert_eq!(config.output_dir(), PathBuf::from("."));
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[gateway]"));
        assert!(toml.contains("validation_model"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
[gateway]
model = "gemini-custom-image"
timeout_secs = 30

[credentials]
use_keyring = false

[output]
directory = "/tmp/cards"
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.gateway.model, "gemini-custom-image");
        assert_eq!(config.gateway.timeout_secs, 30);
        // Unspecified fields keep their defaults
        assert_eq!(config.gateway.validation_model, "gemini-2.5-flash");
        assert!(!config.credentials.use_keyring);
        assert_eq!(config.output_dir(), PathBuf::from("/tmp/cards"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.gateway.api_key_env = vec!["MY_KEY".to_string()];
        config.save_to_file(&path).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded.gateway.api_key_env, vec!["MY_KEY".to_string()]);
    }
}
