//! Configuration management for CrabView
//!
//! Configuration is read from a TOML file and layered under environment
//! overrides (`CRABVIEW__SESSION__QUIESCENCE_DELAY_MS=500`). Missing keys
//! fall back to the defaults below.

use crate::directory::StaticDeviceDirectory;
use crate::errors::ConfigError;
use crate::types::{DeviceId, StreamPath};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "CRABVIEW";

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrabViewConfig {
    pub session: SessionConfig,
    pub render: RenderConfig,
    pub synthetic: SyntheticConfig,
    pub devices: Vec<DeviceEntry>,
}

/// Session switching behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Pause after disposing an engine before building the next one
    pub quiescence_delay_ms: u64,
    /// Upper bound on the signaling offer/answer exchange
    pub signaling_timeout_ms: u64,
}

/// Shared rendering context settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub context_label: String,
}

/// Synthetic engine used by the CLI and tests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub frame_width: u32,
    pub frame_height: u32,
    pub fps: u32,
}

/// One camera known to the static directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub id: DeviceId,
    pub app: String,
    pub stream: String,
    #[serde(rename = "type", default = "default_stream_kind")]
    pub kind: String,
}

fn default_stream_kind() -> String {
    "play".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            quiescence_delay_ms: 800,
            signaling_timeout_ms: 10_000,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            context_label: "shared-egl".to_string(),
        }
    }
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            frame_width: 320,
            frame_height: 240,
            fps: 15,
        }
    }
}

impl SessionConfig {
    pub fn quiescence_delay(&self) -> Duration {
        Duration::from_millis(self.quiescence_delay_ms)
    }

    pub fn signaling_timeout(&self) -> Duration {
        Duration::from_millis(self.signaling_timeout_ms)
    }
}

impl SyntheticConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.fps.max(1)))
    }
}

impl DeviceEntry {
    pub fn new(id: impl Into<String>, app: impl Into<String>, stream: impl Into<String>) -> Self {
        Self {
            id: DeviceId::new(id),
            app: app.into(),
            stream: stream.into(),
            kind: default_stream_kind(),
        }
    }

    pub fn stream_path(&self) -> StreamPath {
        StreamPath::new(self.app.clone(), self.stream.clone(), self.kind.clone())
    }
}

impl CrabViewConfig {
    /// Load configuration from a TOML file plus `CRABVIEW__*` overrides
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::load_layered(path, ENV_PREFIX)
    }

    /// Load with a custom environment prefix
    pub fn load_layered<P: AsRef<Path>>(path: P, env_prefix: &str) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
        }

        let settings = config::Config::builder()
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: CrabViewConfig = settings.try_deserialize()?;
        log::info!(
            "Loaded configuration from {:?} ({} devices)",
            path,
            config.devices.len()
        );
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let toml_string = toml::to_string_pretty(self)?;
        fs::write(path, toml_string)?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("crabview.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Build the in-memory directory from the `[[devices]]` table
    pub fn device_directory(&self) -> StaticDeviceDirectory {
        StaticDeviceDirectory::from_entries(
            self.devices
                .iter()
                .map(|entry| (entry.id.clone(), entry.stream_path())),
        )
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.quiescence_delay_ms > 10_000 {
            return Err(ConfigError::Invalid(
                "Quiescence delay must be at most 10000 ms".to_string(),
            ));
        }
        if !(100..=120_000).contains(&self.session.signaling_timeout_ms) {
            return Err(ConfigError::Invalid(
                "Signaling timeout must be between 100 and 120000 ms".to_string(),
            ));
        }

        if self.render.context_label.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "Render context label must not be empty".to_string(),
            ));
        }

        let synthetic = &self.synthetic;
        if synthetic.frame_width == 0 || synthetic.frame_height == 0 {
            return Err(ConfigError::Invalid("Invalid synthetic frame size".to_string()));
        }
        if synthetic.frame_width % 2 != 0 || synthetic.frame_height % 2 != 0 {
            return Err(ConfigError::Invalid(
                "Synthetic frame size must be even for I420".to_string(),
            ));
        }
        if synthetic.fps == 0 || synthetic.fps > 120 {
            return Err(ConfigError::Invalid(
                "Synthetic FPS must be between 1 and 120".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for entry in &self.devices {
            if entry.id.as_str().trim().is_empty() {
                return Err(ConfigError::Invalid("Device id must not be empty".to_string()));
            }
            if !seen.insert(entry.id.clone()) {
                return Err(ConfigError::Invalid(format!("Duplicate device id {}", entry.id)));
            }
            if !entry.stream_path().is_usable() {
                return Err(ConfigError::Invalid(format!(
                    "Device {} has no usable stream path",
                    entry.id
                )));
            }
        }

        Ok(())
    }
}
