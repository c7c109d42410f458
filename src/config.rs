//! Player configuration with JSON persistence.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::Backend;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("Failed to read config: {0}")]
  Read(#[from] std::io::Error),
  #[error("Failed to parse config: {0}")]
  Parse(#[from] serde_json::Error),
  #[error("Invalid config: {0}")]
  Invalid(String),
}

/// Player configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerConfig {
  /// Backend variant to drive.
  #[serde(default)]
  pub backend: Backend,

  /// Custom executable path (None = auto-detect).
  #[serde(default)]
  pub player_path: Option<PathBuf>,

  /// Audio device passed as `--audiodevice`.
  #[serde(default)]
  pub audio_device: Option<String>,

  /// Additional command-line arguments, placed before the remote-control flag.
  #[serde(default)]
  pub extra_args: Vec<String>,

  /// Send `SILENCE` after start so mpg123 stops reporting every frame.
  #[serde(default = "default_performance_mode")]
  pub performance_mode: bool,

  /// Pass `--rva-mix` (mpg123 only).
  #[serde(default)]
  pub rva_mix: bool,

  /// Idle timeout for status reads in milliseconds (None = wait forever).
  #[serde(default)]
  pub read_timeout_ms: Option<u64>,

  /// End the reader loop when the backend reports an error.
  #[serde(default = "default_stop_on_backend_error")]
  pub stop_on_backend_error: bool,
}

fn default_performance_mode() -> bool {
  true
}

fn default_stop_on_backend_error() -> bool {
  true
}

impl Default for PlayerConfig {
  fn default() -> Self {
    Self {
      backend: Backend::default(),
      player_path: None,
      audio_device: None,
      extra_args: Vec::new(),
      performance_mode: default_performance_mode(),
      rva_mix: false,
      read_timeout_ms: None,
      stop_on_backend_error: default_stop_on_backend_error(),
    }
  }
}

impl PlayerConfig {
  /// Default configuration for the given backend.
  pub fn for_backend(backend: Backend) -> Self {
    Self {
      backend,
      ..Self::default()
    }
  }

  /// Parse a JSON configuration. Missing fields take their defaults.
  pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
    let config: Self = serde_json::from_str(json)?;
    config.validate().map_err(ConfigError::Invalid)?;
    Ok(config)
  }

  /// Load a JSON configuration file.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let json = std::fs::read_to_string(path)?;
    Self::from_json_str(&json)
  }

  /// Idle timeout for status reads.
  pub fn read_timeout(&self) -> Option<Duration> {
    self.read_timeout_ms.map(Duration::from_millis)
  }

  /// Validate configuration values.
  pub fn validate(&self) -> Result<(), String> {
    if let Some(path) = &self.player_path {
      if path.as_os_str().is_empty() {
        return Err("Player path cannot be empty".to_string());
      }
    }
    if let Some(device) = &self.audio_device {
      if device.trim().is_empty() {
        return Err("Audio device cannot be empty".to_string());
      }
    }
    if self.rva_mix && !self.backend.is_extended() {
      return Err(format!("--rva-mix is not supported by {}", self.backend));
    }
    if self.read_timeout_ms == Some(0) {
      return Err("Read timeout must be at least 1 millisecond".to_string());
    }
    if self.extra_args.iter().any(|arg| arg == "-R" || arg == "--remote") {
      return Err("Remote-control mode is always enabled, do not pass -R".to_string());
    }
    Ok(())
  }
}
