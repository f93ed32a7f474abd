//! Application configuration.
//!
//! Read from a JSON file; every section and field is optional:
//!
//! ```json
//! {
//!   "model": {
//!     "runner": "/usr/local/bin/tflite-runner",
//!     "model": "assets/mobilenet_quant_v1_224.tflite",
//!     "labels": "assets/labels.txt",
//!     "top_k": 3
//!   },
//!   "camera": { "type": "still", "path": "assets/pictures" },
//!   "button": { "pin": 21 },
//!   "failure_policy": "suppress",
//!   "snapshot": "/run/classifier/last.jpg"
//! }
//! ```

use crate::camera::CameraConfig;
use crate::controller::{ControllerConfig, FailurePolicy};
use crate::engine::RunnerConfig;
use crate::error::ConfigError;
use crate::input::ButtonConfig;
use crate::ranker::DEFAULT_TOP_K;
use crate::sensors::iio::{DEFAULT_DEVICE_NAMES, DEFAULT_IIO_ROOT};
use crate::types::InputShape;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Model, labels and the runner that executes the model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Runner executable wrapping the interpreter
    pub runner: PathBuf,
    /// Quantized model file
    pub model: PathBuf,
    /// One label per line, aligned with the model outputs
    pub labels: PathBuf,
    /// Input tensor the model expects
    pub input: InputShape,
    /// Number of recognitions shown per picture
    pub top_k: usize,
    /// Runner startup and per-inference timeout
    pub timeout_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            runner: PathBuf::from("tflite-runner"),
            model: PathBuf::from("assets/mobilenet_quant_v1_224.tflite"),
            labels: PathBuf::from("assets/labels.txt"),
            input: InputShape::default(),
            top_k: DEFAULT_TOP_K,
            timeout_ms: 10_000,
        }
    }
}

impl ModelConfig {
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            runner: self.runner.clone(),
            model: self.model.clone(),
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub enabled: bool,
    /// Directory holding the IIO devices
    pub iio_root: PathBuf,
    /// Driver names accepted as the environmental sensor
    pub device_names: Vec<String>,
    pub poll_ms: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            iio_root: PathBuf::from(DEFAULT_IIO_ROOT),
            device_names: DEFAULT_DEVICE_NAMES.iter().map(|s| s.to_string()).collect(),
            poll_ms: 1000,
        }
    }
}

impl SensorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub camera: CameraConfig,
    /// Push-button wiring; no button when absent
    pub button: Option<ButtonConfig>,
    /// Trigger on Enter
    pub keyboard: bool,
    pub sensors: SensorConfig,
    pub failure_policy: FailurePolicy,
    /// First line of the environment summary
    pub greeting: Option<String>,
    /// Where to keep the last picture taken (`.png` or `.jpg`)
    pub snapshot: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            camera: CameraConfig::default(),
            button: None,
            keyboard: true,
            sensors: SensorConfig::default(),
            failure_policy: FailurePolicy::default(),
            greeting: None,
            snapshot: None,
        }
    }
}

impl AppConfig {
    /// Parse and validate a configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&text)?;
        config.validate()?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let input = self.model.input;
        if input.width == 0 || input.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "model input must not be zero-sized, got {input}"
            )));
        }
        if input.channels != 1 && input.channels != 3 {
            return Err(ConfigError::Invalid(format!(
                "model input must have 1 or 3 channels, got {}",
                input.channels
            )));
        }
        if self.model.top_k == 0 {
            return Err(ConfigError::Invalid("top_k must be at least 1".to_string()));
        }
        if self.model.timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeout_ms must be positive".to_string()));
        }
        if self.sensors.enabled && self.sensors.poll_ms == 0 {
            return Err(ConfigError::Invalid(
                "sensors.poll_ms must be positive".to_string(),
            ));
        }
        if let Some(path) = &self.snapshot {
            let extension = path
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_ascii_lowercase);
            if !matches!(extension.as_deref(), Some("png" | "jpg" | "jpeg")) {
                return Err(ConfigError::Invalid(format!(
                    "snapshot must be a .png or .jpg file, got {}",
                    path.display()
                )));
            }
        }
        if let Some(button) = &self.button {
            if button.debounce_ms == 0 || button.poll_ms == 0 {
                return Err(ConfigError::Invalid(
                    "button debounce_ms and poll_ms must be positive".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            top_k: self.model.top_k,
            failure_policy: self.failure_policy,
            snapshot: self.snapshot.clone(),
        }
    }
}
