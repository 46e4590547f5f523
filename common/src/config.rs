use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub stream: StreamConfig,
    pub classifier: ClassifierConfig,
    pub actuator: ActuatorConfig,
    #[serde(default)]
    pub consumer: ConsumerConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    pub url: String,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_quality")]
    pub quality: u32,
    #[serde(default = "default_fps")]
    pub fps: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    pub url: String,
    #[serde(default = "default_classifier_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_min_detection_confidence")]
    pub min_detection_confidence: f32,
    #[serde(default = "default_max_hands")]
    pub max_hands: usize,
    #[serde(default = "default_mirror")]
    pub mirror: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActuatorConfig {
    pub url: String,
    #[serde(default = "default_actuator_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsumerConfig {
    #[serde(default = "default_idle_wait_ms")]
    pub idle_wait_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreviewConfig {
    #[serde(default = "default_preview_enabled")]
    pub enabled: bool,
    #[serde(default = "default_preview_bind")]
    pub bind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            idle_wait_ms: default_idle_wait_ms(),
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            enabled: default_preview_enabled(),
            bind: default_preview_bind(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Stream modes understood by the producer.
pub const STREAM_MODES: &[&str] = &["mjpeg", "polling", "rtsp"];

/// Bounds on `stream.fps`; the polling interval is `1 / fps`.
pub const MIN_FPS: f64 = 0.001;
pub const MAX_FPS: f64 = 1000.0;

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !STREAM_MODES.contains(&self.stream.mode.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "unknown stream mode '{}', expected one of {:?}",
                self.stream.mode, STREAM_MODES
            )));
        }
        if !(MIN_FPS..=MAX_FPS).contains(&self.stream.fps) {
            return Err(ConfigError::Invalid(format!(
                "stream.fps must be within [{MIN_FPS}, {MAX_FPS}], got {}",
                self.stream.fps
            )));
        }
        if self.actuator.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "actuator.timeout_ms must be greater than zero".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.classifier.min_detection_confidence) {
            return Err(ConfigError::Invalid(format!(
                "classifier.min_detection_confidence must be within [0, 1], got {}",
                self.classifier.min_detection_confidence
            )));
        }
        Ok(())
    }
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl ActuatorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl ConsumerConfig {
    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_mode() -> String {
    "mjpeg".into()
}
fn default_quality() -> u32 {
    80
}
fn default_fps() -> f64 {
    10.0
}
fn default_classifier_timeout_ms() -> u64 {
    500
}
fn default_min_detection_confidence() -> f32 {
    0.5
}
fn default_max_hands() -> usize {
    2
}
fn default_mirror() -> bool {
    true
}
fn default_actuator_timeout_ms() -> u64 {
    1000
}
fn default_idle_wait_ms() -> u64 {
    5
}
fn default_preview_enabled() -> bool {
    true
}
fn default_preview_bind() -> String {
    "127.0.0.1:8090".into()
}
fn default_log_level() -> String {
    "info".into()
}
