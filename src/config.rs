//! Configuration for the step tracking agent.

use crate::collector::SensorAvailability;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path for the durable ledger and session statistics
    pub data_path: PathBuf,

    /// Which sensor kinds the host exposes
    pub sources: SourceConfig,

    /// Classifier, estimator and validator thresholds
    #[serde(default)]
    pub tuning: Tuning,

    /// Minimum time between rate-limited ledger writes
    #[serde(with = "duration_serde")]
    pub persist_interval: Duration,

    /// IANA timezone used for day rollover (device-local when absent)
    #[serde(default)]
    pub timezone: Option<String>,

    /// How often the idle worker re-checks the day rollover (in seconds)
    pub rollover_check_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("steptrack-agent");

        Self {
            data_path: data_dir,
            sources: SourceConfig::default(),
            tuning: Tuning::default(),
            persist_interval: Duration::from_secs(30),
            timezone: None,
            rollover_check_interval_secs: 60,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("steptrack-agent")
            .join("config.json")
    }

    /// Path of the durable ledger store.
    pub fn ledger_path(&self) -> PathBuf {
        self.data_path.join("ledger.json")
    }

    /// Path of the persisted session statistics.
    pub fn stats_path(&self) -> PathBuf {
        self.data_path.join("stats.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ref tz) = self.timezone {
            tz.parse::<chrono_tz::Tz>()
                .map_err(|_| ConfigError::ParseError(format!("unknown timezone '{tz}'")))?;
        }
        if self.persist_interval.is_zero() {
            return Err(ConfigError::ParseError(
                "persist_interval must be at least one second".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for which sensor kinds to register.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub step_counter: bool,
    pub accelerometer: bool,
    pub gyroscope: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            step_counter: true,
            accelerometer: true,
            gyroscope: true,
        }
    }
}

impl SourceConfig {
    /// Parse source configuration from a comma-separated string.
    pub fn from_csv(s: &str) -> Self {
        let sources: Vec<String> = s.split(',').map(|s| s.trim().to_lowercase()).collect();
        let has = |name: &str| sources.iter().any(|s| s == name || s == "all");

        Self {
            step_counter: has("step_counter"),
            accelerometer: has("accelerometer"),
            gyroscope: has("gyroscope"),
        }
    }

    /// Check if at least one source is enabled.
    pub fn any_enabled(&self) -> bool {
        self.step_counter || self.accelerometer || self.gyroscope
    }

    pub fn availability(&self) -> SensorAvailability {
        SensorAvailability {
            step_counter: self.step_counter,
            accelerometer: self.accelerometer,
            gyroscope: self.gyroscope,
        }
    }
}

/// Thresholds for motion classification and step detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    /// Accelerometer delta above which the device counts as moving
    pub movement_threshold: f32,
    /// Accelerometer delta below which a reading counts as stationary
    pub stationary_threshold: f32,
    /// Consecutive stationary readings before the label is forced to stationary
    pub stationary_readings: u32,
    /// Acceleration magnitude above which a vehicle is assumed (m/s²)
    pub vehicle_accel_threshold: f32,
    /// Lower bound of the walking rotation band (rad/s)
    pub walking_gyro_threshold: f32,
    /// Upper bound of the walking rotation band (rad/s)
    pub max_walking_gyro: f32,
    /// Rotation above which a walking pattern is labeled running (rad/s)
    pub running_gyro_threshold: f32,
    /// Peak threshold for accelerometer step detection (m/s²)
    pub step_threshold: f32,
    /// Minimum time between two counted steps
    pub min_step_interval_ms: u64,
    /// Largest hardware counter decrease still treated as sensor noise
    pub counter_noise_tolerance: u64,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            movement_threshold: 0.5,
            stationary_threshold: 0.2,
            stationary_readings: 10,
            vehicle_accel_threshold: 15.0,
            walking_gyro_threshold: 0.3,
            max_walking_gyro: 2.0,
            running_gyro_threshold: 1.0,
            step_threshold: 11.5,
            min_step_interval_ms: 200,
            counter_noise_tolerance: 10,
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
