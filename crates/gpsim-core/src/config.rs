//! Configuration loading and typed config structures for gpsim.
//!
//! The configuration lives in `gpsim-config.yaml` at the project root.
//! Every field has a default, so an empty or missing file yields a
//! working setup: HTTP on `0.0.0.0:8080`, one tick per second.

use std::path::Path;

use serde::Deserialize;

/// Smallest accepted tick interval.
pub const MIN_TICK_INTERVAL_MS: u64 = 100;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value was syntactically valid but out of range.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// What is wrong.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GpsimConfig {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerSection,

    /// Tick loop and motion settings.
    #[serde(default)]
    pub simulation: SimulationSection,

    /// Serial output defaults.
    #[serde(default)]
    pub serial: SerialSection,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSection,
}

impl GpsimConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `GPSIM_HOST` overrides `server.host`
    /// - `GPSIM_PORT` overrides `server.port`
    /// - `GPSIM_LOG_LEVEL` overrides `logging.level`
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, apply environment
    /// overrides, and validate.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config = Self::parse_without_env(yaml)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate without consulting the environment.
    pub fn parse_without_env(yaml: &str) -> Result<Self, ConfigError> {
        // serde_yml maps an empty document to unit, not an empty mapping.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Override settings with environment variables when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("GPSIM_HOST") {
            self.server.host = val;
        }
        if let Some(port) = std::env::var("GPSIM_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.server.port = port;
        }
        if let Ok(val) = std::env::var("GPSIM_LOG_LEVEL") {
            self.logging.level = val;
        }
    }

    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.simulation.tick_interval_ms < MIN_TICK_INTERVAL_MS {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "simulation.tick_interval_ms must be at least {MIN_TICK_INTERVAL_MS}, got {}",
                    self.simulation.tick_interval_ms
                ),
            });
        }
        if self.simulation.broadcast_capacity == 0 {
            return Err(ConfigError::Invalid {
                reason: "simulation.broadcast_capacity must be at least 1".to_owned(),
            });
        }
        let speed = self.simulation.default_speed_deg_per_min;
        if !speed.is_finite() || speed <= 0.0 {
            return Err(ConfigError::Invalid {
                reason: format!("simulation.default_speed_deg_per_min must be > 0, got {speed}"),
            });
        }
        Ok(())
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerSection {
    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port for the control API and push channel.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Tick loop and motion settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SimulationSection {
    /// Milliseconds between ticks.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Speed reported by the status endpoint while no pivot is set.
    #[serde(default = "default_speed_deg_per_min")]
    pub default_speed_deg_per_min: f64,

    /// Position events buffered per push subscriber before it lags.
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            default_speed_deg_per_min: default_speed_deg_per_min(),
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

/// Serial output defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SerialSection {
    /// Baud rate used when an open request does not name one.
    #[serde(default = "default_baud_rate")]
    pub default_baud_rate: u32,
}

impl Default for SerialSection {
    fn default() -> Self {
        Self {
            default_baud_rate: default_baud_rate(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingSection {
    /// Log level (trace, debug, info, warn, error) used when `RUST_LOG`
    /// is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_host() -> String {
    String::from("0.0.0.0")
}

const fn default_port() -> u16 {
    8080
}

const fn default_tick_interval_ms() -> u64 {
    1000
}

const fn default_speed_deg_per_min() -> f64 {
    1.0
}

const fn default_broadcast_capacity() -> usize {
    256
}

const fn default_baud_rate() -> u32 {
    4800
}

fn default_log_level() -> String {
    String::from("info")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = GpsimConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.simulation.tick_interval_ms, 1000);
        assert_eq!(config.serial.default_baud_rate, 4800);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 9090

simulation:
  tick_interval_ms: 500
  default_speed_deg_per_min: 2.5
  broadcast_capacity: 16

serial:
  default_baud_rate: 9600

logging:
  level: "debug"
"#;

        let config = GpsimConfig::parse_without_env(yaml);
        assert!(config.is_ok(), "{config:?}");
        let config = config.ok().unwrap_or_default();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.simulation.tick_interval_ms, 500);
        assert_eq!(config.simulation.broadcast_capacity, 16);
        assert_eq!(config.serial.default_baud_rate, 9600);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn parse_minimal_yaml() {
        let config = GpsimConfig::parse_without_env("server:\n  port: 7000\n");
        assert!(config.is_ok());
        let config = config.ok().unwrap_or_default();

        assert_eq!(config.server.port, 7000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.simulation.tick_interval_ms, 1000);
    }

    #[test]
    fn parse_empty_yaml() {
        let config = GpsimConfig::parse_without_env("");
        assert!(config.is_ok());
    }

    #[test]
    fn rejects_fast_tick_interval() {
        let result = GpsimConfig::parse_without_env("simulation:\n  tick_interval_ms: 10\n");
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn rejects_zero_capacity_and_bad_speed() {
        let capacity = GpsimConfig::parse_without_env("simulation:\n  broadcast_capacity: 0\n");
        assert!(matches!(capacity, Err(ConfigError::Invalid { .. })));
        let speed =
            GpsimConfig::parse_without_env("simulation:\n  default_speed_deg_per_min: -1\n");
        assert!(matches!(speed, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn rejects_malformed_yaml() {
        let result = GpsimConfig::parse_without_env("server: [unterminated");
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }

    #[test]
    fn load_project_config_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("gpsim-config.yaml");
        if path.exists() {
            let config = GpsimConfig::from_file(&path);
            assert!(config.is_ok(), "Failed to load project config: {config:?}");
        }
    }
}
