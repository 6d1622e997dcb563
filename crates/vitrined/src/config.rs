//! Server configuration.
//!
//! Loaded once at startup. Every field has a default, so an empty file (or
//! no file at all) yields a working server. Files ending in `.toml` are read
//! as TOML, anything else as JSON.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What a connection pushes on every lifecycle iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushMode {
    /// `{"object_name": ..., "prob": ...}`
    #[default]
    State,

    /// `{"type": "heartbeat"}`
    Heartbeat,
}

/// Runtime configuration for `vitrined`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the per-object media directories
    pub static_objects_directory: PathBuf,

    /// Root of the static web files (`index.html`, `assets/`)
    pub static_directory: PathBuf,

    /// Log level name, Python style (`INFO`, `WARNING`) or tracing style
    pub log_level: String,

    pub host: String,
    pub port: u16,

    pub push_mode: PushMode,

    /// Pause between two pushes on one connection
    pub push_interval_ms: u64,

    /// Upper bound of the random extra pause added to `push_interval_ms`
    pub push_jitter_ms: u64,

    /// Upper bound on one send during a broadcast
    pub send_timeout_ms: u64,

    /// Drop a screen that sends nothing for this long (0 disables)
    pub idle_timeout_secs: u64,

    /// Object displayed before the first update
    pub initial_object: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            static_objects_directory: PathBuf::from("static/objects"),
            static_directory: PathBuf::from("static"),
            log_level: "info".to_string(),
            host: "0.0.0.0".to_string(),
            port: 9999,
            push_mode: PushMode::State,
            push_interval_ms: 1000,
            push_jitter_ms: 200,
            send_timeout_ms: 5000,
            idle_timeout_secs: 300,
            initial_object: vitrine_core::NO_OBJECT.to_string(),
        }
    }
}

impl Config {
    /// Loads a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let config: Config = if is_toml {
            toml::from_str(&text).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                error: e.to_string(),
            })?
        } else {
            serde_json::from_str(&text).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                error: e.to_string(),
            })?
        };

        // Unknown level names fail here, not at subscriber setup
        config.log_directive()?;
        Ok(config)
    }

    /// The tracing filter directive for `log_level`.
    pub fn log_directive(&self) -> Result<&'static str, ConfigError> {
        let level = self.log_level.trim().to_ascii_lowercase();
        match level.as_str() {
            "trace" => Ok("trace"),
            "debug" => Ok("debug"),
            "info" => Ok("info"),
            "warning" | "warn" => Ok("warn"),
            "error" | "critical" | "fatal" => Ok("error"),
            "off" => Ok("off"),
            _ => Err(ConfigError::InvalidLogLevel {
                level: self.log_level.clone(),
            }),
        }
    }

    /// Address to bind the HTTP listener to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn push_interval(&self) -> Duration {
        Duration::from_millis(self.push_interval_ms)
    }

    pub fn push_jitter(&self) -> Duration {
        Duration::from_millis(self.push_jitter_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// `None` when the idle timeout is disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }
}

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {error}")]
    Read { path: PathBuf, error: String },

    #[error("Failed to parse config {path}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Unknown log level: {level}")]
    InvalidLogLevel { level: String },
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.port, 9999);
        assert_eq!(config.push_mode, PushMode::State);
        assert_eq!(config.initial_object, "nothing");
        assert_eq!(config.idle_timeout(), Some(Duration::from_secs(300)));
        assert_eq!(config.bind_address(), "0.0.0.0:9999");
    }

    #[test]
    fn test_load_json_with_partial_keys() {
        let file = write_temp(
            ".json",
            r#"{"static_objects_directory": "media/objects", "log_level": "DEBUG"}"#,
        );
        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.static_objects_directory, PathBuf::from("media/objects"));
        assert_eq!(config.log_directive().unwrap(), "debug");
        assert_eq!(config.port, 9999);
    }

    #[test]
    fn test_load_toml() {
        let file = write_temp(
            ".toml",
            "port = 8080\npush_mode = \"heartbeat\"\nidle_timeout_secs = 0\n",
        );
        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.push_mode, PushMode::Heartbeat);
        assert_eq!(config.idle_timeout(), None);
    }

    #[test]
    fn test_python_level_names() {
        let mut config = Config::default();
        for (name, directive) in [
            ("WARNING", "warn"),
            ("CRITICAL", "error"),
            ("Info", "info"),
            ("trace", "trace"),
        ] {
            config.log_level = name.to_string();
            assert_eq!(config.log_directive().unwrap(), directive);
        }
    }

    #[test]
    fn test_invalid_log_level_rejected_at_load() {
        let file = write_temp(".json", r#"{"log_level": "LOUD"}"#);
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLogLevel { .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load(Path::new("/nonexistent/vitrine.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_malformed_json() {
        let file = write_temp(".json", "{not json");
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
