use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::SwarmError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwarmConfig {
    #[serde(default)]
    pub mesh: MeshConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshConfig {
    /// Seconds between two heartbeats of the same node
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: f64,
    /// Seconds after which a silent peer is reported as stale
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_secs: f64,
    /// Buffered messages per subscriber on the in-process bus
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Nodes spawned when the supervisor starts
    #[serde(default = "default_initial_nodes")]
    pub initial_nodes: usize,
    /// Insert unknown peers from cluster state responses into the view
    #[serde(default)]
    pub merge_cluster_state: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Directory for the rolling JSON log; console only when unset
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default)]
    pub json: bool,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_interval(),
            heartbeat_timeout_secs: default_heartbeat_timeout(),
            channel_capacity: default_channel_capacity(),
            initial_nodes: default_initial_nodes(),
            merge_cluster_state: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
            json: false,
        }
    }
}

/// Longest heartbeat interval or timeout accepted, one week.
pub const MAX_PERIOD_SECS: f64 = 604_800.0;

fn default_heartbeat_interval() -> f64 {
    5.0
}

fn default_heartbeat_timeout() -> f64 {
    10.0
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_initial_nodes() -> usize {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Seconds to `Duration`, clamped to `(0, MAX_PERIOD_SECS]`.
fn period(secs: f64) -> Duration {
    let secs = if secs.is_nan() {
        MAX_PERIOD_SECS
    } else {
        secs.clamp(0.001, MAX_PERIOD_SECS)
    };
    Duration::from_secs_f64(secs)
}

impl MeshConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        period(self.heartbeat_interval_secs)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        period(self.heartbeat_timeout_secs)
    }
}

impl SwarmConfig {
    /// Loads the first configuration found: the explicit path, `./swarm.yml`,
    /// then the user config directory. Falls back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, SwarmError> {
        if let Some(path) = path {
            return Self::load_from_file(path);
        }

        let config_paths = [
            Some(PathBuf::from("swarm.yml")),
            dirs::config_dir().map(|p| p.join("mesh-swarm/swarm.yml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                return Self::load_from_file(path);
            }
        }

        debug!("No configuration file found, using defaults");
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, SwarmError> {
        let content = fs::read_to_string(path).map_err(|e| {
            SwarmError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| {
            SwarmError::config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;

        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SwarmError> {
        let mesh = &self.mesh;
        if !(mesh.heartbeat_interval_secs.is_finite() && mesh.heartbeat_interval_secs > 0.0) {
            return Err(SwarmError::config("heartbeat_interval_secs must be positive"));
        }
        for (name, secs) in [
            ("heartbeat_interval_secs", mesh.heartbeat_interval_secs),
            ("heartbeat_timeout_secs", mesh.heartbeat_timeout_secs),
        ] {
            if secs > MAX_PERIOD_SECS {
                return Err(SwarmError::config(format!(
                    "{} must not exceed {} seconds",
                    name, MAX_PERIOD_SECS
                )));
            }
        }
        if !mesh.heartbeat_timeout_secs.is_finite()
            || mesh.heartbeat_timeout_secs < mesh.heartbeat_interval_secs
        {
            return Err(SwarmError::config(
                "heartbeat_timeout_secs must not be shorter than heartbeat_interval_secs",
            ));
        }
        if mesh.channel_capacity == 0 {
            return Err(SwarmError::config("channel_capacity must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = SwarmConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.mesh.heartbeat_interval(), Duration::from_secs(5));
        assert_eq!(config.mesh.heartbeat_timeout(), Duration::from_secs(10));
        assert!(!config.mesh.merge_cluster_state);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "mesh:\n  heartbeat_interval_secs: 0.5\n  initial_nodes: 3").unwrap();

        let config = SwarmConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.mesh.heartbeat_interval(), Duration::from_millis(500));
        assert_eq!(config.mesh.initial_nodes, 3);
        assert_eq!(config.mesh.heartbeat_timeout_secs, 10.0);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_rejects_invalid_values() {
        let mut config = SwarmConfig::default();
        config.mesh.heartbeat_interval_secs = 0.0;
        assert!(matches!(config.validate(), Err(SwarmError::Config(_))));

        let mut config = SwarmConfig::default();
        config.mesh.heartbeat_timeout_secs = 1.0;
        assert!(config.validate().is_err());

        let mut config = SwarmConfig::default();
        config.mesh.channel_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_oversized_periods() {
        let mut config = SwarmConfig::default();
        config.mesh.heartbeat_interval_secs = 1e300;
        config.mesh.heartbeat_timeout_secs = 1e300;
        assert!(matches!(config.validate(), Err(SwarmError::Config(_))));

        let mut config = SwarmConfig::default();
        config.mesh.heartbeat_timeout_secs = MAX_PERIOD_SECS * 2.0;
        assert!(config.validate().is_err());

        config.mesh.heartbeat_timeout_secs = MAX_PERIOD_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_durations_are_clamped() {
        let mut config = MeshConfig::default();
        config.heartbeat_interval_secs = 1e300;
        config.heartbeat_timeout_secs = f64::NAN;
        let max = Duration::from_secs_f64(MAX_PERIOD_SECS);
        assert_eq!(config.heartbeat_interval(), max);
        assert_eq!(config.heartbeat_timeout(), max);

        config.heartbeat_interval_secs = -1.0;
        assert!(config.heartbeat_interval() > Duration::ZERO);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = SwarmConfig::load(Some(&dir.path().join("absent.yml")));
        assert!(matches!(result, Err(SwarmError::Config(_))));
    }
}
