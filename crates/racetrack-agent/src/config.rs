//! Agent configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! TOML file, then `RACETRACK_*` environment variables (nested keys use a
//! double underscore, e.g. `RACETRACK_TRACKER__LOW_BATTERY_THRESHOLD`).

use racetrack_tracker::{Accuracy, TrackerConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "racetrack.toml";

/// Agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Control API port
    pub api_port: u16,
    /// Enable CORS for all origins (development)
    pub cors_permissive: bool,
    /// Base URL of the race service (metadata, telemetry, timing)
    pub remote_url: String,
    /// Per-request timeout for the race service
    pub remote_timeout_secs: u64,
    /// How often reachability of the race service is probed
    pub probe_interval_secs: u64,
    /// Directory of the durable store
    pub data_dir: PathBuf,
    /// Registration to start tracking at boot when nothing is restored
    pub registration_id: Option<String>,
    pub tracker: TrackerSettings,
    pub simulation: SimulationSettings,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            api_port: 3000,
            cors_permissive: true,
            remote_url: "http://localhost:8080/api/v1".into(),
            remote_timeout_secs: 10,
            probe_interval_secs: 15,
            data_dir: PathBuf::from("data"),
            registration_id: None,
            tracker: TrackerSettings::default(),
            simulation: SimulationSettings::default(),
        }
    }
}

impl AgentConfig {
    /// Load defaults, the optional file at `path` and the environment
    pub fn load(path: impl AsRef<Path>) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix("RACETRACK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Load using `RACETRACK_CONFIG` or the default file name
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let path = std::env::var("RACETRACK_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());
        Self::load(path)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs.max(1))
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs.max(1))
    }
}

/// Tracking engine settings, in config-friendly units
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSettings {
    pub default_frequency_secs: u64,
    pub low_battery_threshold: u8,
    pub conservation_interval_secs: u64,
    pub fix_timeout_secs: u64,
    pub accuracy: Accuracy,
    /// Zero keeps the offline queue unbounded
    pub max_queued_points: usize,
    pub resume_capture_on_restore: bool,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        let defaults = TrackerConfig::default();
        Self {
            default_frequency_secs: defaults.default_frequency.as_secs(),
            low_battery_threshold: defaults.low_battery_threshold,
            conservation_interval_secs: defaults.conservation_interval.as_secs(),
            fix_timeout_secs: defaults.fix_timeout.as_secs(),
            accuracy: defaults.accuracy,
            max_queued_points: 0,
            resume_capture_on_restore: defaults.resume_capture_on_restore,
        }
    }
}

impl TrackerSettings {
    pub fn to_tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            default_frequency: Duration::from_secs(self.default_frequency_secs.max(1)),
            low_battery_threshold: self.low_battery_threshold.min(100),
            conservation_interval: Duration::from_secs(self.conservation_interval_secs.max(1)),
            fix_timeout: Duration::from_secs(self.fix_timeout_secs.max(1)),
            accuracy: self.accuracy,
            max_queued_points: (self.max_queued_points > 0).then_some(self.max_queued_points),
            resume_capture_on_restore: self.resume_capture_on_restore,
            ..TrackerConfig::default()
        }
    }
}

/// Simulated runner used in place of device GPS and battery
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// Running pace in meters per second
    pub speed_mps: f64,
    /// Period of the simulated watch stream
    pub fix_interval_ms: u64,
    pub battery_start: u8,
    /// Percentage points lost per minute
    pub battery_drain_per_min: f64,
    /// Route as `[latitude, longitude]` pairs
    pub route: Vec<[f64; 2]>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            speed_mps: 3.2,
            fix_interval_ms: 1000,
            battery_start: 100,
            battery_drain_per_min: 0.25,
            route: vec![
                [40.4153, -3.7074],
                [40.4184, -3.7143],
                [40.4216, -3.7196],
                [40.4257, -3.7152],
                [40.4239, -3.7083],
                [40.4153, -3.7074],
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_file_missing() {
        let config = AgentConfig::load("definitely-not-here.toml").unwrap();
        assert_eq!(config.api_port, 3000);
        assert_eq!(config.tracker.low_battery_threshold, 20);
        assert_eq!(config.simulation.route.len(), 6);
        assert!(config.registration_id.is_none());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(
            &path,
            "api_port = 4100\nregistration_id = \"reg-9\"\n\n[tracker]\nlow_battery_threshold = 15\nmax_queued_points = 500\n",
        )
        .unwrap();

        let config = AgentConfig::load(&path).unwrap();
        assert_eq!(config.api_port, 4100);
        assert_eq!(config.registration_id.as_deref(), Some("reg-9"));
        assert_eq!(config.tracker.low_battery_threshold, 15);
        // Untouched nested keys keep their defaults
        assert_eq!(config.tracker.conservation_interval_secs, 60);
    }

    #[test]
    fn test_tracker_config_conversion() {
        let settings = TrackerSettings {
            max_queued_points: 500,
            ..Default::default()
        };
        let config = settings.to_tracker_config();
        assert_eq!(config.max_queued_points, Some(500));
        assert_eq!(config.default_frequency, Duration::from_secs(10));

        assert!(TrackerSettings::default().to_tracker_config().max_queued_points.is_none());
    }
}
