//! Configuration system using Figment
//!
//! Settings are layered from:
//! 1. Built-in defaults
//! 2. An optional TOML file
//! 3. Environment variables (prefixed with `CAPTURE_DAQ_`, nested keys split by `__`)
//!
//! # Environment Variable Overrides
//!
//! ```text
//! CAPTURE_DAQ_APPLICATION__LOG_LEVEL=debug
//! CAPTURE_DAQ_SCHEDULER__MAX_INTERVAL_SECS=20
//! CAPTURE_DAQ_SCHEDULER__HANDOFF_SETTLE=500ms
//! ```
//!
//! # Example
//!
//! ```toml
//! [scheduler]
//! min_interval_secs = 0.5
//! max_interval_secs = 10.0
//! max_consecutive_failures = 5
//! handoff_settle = "200ms"
//!
//! [[mock.cameras]]
//! id = "brightfield"
//! width = 640
//! height = 480
//! ```

use crate::error::{AppResult, DaqError};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "CAPTURE_DAQ_";

/// Top-level settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Capture scheduler settings
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Live preview settings
    #[serde(default)]
    pub preview: PreviewConfig,
    /// Simulated cameras for the CLI and tests
    #[serde(default)]
    pub mock: MockConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging filter directive (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "capture_daq".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Cadence bounds, quarantine policy and hardware timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Smallest accepted tick interval in seconds
    pub min_interval_secs: f64,
    /// Largest accepted tick interval in seconds
    pub max_interval_secs: f64,
    /// Interval used when the caller does not pick one
    pub default_interval_secs: f64,
    /// Consecutive failures tolerated before a camera is quarantined
    pub max_consecutive_failures: u32,
    /// Pause after live preview releases its camera, before the first tick
    #[serde(with = "humantime_serde")]
    pub handoff_settle: Duration,
    /// Maximum wait for the system-wide camera slot
    #[serde(with = "humantime_serde")]
    pub acquire_timeout: Duration,
    /// Maximum time a single frame capture may take
    #[serde(with = "humantime_serde")]
    pub capture_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_interval_secs: 0.5,
            max_interval_secs: 10.0,
            default_interval_secs: 1.0,
            max_consecutive_failures: 5,
            handoff_settle: Duration::from_millis(200),
            acquire_timeout: Duration::from_secs(2),
            capture_timeout: Duration::from_secs(5),
        }
    }
}

impl SchedulerConfig {
    /// Check `secs` against the configured interval bounds.
    pub fn check_interval(&self, secs: f64) -> AppResult<Duration> {
        if !secs.is_finite() || secs < self.min_interval_secs || secs > self.max_interval_secs {
            return Err(DaqError::Configuration(format!(
                "interval {secs}s outside allowed range [{}, {}]",
                self.min_interval_secs, self.max_interval_secs
            )));
        }
        Ok(Duration::from_secs_f64(secs))
    }

    fn validate(&self) -> AppResult<()> {
        if self.min_interval_secs.is_nan()
            || self.min_interval_secs <= 0.0
            || !self.max_interval_secs.is_finite()
        {
            return Err(DaqError::Configuration(
                "scheduler interval bounds must be positive and finite".into(),
            ));
        }
        if self.min_interval_secs > self.max_interval_secs {
            return Err(DaqError::Configuration(format!(
                "min_interval_secs ({}) exceeds max_interval_secs ({})",
                self.min_interval_secs, self.max_interval_secs
            )));
        }
        self.check_interval(self.default_interval_secs)?;
        if self.max_consecutive_failures == 0 {
            return Err(DaqError::Configuration(
                "max_consecutive_failures must be at least 1".into(),
            ));
        }
        if self.acquire_timeout.is_zero() || self.capture_timeout.is_zero() {
            return Err(DaqError::Configuration(
                "acquire_timeout and capture_timeout must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Live preview configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewConfig {
    /// Time between preview frames
    #[serde(with = "humantime_serde")]
    pub frame_period: Duration,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            frame_period: Duration::from_millis(100),
        }
    }
}

/// Simulated camera bank
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MockConfig {
    /// Camera definitions, in enumeration order
    #[serde(default)]
    pub cameras: Vec<MockCameraDefinition>,
}

/// One simulated camera
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockCameraDefinition {
    /// Camera identifier
    pub id: String,
    /// Frame width in pixels
    #[serde(default = "default_width")]
    pub width: u32,
    /// Frame height in pixels
    #[serde(default = "default_height")]
    pub height: u32,
    /// Every capture from this frame number on fails
    #[serde(default)]
    pub fail_from_frame: Option<u64>,
    /// Probability (0-1) that any capture fails
    #[serde(default)]
    pub failure_rate: f64,
    /// Simulated readout time
    #[serde(default, with = "humantime_serde")]
    pub capture_delay: Option<Duration>,
}

fn default_width() -> u32 {
    640
}

fn default_height() -> u32 {
    480
}

impl Settings {
    /// Load settings from defaults, an optional TOML file and the environment.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        Self::from_figment(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Extract and validate settings from a prepared figment.
    pub fn from_figment(figment: Figment) -> AppResult<Self> {
        let settings: Settings = figment.extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Semantic validation beyond what deserialization checks.
    pub fn validate(&self) -> AppResult<()> {
        self.scheduler.validate()?;
        if self.preview.frame_period.is_zero() {
            return Err(DaqError::Configuration(
                "preview.frame_period must be non-zero".into(),
            ));
        }

        let mut seen = HashSet::new();
        for camera in &self.mock.cameras {
            if camera.id.trim().is_empty() {
                return Err(DaqError::Configuration("mock camera id is empty".into()));
            }
            if !seen.insert(camera.id.as_str()) {
                return Err(DaqError::Configuration(format!(
                    "duplicate mock camera id '{}'",
                    camera.id
                )));
            }
            if !(0.0..=1.0).contains(&camera.failure_rate) {
                return Err(DaqError::Configuration(format!(
                    "mock camera '{}' failure_rate must be within [0, 1]",
                    camera.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.scheduler.max_consecutive_failures, 5);
        assert_eq!(settings.scheduler.min_interval_secs, 0.5);
        assert_eq!(settings.scheduler.max_interval_secs, 10.0);
    }

    #[test]
    fn test_check_interval_bounds() {
        let config = SchedulerConfig::default();
        assert!(config.check_interval(0.5).is_ok());
        assert!(config.check_interval(10.0).is_ok());
        assert_eq!(
            config.check_interval(2.5).unwrap(),
            Duration::from_millis(2500)
        );
        assert!(config.check_interval(0.49).is_err());
        assert!(config.check_interval(20.0).is_err());
        assert!(config.check_interval(f64::NAN).is_err());
        assert!(config.check_interval(f64::INFINITY).is_err());
    }

    #[test]
    fn test_inverted_range_rejected() {
        let mut settings = Settings::default();
        settings.scheduler.min_interval_secs = 5.0;
        settings.scheduler.max_interval_secs = 1.0;
        assert!(matches!(
            settings.validate(),
            Err(DaqError::Configuration(_))
        ));
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let mut settings = Settings::default();
        settings.scheduler.max_consecutive_failures = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_duplicate_mock_ids_rejected() {
        let mut settings = Settings::default();
        let camera = MockCameraDefinition {
            id: "a".into(),
            width: 4,
            height: 4,
            fail_from_frame: None,
            failure_rate: 0.0,
            capture_delay: None,
        };
        settings.mock.cameras = vec![camera.clone(), camera];
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_env_override() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "capture.toml",
                r#"
                [scheduler]
                max_interval_secs = 4.0
                handoff_settle = "1s"

                [[mock.cameras]]
                id = "brightfield"
                "#,
            )?;
            jail.set_env("CAPTURE_DAQ_APPLICATION__LOG_LEVEL", "debug");

            let settings = Settings::load(Some(Path::new("capture.toml")))
                .map_err(|e| e.to_string())?;
            assert_eq!(settings.application.log_level, "debug");
            assert_eq!(settings.scheduler.max_interval_secs, 4.0);
            assert_eq!(settings.scheduler.handoff_settle, Duration::from_secs(1));
            assert_eq!(settings.scheduler.min_interval_secs, 0.5);
            assert_eq!(settings.mock.cameras.len(), 1);
            assert_eq!(settings.mock.cameras[0].width, 640);
            Ok(())
        });
    }
}
