//! Pipeline configuration.
//!
//! Loaded from YAML, then optionally overridden from `TIMELINE_*`
//! environment variables. Every field has a default, so an empty file is a
//! valid configuration.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Default gap that splits an interval (seconds, strict `>`)
pub const DEFAULT_GAP_THRESHOLD_SECS: i64 = 300;

/// Default offset of synthetic padding points (seconds)
pub const DEFAULT_PADDING_OFFSET_SECS: i64 = 300;

/// Default silence after which a condition counts as resolved (seconds)
pub const DEFAULT_RESOLVED_THRESHOLD_SECS: i64 = 600;

/// Default gap between samples rendered as a nodata span (seconds, strict `>`)
pub const DEFAULT_NODATA_GAP_SECS: i64 = 300;

/// Default visible window in days
pub const DEFAULT_WINDOW_DAYS: u32 = 7;

/// Liveness alert dropped before any processing
pub const DEFAULT_HEARTBEAT_ALERT: &str = "Watchdog";

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Gap that closes an interval (seconds)
    pub gap_threshold_secs: i64,
    /// Offset of synthetic padding points (seconds)
    pub padding_offset_secs: i64,
    /// Silence after which a condition is resolved (seconds)
    pub resolved_threshold_secs: i64,
    /// Gap between samples shown as nodata (seconds)
    pub nodata_gap_secs: i64,
    /// Visible window (days)
    pub window_days: u32,
    /// Alert name of the liveness ping
    pub heartbeat_alert_name: String,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            gap_threshold_secs: DEFAULT_GAP_THRESHOLD_SECS,
            padding_offset_secs: DEFAULT_PADDING_OFFSET_SECS,
            resolved_threshold_secs: DEFAULT_RESOLVED_THRESHOLD_SECS,
            nodata_gap_secs: DEFAULT_NODATA_GAP_SECS,
            window_days: DEFAULT_WINDOW_DAYS,
            heartbeat_alert_name: DEFAULT_HEARTBEAT_ALERT.to_string(),
        }
    }
}

impl TimelineConfig {
    /// Load from a YAML file and validate
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&content)?;
        debug!(path = %path.display(), "Loaded timeline configuration");
        Ok(config)
    }

    /// Parse YAML and validate
    pub fn from_yaml(content: &str) -> Result<Self> {
        // An empty document deserializes to unit, not to a defaulted struct.
        let config: Self = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `TIMELINE_*` environment variables.
    ///
    /// Unset or unparsable variables leave the field unchanged.
    pub fn apply_env_overrides(mut self) -> Result<Self> {
        fn parsed<T: std::str::FromStr>(var: &str) -> Option<T> {
            std::env::var(var).ok().and_then(|v| v.trim().parse().ok())
        }

        if let Some(v) = parsed("TIMELINE_GAP_THRESHOLD_SECS") {
            self.gap_threshold_secs = v;
        }
        if let Some(v) = parsed("TIMELINE_PADDING_OFFSET_SECS") {
            self.padding_offset_secs = v;
        }
        if let Some(v) = parsed("TIMELINE_RESOLVED_THRESHOLD_SECS") {
            self.resolved_threshold_secs = v;
        }
        if let Some(v) = parsed("TIMELINE_NODATA_GAP_SECS") {
            self.nodata_gap_secs = v;
        }
        if let Some(v) = parsed("TIMELINE_WINDOW_DAYS") {
            self.window_days = v;
        }
        if let Ok(name) = std::env::var("TIMELINE_HEARTBEAT_ALERT") {
            self.heartbeat_alert_name = name;
        }

        self.validate()?;
        Ok(self)
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.gap_threshold_secs <= 0 {
            return Err(Error::config("gap_threshold_secs must be greater than 0"));
        }
        if self.padding_offset_secs < 0 {
            return Err(Error::config("padding_offset_secs must not be negative"));
        }
        if self.resolved_threshold_secs <= 0 {
            return Err(Error::config(
                "resolved_threshold_secs must be greater than 0",
            ));
        }
        if self.nodata_gap_secs <= 0 {
            return Err(Error::config("nodata_gap_secs must be greater than 0"));
        }
        if self.window_days == 0 {
            return Err(Error::config("window_days must be greater than 0"));
        }
        if self.heartbeat_alert_name.trim().is_empty() {
            return Err(Error::config("heartbeat_alert_name must not be empty"));
        }
        Ok(())
    }

    /// Resolved threshold in milliseconds
    pub fn resolved_threshold_millis(&self) -> i64 {
        self.resolved_threshold_secs * 1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = TimelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gap_threshold_secs, 300);
        assert_eq!(config.resolved_threshold_millis(), 600_000);
        assert_eq!(config.heartbeat_alert_name, "Watchdog");
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = TimelineConfig::from_yaml("window_days: 15\npadding_offset_secs: 60\n").unwrap();
        assert_eq!(config.window_days, 15);
        assert_eq!(config.padding_offset_secs, 60);
        assert_eq!(config.gap_threshold_secs, DEFAULT_GAP_THRESHOLD_SECS);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(TimelineConfig::from_yaml("").unwrap(), TimelineConfig::default());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = TimelineConfig::from_yaml("window_days: 0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = TimelineConfig::from_yaml("gap_threshold_secs: -5").unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = TimelineConfig::from_yaml("heartbeat_alert_name: '  '").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_malformed_yaml() {
        let err = TimelineConfig::from_yaml("window_days: [").unwrap_err();
        assert!(matches!(err, Error::Yaml(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timeline.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "nodata_gap_secs: 120").unwrap();

        let config = TimelineConfig::from_file(&path).unwrap();
        assert_eq!(config.nodata_gap_secs, 120);

        let missing = TimelineConfig::from_file(dir.path().join("absent.yaml"));
        assert!(matches!(missing, Err(Error::Io(_))));
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("TIMELINE_WINDOW_DAYS", "3");
        std::env::set_var("TIMELINE_HEARTBEAT_ALERT", "DeadMansSwitch");

        let config = TimelineConfig::default().apply_env_overrides().unwrap();
        assert_eq!(config.window_days, 3);
        assert_eq!(config.heartbeat_alert_name, "DeadMansSwitch");

        // Cleanup
        std::env::remove_var("TIMELINE_WINDOW_DAYS");
        std::env::remove_var("TIMELINE_HEARTBEAT_ALERT");
    }
}
