//! Local settings parser
//!
//! Parses the validated settings file produced by the (out-of-scope) setup
//! flow: session credential, target groups, fixed coordinate, cycle
//! interval, operating window, and exit behavior.

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// When the exit-after-success flag is set, how eagerly to stop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExitMode {
    /// Stop as soon as any target group succeeds in a cycle.
    Any,
    /// Stop once every configured group has succeeded at least once.
    All,
}

/// Fixed fallback coordinate used when zone randomization is off (or fails).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinate {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// Reported accuracy in meters.
    #[serde(default = "default_accuracy")]
    pub accuracy: f64,
}

const fn default_accuracy() -> f64 {
    20.0
}

/// Daily operating window. Supports overnight windows (start > end).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WindowConfig {
    /// Whether the window is enforced at all.
    #[serde(default)]
    pub enabled: bool,
    /// Inclusive start, "HH:MM".
    #[serde(default = "default_window_start")]
    pub start: String,
    /// Exclusive end, "HH:MM".
    #[serde(default = "default_window_end")]
    pub end: String,
}

fn default_window_start() -> String {
    "08:00".to_string()
}

fn default_window_end() -> String {
    "22:00".to_string()
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            start: default_window_start(),
            end: default_window_end(),
        }
    }
}

impl WindowConfig {
    /// Parsed start time. Only valid after `Settings::validate`.
    pub fn start_time(&self) -> Result<NaiveTime> {
        parse_hhmm(&self.start)
    }

    /// Parsed end time. Only valid after `Settings::validate`.
    pub fn end_time(&self) -> Result<NaiveTime> {
        parse_hhmm(&self.end)
    }
}

fn parse_hhmm(text: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(text, "%H:%M")
        .with_context(|| format!("invalid time '{text}', expected HH:MM"))
}

/// Exit-after-success behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExitConfig {
    /// Whether the orchestrator stops the process after successful check-ins.
    #[serde(default)]
    pub enabled: bool,
    /// Which groups count towards stopping.
    #[serde(default = "default_exit_mode")]
    pub mode: ExitMode,
}

const fn default_exit_mode() -> ExitMode {
    ExitMode::Any
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: ExitMode::Any,
        }
    }
}

/// Zone-based coordinate randomization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ZoneConfig {
    /// Whether to regenerate the cycle coordinate from a zone each cycle.
    #[serde(default)]
    pub enabled: bool,
    /// Id of the zone to draw coordinates from.
    #[serde(default)]
    pub zone_id: Option<String>,
    /// Path to the zone catalog file.
    #[serde(default = "default_catalog_path")]
    pub catalog_path: String,
}

fn default_catalog_path() -> String {
    "zones.toml".to_string()
}

/// Top-level settings, supplied by the setup flow and validated here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Opaque session credential obtained by the login flow.
    pub session_credential: String,
    /// Base URL of the remote check-in service.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Target group ids, processed in order each cycle.
    pub group_ids: Vec<String>,
    /// Seconds between cycles.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Free-form label shown in logs and notifications.
    #[serde(default)]
    pub operator_label: String,
    /// Treat unclassifiable responses as confirmed (suppresses repeated
    /// notifications for persistently odd response text).
    #[serde(default = "default_true")]
    pub confirm_ambiguous: bool,
    /// Fixed fallback coordinate.
    pub coordinate: Coordinate,
    /// Daily operating window.
    #[serde(default)]
    pub window: WindowConfig,
    /// Exit-after-success behavior.
    #[serde(default)]
    pub exit_after_success: ExitConfig,
    /// Zone randomization.
    #[serde(default)]
    pub zone: ZoneConfig,
}

fn default_base_url() -> String {
    "https://checkin.example.com".to_string()
}

const fn default_interval_secs() -> u64 {
    60
}

const fn default_true() -> bool {
    true
}

impl Settings {
    /// Parse a settings file from a path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse settings content from a string.
    pub fn parse(content: &str) -> Result<Self> {
        let settings: Self = toml::from_str(content).context("Failed to parse settings")?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the settings.
    fn validate(&self) -> Result<()> {
        if self.session_credential.trim().is_empty() {
            bail!("session_credential cannot be empty");
        }
        if self.group_ids.is_empty() {
            bail!("at least one group id is required");
        }
        for id in &self.group_ids {
            if id.trim().is_empty() {
                bail!("group ids cannot be empty");
            }
        }
        if self.interval_secs == 0 {
            bail!("interval_secs must be positive");
        }
        if !(-90.0..=90.0).contains(&self.coordinate.lat) {
            bail!("coordinate.lat must be within [-90, 90]");
        }
        if !(-180.0..=180.0).contains(&self.coordinate.lng) {
            bail!("coordinate.lng must be within [-180, 180]");
        }
        if self.coordinate.accuracy <= 0.0 {
            bail!("coordinate.accuracy must be positive");
        }
        if self.window.enabled {
            self.window.start_time()?;
            self.window.end_time()?;
        }
        if self.zone.enabled && self.zone.zone_id.is_none() {
            bail!("zone.zone_id is required when zone randomization is enabled");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_SETTINGS: &str = r#"
session_credential = "session-token-abc"
group_ids = ["g101", "g102"]
interval_secs = 60
operator_label = "laptop"

[coordinate]
lat = 39.908722
lng = 116.397499
accuracy = 20.0

[window]
enabled = true
start = "08:00"
end = "22:00"

[exit_after_success]
enabled = true
mode = "all"
"#;

    #[test]
    fn test_parse_valid_settings() {
        let settings = Settings::parse(VALID_SETTINGS).unwrap();
        assert_eq!(settings.session_credential, "session-token-abc");
        assert_eq!(settings.group_ids, vec!["g101", "g102"]);
        assert_eq!(settings.interval_secs, 60);
        assert_eq!(settings.exit_after_success.mode, ExitMode::All);
        assert!(settings.exit_after_success.enabled);
    }

    #[test]
    fn test_defaults() {
        let toml = r#"
session_credential = "tok"
group_ids = ["g1"]

[coordinate]
lat = 1.0
lng = 2.0
"#;
        let settings = Settings::parse(toml).unwrap();
        assert_eq!(settings.interval_secs, 60);
        assert!(!settings.window.enabled);
        assert!(!settings.exit_after_success.enabled);
        assert_eq!(settings.exit_after_success.mode, ExitMode::Any);
        assert!(!settings.zone.enabled);
        assert!(settings.confirm_ambiguous);
        assert!((settings.coordinate.accuracy - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_reject_empty_credential() {
        let toml = r#"
session_credential = "  "
group_ids = ["g1"]

[coordinate]
lat = 1.0
lng = 2.0
"#;
        let err = Settings::parse(toml).unwrap_err();
        assert!(err.to_string().contains("session_credential"));
    }

    #[test]
    fn test_reject_no_groups() {
        let toml = r#"
session_credential = "tok"
group_ids = []

[coordinate]
lat = 1.0
lng = 2.0
"#;
        let err = Settings::parse(toml).unwrap_err();
        assert!(err.to_string().contains("group id"));
    }

    #[test]
    fn test_reject_out_of_range_latitude() {
        let toml = r#"
session_credential = "tok"
group_ids = ["g1"]

[coordinate]
lat = 91.0
lng = 2.0
"#;
        let err = Settings::parse(toml).unwrap_err();
        assert!(err.to_string().contains("lat"));
    }

    #[test]
    fn test_reject_bad_window_time() {
        let toml = r#"
session_credential = "tok"
group_ids = ["g1"]

[coordinate]
lat = 1.0
lng = 2.0

[window]
enabled = true
start = "8 o'clock"
end = "22:00"
"#;
        let err = Settings::parse(toml).unwrap_err();
        assert!(format!("{err:?}").contains("HH:MM"));
    }

    #[test]
    fn test_disabled_window_skips_time_validation() {
        let toml = r#"
session_credential = "tok"
group_ids = ["g1"]

[coordinate]
lat = 1.0
lng = 2.0

[window]
enabled = false
start = "not-a-time"
"#;
        assert!(Settings::parse(toml).is_ok());
    }

    #[test]
    fn test_zone_requires_id_when_enabled() {
        let toml = r#"
session_credential = "tok"
group_ids = ["g1"]

[coordinate]
lat = 1.0
lng = 2.0

[zone]
enabled = true
"#;
        let err = Settings::parse(toml).unwrap_err();
        assert!(err.to_string().contains("zone_id"));
    }

    #[test]
    fn test_from_path_missing_file() {
        let err = Settings::from_path("/nonexistent/settings.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }

    #[test]
    fn test_from_path_valid_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.toml");
        std::fs::write(&path, VALID_SETTINGS).unwrap();

        let settings = Settings::from_path(&path).unwrap();
        assert_eq!(settings.group_ids.len(), 2);
    }

    #[test]
    fn test_window_time_parsing() {
        let settings = Settings::parse(VALID_SETTINGS).unwrap();
        let start = settings.window.start_time().unwrap();
        assert_eq!(start, NaiveTime::from_hms_opt(8, 0, 0).unwrap());
    }
}
