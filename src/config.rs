//! Configuration types for the background controller.

use crate::error::{CadenceError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    /// Timer delays, periods and hours.
    pub timers: TimerConfig,
    /// Armed-timer snapshot settings.
    pub registry: RegistryConfig,
}

/// Delays and cadences for the built-in timers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    /// Accelerometer on/off delay in milliseconds (also the fuzzy base).
    pub accel_timer_delay_ms: u64,
    /// GPS on/off delay in milliseconds (also the fuzzy base).
    pub gps_timer_delay_ms: u64,
    /// Base delay between Wi-Fi scans in milliseconds.
    pub wifi_timer_delay_ms: u64,
    /// Seconds between Bluetooth scan windows.
    pub bluetooth_cadence_secs: u64,
    /// Length of one Bluetooth scan window in milliseconds.
    pub bluetooth_scan_window_ms: u64,
    /// Seconds between data uploads.
    pub upload_period_secs: u64,
    /// Seconds between survey metadata checks.
    pub survey_check_period_secs: u64,
    /// Local hour (0-23) of the daily voice-recording prompt.
    pub voice_recording_hour: u8,
    /// Seconds of inactivity before the session is logged out.
    pub auto_logout_secs: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            accel_timer_delay_ms: 5_000,
            gps_timer_delay_ms: 5_000,
            wifi_timer_delay_ms: 5_000,
            bluetooth_cadence_secs: 3_600,
            bluetooth_scan_window_ms: 5_000,
            upload_period_secs: 3_600,
            survey_check_period_secs: 86_400,
            voice_recording_hour: 19,
            auto_logout_secs: 600,
        }
    }
}

impl TimerConfig {
    pub fn accel_timer_delay(&self) -> Duration {
        Duration::from_millis(self.accel_timer_delay_ms)
    }

    pub fn gps_timer_delay(&self) -> Duration {
        Duration::from_millis(self.gps_timer_delay_ms)
    }

    pub fn wifi_timer_delay(&self) -> Duration {
        Duration::from_millis(self.wifi_timer_delay_ms)
    }

    pub fn bluetooth_cadence(&self) -> Duration {
        Duration::from_secs(self.bluetooth_cadence_secs)
    }

    pub fn bluetooth_scan_window(&self) -> Duration {
        Duration::from_millis(self.bluetooth_scan_window_ms)
    }

    pub fn upload_period(&self) -> Duration {
        Duration::from_secs(self.upload_period_secs)
    }

    pub fn survey_check_period(&self) -> Duration {
        Duration::from_secs(self.survey_check_period_secs)
    }

    pub fn auto_logout_delay(&self) -> Duration {
        Duration::from_secs(self.auto_logout_secs)
    }
}

/// Armed-timer snapshot settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Mirror the armed set to disk and reconcile from it at startup.
    pub persist: bool,
    /// Snapshot location (None = `cadence_dirs::registry_file()`).
    pub state_path: Option<PathBuf>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            persist: true,
            state_path: None,
        }
    }
}

impl RegistryConfig {
    /// Where the snapshot lives, or `None` when persistence is off.
    #[must_use]
    pub fn resolved_state_path(&self) -> Option<PathBuf> {
        if !self.persist {
            return None;
        }
        Some(
            self.state_path
                .clone()
                .unwrap_or_else(crate::cadence_dirs::registry_file),
        )
    }
}

impl CadenceConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CadenceError::Config(e.to_string()))
    }

    /// Load `path` when it exists, defaults otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error for a file that exists but cannot be read or parsed.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| CadenceError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Default config file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        crate::cadence_dirs::config_file()
    }

    /// Reject settings no timer can be armed with.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let t = &self.timers;
        let nonzero = [
            ("timers.accel_timer_delay_ms", t.accel_timer_delay_ms),
            ("timers.gps_timer_delay_ms", t.gps_timer_delay_ms),
            ("timers.wifi_timer_delay_ms", t.wifi_timer_delay_ms),
            ("timers.bluetooth_cadence_secs", t.bluetooth_cadence_secs),
            ("timers.bluetooth_scan_window_ms", t.bluetooth_scan_window_ms),
            ("timers.upload_period_secs", t.upload_period_secs),
            ("timers.survey_check_period_secs", t.survey_check_period_secs),
            ("timers.auto_logout_secs", t.auto_logout_secs),
        ];
        if let Some((field, _)) = nonzero.iter().find(|(_, value)| *value == 0) {
            return Err(CadenceError::Config(format!("{field} must be greater than zero")));
        }
        if t.voice_recording_hour > 23 {
            return Err(CadenceError::Config(format!(
                "timers.voice_recording_hour must be 0-23, got {}",
                t.voice_recording_hour
            )));
        }
        Ok(())
    }
}
