//! Application directory paths.
//!
//! Uses the [`dirs`] crate for platform-appropriate locations.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | Data | `~/Library/Application Support/cadence/` | `~/.local/share/cadence/` |
//! | Config | `~/Library/Application Support/cadence/` | `~/.config/cadence/` |
//!
//! # Environment Overrides
//!
//! - `CADENCE_DATA_DIR` overrides [`data_dir`]
//! - `CADENCE_CONFIG_DIR` overrides [`config_dir`]

use std::path::PathBuf;

/// Application data root (registry snapshot, logs).
///
/// Resolves to `dirs::data_dir()/cadence/` unless `CADENCE_DATA_DIR` is set.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("CADENCE_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("cadence"))
        .unwrap_or_else(|| PathBuf::from("/tmp/cadence-data"))
}

/// Application config directory.
///
/// Resolves to `dirs::config_dir()/cadence/` unless `CADENCE_CONFIG_DIR` is set.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("CADENCE_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("cadence"))
        .unwrap_or_else(|| PathBuf::from("/tmp/cadence-config"))
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Armed-timer snapshot path (`data_dir()/alarms.json`).
#[must_use]
pub fn registry_file() -> PathBuf {
    data_dir().join("alarms.json")
}
