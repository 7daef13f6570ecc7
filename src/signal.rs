//! The fixed vocabulary of control signals.
//!
//! Wire spellings cross a process boundary (persisted registry snapshots,
//! external triggers), so [`Signal::as_str`] and [`Signal::parse`] are part of
//! the contract and must never change.

use serde::{Deserialize, Serialize};

/// A named, payload-free control event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    AccelerometerOff,
    AccelerometerOn,
    ActionAccelerometerTimer,
    ActionBluetoothTimer,
    ActionGpsTimer,
    ActionWifiLog,
    BluetoothOff,
    BluetoothOn,
    DailySurvey,
    GpsOff,
    GpsOn,
    #[serde(rename = "signout_intent")]
    Signout,
    VoiceRecording,
    WeeklySurvey,
    #[serde(rename = "upload_data_files_intent")]
    UploadDataFiles,
    #[serde(rename = "check_for_new_surveys_intent")]
    CheckForNewSurveys,
}

impl Signal {
    /// Every signal, in wire-name order.
    pub const ALL: [Signal; 16] = [
        Self::AccelerometerOff,
        Self::AccelerometerOn,
        Self::ActionAccelerometerTimer,
        Self::ActionBluetoothTimer,
        Self::ActionGpsTimer,
        Self::ActionWifiLog,
        Self::BluetoothOff,
        Self::BluetoothOn,
        Self::DailySurvey,
        Self::GpsOff,
        Self::GpsOn,
        Self::Signout,
        Self::VoiceRecording,
        Self::WeeklySurvey,
        Self::UploadDataFiles,
        Self::CheckForNewSurveys,
    ];

    /// Render the signal to its wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AccelerometerOff => "accelerometer_off",
            Self::AccelerometerOn => "accelerometer_on",
            Self::ActionAccelerometerTimer => "action_accelerometer_timer",
            Self::ActionBluetoothTimer => "action_bluetooth_timer",
            Self::ActionGpsTimer => "action_gps_timer",
            Self::ActionWifiLog => "action_wifi_log",
            Self::BluetoothOff => "bluetooth_off",
            Self::BluetoothOn => "bluetooth_on",
            Self::DailySurvey => "daily_survey",
            Self::GpsOff => "gps_off",
            Self::GpsOn => "gps_on",
            Self::Signout => "signout_intent",
            Self::VoiceRecording => "voice_recording",
            Self::WeeklySurvey => "weekly_survey",
            Self::UploadDataFiles => "upload_data_files_intent",
            Self::CheckForNewSurveys => "check_for_new_surveys_intent",
        }
    }

    /// Parse a wire name. Matching is exact; unknown names yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|signal| signal.as_str() == raw)
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::collections::HashSet;

    #[test]
    fn wire_names_are_unique() {
        let names: HashSet<&str> = Signal::ALL.iter().map(|s| s.as_str()).collect();
        assert_eq!(names.len(), Signal::ALL.len());
    }

    #[test]
    fn parse_is_inverse_of_as_str() {
        for signal in Signal::ALL {
            assert_eq!(Signal::parse(signal.as_str()), Some(signal));
        }
    }

    #[test]
    fn parse_is_exact() {
        assert_eq!(Signal::parse("GPS_ON"), None);
        assert_eq!(Signal::parse(" gps_on"), None);
        assert_eq!(Signal::parse("signout"), None);
    }

    #[test]
    fn serde_uses_wire_names() {
        for signal in Signal::ALL {
            let json = serde_json::to_string(&signal).unwrap();
            assert_eq!(json, format!("\"{}\"", signal.as_str()));
        }
    }
}
