//! Timer definitions: the timing policy and the signal a timer emits.

use crate::signal::Signal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Well-known timer names. Each identifies one logical alarm; at most one
/// instance per name is ever armed.
pub mod names {
    /// Accelerometer on/off cycle.
    pub const ACCELEROMETER: &str = "action_accelerometer_timer";
    /// GPS on/off cycle.
    pub const GPS: &str = "action_gps_timer";
    /// Bluetooth scan window and hourly cadence.
    pub const BLUETOOTH: &str = "action_bluetooth_timer";
    /// Wi-Fi log scans.
    pub const WIFI_LOG: &str = "wifi_log_timer";
    /// Daily voice-recording prompt.
    pub const VOICE_RECORDING: &str = "voice_recording";
    /// Periodic upload of queued data files.
    pub const UPLOAD_DATA_FILES: &str = "upload_data_files_intent";
    /// Periodic survey metadata refresh.
    pub const CHECK_FOR_NEW_SURVEYS: &str = "check_for_new_surveys_intent";
    /// Automatic logout countdown.
    pub const SIGNOUT: &str = "signout_intent";
    /// Daily survey prompt (suffixed with `:<survey id>` when known).
    pub const DAILY_SURVEY: &str = "daily_survey";
    /// Weekly survey prompt (suffixed with `:<survey id>` when known).
    pub const WEEKLY_SURVEY: &str = "weekly_survey";
}

/// How a timer decides when to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimerKind {
    /// Fire once, exactly `delay_ms` after arming.
    SingularExact {
        /// Delay in milliseconds.
        delay_ms: u64,
    },
    /// Fire once, `base_ms` plus a uniform jitter in `[0, base_ms)` after arming.
    SingularFuzzy {
        /// Base delay in milliseconds (also the jitter ceiling).
        base_ms: u64,
    },
    /// Fire every `period_ms`, first fire one period after arming.
    PeriodicExact {
        /// Period in milliseconds.
        period_ms: u64,
    },
    /// Fire every day at `hour`:00 local time.
    DailyRepeating {
        /// Hour of day (0-23).
        hour: u8,
    },
    /// Fire every week on `day_of_week` (0 = Sunday) at `hour`:00 local time.
    WeeklyRepeating {
        /// Day of week, 0 = Sunday .. 6 = Saturday.
        day_of_week: u8,
        /// Hour of day (0-23).
        hour: u8,
    },
}

impl TimerKind {
    /// Exact one-shot after `delay`.
    #[must_use]
    pub fn singular_exact(delay: Duration) -> Self {
        Self::SingularExact {
            delay_ms: duration_ms(delay),
        }
    }

    /// Jittered one-shot with base delay `base`.
    #[must_use]
    pub fn singular_fuzzy(base: Duration) -> Self {
        Self::SingularFuzzy {
            base_ms: duration_ms(base),
        }
    }

    /// Fixed-period repeating timer.
    #[must_use]
    pub fn periodic(period: Duration) -> Self {
        Self::PeriodicExact {
            period_ms: duration_ms(period),
        }
    }

    /// Interval between consecutive fires of a repeating kind.
    #[must_use]
    pub fn repeat_interval(&self) -> Option<chrono::Duration> {
        match self {
            Self::SingularExact { .. } | Self::SingularFuzzy { .. } => None,
            Self::PeriodicExact { period_ms } => Some(chrono::Duration::milliseconds(
                i64::try_from(*period_ms).unwrap_or(i64::MAX),
            )),
            Self::DailyRepeating { .. } => Some(chrono::Duration::days(1)),
            Self::WeeklyRepeating { .. } => Some(chrono::Duration::weeks(1)),
        }
    }
}

impl std::fmt::Display for TimerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SingularExact { delay_ms } => write!(f, "once after {delay_ms}ms"),
            Self::SingularFuzzy { base_ms } => {
                write!(f, "once after {base_ms}ms + jitter < {base_ms}ms")
            }
            Self::PeriodicExact { period_ms } => {
                if *period_ms >= 3_600_000 && period_ms % 3_600_000 == 0 {
                    write!(f, "every {} hours", period_ms / 3_600_000)
                } else {
                    write!(f, "every {period_ms}ms")
                }
            }
            Self::DailyRepeating { hour } => write!(f, "daily at {hour:02}:00"),
            Self::WeeklyRepeating { day_of_week, hour } => {
                write!(f, "weekly on day {day_of_week} at {hour:02}:00")
            }
        }
    }
}

/// One logical alarm: a name, a timing policy and the signal it emits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSpec {
    /// Unique timer name.
    pub name: String,
    /// Timing policy.
    pub kind: TimerKind,
    /// Signal published when the timer fires.
    pub target: Signal,
}

impl TimerSpec {
    /// Create a timer spec.
    pub fn new(name: impl Into<String>, kind: TimerKind, target: Signal) -> Self {
        Self {
            name: name.into(),
            kind,
            target,
        }
    }
}

pub(crate) fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
