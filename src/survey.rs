//! Survey schedule resolution.
//!
//! Survey metadata arrives as raw JSON. Only two integer fields matter here:
//! `hour_of_day` and `day_of_week`. Resolution never fails; anything missing
//! or malformed falls back to a daily prompt at 19:00.

use crate::alarm::timer::{TimerKind, TimerSpec, names};
use crate::error::CadenceError;
use crate::signal::Signal;
use serde_json::Value;
use tracing::warn;

/// Hour used when `hour_of_day` is missing or unusable.
pub const DEFAULT_SURVEY_HOUR: u8 = 19;

/// How often a survey is prompted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Daily,
    /// Weekly on the given day, 0 = Sunday.
    Weekly { day_of_week: u8 },
}

/// Resolved prompt schedule for one survey. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurveySchedule {
    pub survey_id: Option<String>,
    pub hour: u8,
    pub cadence: Cadence,
}

impl SurveySchedule {
    /// Signal emitted when the prompt is due.
    #[must_use]
    pub fn signal(&self) -> Signal {
        match self.cadence {
            Cadence::Daily => Signal::DailySurvey,
            Cadence::Weekly { .. } => Signal::WeeklySurvey,
        }
    }

    /// Timer name: the canonical survey name, suffixed with `:<id>` when the
    /// metadata carried one.
    #[must_use]
    pub fn timer_name(&self) -> String {
        let base = match self.cadence {
            Cadence::Daily => names::DAILY_SURVEY,
            Cadence::Weekly { .. } => names::WEEKLY_SURVEY,
        };
        match &self.survey_id {
            Some(id) => format!("{base}:{id}"),
            None => base.to_owned(),
        }
    }

    /// Repeating timer kind for this schedule.
    #[must_use]
    pub fn timer_kind(&self) -> TimerKind {
        match self.cadence {
            Cadence::Daily => TimerKind::DailyRepeating { hour: self.hour },
            Cadence::Weekly { day_of_week } => TimerKind::WeeklyRepeating {
                day_of_week,
                hour: self.hour,
            },
        }
    }

    /// Complete timer definition.
    #[must_use]
    pub fn timer_spec(&self) -> TimerSpec {
        TimerSpec::new(self.timer_name(), self.timer_kind(), self.signal())
    }
}

/// Resolve one survey's schedule from raw metadata text.
///
/// Text that is not a JSON object resolves to the daily default.
#[must_use]
pub fn resolve_str(raw: &str) -> SurveySchedule {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => resolve(&value),
        Err(e) => {
            report(CadenceError::MalformedSurveyMetadata {
                field: "survey",
                reason: e.to_string(),
            });
            resolve(&Value::Null)
        }
    }
}

/// Resolve one survey's schedule from parsed metadata.
#[must_use]
pub fn resolve(metadata: &Value) -> SurveySchedule {
    let hour = match metadata.get("hour_of_day") {
        None | Some(Value::Null) => DEFAULT_SURVEY_HOUR,
        Some(raw) => match as_int(raw).and_then(|h| in_range(h, 23)) {
            Some(hour) => hour,
            None => {
                report(CadenceError::MalformedSurveyMetadata {
                    field: "hour_of_day",
                    reason: format!("expected an integer 0-23, got {raw}"),
                });
                DEFAULT_SURVEY_HOUR
            }
        },
    };

    let cadence = match metadata.get("day_of_week") {
        None | Some(Value::Null) => Cadence::Daily,
        Some(raw) => match as_int(raw).and_then(|d| in_range(d, 6)) {
            Some(day_of_week) => Cadence::Weekly { day_of_week },
            None => {
                report(CadenceError::MalformedSurveyMetadata {
                    field: "day_of_week",
                    reason: format!("expected an integer 0-6, got {raw}"),
                });
                Cadence::Daily
            }
        },
    };

    let survey_id = metadata
        .get("survey_id")
        .and_then(|id| match id {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

    SurveySchedule {
        survey_id,
        hour,
        cadence,
    }
}

/// Integers, integral floats and numeric strings.
fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.is_finite())
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn in_range(value: i64, max: u8) -> Option<u8> {
    u8::try_from(value).ok().filter(|v| *v <= max)
}

fn report(error: CadenceError) {
    warn!("{error}; using default");
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use serde_json::json;

    #[test]
    fn hour_only_is_daily() {
        let s = resolve(&json!({"hour_of_day": 8}));
        assert_eq!(s.hour, 8);
        assert_eq!(s.cadence, Cadence::Daily);
        assert_eq!(s.signal(), Signal::DailySurvey);
        assert_eq!(s.timer_name(), "daily_survey");
    }

    #[test]
    fn hour_and_day_is_weekly() {
        let s = resolve(&json!({"hour_of_day": 8, "day_of_week": 2}));
        assert_eq!(s.hour, 8);
        assert_eq!(s.cadence, Cadence::Weekly { day_of_week: 2 });
        assert_eq!(
            s.timer_kind(),
            TimerKind::WeeklyRepeating {
                day_of_week: 2,
                hour: 8
            }
        );
        assert_eq!(s.timer_name(), "weekly_survey");
    }

    #[test]
    fn empty_object_defaults_to_daily_at_nineteen() {
        let s = resolve(&json!({}));
        assert_eq!(s.hour, DEFAULT_SURVEY_HOUR);
        assert_eq!(s.cadence, Cadence::Daily);
        assert_eq!(s.survey_id, None);
    }

    #[test]
    fn malformed_hour_defaults() {
        for raw in [json!({"hour_of_day": "evening"}), json!({"hour_of_day": 24}), json!({"hour_of_day": -1}), json!({"hour_of_day": 7.5})] {
            assert_eq!(resolve(&raw).hour, DEFAULT_SURVEY_HOUR, "{raw}");
        }
    }

    #[test]
    fn numeric_strings_and_integral_floats_are_accepted() {
        assert_eq!(resolve(&json!({"hour_of_day": "8"})).hour, 8);
        assert_eq!(resolve(&json!({"hour_of_day": 8.0})).hour, 8);
        assert_eq!(
            resolve(&json!({"day_of_week": "0"})).cadence,
            Cadence::Weekly { day_of_week: 0 }
        );
    }

    #[test]
    fn bad_day_of_week_falls_back_to_daily() {
        for raw in [json!({"day_of_week": 7}), json!({"day_of_week": "monday"}), json!({"day_of_week": [1]})] {
            assert_eq!(resolve(&raw).cadence, Cadence::Daily, "{raw}");
        }
        assert_eq!(resolve(&json!({"day_of_week": null})).cadence, Cadence::Daily);
    }

    #[test]
    fn survey_id_suffixes_timer_name() {
        let s = resolve(&json!({"survey_id": "abc", "hour_of_day": 9, "day_of_week": 1}));
        assert_eq!(s.timer_name(), "weekly_survey:abc");
        assert_eq!(s.timer_spec().target, Signal::WeeklySurvey);
        assert_eq!(resolve(&json!({"survey_id": 12})).timer_name(), "daily_survey:12");
        assert_eq!(resolve(&json!({"survey_id": "  "})).timer_name(), "daily_survey");
    }

    #[test]
    fn unparseable_text_defaults() {
        let s = resolve_str("not json at all");
        assert_eq!(s.hour, DEFAULT_SURVEY_HOUR);
        assert_eq!(s.cadence, Cadence::Daily);

        let s = resolve_str(r#"{"hour_of_day": 6, "day_of_week": 5}"#);
        assert_eq!(s.cadence, Cadence::Weekly { day_of_week: 5 });
    }

    #[test]
    fn non_object_metadata_defaults() {
        assert_eq!(resolve(&json!([1, 2, 3])).hour, DEFAULT_SURVEY_HOUR);
        assert_eq!(resolve(&json!("text")).cadence, Cadence::Daily);
    }
}
