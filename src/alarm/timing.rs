//! Fire-time arithmetic: jitter, wall-clock anchors and repeat stepping.
//!
//! Everything here is pure so the calendar rules can be tested against fixed
//! instants instead of the system clock.

use chrono::{DateTime, Datelike, Days, NaiveDate, TimeZone};
use rand::Rng;
use std::time::Duration;

use super::timer::duration_ms;

/// Delay for a fuzzy one-shot: `base + U[0, base)`, at millisecond resolution.
///
/// Jitter is only ever added, so a fuzzy timer never fires before `base`.
pub fn fuzzy_delay<R: Rng + ?Sized>(base: Duration, rng: &mut R) -> Duration {
    let base_ms = duration_ms(base);
    if base_ms == 0 {
        return Duration::ZERO;
    }
    let jitter = rng.gen_range(0..base_ms);
    Duration::from_millis(base_ms.saturating_add(jitter))
}

/// Next `hour:00` strictly after `now` in `now`'s time zone.
///
/// Today when that instant is still ahead, tomorrow otherwise. Returns `None`
/// for an hour outside 0-23.
pub fn next_daily<Tz: TimeZone>(now: &DateTime<Tz>, hour: u8) -> Option<DateTime<Tz>> {
    if hour > 23 {
        return None;
    }
    let today = now.date_naive();
    // A third day covers a DST gap swallowing tomorrow's slot.
    (0..3).find_map(|offset| {
        let day = today.checked_add_days(Days::new(offset))?;
        local_hour(&now.timezone(), day, hour).filter(|candidate| candidate > now)
    })
}

/// Next `day_of_week` (0 = Sunday) at `hour:00` strictly after `now`.
///
/// Returns `None` for a day outside 0-6 or an hour outside 0-23.
pub fn next_weekly<Tz: TimeZone>(
    now: &DateTime<Tz>,
    day_of_week: u8,
    hour: u8,
) -> Option<DateTime<Tz>> {
    if day_of_week > 6 || hour > 23 {
        return None;
    }
    let today = now.date_naive();
    let current = now.weekday().num_days_from_sunday();
    let ahead = (u32::from(day_of_week) + 7 - current) % 7;
    [0_u64, 7, 14].into_iter().find_map(|extra| {
        let day = today.checked_add_days(Days::new(u64::from(ahead) + extra))?;
        local_hour(&now.timezone(), day, hour).filter(|candidate| candidate > now)
    })
}

/// First occurrence of `anchor + k * interval` strictly after `now`.
///
/// Returns `anchor` itself while it is still in the future. Missed
/// occurrences are skipped, never replayed. `None` for a non-positive
/// interval or when the next occurrence is out of range.
pub fn next_after<Tz: TimeZone>(
    anchor: DateTime<Tz>,
    interval: chrono::Duration,
    now: &DateTime<Tz>,
) -> Option<DateTime<Tz>> {
    let interval_ms = interval.num_milliseconds();
    if interval_ms <= 0 {
        return None;
    }
    if anchor > *now {
        return Some(anchor);
    }
    let elapsed_ms = (now.clone() - anchor.clone()).num_milliseconds();
    let offset_ms = (elapsed_ms / interval_ms + 1).checked_mul(interval_ms)?;
    anchor.checked_add_signed(chrono::Duration::try_milliseconds(offset_ms)?)
}

/// Convert a signed wall-clock gap into a non-negative sleep duration.
pub fn until(from: DateTime<chrono::Utc>, to: DateTime<chrono::Utc>) -> Duration {
    (to - from).to_std().unwrap_or(Duration::ZERO)
}

fn local_hour<Tz: TimeZone>(tz: &Tz, day: NaiveDate, hour: u8) -> Option<DateTime<Tz>> {
    let naive = day.and_hms_opt(u32::from(hour), 0, 0)?;
    tz.from_local_datetime(&naive).earliest().or_else(|| {
        // Skipped by a DST gap: take the first valid instant after it.
        let shifted = naive + chrono::Duration::hours(1);
        tz.from_local_datetime(&shifted).earliest()
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use chrono::{FixedOffset, Timelike, Utc, Weekday};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn fuzzy_delay_stays_in_half_open_range_and_is_uniform() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let base = Duration::from_millis(5000);
        let trials = 10_000;
        let buckets = 10;
        let mut counts = vec![0_u32; buckets];
        let mut sum_ms = 0_u64;

        for _ in 0..trials {
            let delay = fuzzy_delay(base, &mut rng);
            let ms = duration_ms(delay);
            assert!((5000..10_000).contains(&ms), "delay {ms}ms out of range");
            sum_ms += ms;
            counts[((ms - 5000) / 500) as usize] += 1;
        }

        // Mean of U[5000, 10000) is 7499.5; standard error is ~14ms.
        let mean = sum_ms as f64 / f64::from(trials);
        assert!((mean - 7499.5).abs() < 100.0, "mean {mean}");

        // Chi-square against uniform with 9 degrees of freedom; p=0.001 cutoff is 27.88.
        let expected = f64::from(trials) / buckets as f64;
        let chi2: f64 = counts
            .iter()
            .map(|&c| (f64::from(c) - expected).powi(2) / expected)
            .sum();
        assert!(chi2 < 27.88, "chi-square {chi2} for counts {counts:?}");
    }

    #[test]
    fn fuzzy_delay_never_fires_early() {
        let mut rng = StdRng::seed_from_u64(7);
        for base_ms in [1_u64, 2, 10, 999] {
            for _ in 0..200 {
                let d = duration_ms(fuzzy_delay(Duration::from_millis(base_ms), &mut rng));
                assert!(d >= base_ms && d < 2 * base_ms);
            }
        }
    }

    #[test]
    fn fuzzy_delay_zero_base_is_zero() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(fuzzy_delay(Duration::ZERO, &mut rng), Duration::ZERO);
    }

    #[test]
    fn daily_before_hour_fires_today() {
        let now = utc(2024, 3, 5, 7, 30);
        assert_eq!(next_daily(&now, 8), Some(utc(2024, 3, 5, 8, 0)));
    }

    #[test]
    fn daily_after_hour_fires_tomorrow() {
        let now = utc(2024, 3, 5, 9, 15);
        assert_eq!(next_daily(&now, 8), Some(utc(2024, 3, 6, 8, 0)));
    }

    #[test]
    fn daily_exactly_on_hour_fires_tomorrow() {
        let now = utc(2024, 3, 5, 8, 0);
        assert_eq!(next_daily(&now, 8), Some(utc(2024, 3, 6, 8, 0)));
    }

    #[test]
    fn daily_respects_time_zone_of_now() {
        let tz = FixedOffset::east_opt(-5 * 3600).unwrap();
        let now = tz.with_ymd_and_hms(2024, 3, 5, 18, 0, 0).unwrap();
        let next = next_daily(&now, 19).unwrap();
        assert_eq!(next.hour(), 19);
        assert_eq!(next.with_timezone(&Utc), utc(2024, 3, 6, 0, 0));
    }

    #[test]
    fn daily_rejects_bad_hour() {
        assert_eq!(next_daily(&utc(2024, 3, 5, 0, 0), 24), None);
    }

    #[test]
    fn weekly_from_monday_morning_to_wednesday() {
        // 2024-01-01 is a Monday.
        let now = utc(2024, 1, 1, 9, 0);
        assert_eq!(now.weekday(), Weekday::Mon);
        let first = next_weekly(&now, 3, 10).unwrap();
        assert_eq!(first, utc(2024, 1, 3, 10, 0));
        assert_eq!(first.weekday(), Weekday::Wed);
    }

    #[test]
    fn weekly_same_day_later_hour_fires_today() {
        let now = utc(2024, 1, 3, 9, 0);
        assert_eq!(next_weekly(&now, 3, 10), Some(utc(2024, 1, 3, 10, 0)));
    }

    #[test]
    fn weekly_same_day_past_hour_fires_next_week() {
        let now = utc(2024, 1, 3, 11, 0);
        assert_eq!(next_weekly(&now, 3, 10), Some(utc(2024, 1, 10, 10, 0)));
    }

    #[test]
    fn weekly_sunday_is_zero() {
        let now = utc(2024, 1, 1, 9, 0);
        let next = next_weekly(&now, 0, 9).unwrap();
        assert_eq!(next.weekday(), Weekday::Sun);
        assert_eq!(next, utc(2024, 1, 7, 9, 0));
    }

    #[test]
    fn weekly_rejects_bad_inputs() {
        let now = utc(2024, 1, 1, 9, 0);
        assert_eq!(next_weekly(&now, 7, 10), None);
        assert_eq!(next_weekly(&now, 2, 24), None);
    }

    #[test]
    fn next_after_returns_future_anchor_unchanged() {
        let anchor = utc(2024, 1, 2, 0, 0);
        let now = utc(2024, 1, 1, 0, 0);
        assert_eq!(
            next_after(anchor, chrono::Duration::hours(1), &now),
            Some(anchor)
        );
    }

    #[test]
    fn next_after_skips_missed_occurrences() {
        let anchor = utc(2024, 1, 1, 0, 0);
        let now = utc(2024, 1, 1, 5, 30);
        assert_eq!(
            next_after(anchor, chrono::Duration::hours(1), &now),
            Some(utc(2024, 1, 1, 6, 0))
        );
        // Exactly on an occurrence moves to the following one.
        let on_the_hour = utc(2024, 1, 1, 6, 0);
        assert_eq!(
            next_after(anchor, chrono::Duration::hours(1), &on_the_hour),
            Some(utc(2024, 1, 1, 7, 0))
        );
    }

    #[test]
    fn next_after_rejects_zero_and_out_of_range_intervals() {
        let anchor = utc(2024, 1, 1, 0, 0);
        let now = utc(2024, 1, 1, 5, 30);
        assert_eq!(next_after(anchor, chrono::Duration::zero(), &now), None);
        assert_eq!(
            next_after(anchor, chrono::Duration::milliseconds(i64::MAX), &now),
            None
        );
    }

    #[test]
    fn until_clamps_past_to_zero() {
        let a = utc(2024, 1, 1, 0, 0);
        let b = utc(2024, 1, 1, 0, 1);
        assert_eq!(until(a, b), Duration::from_secs(60));
        assert_eq!(until(b, a), Duration::ZERO);
    }
}
