use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveTime, TimeDelta, Utc};

/// When a job fires. Calendar triggers are evaluated in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Every(Duration),
    DailyAt { hour: u32, minute: u32 },
    MonthlyAt { day: u32, hour: u32, minute: u32 },
}

impl Trigger {
    /// First fire time strictly after `after`.
    ///
    /// `None` for triggers that can never fire (zero interval, out-of-range
    /// fields) or that would leave the representable date range.
    #[must_use]
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match *self {
            Trigger::Every(interval) => {
                if interval.is_zero() {
                    return None;
                }
                after.checked_add_signed(TimeDelta::from_std(interval).ok()?)
            }
            Trigger::DailyAt { hour, minute } => {
                let target = NaiveTime::from_hms_opt(hour, minute, 0)?;
                let mut date = after.date_naive();
                if after.time() >= target {
                    date = date.succ_opt()?;
                }
                Some(date.and_time(target).and_utc())
            }
            Trigger::MonthlyAt { day, hour, minute } => {
                let target = NaiveTime::from_hms_opt(hour, minute, 0)?;
                if !(1..=31).contains(&day) {
                    return None;
                }
                let first = NaiveDate::from_ymd_opt(after.year(), after.month(), 1)?;
                // Months without `day` are skipped; any day fits within a year.
                (0..=12).find_map(|offset| {
                    let month = first.checked_add_months(Months::new(offset))?;
                    let candidate = month
                        .with_day(day)?
                        .and_time(target)
                        .and_utc();
                    (candidate > after).then_some(candidate)
                })
            }
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Every(interval) => write!(f, "every {}ms", interval.as_millis()),
            Trigger::DailyAt { hour, minute } => write!(f, "daily at {hour:02}:{minute:02} UTC"),
            Trigger::MonthlyAt { day, hour, minute } => {
                write!(f, "monthly on day {day} at {hour:02}:{minute:02} UTC")
            }
        }
    }
}

/// What to do with a tick that woke at `now` for a fire time of `scheduled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickDecision {
    Run,
    Misfire { late_by: Duration },
}

#[must_use]
pub fn classify_tick(scheduled: DateTime<Utc>, now: DateTime<Utc>, grace: Duration) -> TickDecision {
    match (now - scheduled).to_std() {
        Ok(late_by) if late_by > grace => TickDecision::Misfire { late_by },
        _ => TickDecision::Run,
    }
}

/// Wall-clock wait until `next`, zero if it has already passed.
#[must_use]
pub fn duration_until(next: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn parse_utc(ts: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(ts)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    #[rstest]
    #[case("2025-11-08T00:03:00Z", "2025-11-08T00:05:00Z")]
    #[case("2025-11-08T00:05:00Z", "2025-11-09T00:05:00Z")]
    #[case("2025-12-31T23:59:00Z", "2026-01-01T00:05:00Z")]
    fn daily_fires_strictly_after(#[case] now: &str, #[case] expected: &str) {
        let trigger = Trigger::DailyAt { hour: 0, minute: 5 };
        assert_eq!(trigger.next_after(parse_utc(now)), Some(parse_utc(expected)));
    }

    #[rstest]
    #[case("2025-11-08T10:00:00Z", "2025-12-01T00:00:00Z")]
    #[case("2025-12-01T00:00:00Z", "2026-01-01T00:00:00Z")]
    #[case("2025-11-30T23:59:59Z", "2025-12-01T00:00:00Z")]
    fn monthly_first_of_month(#[case] now: &str, #[case] expected: &str) {
        let trigger = Trigger::MonthlyAt { day: 1, hour: 0, minute: 0 };
        assert_eq!(trigger.next_after(parse_utc(now)), Some(parse_utc(expected)));
    }

    #[test]
    fn monthly_skips_short_months() {
        let trigger = Trigger::MonthlyAt { day: 31, hour: 2, minute: 0 };
        assert_eq!(
            trigger.next_after(parse_utc("2025-01-31T03:00:00Z")),
            Some(parse_utc("2025-03-31T02:00:00Z"))
        );
    }

    #[test]
    fn every_adds_interval() {
        let trigger = Trigger::Every(Duration::from_secs(300));
        assert_eq!(
            trigger.next_after(parse_utc("2025-11-08T10:00:00Z")),
            Some(parse_utc("2025-11-08T10:05:00Z"))
        );
    }

    #[rstest]
    #[case(Trigger::Every(Duration::ZERO))]
    #[case(Trigger::DailyAt { hour: 24, minute: 0 })]
    #[case(Trigger::MonthlyAt { day: 0, hour: 0, minute: 0 })]
    #[case(Trigger::MonthlyAt { day: 32, hour: 0, minute: 0 })]
    fn invalid_triggers_never_fire(#[case] trigger: Trigger) {
        assert_eq!(trigger.next_after(parse_utc("2025-11-08T10:00:00Z")), None);
    }

    #[test]
    fn ticks_later_than_grace_are_misfires() {
        let scheduled = parse_utc("2025-11-08T00:00:00Z");
        let grace = Duration::from_secs(60);

        assert_eq!(classify_tick(scheduled, scheduled, grace), TickDecision::Run);
        assert_eq!(
            classify_tick(scheduled, parse_utc("2025-11-08T00:01:00Z"), grace),
            TickDecision::Run
        );
        assert_eq!(
            classify_tick(scheduled, parse_utc("2025-11-08T00:01:01Z"), grace),
            TickDecision::Misfire {
                late_by: Duration::from_secs(61)
            }
        );
        // waking early is never a misfire
        assert_eq!(
            classify_tick(scheduled, parse_utc("2025-11-07T23:59:59Z"), grace),
            TickDecision::Run
        );
    }
}
