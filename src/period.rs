//! Period arithmetic for rollup granularities
//!
//! A period is a unit (seconds through years) plus a positive duration.
//! Seconds through days are pure tick arithmetic; months and years follow
//! the calendar. Range starts are floored to multiples of the duration
//! counted from the calendar anchors (midnight, day 1, month 1, year 1).

use crate::error::{Result, TickError};
use crate::types::{
    from_ticks, to_ticks, TICKS_PER_DAY, TICKS_PER_HOUR, TICKS_PER_MINUTE, TICKS_PER_SECOND,
};
use chrono::{DateTime, Datelike, Months, TimeZone, Timelike, Utc};
use std::fmt;

/// Unit of a rollup period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeriodType {
    Seconds,
    Minutes,
    Hours,
    Days,
    Months,
    Years,
}

impl PeriodType {
    /// Parse a unit from its canonical name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Seconds" => Some(PeriodType::Seconds),
            "Minutes" => Some(PeriodType::Minutes),
            "Hours" => Some(PeriodType::Hours),
            "Days" => Some(PeriodType::Days),
            "Months" => Some(PeriodType::Months),
            "Years" => Some(PeriodType::Years),
            _ => None,
        }
    }
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PeriodType::Seconds => "Seconds",
            PeriodType::Minutes => "Minutes",
            PeriodType::Hours => "Hours",
            PeriodType::Days => "Days",
            PeriodType::Months => "Months",
            PeriodType::Years => "Years",
        };
        f.write_str(name)
    }
}

/// A rollup granularity: unit plus positive duration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeriodDuration {
    /// Period unit
    pub period_type: PeriodType,
    /// How many units per window
    pub duration: u32,
}

impl PeriodDuration {
    /// A period of `n` seconds
    pub fn seconds(n: u32) -> Self {
        Self { period_type: PeriodType::Seconds, duration: n }
    }

    /// A period of `n` minutes
    pub fn minutes(n: u32) -> Self {
        Self { period_type: PeriodType::Minutes, duration: n }
    }

    /// A period of `n` hours
    pub fn hours(n: u32) -> Self {
        Self { period_type: PeriodType::Hours, duration: n }
    }

    /// A period of `n` days
    pub fn days(n: u32) -> Self {
        Self { period_type: PeriodType::Days, duration: n }
    }

    /// A period of `n` calendar months
    pub fn months(n: u32) -> Self {
        Self { period_type: PeriodType::Months, duration: n }
    }

    /// A period of `n` calendar years
    pub fn years(n: u32) -> Self {
        Self { period_type: PeriodType::Years, duration: n }
    }

    /// The suffix under which rollup trees for this period are filed,
    /// e.g. `Minutes-5`
    pub fn suffix(&self) -> String {
        format!("{}-{}", self.period_type, self.duration)
    }

    /// Parse a rollup tree suffix back into a period
    pub fn from_suffix(s: &str) -> Option<Self> {
        let (name, n) = s.split_once('-')?;
        let period_type = PeriodType::parse(name)?;
        let duration: u32 = n.parse().ok()?;
        if duration == 0 {
            return None;
        }
        Some(Self { period_type, duration })
    }

    /// Advance an instant by one period
    pub fn add(&self, at: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let n = self.duration;
        let advanced = match self.period_type {
            PeriodType::Seconds => from_ticks(to_ticks(at) + n as i64 * TICKS_PER_SECOND),
            PeriodType::Minutes => from_ticks(to_ticks(at) + n as i64 * TICKS_PER_MINUTE),
            PeriodType::Hours => from_ticks(to_ticks(at) + n as i64 * TICKS_PER_HOUR),
            PeriodType::Days => from_ticks(to_ticks(at) + n as i64 * TICKS_PER_DAY),
            PeriodType::Months => at.checked_add_months(Months::new(n)),
            PeriodType::Years => at.checked_add_months(Months::new(n * 12)),
        };
        advanced.ok_or_else(|| {
            TickError::InvalidQuery(format!("advancing {} by {} overflows the calendar", at, self))
        })
    }

    /// Floor an instant to the start of the period window containing it
    pub fn start_of_range(&self, at: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let d = self.duration;
        let (y, mo, da) = (at.year(), at.month(), at.day());
        let (h, mi, s) = (at.hour(), at.minute(), at.second());

        let floored = match self.period_type {
            PeriodType::Seconds => Utc.with_ymd_and_hms(y, mo, da, h, mi, s - s % d),
            PeriodType::Minutes => Utc.with_ymd_and_hms(y, mo, da, h, mi - mi % d, 0),
            PeriodType::Hours => Utc.with_ymd_and_hms(y, mo, da, h - h % d, 0, 0),
            PeriodType::Days => Utc.with_ymd_and_hms(y, mo, (da - da % d).max(1), 0, 0, 0),
            PeriodType::Months => Utc.with_ymd_and_hms(y, (mo - mo % d).max(1), 1, 0, 0, 0),
            PeriodType::Years => Utc.with_ymd_and_hms(y - y.rem_euclid(d as i32), 1, 1, 0, 0, 0),
        };
        floored.single().ok_or_else(|| {
            TickError::InvalidQuery(format!("no valid window start for {} by {}", at, self))
        })
    }

    /// Validate that both query boundaries fall on window edges for this
    /// period, per the alignment rules of the rollup engine
    pub fn validate_aligned(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<()> {
        if self.duration == 0 {
            return Err(TickError::InvalidQuery(
                "period duration must be positive".into(),
            ));
        }
        self.check_boundary(start, false)?;
        self.check_boundary(end, true)
    }

    fn check_boundary(&self, b: DateTime<Utc>, is_end: bool) -> Result<()> {
        let d = self.duration;
        match self.period_type {
            PeriodType::Seconds => {
                if b.nanosecond() != 0 {
                    return Err(invalid("cannot specify milliseconds for a rollup query by seconds"));
                }
                if b.second() % d != 0 {
                    return Err(invalid(&format!(
                        "seconds must fall on a multiple of the {} second period", d
                    )));
                }
            }
            PeriodType::Minutes => {
                if b.nanosecond() != 0 {
                    return Err(invalid("cannot specify milliseconds for a rollup query by minutes"));
                }
                if b.second() != 0 {
                    return Err(invalid("cannot specify seconds for a rollup query by minutes"));
                }
                if b.minute() % d != 0 {
                    return Err(invalid(&format!(
                        "minutes must fall on a multiple of the {} minute period", d
                    )));
                }
            }
            PeriodType::Hours => {
                if b.nanosecond() != 0 {
                    return Err(invalid("cannot specify milliseconds for a rollup query by hours"));
                }
                if b.second() != 0 {
                    return Err(invalid("cannot specify seconds for a rollup query by hours"));
                }
                if b.minute() != 0 {
                    return Err(invalid("cannot specify minutes for a rollup query by hours"));
                }
                if b.hour() % d != 0 {
                    return Err(invalid(&format!(
                        "hours must fall on a multiple of the {} hour period", d
                    )));
                }
            }
            PeriodType::Days => {
                if b.nanosecond() != 0 {
                    return Err(invalid("cannot specify milliseconds for a rollup query by days"));
                }
                if b.second() != 0 {
                    return Err(invalid("cannot specify seconds for a rollup query by days"));
                }
                if b.minute() != 0 {
                    return Err(invalid("cannot specify minutes for a rollup query by days"));
                }
                if b.hour() != 0 {
                    return Err(invalid("cannot specify hours for a rollup query by days"));
                }
                if b.day() % d != 0 {
                    return Err(invalid(&format!(
                        "days must fall on a multiple of the {} day period", d
                    )));
                }
            }
            PeriodType::Months => {
                if b.nanosecond() != 0 {
                    return Err(invalid("cannot specify milliseconds for a rollup query by months"));
                }
                if !is_end && b.second() != 0 {
                    return Err(invalid("cannot specify seconds for a rollup query by months"));
                }
                if b.minute() != 0 {
                    return Err(invalid("cannot specify minutes for a rollup query by months"));
                }
                if b.hour() != 0 {
                    return Err(invalid("cannot specify hours for a rollup query by months"));
                }
                if b.day() != 1 {
                    return Err(invalid(
                        "a rollup query by months must fall on the first day of the month",
                    ));
                }
                if b.month() % d != 0 {
                    return Err(invalid(&format!(
                        "months must fall on a multiple of the {} month period", d
                    )));
                }
            }
            PeriodType::Years => {
                if b.nanosecond() != 0 {
                    return Err(invalid("cannot specify milliseconds for a rollup query by years"));
                }
                if b.second() != 0 {
                    return Err(invalid("cannot specify seconds for a rollup query by years"));
                }
                if b.minute() != 0 {
                    return Err(invalid("cannot specify minutes for a rollup query by years"));
                }
                if b.hour() != 0 {
                    return Err(invalid("cannot specify hours for a rollup query by years"));
                }
                if b.day() != 1 {
                    return Err(invalid(
                        "a rollup query by years must fall on the first day of the month",
                    ));
                }
                if b.month() != 1 {
                    return Err(invalid(
                        "a rollup query by years must fall on the first month of the year",
                    ));
                }
                if b.year().rem_euclid(d as i32) != 0 {
                    return Err(invalid(&format!(
                        "years must fall on a multiple of the {} year period", d
                    )));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for PeriodDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.duration, self.period_type)
    }
}

fn invalid(message: &str) -> TickError {
    TickError::InvalidQuery(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_add_tick_units() {
        let d = PeriodDuration::minutes(5);
        assert_eq!(d.add(at(2015, 1, 1, 0, 0, 0)).unwrap(), at(2015, 1, 1, 0, 5, 0));

        let d = PeriodDuration::days(1);
        assert_eq!(d.add(at(2015, 2, 28, 0, 0, 0)).unwrap(), at(2015, 3, 1, 0, 0, 0));
    }

    #[test]
    fn test_add_calendar_units() {
        let d = PeriodDuration::months(1);
        assert_eq!(d.add(at(2015, 1, 31, 0, 0, 0)).unwrap(), at(2015, 2, 28, 0, 0, 0));

        let d = PeriodDuration::years(2);
        assert_eq!(d.add(at(2015, 6, 1, 0, 0, 0)).unwrap(), at(2017, 6, 1, 0, 0, 0));
    }

    #[test]
    fn test_start_of_range() {
        let t = at(2015, 3, 17, 13, 47, 29);

        assert_eq!(
            PeriodDuration::seconds(10).start_of_range(t).unwrap(),
            at(2015, 3, 17, 13, 47, 20)
        );
        assert_eq!(
            PeriodDuration::minutes(15).start_of_range(t).unwrap(),
            at(2015, 3, 17, 13, 45, 0)
        );
        assert_eq!(
            PeriodDuration::hours(6).start_of_range(t).unwrap(),
            at(2015, 3, 17, 12, 0, 0)
        );
        assert_eq!(
            PeriodDuration::days(1).start_of_range(t).unwrap(),
            at(2015, 3, 17, 0, 0, 0)
        );
        assert_eq!(
            PeriodDuration::months(1).start_of_range(t).unwrap(),
            at(2015, 3, 1, 0, 0, 0)
        );
        assert_eq!(
            PeriodDuration::years(1).start_of_range(t).unwrap(),
            at(2015, 1, 1, 0, 0, 0)
        );
    }

    #[test]
    fn test_start_of_range_truncates_subseconds() {
        let t = at(2015, 1, 1, 0, 0, 5) + chrono::Duration::milliseconds(500);
        assert_eq!(
            PeriodDuration::seconds(1).start_of_range(t).unwrap(),
            at(2015, 1, 1, 0, 0, 5)
        );
    }

    #[test]
    fn test_validate_aligned_accepts_boundaries() {
        PeriodDuration::minutes(1)
            .validate_aligned(at(2015, 1, 1, 0, 0, 0), at(2015, 1, 1, 0, 1, 0))
            .unwrap();
        PeriodDuration::hours(6)
            .validate_aligned(at(2015, 1, 1, 0, 0, 0), at(2015, 1, 1, 12, 0, 0))
            .unwrap();
        PeriodDuration::years(1)
            .validate_aligned(at(2014, 1, 1, 0, 0, 0), at(2016, 1, 1, 0, 0, 0))
            .unwrap();
    }

    #[test]
    fn test_validate_aligned_rejects_milliseconds() {
        let start = at(2015, 1, 1, 0, 0, 0) + chrono::Duration::milliseconds(500);
        let err = PeriodDuration::seconds(1)
            .validate_aligned(start, at(2015, 1, 1, 0, 1, 0))
            .unwrap_err();
        match err {
            TickError::InvalidQuery(msg) => assert!(msg.contains("cannot specify milliseconds")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validate_aligned_rejects_each_field() {
        assert!(PeriodDuration::minutes(1)
            .validate_aligned(at(2015, 1, 1, 0, 0, 30), at(2015, 1, 1, 0, 1, 0))
            .is_err());
        assert!(PeriodDuration::hours(1)
            .validate_aligned(at(2015, 1, 1, 0, 30, 0), at(2015, 1, 1, 1, 0, 0))
            .is_err());
        assert!(PeriodDuration::days(1)
            .validate_aligned(at(2015, 1, 1, 6, 0, 0), at(2015, 1, 2, 0, 0, 0))
            .is_err());
        assert!(PeriodDuration::months(1)
            .validate_aligned(at(2015, 1, 15, 0, 0, 0), at(2015, 2, 1, 0, 0, 0))
            .is_err());
        assert!(PeriodDuration::years(1)
            .validate_aligned(at(2015, 2, 1, 0, 0, 0), at(2016, 1, 1, 0, 0, 0))
            .is_err());
    }

    #[test]
    fn test_validate_aligned_rejects_off_multiples() {
        assert!(PeriodDuration::minutes(15)
            .validate_aligned(at(2015, 1, 1, 0, 10, 0), at(2015, 1, 1, 0, 30, 0))
            .is_err());
        assert!(PeriodDuration::hours(6)
            .validate_aligned(at(2015, 1, 1, 0, 0, 0), at(2015, 1, 1, 7, 0, 0))
            .is_err());
    }

    #[test]
    fn test_months_end_boundary_relaxes_seconds() {
        // the end boundary of a by-months query does not reject stray seconds
        let start = at(2015, 1, 1, 0, 0, 0);
        let end = at(2015, 3, 1, 0, 0, 30);
        PeriodDuration::months(1).validate_aligned(start, end).unwrap();

        // but the start boundary does
        let bad_start = at(2015, 1, 1, 0, 0, 30);
        assert!(PeriodDuration::months(1)
            .validate_aligned(bad_start, at(2015, 3, 1, 0, 0, 0))
            .is_err());
    }

    #[test]
    fn test_suffix_round_trip() {
        let d = PeriodDuration::minutes(5);
        assert_eq!(d.suffix(), "Minutes-5");
        assert_eq!(PeriodDuration::from_suffix("Minutes-5"), Some(d));
        assert_eq!(PeriodDuration::from_suffix("Fortnights-2"), None);
        assert_eq!(PeriodDuration::from_suffix("Hours-0"), None);
        assert_eq!(PeriodDuration::from_suffix("Hours"), None);
    }

    #[test]
    fn test_zero_duration_rejected() {
        let d = PeriodDuration { period_type: PeriodType::Seconds, duration: 0 };
        assert!(d
            .validate_aligned(at(2015, 1, 1, 0, 0, 0), at(2015, 1, 1, 0, 1, 0))
            .is_err());
    }
}
