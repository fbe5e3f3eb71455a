//! Schedule descriptors and next-run computation.
//!
//! A [`ScheduleDescriptor`] is the loose, wire-level form (frequency plus
//! optional `time`, `day`, and `interval` strings). [`ScheduleDescriptor::validate`]
//! turns it into a typed [`Schedule`], rejecting missing or contradictory
//! fields. All computation happens in UTC.

use crate::error::{OrdersError, Result};
use chrono::{DateTime, Datelike, Days, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Frequency
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Custom,
}

impl Frequency {
    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::Hourly => "hourly",
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Custom => "custom",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = OrdersError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hourly" => Ok(Frequency::Hourly),
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            "custom" => Ok(Frequency::Custom),
            other => Err(OrdersError::Validation(format!(
                "unknown frequency '{other}' (expected hourly, daily, weekly, monthly, or custom)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// ScheduleDescriptor
// ---------------------------------------------------------------------------

/// Wire-level schedule as submitted by the owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleDescriptor {
    pub frequency: Frequency,
    /// `HH:MM`, 24-hour clock.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    /// Weekday name for weekly schedules, day-of-month for monthly ones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<String>,
    /// `<N><unit>` duration for custom schedules, e.g. `5m` or `2h`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
}

impl ScheduleDescriptor {
    pub fn new(frequency: Frequency) -> Self {
        Self {
            frequency,
            time: None,
            day: None,
            interval: None,
        }
    }

    pub fn hourly() -> Self {
        Self::new(Frequency::Hourly)
    }

    pub fn daily(time: impl Into<String>) -> Self {
        Self {
            time: Some(time.into()),
            ..Self::new(Frequency::Daily)
        }
    }

    pub fn weekly(day: impl Into<String>, time: impl Into<String>) -> Self {
        Self {
            time: Some(time.into()),
            day: Some(day.into()),
            ..Self::new(Frequency::Weekly)
        }
    }

    pub fn monthly(day: u32, time: impl Into<String>) -> Self {
        Self {
            time: Some(time.into()),
            day: Some(day.to_string()),
            ..Self::new(Frequency::Monthly)
        }
    }

    pub fn custom(interval: impl Into<String>) -> Self {
        Self {
            interval: Some(interval.into()),
            ..Self::new(Frequency::Custom)
        }
    }

    /// Check the descriptor's fields against its frequency and parse them.
    ///
    /// `time` is tolerated (and ignored) on hourly schedules; every other
    /// field that has no meaning for the frequency is rejected.
    pub fn validate(&self) -> Result<Schedule> {
        let freq = self.frequency;
        let time = present(&self.time);
        let day = present(&self.day);
        let interval = present(&self.interval);

        match freq {
            Frequency::Hourly => {
                forbid(freq, "day", day)?;
                forbid(freq, "interval", interval)?;
                Ok(Schedule::Hourly)
            }
            Frequency::Daily => {
                forbid(freq, "day", day)?;
                forbid(freq, "interval", interval)?;
                let at = parse_time(require(freq, "time", time)?)?;
                Ok(Schedule::Daily { at })
            }
            Frequency::Weekly => {
                forbid(freq, "interval", interval)?;
                let day = parse_weekday(require(freq, "day", day)?)?;
                let at = parse_time(require(freq, "time", time)?)?;
                Ok(Schedule::Weekly { day, at })
            }
            Frequency::Monthly => {
                forbid(freq, "interval", interval)?;
                let day = parse_day_of_month(require(freq, "day", day)?)?;
                let at = parse_time(require(freq, "time", time)?)?;
                Ok(Schedule::Monthly { day, at })
            }
            Frequency::Custom => {
                forbid(freq, "time", time)?;
                forbid(freq, "day", day)?;
                let every = parse_interval(require(freq, "interval", interval)?)?;
                Ok(Schedule::Custom { every })
            }
        }
    }
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn forbid(freq: Frequency, field: &str, value: Option<&str>) -> Result<()> {
    match value {
        Some(v) => Err(OrdersError::Validation(format!(
            "'{field}' ({v}) is not allowed for {freq} schedules"
        ))),
        None => Ok(()),
    }
}

fn require<'a>(freq: Frequency, field: &str, value: Option<&'a str>) -> Result<&'a str> {
    value.ok_or_else(|| OrdersError::Validation(format!("'{field}' is required for {freq} schedules")))
}

// ---------------------------------------------------------------------------
// Field parsers
// ---------------------------------------------------------------------------

static TIME_RE: OnceLock<Regex> = OnceLock::new();
static INTERVAL_RE: OnceLock<Regex> = OnceLock::new();

fn time_re() -> &'static Regex {
    TIME_RE.get_or_init(|| Regex::new(r"^([01]?[0-9]|2[0-3]):([0-5][0-9])$").unwrap())
}

fn interval_re() -> &'static Regex {
    INTERVAL_RE.get_or_init(|| Regex::new(r"^([0-9]+)\s*([smhdw])$").unwrap())
}

/// Parse `HH:MM` (24h).
pub fn parse_time(s: &str) -> Result<NaiveTime> {
    let caps = time_re()
        .captures(s.trim())
        .ok_or_else(|| OrdersError::Validation(format!("invalid time '{s}': expected HH:MM")))?;
    let hour: u32 = caps[1].parse().unwrap_or_default();
    let minute: u32 = caps[2].parse().unwrap_or_default();
    NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or_else(|| OrdersError::Validation(format!("invalid time '{s}'")))
}

fn parse_weekday(s: &str) -> Result<Weekday> {
    s.parse::<Weekday>()
        .map_err(|_| OrdersError::Validation(format!("invalid weekday '{s}'")))
}

fn parse_day_of_month(s: &str) -> Result<u32> {
    match s.parse::<u32>() {
        Ok(d) if (1..=31).contains(&d) => Ok(d),
        _ => Err(OrdersError::Validation(format!(
            "invalid day of month '{s}': expected 1-31"
        ))),
    }
}

/// Parse a custom interval such as `30s`, `5m`, `2h`, `1d`, or `1w`.
pub fn parse_interval(s: &str) -> Result<Duration> {
    let invalid = || {
        OrdersError::Validation(format!(
            "invalid interval '{s}': expected <N><unit> with unit s, m, h, d, or w"
        ))
    };
    let caps = interval_re().captures(s.trim()).ok_or_else(invalid)?;
    let n: i64 = caps[1].parse().map_err(|_| invalid())?;
    if n == 0 {
        return Err(OrdersError::Validation(format!(
            "invalid interval '{s}': must be greater than zero"
        )));
    }
    let unit_secs: i64 = match &caps[2] {
        "s" => 1,
        "m" => 60,
        "h" => 3_600,
        "d" => 86_400,
        _ => 604_800,
    };
    n.checked_mul(unit_secs)
        .and_then(Duration::try_seconds)
        .ok_or_else(invalid)
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

/// A validated schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Every hour, counted from the reference instant.
    Hourly,
    Daily { at: NaiveTime },
    Weekly { day: Weekday, at: NaiveTime },
    /// `day` is 1..=31 and is clamped to the length of short months.
    Monthly { day: u32, at: NaiveTime },
    Custom { every: Duration },
}

impl Schedule {
    /// The first instant strictly after `reference` at which this schedule fires.
    pub fn next_after(&self, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match *self {
            Schedule::Hourly => reference.checked_add_signed(Duration::hours(1)),
            Schedule::Daily { at } => {
                let today = reference.date_naive();
                let candidate = today.and_time(at).and_utc();
                if candidate > reference {
                    Some(candidate)
                } else {
                    Some(today.succ_opt()?.and_time(at).and_utc())
                }
            }
            Schedule::Weekly { day, at } => {
                let today = reference.date_naive();
                (0..=7u64).find_map(|offset| {
                    let date = today.checked_add_days(Days::new(offset))?;
                    let candidate = date.and_time(at).and_utc();
                    (date.weekday() == day && candidate > reference).then_some(candidate)
                })
            }
            Schedule::Monthly { day, at } => {
                let (year, month) = (reference.year(), reference.month());
                (0..2u32).find_map(|ahead| {
                    let (y, m) = add_months(year, month, ahead);
                    let clamped = day.min(days_in_month(y, m)?);
                    let candidate = NaiveDate::from_ymd_opt(y, m, clamped)?
                        .and_time(at)
                        .and_utc();
                    (candidate > reference).then_some(candidate)
                })
            }
            Schedule::Custom { every } => reference.checked_add_signed(every),
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Hourly => write!(f, "every hour"),
            Schedule::Daily { at } => write!(f, "daily at {}", at.format("%H:%M")),
            Schedule::Weekly { day, at } => write!(f, "every {day} at {}", at.format("%H:%M")),
            Schedule::Monthly { day, at } => {
                write!(f, "monthly on day {day} at {}", at.format("%H:%M"))
            }
            Schedule::Custom { every } => write!(f, "every {}s", every.num_seconds()),
        }
    }
}

fn add_months(year: i32, month: u32, ahead: u32) -> (i32, u32) {
    let zero_based = month - 1 + ahead;
    (year + (zero_based / 12) as i32, zero_based % 12 + 1)
}

fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let (ny, nm) = add_months(year, month, 1);
    Some(NaiveDate::from_ymd_opt(ny, nm, 1)?.pred_opt()?.day())
}

/// Next eligible run for `descriptor` after `reference`.
///
/// Returns `None` for a malformed descriptor; call
/// [`ScheduleDescriptor::validate`] to learn why.
pub fn compute_next_run(
    descriptor: &ScheduleDescriptor,
    reference: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match descriptor.validate() {
        Ok(schedule) => schedule.next_after(reference),
        Err(e) => {
            tracing::warn!(frequency = %descriptor.frequency, error = %e, "malformed schedule");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn hourly_adds_one_hour() {
        let t = at(2026, 3, 10, 10, 17);
        let next = compute_next_run(&ScheduleDescriptor::hourly(), t).unwrap();
        assert_eq!(next, t + Duration::hours(1));
    }

    #[test]
    fn hourly_ignores_time() {
        let mut d = ScheduleDescriptor::hourly();
        d.time = Some("09:00".into());
        assert_eq!(d.validate().unwrap(), Schedule::Hourly);
    }

    #[test]
    fn daily_later_today() {
        let next = compute_next_run(&ScheduleDescriptor::daily("18:30"), at(2026, 3, 10, 9, 0)).unwrap();
        assert_eq!(next, at(2026, 3, 10, 18, 30));
    }

    #[test]
    fn daily_time_passed_rolls_to_tomorrow() {
        for (h, m) in [(9, 1), (12, 0), (23, 59)] {
            let reference = at(2026, 3, 10, h, m);
            let next = compute_next_run(&ScheduleDescriptor::daily("09:00"), reference).unwrap();
            assert_eq!(next, at(2026, 3, 11, 9, 0), "reference {reference}");
        }
    }

    #[test]
    fn daily_exactly_at_time_is_not_due_again() {
        let next = compute_next_run(&ScheduleDescriptor::daily("09:00"), at(2026, 3, 10, 9, 0)).unwrap();
        assert_eq!(next, at(2026, 3, 11, 9, 0));
    }

    #[test]
    fn daily_rolls_over_month_and_year_end() {
        let next = compute_next_run(&ScheduleDescriptor::daily("08:00"), at(2026, 12, 31, 20, 0)).unwrap();
        assert_eq!(next, at(2027, 1, 1, 8, 0));
    }

    #[test]
    fn weekly_finds_next_weekday() {
        // 2026-03-10 is a Tuesday.
        let next = compute_next_run(&ScheduleDescriptor::weekly("friday", "07:15"), at(2026, 3, 10, 12, 0))
            .unwrap();
        assert_eq!(next, at(2026, 3, 13, 7, 15));
        assert_eq!(next.weekday(), Weekday::Fri);
    }

    #[test]
    fn weekly_same_day_passed_goes_a_week_out() {
        let next = compute_next_run(&ScheduleDescriptor::weekly("tue", "07:00"), at(2026, 3, 10, 12, 0))
            .unwrap();
        assert_eq!(next, at(2026, 3, 17, 7, 0));
    }

    #[test]
    fn weekly_same_day_later_today() {
        let next = compute_next_run(&ScheduleDescriptor::weekly("Tue", "13:00"), at(2026, 3, 10, 12, 0))
            .unwrap();
        assert_eq!(next, at(2026, 3, 10, 13, 0));
    }

    #[test]
    fn monthly_day_31_clamps_to_end_of_february() {
        let d = ScheduleDescriptor::monthly(31, "09:00");
        let next = compute_next_run(&d, at(2026, 1, 31, 12, 0)).unwrap();
        assert_eq!(next, at(2026, 2, 28, 9, 0));

        // Leap year.
        let next = compute_next_run(&d, at(2028, 2, 1, 0, 0)).unwrap();
        assert_eq!(next, at(2028, 2, 29, 9, 0));
    }

    #[test]
    fn monthly_does_not_skip_short_month() {
        let d = ScheduleDescriptor::monthly(31, "09:00");
        let next = compute_next_run(&d, at(2026, 4, 2, 0, 0)).unwrap();
        assert_eq!(next, at(2026, 4, 30, 9, 0));
    }

    #[test]
    fn monthly_rolls_into_next_year() {
        let d = ScheduleDescriptor::monthly(5, "06:00");
        let next = compute_next_run(&d, at(2026, 12, 20, 0, 0)).unwrap();
        assert_eq!(next, at(2027, 1, 5, 6, 0));
    }

    #[test]
    fn custom_adds_interval() {
        let t = at(2026, 3, 10, 10, 0);
        let next = compute_next_run(&ScheduleDescriptor::custom("5m"), t).unwrap();
        assert_eq!(next, t + Duration::minutes(5));
        let next = compute_next_run(&ScheduleDescriptor::custom("2d"), t).unwrap();
        assert_eq!(next, t + Duration::days(2));
    }

    #[test]
    fn interval_parsing() {
        assert_eq!(parse_interval("30s").unwrap(), Duration::seconds(30));
        assert_eq!(parse_interval(" 1w ").unwrap(), Duration::weeks(1));
        assert_eq!(parse_interval("90 m").unwrap(), Duration::minutes(90));
        for bad in ["", "0m", "5", "m", "5x", "-5m", "5.5h"] {
            assert!(parse_interval(bad).is_err(), "expected invalid: {bad:?}");
        }
    }

    #[test]
    fn time_parsing() {
        let t = parse_time("7:05").unwrap();
        assert_eq!((t.hour(), t.minute()), (7, 5));
        for bad in ["24:00", "12:60", "noon", "12", "12:5"] {
            assert!(parse_time(bad).is_err(), "expected invalid: {bad:?}");
        }
    }

    #[test]
    fn contradictory_fields_are_rejected() {
        let mut daily = ScheduleDescriptor::daily("09:00");
        daily.interval = Some("5m".into());
        let err = daily.validate().unwrap_err();
        assert!(matches!(err, OrdersError::Validation(_)));
        assert!(err.to_string().contains("interval"), "{err}");
        assert!(compute_next_run(&daily, Utc::now()).is_none());

        let mut custom = ScheduleDescriptor::custom("5m");
        custom.time = Some("09:00".into());
        assert!(custom.validate().is_err());

        let mut hourly = ScheduleDescriptor::hourly();
        hourly.day = Some("mon".into());
        assert!(hourly.validate().is_err());
    }

    #[test]
    fn missing_fields_are_rejected() {
        for d in [
            ScheduleDescriptor::new(Frequency::Daily),
            ScheduleDescriptor::new(Frequency::Custom),
            ScheduleDescriptor {
                day: None,
                ..ScheduleDescriptor::weekly("mon", "09:00")
            },
            ScheduleDescriptor {
                time: None,
                ..ScheduleDescriptor::monthly(1, "09:00")
            },
        ] {
            let err = d.validate().unwrap_err();
            assert!(err.to_string().contains("required"), "{err}");
        }
    }

    #[test]
    fn blank_fields_count_as_absent() {
        let mut d = ScheduleDescriptor::daily("09:00");
        d.interval = Some("  ".into());
        assert!(d.validate().is_ok());
    }

    #[test]
    fn out_of_range_day_of_month() {
        assert!(ScheduleDescriptor::monthly(0, "09:00").validate().is_err());
        assert!(ScheduleDescriptor::monthly(32, "09:00").validate().is_err());
    }

    #[test]
    fn descriptor_wire_format() {
        let d: ScheduleDescriptor =
            serde_json::from_str(r#"{"frequency":"weekly","time":"09:00","day":"mon"}"#).unwrap();
        assert_eq!(d, ScheduleDescriptor::weekly("mon", "09:00"));
        let json = serde_json::to_value(ScheduleDescriptor::hourly()).unwrap();
        assert_eq!(json, serde_json::json!({ "frequency": "hourly" }));
    }

    #[test]
    fn frequency_from_str() {
        assert_eq!("Weekly".parse::<Frequency>().unwrap(), Frequency::Weekly);
        assert!("yearly".parse::<Frequency>().is_err());
    }
}
