//! Working-hours and holiday data, as read from the calendar store

use chrono::{DateTime, Datelike, Duration, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AssignmentError, Result};

/// Opening window for one weekday
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaySchedule {
    pub is_working_day: bool,
    #[serde(with = "clock_time")]
    pub start_time: NaiveTime,
    /// `00:00` means end of day
    #[serde(with = "clock_time")]
    pub end_time: NaiveTime,
}

impl DaySchedule {
    pub fn working(start_time: NaiveTime, end_time: NaiveTime) -> Self {
        Self {
            is_working_day: true,
            start_time,
            end_time,
        }
    }

    pub fn closed() -> Self {
        Self {
            is_working_day: false,
            start_time: NaiveTime::MIN,
            end_time: NaiveTime::MIN,
        }
    }
}

impl Default for DaySchedule {
    fn default() -> Self {
        Self::closed()
    }
}

/// Per-weekday schedule
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeeklySchedule {
    pub monday: DaySchedule,
    pub tuesday: DaySchedule,
    pub wednesday: DaySchedule,
    pub thursday: DaySchedule,
    pub friday: DaySchedule,
    pub saturday: DaySchedule,
    pub sunday: DaySchedule,
}

impl WeeklySchedule {
    /// Monday to Friday with the same window, weekend closed
    pub fn weekdays(start_time: NaiveTime, end_time: NaiveTime) -> Self {
        let day = DaySchedule::working(start_time, end_time);
        Self {
            monday: day.clone(),
            tuesday: day.clone(),
            wednesday: day.clone(),
            thursday: day.clone(),
            friday: day,
            saturday: DaySchedule::closed(),
            sunday: DaySchedule::closed(),
        }
    }

    pub fn day(&self, weekday: Weekday) -> &DaySchedule {
        match weekday {
            Weekday::Mon => &self.monday,
            Weekday::Tue => &self.tuesday,
            Weekday::Wed => &self.wednesday,
            Weekday::Thu => &self.thursday,
            Weekday::Fri => &self.friday,
            Weekday::Sat => &self.saturday,
            Weekday::Sun => &self.sunday,
        }
    }

    pub fn day_mut(&mut self, weekday: Weekday) -> &mut DaySchedule {
        match weekday {
            Weekday::Mon => &mut self.monday,
            Weekday::Tue => &mut self.tuesday,
            Weekday::Wed => &mut self.wednesday,
            Weekday::Thu => &mut self.thursday,
            Weekday::Fri => &mut self.friday,
            Weekday::Sat => &mut self.saturday,
            Weekday::Sun => &mut self.sunday,
        }
    }

    pub fn working_days(&self) -> usize {
        [
            &self.monday,
            &self.tuesday,
            &self.wednesday,
            &self.thursday,
            &self.friday,
            &self.saturday,
            &self.sunday,
        ]
        .iter()
        .filter(|d| d.is_working_day)
        .count()
    }
}

/// Daily pause inside the working window (lunch and similar)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakWindow {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(with = "clock_time")]
    pub start_time: NaiveTime,
    #[serde(with = "clock_time")]
    pub end_time: NaiveTime,
}

/// Working-hours configuration, looked up by id or `"default"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkingHoursConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// `UTC` or a fixed offset such as `+05:30`
    pub timezone: String,
    pub schedule: WeeklySchedule,
    #[serde(default)]
    pub breaks: Vec<BreakWindow>,
}

impl WorkingHoursConfig {
    /// Monday to Friday calendar in the given timezone
    pub fn business_week(
        id: impl Into<String>,
        timezone: impl Into<String>,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            timezone: timezone.into(),
            schedule: WeeklySchedule::weekdays(start_time, end_time),
            breaks: Vec::new(),
        }
    }

    /// Every day, around the clock, UTC
    pub fn always_open(id: impl Into<String>) -> Self {
        let day = DaySchedule::working(NaiveTime::MIN, NaiveTime::MIN);
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            timezone: "UTC".to_string(),
            schedule: WeeklySchedule {
                monday: day.clone(),
                tuesday: day.clone(),
                wednesday: day.clone(),
                thursday: day.clone(),
                friday: day.clone(),
                saturday: day.clone(),
                sunday: day,
            },
            breaks: Vec::new(),
        }
    }

    pub fn with_break(mut self, start_time: NaiveTime, end_time: NaiveTime) -> Self {
        self.breaks.push(BreakWindow {
            name: None,
            start_time,
            end_time,
        });
        self
    }
}

/// Holiday category, used to filter which holidays block working time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HolidayType {
    Public,
    Company,
    Regional,
    Optional,
}

impl HolidayType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HolidayType::Public => "public",
            HolidayType::Company => "company",
            HolidayType::Regional => "regional",
            HolidayType::Optional => "optional",
        }
    }
}

impl std::str::FromStr for HolidayType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "public" => Ok(HolidayType::Public),
            "company" => Ok(HolidayType::Company),
            "regional" => Ok(HolidayType::Regional),
            "optional" => Ok(HolidayType::Optional),
            _ => Err(format!("Unknown holiday type: {}", s)),
        }
    }
}

impl fmt::Display for HolidayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holiday {
    pub date: NaiveDate,
    #[serde(default)]
    pub name: String,
    pub holiday_type: HolidayType,
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Repeats every year on the same month and day
    #[serde(default)]
    pub recurring: bool,
}

fn default_true() -> bool {
    true
}

impl Holiday {
    pub fn new(date: NaiveDate, name: impl Into<String>, holiday_type: HolidayType) -> Self {
        Self {
            date,
            name: name.into(),
            holiday_type,
            is_active: true,
            recurring: false,
        }
    }

    pub fn recurring(mut self) -> Self {
        self.recurring = true;
        self
    }

    pub fn falls_on(&self, date: NaiveDate) -> bool {
        if self.recurring {
            self.date.month() == date.month() && self.date.day() == date.day()
        } else {
            self.date == date
        }
    }
}

/// Timezone a calendar's schedule is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarZone {
    /// IANA zone such as `America/New_York`, with its DST rules
    Named(Tz),
    Fixed(FixedOffset),
}

/// Longest run of nonexistent local time searched when a wall-clock time falls in a DST gap
const MAX_GAP_MINUTES: i64 = 24 * 60;

impl CalendarZone {
    pub fn to_local(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        match self {
            CalendarZone::Named(tz) => instant.with_timezone(tz).naive_local(),
            CalendarZone::Fixed(offset) => instant.with_timezone(offset).naive_local(),
        }
    }

    fn from_local(&self, local: NaiveDateTime) -> LocalResult<DateTime<Utc>> {
        match self {
            CalendarZone::Named(tz) => tz.from_local_datetime(&local).map(|dt| dt.with_timezone(&Utc)),
            CalendarZone::Fixed(offset) => offset.from_local_datetime(&local).map(|dt| dt.with_timezone(&Utc)),
        }
    }

    /// Map a wall-clock time onto the timeline
    ///
    /// A time repeated by a DST fall-back resolves to its first occurrence. A time
    /// skipped by a spring-forward resolves to the instant the clocks jump, so the
    /// mapping never runs backwards.
    pub fn to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        let mut probe = local;
        for _ in 0..=MAX_GAP_MINUTES {
            match self.from_local(probe) {
                LocalResult::Single(instant) => return instant,
                LocalResult::Ambiguous(earliest, _) => return earliest,
                LocalResult::None => probe += Duration::minutes(1),
            }
        }
        Utc.from_utc_datetime(&local)
    }
}

impl fmt::Display for CalendarZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalendarZone::Named(tz) => write!(f, "{}", tz.name()),
            CalendarZone::Fixed(offset) => write!(f, "{}", offset),
        }
    }
}

/// Parse an IANA zone name (`Europe/Berlin`, `UTC`) or a fixed offset
/// (`Z`, `+05:30`, `-0800`, `+05`, `UTC+02:00`)
pub fn parse_timezone(tz: &str) -> Result<CalendarZone> {
    let trimmed = tz.trim();
    if let Ok(named) = trimmed.parse::<Tz>() {
        return Ok(CalendarZone::Named(named));
    }
    parse_fixed_offset(trimmed)
        .map(CalendarZone::Fixed)
        .ok_or_else(|| AssignmentError::validation(format!("unsupported timezone '{}'", tz)))
}

fn parse_fixed_offset(tz: &str) -> Option<FixedOffset> {
    let upper = tz.to_ascii_uppercase();
    let rest = upper
        .strip_prefix("UTC")
        .or_else(|| upper.strip_prefix("GMT"))
        .unwrap_or(&upper);

    if rest.is_empty() || rest == "Z" {
        return FixedOffset::east_opt(0);
    }

    let (sign, digits) = match rest.chars().next() {
        Some('+') => (1, &rest[1..]),
        Some('-') => (-1, &rest[1..]),
        _ => return None,
    };

    let digits: String = digits.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = match digits.len() {
        1 | 2 => (digits.parse::<i32>().ok()?, 0),
        4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
        _ => return None,
    };
    if hours > 14 || minutes > 59 {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// `HH:MM` (or `HH:MM:SS`) serde form for schedule times
mod clock_time {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
            .map_err(|e| serde::de::Error::custom(format!("invalid time '{}': {}", raw, e)))
    }
}
