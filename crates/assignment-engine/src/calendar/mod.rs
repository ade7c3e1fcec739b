//! # Working-Hours Calendar
//!
//! Pure time arithmetic over a weekly business-hours schedule, daily breaks and a
//! holiday set. Every SLA deadline and every "is this agent on shift" check in the
//! engine goes through this module.
//!
//! ## Key Features
//!
//! - **Working-time walks**: [`WorkingHoursCalendar::add_working_duration`] consumes
//!   working segments only, jumping over nights, weekends, breaks and holidays
//! - **Signed distances**: [`WorkingHoursCalendar::working_duration_between`] measures
//!   working time between two instants, negative when they are reversed
//! - **Timezones**: schedules are wall-clock times in an IANA zone or a fixed offset;
//!   working durations are real elapsed time, so a DST change shortens or lengthens
//!   the day it falls on
//! - **Bounded iteration**: forward searches give up after [`MAX_DAY_STEPS`] days
//!   without working time and report [`AssignmentError::CalendarExhausted`]
//!
//! ## Example
//!
//! ```
//! use chrono::{Duration, NaiveTime, TimeZone, Utc};
//! use leadflow_assignment_engine::calendar::{WorkingHoursCalendar, WorkingHoursConfig};
//!
//! # fn main() -> leadflow_assignment_engine::Result<()> {
//! let config = WorkingHoursConfig::business_week(
//!     "default",
//!     "UTC",
//!     NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
//!     NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
//! );
//! let calendar = WorkingHoursCalendar::new(config, Vec::new())?;
//!
//! // Friday 16:00 + 2 working hours lands on Monday 10:00
//! let friday = Utc.with_ymd_and_hms(2024, 3, 8, 16, 0, 0).unwrap();
//! let deadline = calendar.add_working_duration(friday, Duration::hours(2))?;
//! assert_eq!(deadline, Utc.with_ymd_and_hms(2024, 3, 11, 10, 0, 0).unwrap());
//! # Ok(())
//! # }
//! ```

pub mod types;

pub use types::{
    parse_timezone, BreakWindow, CalendarZone, DaySchedule, Holiday, HolidayType, WeeklySchedule,
    WorkingHoursConfig,
};

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Timelike, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AssignmentError, Result};

/// Maximum consecutive days a forward walk may inspect without finding working time
pub const MAX_DAY_STEPS: u32 = 366;

const SECONDS_PER_DAY: u32 = 86_400;

/// A validated calendar ready for time arithmetic
///
/// Built from a [`WorkingHoursConfig`] and the holidays that apply to it. Inactive
/// holidays are dropped at construction.
#[derive(Debug, Clone)]
pub struct WorkingHoursCalendar {
    id: String,
    zone: CalendarZone,
    /// Working windows per weekday (Monday first), seconds from local midnight
    windows: [Option<(u32, u32)>; 7],
    /// Break windows, seconds from local midnight, sorted by start
    breaks: Vec<(u32, u32)>,
    holidays: Vec<Holiday>,
}

impl WorkingHoursCalendar {
    /// Validate the config and build a calendar using every active holiday
    pub fn new(config: WorkingHoursConfig, holidays: Vec<Holiday>) -> Result<Self> {
        Self::with_holiday_filter(config, holidays, None)
    }

    /// Build a calendar that only honours holidays of the given types
    pub fn with_holiday_filter(
        config: WorkingHoursConfig,
        holidays: Vec<Holiday>,
        holiday_types: Option<&[HolidayType]>,
    ) -> Result<Self> {
        let zone = parse_timezone(&config.timezone).map_err(|e| {
            AssignmentError::validation(format!("calendar '{}': {}", config.id, e))
        })?;

        let mut windows = [None; 7];
        for (index, weekday) in WEEK.iter().enumerate() {
            let day = config.schedule.day(*weekday);
            if !day.is_working_day {
                continue;
            }
            let (start, end) = window_seconds(day.start_time, day.end_time);
            if start >= end {
                return Err(AssignmentError::validation(format!(
                    "calendar '{}': {} ends at {} which is not after its start {}",
                    config.id,
                    weekday,
                    day.end_time.format("%H:%M"),
                    day.start_time.format("%H:%M")
                )));
            }
            windows[index] = Some((start, end));
        }

        let mut breaks = Vec::with_capacity(config.breaks.len());
        for window in &config.breaks {
            let (start, end) = window_seconds(window.start_time, window.end_time);
            if start >= end {
                return Err(AssignmentError::validation(format!(
                    "calendar '{}': break {} ends before it starts",
                    config.id,
                    window.name.as_deref().unwrap_or("(unnamed)")
                )));
            }
            breaks.push((start, end));
        }
        breaks.sort_unstable();

        let holidays = holidays
            .into_iter()
            .filter(|h| h.is_active)
            .filter(|h| holiday_types.map_or(true, |types| types.contains(&h.holiday_type)))
            .collect();

        Ok(Self {
            id: config.id,
            zone,
            windows,
            breaks,
            holidays,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn zone(&self) -> CalendarZone {
        self.zone
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.iter().any(|h| h.falls_on(date))
    }

    /// Is `instant` inside a working segment (start inclusive, end exclusive)?
    pub fn is_working_time(&self, instant: DateTime<Utc>) -> bool {
        self.segments(self.zone.to_local(instant).date())
            .iter()
            .any(|(start, end)| *start <= instant && instant < *end)
    }

    /// First working instant at or after `instant`
    pub fn next_working_instant(&self, instant: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let mut date = self.zone.to_local(instant).date();
        for _ in 0..MAX_DAY_STEPS {
            for (start, end) in self.segments(date) {
                if end > instant {
                    return Ok(start.max(instant));
                }
            }
            date = self.next_date(date)?;
        }
        Err(self.exhausted())
    }

    /// Advance `instant` by `duration` of working time
    ///
    /// Non-working spans contribute nothing: the walk consumes what is left of the
    /// current segment, jumps to the next one, and so on. A zero duration returns
    /// `instant` unchanged even outside working hours.
    pub fn add_working_duration(&self, instant: DateTime<Utc>, duration: Duration) -> Result<DateTime<Utc>> {
        if duration < Duration::zero() {
            return Err(AssignmentError::validation(format!(
                "cannot add negative working duration {}",
                duration
            )));
        }
        if duration.is_zero() {
            return Ok(instant);
        }

        let mut remaining = duration;
        let mut date = self.zone.to_local(instant).date();
        let mut idle_days = 0;

        loop {
            let mut worked = false;
            for (start, end) in self.segments(date) {
                let from = start.max(instant);
                if from >= end {
                    continue;
                }
                worked = true;
                let available = end - from;
                if remaining <= available {
                    return Ok(from + remaining);
                }
                remaining -= available;
            }

            idle_days = if worked { 0 } else { idle_days + 1 };
            if idle_days >= MAX_DAY_STEPS {
                return Err(self.exhausted());
            }
            date = self.next_date(date)?;
        }
    }

    /// Working time between two instants, negative when `to` precedes `from`
    pub fn working_duration_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Duration {
        if to < from {
            return -self.working_duration_between(to, from);
        }

        let last = self.zone.to_local(to).date();
        let mut total = Duration::zero();
        let mut date = self.zone.to_local(from).date();

        while date <= last {
            for (start, end) in self.segments(date) {
                let lo = start.max(from);
                let hi = end.min(to);
                if hi > lo {
                    total += hi - lo;
                }
            }
            match date.succ_opt() {
                Some(next) => date = next,
                None => break,
            }
        }
        total
    }

    /// Working segments for a local date, breaks removed, as instants on the timeline
    fn segments(&self, date: NaiveDate) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        if self.is_holiday(date) {
            return Vec::new();
        }
        let Some((open, close)) = self.windows[date.weekday().num_days_from_monday() as usize] else {
            return Vec::new();
        };

        let mut spans = vec![(open, close)];
        for (break_start, break_end) in &self.breaks {
            let mut next = Vec::with_capacity(spans.len() + 1);
            for (start, end) in spans {
                if *break_end <= start || *break_start >= end {
                    next.push((start, end));
                    continue;
                }
                if start < *break_start {
                    next.push((start, *break_start));
                }
                if *break_end < end {
                    next.push((*break_end, end));
                }
            }
            spans = next;
        }

        // A segment swallowed by a DST gap collapses to an empty span and is dropped
        let midnight = date.and_time(NaiveTime::MIN);
        spans
            .into_iter()
            .map(|(start, end)| {
                (
                    self.zone.to_utc(midnight + Duration::seconds(start as i64)),
                    self.zone.to_utc(midnight + Duration::seconds(end as i64)),
                )
            })
            .filter(|(start, end)| start < end)
            .collect()
    }

    fn next_date(&self, date: NaiveDate) -> Result<NaiveDate> {
        date.succ_opt().ok_or_else(|| self.exhausted())
    }

    fn exhausted(&self) -> AssignmentError {
        AssignmentError::CalendarExhausted {
            calendar_id: self.id.clone(),
            steps: MAX_DAY_STEPS,
        }
    }
}

const WEEK: [chrono::Weekday; 7] = [
    chrono::Weekday::Mon,
    chrono::Weekday::Tue,
    chrono::Weekday::Wed,
    chrono::Weekday::Thu,
    chrono::Weekday::Fri,
    chrono::Weekday::Sat,
    chrono::Weekday::Sun,
];

/// Seconds from midnight; an end of `00:00` means midnight at the end of the day
fn window_seconds(start: NaiveTime, end: NaiveTime) -> (u32, u32) {
    let start = start.num_seconds_from_midnight();
    let end = match end.num_seconds_from_midnight() {
        0 => SECONDS_PER_DAY,
        secs => secs,
    };
    (start, end)
}

/// Calendars resolved for one operation, keyed by id
///
/// Lookups for an unknown id fall back to the default calendar.
#[derive(Debug, Clone)]
pub struct CalendarSet {
    default: Arc<WorkingHoursCalendar>,
    calendars: HashMap<String, Arc<WorkingHoursCalendar>>,
}

impl CalendarSet {
    pub fn new(default: WorkingHoursCalendar) -> Self {
        Self {
            default: Arc::new(default),
            calendars: HashMap::new(),
        }
    }

    pub fn insert(&mut self, calendar: WorkingHoursCalendar) {
        if calendar.id() == self.default.id() {
            self.default = Arc::new(calendar);
        } else {
            self.calendars
                .insert(calendar.id().to_string(), Arc::new(calendar));
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        id == self.default.id() || self.calendars.contains_key(id)
    }

    pub fn default_calendar(&self) -> &WorkingHoursCalendar {
        &self.default
    }

    /// Calendar for `id`, or the default when `id` is `None` or unknown
    pub fn resolve(&self, id: Option<&str>) -> &WorkingHoursCalendar {
        match id.and_then(|id| self.calendars.get(id)) {
            Some(calendar) => calendar,
            None => &self.default,
        }
    }
}
