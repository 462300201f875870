use std::{collections::HashSet, str::FromStr};

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Timelike};
use chrono_tz::Tz;
use dialoguer::MultiSelect;

use crate::{
    acuity::{
        models::{AppointmentType, Calendar, TimeSlot},
        Upstream,
    },
    courses::{models::TutorId, CourseMap},
    error::{Error, Result},
};

/// Most availability windows checked at once
pub const MAX_WINDOWS: usize = 4;

const DISCLAIMER: &str = "(select with SPACE, confirm with ENTER)";

/// A date and a wall-clock range on that date
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeWindow {
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl FromStr for TimeWindow {
    type Err = Error;

    /// `YYYY-MM-DD,HH:MM,HH:MM`
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            Error::validation(format!(
                "\"{s}\" is not a time window, expected DATE,START,END (i.e.: 2024-05-06,09:00,12:00)"
            ))
        };

        let mut parts = s.split(',').map(str::trim);
        let (Some(date), Some(start), Some(end), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        let window = Self {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| invalid())?,
            start: NaiveTime::parse_from_str(start, "%H:%M").map_err(|_| invalid())?,
            end: NaiveTime::parse_from_str(end, "%H:%M").map_err(|_| invalid())?,
        };

        if window.start >= window.end {
            return Err(Error::validation(format!(
                "\"{s}\" ends before it starts"
            )));
        }

        Ok(window)
    }
}

/// Check the amount of windows asked
pub fn check_windows(windows: &[TimeWindow]) -> Result<()> {
    if windows.len() > MAX_WINDOWS {
        return Err(Error::validation(format!(
            "At most {MAX_WINDOWS} time windows can be checked at once."
        )));
    }

    Ok(())
}

/// Tutors assigned to every one of the courses
pub fn common_tutors(map: &CourseMap, courses: &[String]) -> Vec<TutorId> {
    let mut iter = courses.iter();
    let Some(first) = iter.next() else {
        return vec![];
    };

    let mut common = map.tutors_for(first).to_vec();
    for course in iter {
        let ids: HashSet<_> = map.tutors_for(course).iter().collect();
        common.retain(|id| ids.contains(id));
    }

    common
}

/// Calendars of the tutors teaching all the courses, every calendar when no course is given
pub fn calendars_for_courses(
    calendars: Vec<Calendar>,
    map: &CourseMap,
    courses: &[String],
) -> Vec<Calendar> {
    if courses.is_empty() {
        return calendars;
    }

    let pool: HashSet<_> = common_tutors(map, courses).into_iter().collect();
    if pool.is_empty() {
        return vec![];
    }

    calendars
        .into_iter()
        .filter(|calendar| pool.contains(&calendar.id))
        .collect()
}

/// Acuity writes offsets without colon (`-0800`), accept both
fn parse_slot_time(time: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(time)
        .or_else(|_| DateTime::parse_from_str(time, "%Y-%m-%dT%H:%M:%S%z"))
        .ok()
}

/// Whether a session starting at `slot_time` fits between `start` and `end`,
/// read on the clock of `time_zone`
pub fn is_within_range(
    slot_time: &str,
    start: Option<NaiveTime>,
    end: Option<NaiveTime>,
    time_zone: Tz,
    duration: u32,
) -> bool {
    if start.is_none() && end.is_none() {
        return true;
    }

    let Some(slot) = parse_slot_time(slot_time) else {
        tracing::warn!("unreadable slot time: {}", slot_time);
        return false;
    };

    let minutes = |t: NaiveTime| t.hour() * 60 + t.minute();

    let slot_minutes = minutes(slot.with_timezone(&time_zone).time());
    let start_minutes = start.map_or(0, minutes);
    let end_minutes = end.map_or(23 * 60 + 59, minutes);

    slot_minutes >= start_minutes && slot_minutes + duration <= end_minutes
}

fn has_open_slot(slots: &[TimeSlot], window: &TimeWindow, time_zone: Tz, duration: u32) -> bool {
    slots.iter().any(|slot| {
        slot.slots_available > 0
            && is_within_range(
                &slot.time,
                Some(window.start),
                Some(window.end),
                time_zone,
                duration,
            )
    })
}

/// Keep the calendars with an opening in at least one of the windows.
///
/// Requests go out one after another, a calendar stops being queried once
/// it matched. A failed request counts as no opening.
pub async fn available_tutors(
    upstream: &impl Upstream,
    calendars: Vec<Calendar>,
    windows: &[TimeWindow],
    appointment_type: &AppointmentType,
    time_zone: Tz,
) -> Vec<Calendar> {
    let mut available = vec![];

    for calendar in calendars {
        let mut has_match = false;

        for window in windows {
            match upstream
                .availability(calendar.id, appointment_type.id, window.date, time_zone)
                .await
            {
                Ok(slots) => {
                    if has_open_slot(&slots, window, time_zone, appointment_type.duration) {
                        has_match = true;
                        break;
                    }
                }
                Err(e) => tracing::warn!(
                    calendar = %calendar.id,
                    "availability lookup failed for {}: {}",
                    calendar.name,
                    e
                ),
            }
        }

        if has_match {
            available.push(calendar);
        }
    }

    available
}

/// Let the user choose the courses to filter on
pub fn pick_courses(map: &CourseMap) -> Result<Vec<String>> {
    let names = map.sorted_names();
    if names.is_empty() {
        return Ok(vec![]);
    }

    let selections = MultiSelect::new()
        .with_prompt(format!("Choose the courses {DISCLAIMER}"))
        .items(&names)
        .interact()?;

    Ok(selections
        .into_iter()
        .map(|i| names[i].to_owned())
        .collect())
}

/// Let the user choose the tutors of a course, current ones preselected
pub fn pick_tutors(calendars: &[Calendar], assigned: &[TutorId]) -> Result<Vec<TutorId>> {
    let mut calendars: Vec<&Calendar> = calendars.iter().collect();
    calendars.sort_by_cached_key(|calendar| calendar.name.to_lowercase());

    let labels: Vec<&str> = calendars.iter().map(|c| c.name.as_str()).collect();
    let defaults: Vec<bool> = calendars
        .iter()
        .map(|c| assigned.contains(&c.id))
        .collect();

    let selections = MultiSelect::new()
        .with_prompt(format!("Choose the tutors {DISCLAIMER}"))
        .items(&labels)
        .defaults(&defaults)
        .interact()?;

    Ok(selections.into_iter().map(|i| calendars[i].id).collect())
}
