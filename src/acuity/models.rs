use serde::Deserialize;

use crate::courses::models::TutorId;

/// A tutor's calendar
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Calendar {
    /// Also the id used in course assignments
    pub id: TutorId,
    pub name: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentType {
    pub id: u64,
    pub name: String,
    /// Length of a session in minutes
    #[serde(default = "default_duration")]
    pub duration: u32,
    #[serde(default)]
    pub category: String,
}

fn default_duration() -> u32 {
    60
}

/// A bookable start time
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlot {
    /// ISO-8601 with offset, i.e.: `2016-02-04T13:00:00-0800`
    pub time: String,
    #[serde(default)]
    pub slots_available: u32,
}
