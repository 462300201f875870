use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashSet},
    fmt,
    hash::{Hash, Hasher},
    str::FromStr,
    sync::LazyLock,
};

use regex::Regex;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Course name to the tutors teaching it
pub type AssignmentMap = BTreeMap<String, Vec<TutorId>>;

/// Largest integer an `f64` holds exactly
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Identifier of a calendar on the scheduling provider, always finite
#[derive(Clone, Copy, Debug)]
pub struct TutorId(f64);

impl TutorId {
    pub fn new(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        // -0 and 0 are the same tutor
        Some(Self(if value == 0.0 { 0.0 } else { value }))
    }

    /// Numbers and numeric strings, anything else is rejected
    pub fn coerce(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().and_then(Self::new),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn as_integer(self) -> Option<i64> {
        (self.0.fract() == 0.0 && self.0.abs() <= MAX_EXACT_INTEGER).then_some(self.0 as i64)
    }
}

impl From<u32> for TutorId {
    fn from(value: u32) -> Self {
        Self(f64::from(value))
    }
}

impl PartialEq for TutorId {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for TutorId {}

impl Hash for TutorId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl PartialOrd for TutorId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TutorId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for TutorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_integer() {
            Some(n) => write!(f, "{n}"),
            None => write!(f, "{}", self.0),
        }
    }
}

impl FromStr for TutorId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        trimmed
            .parse::<f64>()
            .ok()
            .filter(|_| !trimmed.is_empty())
            .and_then(Self::new)
            .ok_or_else(|| format!("\"{s}\" is not a tutor id"))
    }
}

impl Serialize for TutorId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.as_integer() {
            Some(n) => serializer.serialize_i64(n),
            None => serializer.serialize_f64(self.0),
        }
    }
}

impl<'de> Deserialize<'de> for TutorId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Self::new(value).ok_or_else(|| de::Error::custom("tutor id must be finite"))
    }
}

/// Collapse whitespace runs to one space and trim
pub fn normalize_course_name(name: &str) -> String {
    WHITESPACE.replace_all(name, " ").trim().to_owned()
}

/// Keep the finite numeric entries of a list, in order
pub fn normalize_tutor_list(list: &Value) -> Vec<TutorId> {
    match list {
        Value::Array(items) => items.iter().filter_map(TutorId::coerce).collect(),
        _ => vec![],
    }
}

/// Rebuild an assignment map from whatever was stored or received.
///
/// Anything but a JSON object gives back `defaults`. An object replaces them
/// entirely: names are normalized (empty ones dropped) and tutor lists keep
/// only usable ids.
pub fn hydrate(raw: &Value, defaults: &AssignmentMap) -> AssignmentMap {
    match raw {
        Value::Object(entries) => fold_courses(
            entries
                .iter()
                .map(|(course, ids)| (course.as_str(), normalize_tutor_list(ids))),
        ),
        _ => clone_map(defaults),
    }
}

/// Normalized copy of a map
pub fn clone_map(source: &AssignmentMap) -> AssignmentMap {
    fold_courses(
        source
            .iter()
            .map(|(course, ids)| (course.as_str(), ids.clone())),
    )
}

/// Normalize the names, the first spelling of a course and its tutors win
/// over any later name equal to it regardless of case
fn fold_courses<'a>(entries: impl Iterator<Item = (&'a str, Vec<TutorId>)>) -> AssignmentMap {
    let mut map = AssignmentMap::new();
    let mut seen = HashSet::new();

    for (course, ids) in entries {
        let name = normalize_course_name(course);
        if name.is_empty() || !seen.insert(name.to_lowercase()) {
            continue;
        }
        map.insert(name, ids);
    }

    map
}
