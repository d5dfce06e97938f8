use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// Type aliases for clarity
pub type SubjectId = String;
pub type TeacherId = String;
pub type EntryId = String;
pub type PeriodKey = String;

/// Broad subject grouping, used for reporting only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum Department {
    Core,
    Science,
    Arts,
    SocialScience,
    Other(String),
}

impl From<String> for Department {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "core" => Department::Core,
            "science" => Department::Science,
            "arts" => Department::Arts,
            "social_science" => Department::SocialScience,
            _ => Department::Other(value),
        }
    }
}

impl From<Department> for String {
    fn from(value: Department) -> Self {
        match value {
            Department::Core => "core".to_string(),
            Department::Science => "science".to_string(),
            Department::Arts => "arts".to_string(),
            Department::SocialScience => "social_science".to_string(),
            Department::Other(other) => other,
        }
    }
}

/// A subject from the school catalog.
///
/// An empty `classes` list means the subject applies to every class.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: SubjectId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default)]
    pub classes: Vec<String>,
    pub periods_per_week: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<Department>,
}

/// A teacher and the subjects they are able to teach.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: TeacherId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default)]
    pub subject_ids: Vec<SubjectId>,
}

impl Teacher {
    pub fn teaches(&self, subject_id: &str) -> bool {
        self.subject_ids.iter().any(|id| id == subject_id)
    }

    pub fn to_ref(&self) -> TeacherRef {
        TeacherRef {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }
}

/// Start and end time of a period, `HH:MM` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct PeriodTime {
    #[serde(with = "clock")]
    pub start: NaiveTime,
    #[serde(with = "clock")]
    pub end: NaiveTime,
}

pub mod clock {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%H:%M";

    pub fn parse(value: &str) -> Result<NaiveTime, chrono::ParseError> {
        NaiveTime::parse_from_str(value.trim(), FORMAT)
    }

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub enum Day {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Day {
    pub const ALL: [Day; 7] = [
        Day::Monday,
        Day::Tuesday,
        Day::Wednesday,
        Day::Thursday,
        Day::Friday,
        Day::Saturday,
        Day::Sunday,
    ];

    pub fn school_week() -> Vec<Day> {
        Day::ALL[..5].to_vec()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Day::Monday => "Monday",
            Day::Tuesday => "Tuesday",
            Day::Wednesday => "Wednesday",
            Day::Thursday => "Thursday",
            Day::Friday => "Friday",
            Day::Saturday => "Saturday",
            Day::Sunday => "Sunday",
        }
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Day {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Day::ALL
            .iter()
            .copied()
            .find(|day| day.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown day of week '{}'", s))
    }
}

impl TryFrom<String> for Day {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Day> for String {
    fn from(value: Day) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct TeacherRef {
    pub id: TeacherId,
    pub name: String,
}

/// One scheduled lesson. No two entries share `(day_of_week, period, teacher.id)`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetableEntry {
    pub id: EntryId,
    pub class_name: String,
    pub day_of_week: Day,
    pub period: PeriodKey,
    pub subject: String,
    pub teacher: TeacherRef,
}

impl TimetableEntry {
    pub fn occupies(&self, day: Day, period: &str) -> bool {
        self.day_of_week == day && self.period == period
    }
}

/// Everything the service persists for one school.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolData {
    #[serde(default)]
    pub subjects: Vec<Subject>,
    #[serde(default)]
    pub teachers: Vec<Teacher>,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default = "Day::school_week")]
    pub days: Vec<Day>,
    #[serde(default = "crate::grid::default_periods")]
    pub periods: BTreeMap<PeriodKey, PeriodTime>,
    #[serde(default)]
    pub entries: Vec<TimetableEntry>,
}

impl Default for SchoolData {
    fn default() -> Self {
        SchoolData {
            subjects: Vec::new(),
            teachers: Vec::new(),
            classes: Vec::new(),
            days: Day::school_week(),
            periods: crate::grid::default_periods(),
            entries: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub overwrite: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEntry {
    pub class_name: String,
    pub day_of_week: Day,
    pub period: PeriodKey,
    pub subject: String,
    pub teacher_id: TeacherId,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPatch {
    pub class_name: Option<String>,
    pub day_of_week: Option<Day>,
    pub period: Option<PeriodKey>,
    pub subject: Option<String>,
    pub teacher_id: Option<TeacherId>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPeriod {
    pub period_number: PeriodKey,
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    List,
    Grid,
}

/// Filters for the timetable listing. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TimetableQuery {
    pub class: Option<String>,
    pub day: Option<Day>,
    pub teacher: Option<TeacherId>,
    #[serde(default)]
    pub view: ViewMode,
}

/// One row of the grid view: a day and its periods in schedulable order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridRow {
    pub day_of_week: Day,
    pub cells: Vec<GridCell>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridCell {
    pub period: PeriodKey,
    pub entries: Vec<TimetableEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetableStatistics {
    pub total_entries: usize,
    pub classes_scheduled: usize,
    pub teachers_scheduled: usize,
    pub subjects_scheduled: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetableView {
    pub timetable: Vec<TimetableEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid: Option<Vec<GridRow>>,
    pub available_classes: Vec<String>,
    pub available_teachers: Vec<TeacherRef>,
    pub subjects: Vec<Subject>,
    pub periods: BTreeMap<PeriodKey, PeriodTime>,
    pub days_of_week: Vec<Day>,
    pub statistics: TimetableStatistics,
}

/// A subject that could not be given all of its weekly periods.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Shortfall {
    pub subject: String,
    pub required: u32,
    pub placed: u32,
    pub reason: String,
}

impl fmt::Display for Shortfall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] placed {}/{}: {}",
            self.subject, self.placed, self.required, self.reason
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSummary {
    pub core_subjects: usize,
    pub science_subjects: usize,
    pub arts_subjects: usize,
    pub other_subjects: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverloadedTeacher {
    pub name: String,
    pub current_load: u32,
    pub recommended: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendations {
    pub current_teachers: usize,
    pub recommended_teachers: usize,
    pub average_load_per_teacher: f64,
    pub max_recommended_load: u32,
    pub need_more_teachers: bool,
    pub overloaded_teachers: Vec<OverloadedTeacher>,
}

/// The output of one generation run. Computed, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub total_periods: usize,
    pub subjects_included: usize,
    pub teachers_involved: usize,
    pub utilization_rate: u32,
    pub summary: SubjectSummary,
    pub recommendations: Recommendations,
    pub shortfalls: Vec<Shortfall>,
}
